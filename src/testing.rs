//! Fakes shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::StreamExt;

use crate::config::AppConfig;
use crate::error::{ClientError, StorageError};
use crate::models::{ChatChunk, ChatCompletionRequest, VerificationDocument};
use crate::services::client_factory::{ClientHandle, Connector};
use crate::services::inference::{ChunkStream, ClientConfig, InferenceClient};
use crate::services::settings::SettingsStore;
use crate::services::storage::{KeyValueStorage, MemoryStorage};

pub const TEST_MODEL: &str = "test-model";

pub fn sample_document(host: &str) -> VerificationDocument {
    VerificationDocument {
        config_repo: None,
        enclave_host: host.to_string(),
        format: "sev-snp".to_string(),
        body: "ZXZpZGVuY2U=".to_string(),
    }
}

pub fn settings_store(api_key: &str) -> Rc<SettingsStore> {
    let store = SettingsStore::load(&AppConfig::default(), Rc::new(MemoryStorage::default()));
    store.set_api_key(api_key);
    store.set_selected_model(TEST_MODEL);
    Rc::new(store)
}

pub fn chunk_stream(parts: &[&str]) -> ChunkStream {
    let items: Vec<Result<ChatChunk, ClientError>> =
        parts.iter().map(|part| Ok(ChatChunk::from_text(part))).collect();
    futures::stream::iter(items).boxed_local()
}

/// A stream the test feeds by hand.
pub fn channel_stream() -> (mpsc::UnboundedSender<Result<ChatChunk, ClientError>>, ChunkStream) {
    let (tx, rx) = mpsc::unbounded();
    (tx, rx.boxed_local())
}

pub enum DocumentReply {
    Now(Result<VerificationDocument, ClientError>),
    Later(oneshot::Receiver<Result<VerificationDocument, ClientError>>),
}

#[derive(Default)]
pub struct MockClient {
    calls: RefCell<Vec<&'static str>>,
    ready_error: RefCell<Option<ClientError>>,
    documents: RefCell<VecDeque<DocumentReply>>,
    streams: RefCell<VecDeque<Result<ChunkStream, ClientError>>>,
    requests: RefCell<Vec<ChatCompletionRequest>>,
}

impl MockClient {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.borrow().clone()
    }

    pub fn fail_ready(&self, err: ClientError) {
        *self.ready_error.borrow_mut() = Some(err);
    }

    pub fn push_document(&self, reply: Result<VerificationDocument, ClientError>) {
        self.documents.borrow_mut().push_back(DocumentReply::Now(reply));
    }

    pub fn push_pending_document(&self) -> oneshot::Sender<Result<VerificationDocument, ClientError>> {
        let (tx, rx) = oneshot::channel();
        self.documents.borrow_mut().push_back(DocumentReply::Later(rx));
        tx
    }

    pub fn push_stream(&self, reply: Result<ChunkStream, ClientError>) {
        self.streams.borrow_mut().push_back(reply);
    }
}

#[async_trait(?Send)]
impl InferenceClient for MockClient {
    async fn ready(&self) -> Result<(), ClientError> {
        self.calls.borrow_mut().push("ready");
        match self.ready_error.borrow().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn verification_document(&self) -> Result<VerificationDocument, ClientError> {
        self.calls.borrow_mut().push("verification_document");
        let reply = self.documents.borrow_mut().pop_front();
        match reply {
            Some(DocumentReply::Now(result)) => result,
            Some(DocumentReply::Later(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(ClientError::Network("reply dropped".into()))),
            None => Ok(sample_document("enclave.test")),
        }
    }

    async fn stream_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChunkStream, ClientError> {
        self.calls.borrow_mut().push("stream_chat_completion");
        self.requests.borrow_mut().push(request);
        let reply = self.streams.borrow_mut().pop_front();
        reply.unwrap_or_else(|| Ok(chunk_stream(&[])))
    }
}

/// Hands out prepared `MockClient`s (or fresh ones) and remembers every
/// client it built together with its configuration.
#[derive(Clone, Default)]
pub struct MockConnector {
    prepared: Rc<RefCell<VecDeque<Rc<MockClient>>>>,
    built: Rc<RefCell<Vec<(ClientConfig, Rc<MockClient>)>>>,
}

impl MockConnector {
    pub fn prepare(&self) -> Rc<MockClient> {
        let client = Rc::new(MockClient::default());
        self.prepared.borrow_mut().push_back(client.clone());
        client
    }

    pub fn connector(&self) -> Connector {
        let this = self.clone();
        Box::new(move |config: &ClientConfig| {
            let client = this.prepared.borrow_mut().pop_front().unwrap_or_default();
            this.built.borrow_mut().push((config.clone(), client.clone()));
            client as ClientHandle
        })
    }

    pub fn built(&self) -> usize {
        self.built.borrow().len()
    }

    pub fn configs(&self) -> Vec<ClientConfig> {
        self.built.borrow().iter().map(|(config, _)| config.clone()).collect()
    }

    pub fn client(&self, index: usize) -> Rc<MockClient> {
        self.built.borrow()[index].1.clone()
    }
}

pub struct FailingStorage;

impl KeyValueStorage for FailingStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Backend("read denied".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Backend("quota exceeded".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Backend("remove denied".into()))
    }
}

use std::cell::RefCell;
use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, LocalBoxStream};
use futures_util::StreamExt;
use reqwest::Client;

use crate::error::ClientError;
use crate::models::{AttestationResponse, ChatChunk, ChatCompletionRequest, VerificationDocument};

pub type ChunkStream = LocalBoxStream<'static, Result<ChatChunk, ClientError>>;

const ATTESTATION_PATH: &str = "/.well-known/tinfoil-attestation";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// What a client handle is bound to.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub config_repo: Option<String>,
    pub api_key: String,
}

/// A configured connection to the remote inference service.
#[async_trait(?Send)]
pub trait InferenceClient {
    /// Resolves once any out-of-band setup (enclave verification, channel
    /// negotiation) has finished and requests may be issued.
    async fn ready(&self) -> Result<(), ClientError>;

    async fn verification_document(&self) -> Result<VerificationDocument, ClientError>;

    async fn stream_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChunkStream, ClientError>;
}

/// OpenAI-compatible client that talks to the enclave proxy over HTTP.
pub struct HttpInferenceClient {
    http: Client,
    config: ClientConfig,
    document: RefCell<Option<VerificationDocument>>,
}

impl HttpInferenceClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            document: RefCell::new(None),
        }
    }

    fn get_clean_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn fetch_document(&self) -> Result<VerificationDocument, ClientError> {
        let url = format!("{}{}", self.get_clean_url(), ATTESTATION_PATH);
        let resp = self.http.get(url).send().await?;
        let resp = check_status(resp).await?;
        let attestation: AttestationResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::InvalidDocument(e.to_string()))?;

        let document = VerificationDocument {
            config_repo: self.config.config_repo.clone(),
            enclave_host: enclave_host(&self.config.base_url),
            format: attestation.format,
            body: attestation.body,
        };
        document.validate()?;
        Ok(document)
    }
}

#[async_trait(?Send)]
impl InferenceClient for HttpInferenceClient {
    async fn ready(&self) -> Result<(), ClientError> {
        if self.document.borrow().is_some() {
            return Ok(());
        }
        let document = self.fetch_document().await?;
        *self.document.borrow_mut() = Some(document);
        Ok(())
    }

    async fn verification_document(&self) -> Result<VerificationDocument, ClientError> {
        self.ready().await?;
        self.document
            .borrow()
            .clone()
            .ok_or_else(|| ClientError::InvalidDocument("attestation was not retained".into()))
    }

    async fn stream_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChunkStream, ClientError> {
        let url = format!("{}{}", self.get_clean_url(), COMPLETIONS_PATH);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(decode_event_stream(resp.bytes_stream()))
    }
}

fn enclave_host(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let without_scheme = base.split("://").nth(1).unwrap_or(base);
    without_scheme.split('/').next().unwrap_or(without_scheme).to_string()
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Turns a raw byte stream of server-sent events into decoded chunks. The
/// stream ends at `data: [DONE]`, at the end of the body, or after the first
/// error.
pub fn decode_event_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: futures_util::Stream<Item = Result<B, E>> + 'static,
    B: AsRef<[u8]> + 'static,
    E: Into<ClientError> + 'static,
{
    let pending = VecDeque::<Result<ChatChunk, ClientError>>::new();
    let state = (bytes.boxed_local(), SseDecoder::default(), pending, false);
    stream::unfold(state, |(mut bytes, mut decoder, mut pending, mut done)| async move {
        loop {
            if let Some(item) = pending.pop_front() {
                return Some((item, (bytes, decoder, pending, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in decoder.push(chunk.as_ref()) {
                        match event {
                            SseEvent::Chunk(chunk) => pending.push_back(Ok(chunk)),
                            SseEvent::Done => {
                                done = true;
                                break;
                            }
                            SseEvent::Malformed(e) => {
                                pending.push_back(Err(ClientError::MalformedStream(e)));
                                done = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    pending.push_back(Err(e.into()));
                    done = true;
                }
                None => {
                    for event in decoder.finish() {
                        match event {
                            SseEvent::Chunk(chunk) => pending.push_back(Ok(chunk)),
                            SseEvent::Malformed(e) => {
                                pending.push_back(Err(ClientError::MalformedStream(e)))
                            }
                            SseEvent::Done => {}
                        }
                    }
                    done = true;
                }
            }
        }
    })
    .boxed_local()
}

#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Chunk(ChatChunk),
    Done,
    Malformed(String),
}

/// Line-oriented SSE decoder. Lines (and multi-byte characters) may be split
/// across transport chunks, so raw bytes are buffered until a newline.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = Self::parse_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&line);
        Self::parse_line(line.trim()).into_iter().collect()
    }

    fn parse_line(line: &str) -> Option<SseEvent> {
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }
        Some(match serde_json::from_str::<ChatChunk>(data) {
            Ok(chunk) => SseEvent::Chunk(chunk),
            Err(e) => SseEvent::Malformed(format!("{}: {}", e, data)),
        })
    }
}

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use futures_util::future::{self, AbortHandle, Abortable, LocalBoxFuture};
use futures_util::FutureExt;

use crate::controllers::observable::{SubscriptionId, Subscribers};
use crate::error::ClientError;
use crate::models::VerificationDocument;
use crate::services::client_factory::InferenceClientFactory;

const FALLBACK_ERROR: &str = "Unable to verify the enclave. Try again.";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VerificationStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl VerificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationStatus::Idle => "Verification center",
            VerificationStatus::Loading => "Verifying enclave...",
            VerificationStatus::Success => "Enclave verified",
            VerificationStatus::Error => "Verification failed",
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct VerificationSnapshot {
    pub status: VerificationStatus,
    pub document: Option<VerificationDocument>,
    pub error: Option<String>,
}

impl Default for VerificationSnapshot {
    fn default() -> Self {
        Self {
            status: VerificationStatus::Idle,
            document: None,
            error: None,
        }
    }
}

impl VerificationSnapshot {
    pub fn tooltip(&self) -> String {
        match self.status {
            VerificationStatus::Error => self
                .error
                .clone()
                .unwrap_or_else(|| "Verification unavailable".to_string()),
            status => status.label().to_string(),
        }
    }
}

struct Inner {
    factory: Rc<InferenceClientFactory>,
    snapshot: RefCell<VerificationSnapshot>,
    generation: Cell<u64>,
    in_flight: RefCell<Option<AbortHandle>>,
    detached: Cell<bool>,
    subscribers: Subscribers<VerificationSnapshot>,
}

impl Inner {
    fn update(&self, apply: impl FnOnce(&mut VerificationSnapshot)) {
        let snapshot = {
            let mut current = self.snapshot.borrow_mut();
            apply(&mut current);
            current.clone()
        };
        self.subscribers.notify(&snapshot);
    }

    fn finish(&self, generation: u64, result: Result<VerificationDocument, ClientError>) {
        if self.detached.get() || self.generation.get() != generation {
            return;
        }
        self.in_flight.borrow_mut().take();
        match result {
            Ok(document) => self.update(|s| {
                s.status = VerificationStatus::Success;
                s.document = Some(document);
                s.error = None;
            }),
            Err(e) => {
                log::error!("unable to load verification document: {}", e);
                let message = e.to_string();
                self.update(|s| {
                    s.status = VerificationStatus::Error;
                    s.document = None;
                    s.error = Some(if message.is_empty() { FALLBACK_ERROR.to_string() } else { message });
                });
            }
        }
    }
}

/// Drives the attestation document lifecycle:
/// `idle -> loading -> success | error`, with `loading` re-entered on refresh.
///
/// Only the latest refresh may complete; an earlier one still in flight is
/// aborted. After [`detach`](Self::detach) no completion touches the state.
#[derive(Clone)]
pub struct VerificationController {
    inner: Rc<Inner>,
}

impl VerificationController {
    pub fn new(factory: Rc<InferenceClientFactory>) -> Self {
        Self {
            inner: Rc::new(Inner {
                factory,
                snapshot: RefCell::new(VerificationSnapshot::default()),
                generation: Cell::new(0),
                in_flight: RefCell::new(None),
                detached: Cell::new(false),
                subscribers: Subscribers::default(),
            }),
        }
    }

    pub fn snapshot(&self) -> VerificationSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn status(&self) -> VerificationStatus {
        self.inner.snapshot.borrow().status
    }

    pub fn subscribe(&self, listener: impl Fn(&VerificationSnapshot) + 'static) -> SubscriptionId {
        self.inner.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.unsubscribe(id);
    }

    /// Enters `loading` immediately and returns the fetch to be driven by the
    /// caller. With `reinitialize` the client handle is rebuilt first, which is
    /// required after an API key change.
    pub fn refresh(&self, reinitialize: bool) -> LocalBoxFuture<'static, ()> {
        let inner = self.inner.clone();
        if inner.detached.get() {
            return future::ready(()).boxed_local();
        }

        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);
        if let Some(previous) = inner.in_flight.borrow_mut().take() {
            previous.abort();
        }

        let client = if reinitialize {
            inner.factory.reinitialize()
        } else {
            inner.factory.get_or_create()
        };
        inner.update(|s| {
            s.status = VerificationStatus::Loading;
            s.error = None;
        });

        let (handle, registration) = AbortHandle::new_pair();
        *inner.in_flight.borrow_mut() = Some(handle);
        let fetch = Abortable::new(
            async move {
                client.ready().await?;
                let document = client.verification_document().await?;
                document.validate()?;
                Ok::<_, ClientError>(document)
            },
            registration,
        );

        async move {
            if let Ok(result) = fetch.await {
                inner.finish(generation, result);
            }
        }
        .boxed_local()
    }

    /// Serves the attestation widget's on-demand request: the current
    /// document when verified, otherwise the document of whichever run
    /// finishes next. A refresh started elsewhere may supersede the one
    /// started here; the winner's outcome is what resolves the request.
    pub fn request_document(&self) -> LocalBoxFuture<'static, Option<VerificationDocument>> {
        let snapshot = self.snapshot();
        if snapshot.status == VerificationStatus::Success && snapshot.document.is_some() {
            return future::ready(snapshot.document).boxed_local();
        }
        if self.inner.detached.get() {
            return future::ready(None).boxed_local();
        }

        let (tx, rx) = oneshot::channel();
        let tx = RefCell::new(Some(tx));
        let subscription = self.inner.subscribers.subscribe(move |s: &VerificationSnapshot| {
            if matches!(s.status, VerificationStatus::Success | VerificationStatus::Error) {
                if let Some(tx) = tx.borrow_mut().take() {
                    let _ = tx.send(s.document.clone());
                }
            }
        });

        let refresh = self.refresh(false);
        let inner = self.inner.clone();
        async move {
            refresh.await;
            // Cancelled when detach drops the listener.
            let document = rx.await.unwrap_or(None);
            inner.subscribers.unsubscribe(subscription);
            document
        }
        .boxed_local()
    }

    /// Re-runs verification only when the last run failed.
    pub fn retry_if_failed(&self) -> Option<LocalBoxFuture<'static, ()>> {
        if self.status() == VerificationStatus::Error {
            Some(self.refresh(false))
        } else {
            None
        }
    }

    /// Stops all pending work and drops every listener; later completions
    /// are dropped.
    pub fn detach(&self) {
        self.inner.detached.set(true);
        if let Some(handle) = self.inner.in_flight.borrow_mut().take() {
            handle.abort();
        }
        self.inner.subscribers.clear();
    }

    #[cfg(test)]
    pub fn is_detached(&self) -> bool {
        self.inner.detached.get()
    }
}

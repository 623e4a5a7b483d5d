use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_util::future::{self, AbortHandle, Abortable, LocalBoxFuture};
use futures_util::{FutureExt, StreamExt};

use crate::controllers::observable::{SubscriptionId, Subscribers};
use crate::error::{ClientError, SessionError};
use crate::models::{ChatCompletionRequest, Message, Role, Settings, WireMessage};
use crate::services::client_factory::InferenceClientFactory;
use crate::services::settings::SettingsStore;

pub const UNABLE_TO_COMPLETE: &str = "Unable to complete the request. Check the settings and try again.";
pub const MISSING_API_KEY: &str = "Add an API key in settings before sending a message.";
pub const MISSING_MODEL: &str = "Select a model in settings before sending a message.";

#[derive(Clone, PartialEq, Debug, Default)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub is_streaming: bool,
    pub stream_error: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum TurnOutcome {
    /// Empty input, a turn already streaming, or a detached controller.
    Rejected,
    Completed,
    Cancelled,
    Failed(SessionError),
}

struct Inner {
    settings: Rc<SettingsStore>,
    factory: Rc<InferenceClientFactory>,
    snapshot: RefCell<ChatSnapshot>,
    in_flight: RefCell<Option<AbortHandle>>,
    detached: Cell<bool>,
    subscribers: Subscribers<ChatSnapshot>,
}

impl Inner {
    fn update(&self, apply: impl FnOnce(&mut ChatSnapshot)) {
        let snapshot = {
            let mut current = self.snapshot.borrow_mut();
            apply(&mut current);
            current.clone()
        };
        self.subscribers.notify(&snapshot);
    }

    fn append_delta(&self, message_id: &str, delta: &str) {
        if self.detached.get() {
            return;
        }
        self.update(|s| {
            if let Some(message) = s.messages.iter_mut().find(|m| m.id == message_id) {
                message.content.push_str(delta);
            }
        });
    }

    fn end_turn(&self) {
        self.in_flight.borrow_mut().take();
        self.update(|s| s.is_streaming = false);
    }

    /// Overwrites whatever was streamed so far with the fixed failure text.
    fn fail_turn(&self, message_id: &str, detail: String) {
        self.in_flight.borrow_mut().take();
        self.update(|s| {
            if let Some(message) = s.messages.iter_mut().find(|m| m.id == message_id) {
                message.content = UNABLE_TO_COMPLETE.to_string();
            }
            s.stream_error = Some(detail);
            s.is_streaming = false;
        });
    }
}

/// Returns the controller to idle if a turn's future is dropped before it
/// settles. Disarmed once the turn has ended on its own.
struct TurnGuard {
    inner: Rc<Inner>,
    armed: bool,
}

impl TurnGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.armed || self.inner.detached.get() {
            return;
        }
        log::debug!("turn dropped before it finished");
        if let Some(handle) = self.inner.in_flight.borrow_mut().take() {
            handle.abort();
        }
        self.inner.update(|s| s.is_streaming = false);
    }
}

/// Owns the transcript and the single streaming turn.
#[derive(Clone)]
pub struct ChatSessionController {
    inner: Rc<Inner>,
}

impl ChatSessionController {
    pub fn new(settings: Rc<SettingsStore>, factory: Rc<InferenceClientFactory>) -> Self {
        Self {
            inner: Rc::new(Inner {
                settings,
                factory,
                snapshot: RefCell::new(ChatSnapshot::default()),
                in_flight: RefCell::new(None),
                detached: Cell::new(false),
                subscribers: Subscribers::default(),
            }),
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.snapshot.borrow().is_streaming
    }

    pub fn subscribe(&self, listener: impl Fn(&ChatSnapshot) + 'static) -> SubscriptionId {
        self.inner.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers.unsubscribe(id);
    }

    /// Starts a turn. The user and assistant messages are appended before this
    /// returns; the returned future drives the request and resolves when the
    /// turn is back to idle. Dropping the future early cancels the turn.
    pub fn send_message(&self, text: &str) -> LocalBoxFuture<'static, TurnOutcome> {
        let inner = self.inner.clone();
        let trimmed = text.trim();
        if trimmed.is_empty() || inner.detached.get() || self.is_streaming() {
            return future::ready(TurnOutcome::Rejected).boxed_local();
        }

        let settings = inner.settings.settings();
        let user = Message::user(trimmed);
        let assistant = Message::assistant_placeholder();
        let assistant_id = assistant.id.clone();
        inner.update(|s| {
            s.messages.push(user);
            s.messages.push(assistant);
            s.is_streaming = true;
            s.stream_error = None;
        });

        if let Err(err) = check_preconditions(&settings) {
            inner.fail_turn(&assistant_id, err.to_string());
            return future::ready(TurnOutcome::Failed(err)).boxed_local();
        }

        let request = ChatCompletionRequest {
            model: settings.selected_model_name.trim().to_string(),
            messages: upstream_messages(&settings.system_prompt, &inner.snapshot.borrow().messages),
            stream: true,
        };
        log::debug!("sending {} messages to {}", request.messages.len(), request.model);

        let client = inner.factory.get_or_create();
        let (handle, registration) = AbortHandle::new_pair();
        *inner.in_flight.borrow_mut() = Some(handle);

        let streaming = inner.clone();
        let target = assistant_id.clone();
        let turn = Abortable::new(
            async move {
                client.ready().await?;
                let mut chunks = client.stream_chat_completion(request).await?;
                while let Some(chunk) = chunks.next().await {
                    if let Some(delta) = chunk?.text_delta() {
                        streaming.append_delta(&target, delta);
                    }
                }
                Ok::<(), ClientError>(())
            },
            registration,
        );

        let mut guard = TurnGuard {
            inner: inner.clone(),
            armed: true,
        };
        async move {
            let result = match turn.await {
                Ok(result) => result.map_err(SessionError::from),
                Err(_aborted) => Err(SessionError::Cancelled),
            };
            guard.disarm();
            if inner.detached.get() {
                return TurnOutcome::Cancelled;
            }
            match result {
                Ok(()) => {
                    inner.end_turn();
                    TurnOutcome::Completed
                }
                Err(err) if err.is_cancelled() => {
                    inner.end_turn();
                    TurnOutcome::Cancelled
                }
                Err(err) => {
                    log::error!("streaming error: {}", err);
                    inner.fail_turn(&assistant_id, err.to_string());
                    TurnOutcome::Failed(err)
                }
            }
        }
        .boxed_local()
    }

    /// Aborts the turn in flight. Text streamed so far is kept.
    pub fn cancel(&self) {
        if let Some(handle) = self.inner.in_flight.borrow().as_ref() {
            handle.abort();
        }
    }

    pub fn dismiss_error(&self) {
        if self.inner.snapshot.borrow().stream_error.is_none() {
            return;
        }
        self.inner.update(|s| s.stream_error = None);
    }

    /// Stops the turn in flight; later completions are dropped.
    pub fn detach(&self) {
        self.inner.detached.set(true);
        if let Some(handle) = self.inner.in_flight.borrow_mut().take() {
            handle.abort();
        }
    }
}

fn check_preconditions(settings: &Settings) -> Result<(), SessionError> {
    if settings.api_key.trim().is_empty() {
        return Err(SessionError::Configuration(MISSING_API_KEY.to_string()));
    }
    if settings.selected_model_name.trim().is_empty() {
        return Err(SessionError::Configuration(MISSING_MODEL.to_string()));
    }
    Ok(())
}

/// System prompt first, then the transcript in order without empty entries.
pub fn upstream_messages(system_prompt: &str, conversation: &[Message]) -> Vec<WireMessage> {
    let mut messages = vec![WireMessage {
        role: Role::System,
        content: system_prompt.to_string(),
    }];
    messages.extend(
        conversation
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| WireMessage {
                role: m.role,
                content: m.content.clone(),
            }),
    );
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DEFAULT_SYSTEM_PROMPT};
    use crate::models::ChatChunk;
    use crate::testing::{channel_stream, chunk_stream, settings_store, MockConnector, TEST_MODEL};
    use futures::executor::block_on;
    use futures::poll;
    use pretty_assertions::assert_eq;

    fn controller(connector: &MockConnector, settings: Rc<SettingsStore>) -> ChatSessionController {
        let factory = InferenceClientFactory::new(&AppConfig::default(), settings.clone(), connector.connector());
        ChatSessionController::new(settings, Rc::new(factory))
    }

    fn contents(chat: &ChatSessionController) -> Vec<(Role, String)> {
        chat.snapshot()
            .messages
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect()
    }

    fn wire(role: Role, content: &str) -> WireMessage {
        WireMessage { role, content: content.to_string() }
    }

    #[test]
    fn appends_user_and_assistant_before_any_network_call() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        let chat = controller(&connector, settings_store("k"));

        let turn = chat.send_message("  hello  ");
        assert_eq!(
            contents(&chat),
            vec![(Role::User, "hello".to_string()), (Role::Assistant, String::new())]
        );
        assert!(chat.is_streaming());
        assert!(client.calls().is_empty());

        assert_eq!(block_on(turn), TurnOutcome::Completed);
        assert!(!chat.is_streaming());
    }

    #[test]
    fn blank_input_is_rejected() {
        let connector = MockConnector::default();
        let chat = controller(&connector, settings_store("k"));

        assert_eq!(block_on(chat.send_message(" \n\t")), TurnOutcome::Rejected);
        assert!(chat.snapshot().messages.is_empty());
        assert_eq!(connector.built(), 0);
    }

    #[test]
    fn deltas_are_appended_in_order() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        client.push_stream(Ok(chunk_stream(&["Hel", "lo"])));
        let chat = controller(&connector, settings_store("k"));

        assert_eq!(block_on(chat.send_message("hi")), TurnOutcome::Completed);
        assert_eq!(chat.snapshot().messages[1].content, "Hello");
        assert_eq!(chat.snapshot().stream_error, None);
        assert_eq!(client.calls(), vec!["ready", "stream_chat_completion"]);
    }

    #[test]
    fn request_carries_system_prompt_model_and_non_empty_history() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        client.push_stream(Ok(chunk_stream(&["Hello"])));
        let chat = controller(&connector, settings_store("k"));

        block_on(chat.send_message("first"));
        block_on(chat.send_message("second"));

        let requests = client.requests();
        assert_eq!(requests[0].model, TEST_MODEL);
        assert!(requests[0].stream);
        assert_eq!(
            requests[0].messages,
            vec![wire(Role::System, DEFAULT_SYSTEM_PROMPT), wire(Role::User, "first")]
        );
        assert_eq!(
            requests[1].messages,
            vec![
                wire(Role::System, DEFAULT_SYSTEM_PROMPT),
                wire(Role::User, "first"),
                wire(Role::Assistant, "Hello"),
                wire(Role::User, "second"),
            ]
        );
    }

    #[test]
    fn send_while_streaming_is_a_no_op() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        let (tx, stream) = channel_stream();
        client.push_stream(Ok(stream));
        let chat = controller(&connector, settings_store("k"));

        block_on(async {
            let mut turn = chat.send_message("one");
            assert!(poll!(&mut turn).is_pending());

            assert_eq!(chat.send_message("two").await, TurnOutcome::Rejected);
            assert_eq!(chat.snapshot().messages.len(), 2);

            tx.unbounded_send(Ok(ChatChunk::from_text("Hel"))).unwrap();
            tx.unbounded_send(Ok(ChatChunk::from_text("lo"))).unwrap();
            drop(tx);
            assert_eq!(turn.await, TurnOutcome::Completed);
        });

        assert_eq!(chat.snapshot().messages[1].content, "Hello");
    }

    #[test]
    fn failure_mid_stream_replaces_partial_text() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        let (tx, stream) = channel_stream();
        client.push_stream(Ok(stream));
        let chat = controller(&connector, settings_store("k"));

        tx.unbounded_send(Ok(ChatChunk::from_text("partial answer"))).unwrap();
        tx.unbounded_send(Err(ClientError::Network("connection reset".into()))).unwrap();

        let outcome = block_on(chat.send_message("hi"));
        assert_eq!(
            outcome,
            TurnOutcome::Failed(SessionError::Transport(ClientError::Network("connection reset".into())))
        );
        let snapshot = chat.snapshot();
        assert_eq!(snapshot.messages[1].content, UNABLE_TO_COMPLETE);
        assert_eq!(snapshot.stream_error.as_deref(), Some("network error: connection reset"));
        assert!(!snapshot.is_streaming);
    }

    #[test]
    fn failure_to_open_the_stream_is_reported() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        client.push_stream(Err(ClientError::Status { status: 401, body: "bad key".into() }));
        let chat = controller(&connector, settings_store("k"));

        assert!(matches!(block_on(chat.send_message("hi")), TurnOutcome::Failed(_)));
        assert_eq!(chat.snapshot().messages[0].content, "hi");
        assert_eq!(chat.snapshot().messages[1].content, UNABLE_TO_COMPLETE);
    }

    #[test]
    fn missing_api_key_fails_without_network() {
        let connector = MockConnector::default();
        let chat = controller(&connector, settings_store(""));

        let outcome = block_on(chat.send_message("hi"));
        assert_eq!(
            outcome,
            TurnOutcome::Failed(SessionError::Configuration(MISSING_API_KEY.to_string()))
        );
        assert_eq!(
            contents(&chat),
            vec![(Role::User, "hi".to_string()), (Role::Assistant, UNABLE_TO_COMPLETE.to_string())]
        );
        assert_eq!(chat.snapshot().stream_error.as_deref(), Some(MISSING_API_KEY));
        assert_eq!(connector.built(), 0);
        assert!(!chat.is_streaming());
    }

    #[test]
    fn missing_model_fails_without_network() {
        let connector = MockConnector::default();
        let settings = settings_store("k");
        settings.set_selected_model("");
        let chat = controller(&connector, settings);

        let outcome = block_on(chat.send_message("hi"));
        assert_eq!(
            outcome,
            TurnOutcome::Failed(SessionError::Configuration(MISSING_MODEL.to_string()))
        );
        assert_eq!(connector.built(), 0);
    }

    #[test]
    fn cancel_keeps_streamed_text_without_error() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        let (tx, stream) = channel_stream();
        client.push_stream(Ok(stream));
        let chat = controller(&connector, settings_store("k"));

        block_on(async {
            let mut turn = chat.send_message("hi");
            tx.unbounded_send(Ok(ChatChunk::from_text("Hel"))).unwrap();
            assert!(poll!(&mut turn).is_pending());

            chat.cancel();
            tx.unbounded_send(Ok(ChatChunk::from_text("lo"))).unwrap();
            assert_eq!(turn.await, TurnOutcome::Cancelled);
        });

        let snapshot = chat.snapshot();
        assert_eq!(snapshot.messages[1].content, "Hel");
        assert_eq!(snapshot.stream_error, None);
        assert!(!snapshot.is_streaming);
    }

    #[test]
    fn transport_abort_is_not_an_error() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        let (tx, stream) = channel_stream();
        client.push_stream(Ok(stream));
        let chat = controller(&connector, settings_store("k"));

        tx.unbounded_send(Ok(ChatChunk::from_text("Hel"))).unwrap();
        tx.unbounded_send(Err(ClientError::Aborted)).unwrap();

        assert_eq!(block_on(chat.send_message("hi")), TurnOutcome::Cancelled);
        assert_eq!(chat.snapshot().messages[1].content, "Hel");
        assert_eq!(chat.snapshot().stream_error, None);
    }

    #[test]
    fn dropping_an_unfinished_turn_returns_to_idle() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        let (tx, stream) = channel_stream();
        client.push_stream(Ok(stream));
        let chat = controller(&connector, settings_store("k"));

        block_on(async {
            let mut turn = chat.send_message("hi");
            tx.unbounded_send(Ok(ChatChunk::from_text("Hel"))).unwrap();
            assert!(poll!(&mut turn).is_pending());
            drop(turn);
        });

        assert!(!chat.is_streaming());
        assert_eq!(chat.snapshot().messages[1].content, "Hel");
        assert_eq!(block_on(chat.send_message("again")), TurnOutcome::Completed);
    }

    #[test]
    fn dropping_a_turn_that_never_ran_returns_to_idle() {
        let connector = MockConnector::default();
        let chat = controller(&connector, settings_store("k"));

        drop(chat.send_message("hi"));
        assert!(!chat.is_streaming());
        assert_eq!(block_on(chat.send_message("again")), TurnOutcome::Completed);
        assert_eq!(chat.snapshot().messages.len(), 4);
    }

    #[test]
    fn detached_controller_ignores_late_chunks() {
        let connector = MockConnector::default();
        let client = connector.prepare();
        let (tx, stream) = channel_stream();
        client.push_stream(Ok(stream));
        let chat = controller(&connector, settings_store("k"));

        block_on(async {
            let mut turn = chat.send_message("hi");
            assert!(poll!(&mut turn).is_pending());

            chat.detach();
            tx.unbounded_send(Ok(ChatChunk::from_text("late"))).unwrap();
            turn.await;
        });

        let snapshot = chat.snapshot();
        assert_eq!(snapshot.messages[1].content, "");
        assert_eq!(block_on(chat.send_message("again")), TurnOutcome::Rejected);
        assert_eq!(chat.snapshot().messages.len(), 2);
    }

    #[test]
    fn new_api_key_gets_a_new_client() {
        let connector = MockConnector::default();
        let settings = settings_store("key-1");
        let chat = controller(&connector, settings.clone());

        block_on(chat.send_message("one"));
        let old = connector.client(0);
        let old_calls = old.calls().len();

        settings.set_api_key("key-2");
        block_on(chat.send_message("two"));

        assert_eq!(connector.built(), 2);
        assert_eq!(old.calls().len(), old_calls);
        assert_eq!(connector.client(1).requests().len(), 1);
    }

    #[test]
    fn error_banner_can_be_dismissed() {
        let connector = MockConnector::default();
        let chat = controller(&connector, settings_store(""));
        block_on(chat.send_message("hi"));
        assert!(chat.snapshot().stream_error.is_some());

        chat.dismiss_error();
        assert_eq!(chat.snapshot().stream_error, None);
    }

    #[test]
    fn upstream_skips_whitespace_only_entries() {
        let mut assistant = Message::assistant_placeholder();
        assistant.content = "  ".to_string();
        let messages = upstream_messages("sys", &[Message::user("q"), assistant]);
        assert_eq!(messages, vec![wire(Role::System, "sys"), wire(Role::User, "q")]);
    }
}

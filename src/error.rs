use thiserror::Error;

/// Name the browser gives a fetch rejected through an `AbortController`.
const ABORT_ERROR: &str = "AbortError";

/// Failures reported by the inference client and its transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed stream: {0}")]
    MalformedStream(String),
    #[error("invalid verification document: {0}")]
    InvalidDocument(String),
    #[error("request aborted")]
    Aborted,
}

impl ClientError {
    pub fn is_abort(&self) -> bool {
        matches!(self, ClientError::Aborted)
    }

    /// Classifies a transport failure by its message. In the browser an
    /// aborted fetch surfaces as a `DOMException` named `AbortError`.
    pub fn transport(message: String) -> Self {
        if message.contains(ABORT_ERROR) {
            ClientError::Aborted
        } else {
            ClientError::Network(message)
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ClientError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            ClientError::MalformedStream(err.to_string())
        } else {
            ClientError::transport(err.to_string())
        }
    }
}

/// Outcome classification for a chat turn or verification run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("{0}")]
    Configuration(String),
    #[error(transparent)]
    Transport(ClientError),
    #[error("cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }
}

impl From<ClientError> for SessionError {
    fn from(err: ClientError) -> Self {
        if err.is_abort() {
            SessionError::Cancelled
        } else {
            SessionError::Transport(err)
        }
    }
}

/// Durable storage problems. These are warnings: the in-memory value stays
/// authoritative and nothing is surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("durable storage is not available")]
    Unavailable,
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_maps_to_cancellation() {
        assert_eq!(SessionError::from(ClientError::Aborted), SessionError::Cancelled);
        assert!(SessionError::from(ClientError::Aborted).is_cancelled());

        let err = SessionError::from(ClientError::Network("offline".into()));
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "network error: offline");
    }

    #[test]
    fn browser_abort_is_classified_as_abort() {
        let err = ClientError::transport(
            "JsValue(AbortError: The user aborted a request.)".to_string(),
        );
        assert!(err.is_abort());
        assert_eq!(SessionError::from(err), SessionError::Cancelled);

        let err = ClientError::transport("JsValue(TypeError: Failed to fetch)".to_string());
        assert_eq!(err, ClientError::Network("JsValue(TypeError: Failed to fetch)".to_string()));
    }
}

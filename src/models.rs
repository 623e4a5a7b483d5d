use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_SYSTEM_PROMPT;
use crate::error::ClientError;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One transcript entry. The id stays fixed for the whole turn so streamed
/// deltas can be routed to the right entry.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: format!("user-{}", Uuid::new_v4()),
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant_placeholder() -> Self {
        Self {
            id: format!("assistant-{}", Uuid::new_v4()),
            role: Role::Assistant,
            content: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Settings {
    pub api_key: String,
    pub system_prompt: String,
    pub selected_model_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            selected_model_name: String::new(),
        }
    }
}

/// Catalog entry as served by the models endpoint.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatModel {
    pub model_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_short: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub requires_api_key: Option<bool>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub chat: Option<bool>,
    #[serde(default)]
    pub paid: Option<bool>,
}

impl ChatModel {
    pub fn is_chat_capable(&self) -> bool {
        let chat_type = self.kind.as_deref().map_or(true, |kind| kind == "chat");
        !self.endpoint.is_empty() && chat_type && self.chat.unwrap_or(true)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.model_name
        } else {
            &self.name
        }
    }
}

/// Attestation evidence for the remote enclave. Opaque to the session beyond
/// presence and basic well-formedness.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDocument {
    #[serde(default)]
    pub config_repo: Option<String>,
    pub enclave_host: String,
    pub format: String,
    pub body: String,
}

impl VerificationDocument {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.enclave_host.trim().is_empty() {
            return Err(ClientError::InvalidDocument("missing enclave host".into()));
        }
        if self.format.trim().is_empty() {
            return Err(ClientError::InvalidDocument("missing attestation format".into()));
        }
        if self.body.trim().is_empty() {
            return Err(ClientError::InvalidDocument("empty attestation body".into()));
        }
        Ok(())
    }
}

// API DTOs

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
}

/// One decoded streaming event. Only `choices[0].delta.content` is used.
#[derive(Deserialize, Clone, PartialEq, Debug, Default)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Clone, PartialEq, Debug, Default)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

#[derive(Deserialize, Clone, PartialEq, Debug, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
}

impl ChatChunk {
    pub fn from_text(text: &str) -> Self {
        Self {
            choices: vec![StreamChoice {
                delta: StreamDelta {
                    content: Some(text.to_string()),
                },
            }],
        }
    }

    pub fn text_delta(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|text| !text.is_empty())
    }
}

/// Attestation payload served by the enclave's well-known endpoint.
#[derive(Deserialize, Clone, PartialEq, Debug)]
pub struct AttestationResponse {
    pub format: String,
    pub body: String,
}

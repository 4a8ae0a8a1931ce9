use crate::error::{ProviderError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// One conversation turn. Immutable once appended to a branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Events emitted during streaming LLM responses.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    Done,
    Error(ProviderError),
}

/// The LLM client trait. Implementations provide both blocking and streaming chat.
///
/// Model, sampling parameters and credentials are bound when the client is
/// built, so callers only pass the conversation.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a chat request and get the full response.
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse>;

    /// Send a chat request and get a stream of events. The stream is finite
    /// and ends with `Done` or `Error`.
    async fn chat_stream(
        &self,
        messages: &[Message],
    ) -> Result<futures::channel::mpsc::UnboundedReceiver<StreamEvent>>;

    /// Human-readable provider name, used in error messages.
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;
}

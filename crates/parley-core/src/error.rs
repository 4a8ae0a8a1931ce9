use thiserror::Error;

/// Failures reported by a chat provider. Never retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Map a non-success HTTP status and its body onto the taxonomy.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let detail = format!("{provider} API error ({status}): {}", body.trim());
        match status {
            401 | 403 => Self::Authentication(detail),
            429 => Self::RateLimit(detail),
            404 => Self::ModelUnavailable(detail),
            400 if body.to_lowercase().contains("model") => Self::ModelUnavailable(detail),
            s if s >= 500 => Self::Network(detail),
            _ => Self::MalformedResponse(detail),
        }
    }

    /// A response stream that closed before its terminator.
    pub fn stream_truncated(provider: &str) -> Self {
        Self::Network(format!("{provider} stream ended before completion"))
    }
}

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown command: {command}{}", suggestion_suffix(.suggestion))]
    UnknownCommand {
        command: String,
        suggestion: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,
}

impl ParleyError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// True for errors that leave the conversation usable and should just be
    /// shown inline.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

impl From<reqwest::Error> for ParleyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Provider(ProviderError::MalformedResponse(e.to_string()))
        } else {
            Self::Provider(ProviderError::Network(e.to_string()))
        }
    }
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean {s}?)"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, ParleyError>;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Slack authentication failed: {0}")]
    Authentication(String),

    #[error("Slack API rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("Storage error for {key}: {message}")]
    Storage { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Broad error category driving retry and exit behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credential rejected; nothing should be attempted.
    Authentication,
    /// Network, timeout, 5xx, throttling or storage hiccup.
    Transient,
    /// The service answered with something we cannot interpret.
    Malformed,
    /// Everything else.
    Fatal,
}

impl ArchiverError {
    pub fn malformed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Authentication(_) => ErrorClass::Authentication,
            Self::RateLimited { .. } | Self::Transport(_) | Self::Storage { .. } => {
                ErrorClass::Transient
            }
            Self::MalformedResponse { .. } => ErrorClass::Malformed,
            Self::SlackApi(_) | Self::Config(_) | Self::Io(_) | Self::Serde(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Throttling hint supplied by the service, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ArchiverError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArchiverError>;

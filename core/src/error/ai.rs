use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the AI service layer, classified by HTTP status or
/// transport error kind.
#[derive(Error, Debug, Clone)]
pub enum AiServiceError {
    /// Missing or rejected API key. Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP 429. `retry_after` carries the provider hint when present.
    #[error("rate limited by provider: {message}")]
    RateLimit {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Transient network fault (connect, timeout, dropped body).
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other non-2xx response or a malformed payload.
    #[error("provider API error (status={status:?}): {message}")]
    ProviderApi {
        status: Option<u16>,
        message: String,
    },
}

impl AiServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit { .. } | Self::Connection(_))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::RateLimit { .. } => "rate_limit",
            Self::Connection(_) => "connection",
            Self::ProviderApi { .. } => "provider_api",
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::ProviderApi {
                status: err.status().map(|s| s.as_u16()),
                message: format!("failed to decode response: {}", err),
            }
        } else {
            Self::ProviderApi {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ProviderApi {
            status,
            message: message.into(),
        }
    }
}

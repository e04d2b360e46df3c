use thiserror::Error;

/// Failures talking to an LLM provider or a market data source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Authentication rejected by provider: {0}")]
    Auth(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("No credential configured for provider '{0}'")]
    MissingCredential(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("No price available for symbol: {0}")]
    PriceUnavailable(String),
}

impl ApiError {
    /// Maps a non-success HTTP status to the matching error class.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ApiError::Auth(format!("HTTP {}: {}", status, body)),
            429 => ApiError::RateLimited(body),
            408 | 504 => ApiError::Timeout(format!("HTTP {}", status)),
            _ => ApiError::Http { status, body },
        }
    }

    /// Short, stable name recorded in a WAIT decision's reasoning.
    pub fn class(&self) -> &'static str {
        match self {
            ApiError::Timeout(_) => "timeout",
            ApiError::Auth(_) | ApiError::MissingCredential(_) => "auth",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::Network(_) => "network",
            ApiError::Http { .. } => "provider_error",
            ApiError::InvalidResponse(_) => "invalid_response",
            ApiError::InvalidConfig(_) => "agent_unavailable",
            ApiError::PriceUnavailable(_) => "market_data",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

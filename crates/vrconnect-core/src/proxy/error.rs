use thiserror::Error;

/// Caller-facing failures of the proxy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Two-factor verification is required before the bot session can be used")]
    AuthPending,

    #[error("VRChat is rate limiting the bot, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("VRChat request failed: {message}")]
    Upstream { status: Option<u16>, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Two-factor verification failed: {0}")]
    TwoFactorRejected(String),
}

impl ProxyError {
    /// HTTP status the proxy answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::AuthPending => 401,
            ProxyError::RateLimited { .. } => 429,
            ProxyError::Upstream { .. } => 500,
            ProxyError::NotFound(_) => 404,
            ProxyError::InvalidInput(_) | ProxyError::TwoFactorRejected(_) => 400,
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingAdapterError {
    #[error("invalid adapter configuration: {0}")]
    Config(String),

    #[error("request to billing provider failed: {0}")]
    Transport(String),

    #[error("billing provider rejected the request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("rate limited by billing provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("resource not found on billing provider: {0}")]
    NotFound(String),
}

impl BillingAdapterError {
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            BillingAdapterError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

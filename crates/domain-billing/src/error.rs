use thiserror::Error;

use usagemeter_infra_repository::RepositoryError;

/// Synchronous error taxonomy returned to `QuotaService` callers.
/// `QuotaExceededError` (see `usagemeter_domain_models`) is deliberately
/// not a variant here — a denial is a successful evaluation outcome,
/// not a service failure.
#[derive(Debug, Error)]
pub enum QuotaServiceError {
    #[error("invalid tenant id")]
    InvalidTenant,

    #[error("invalid usage type: {0}")]
    InvalidUsageType(String),

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for QuotaServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => QuotaServiceError::TenantNotFound(msg),
            other => QuotaServiceError::Internal(other.to_string()),
        }
    }
}

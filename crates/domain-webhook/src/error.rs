use thiserror::Error;

use usagemeter_infra_repository::RepositoryError;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature mismatch. Never acknowledge an unsigned payload — the
    /// caller must surface this as a failure so the provider does not
    /// mistake it for a processed event.
    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// Repository failures are fatal and must propagate so the provider
    /// retries delivery.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

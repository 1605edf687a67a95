use thiserror::Error;

/// Backend failures surfaced by a repository implementation. The core
/// never inspects *which* store produced one of these — the classified
/// variants exist so callers can pick the right HTTP/retry behavior
/// without parsing an error string.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("optimistic concurrency conflict: {0}")]
    Conflict(String),

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("internal repository error: {0}")]
    Internal(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

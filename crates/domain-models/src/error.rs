use thiserror::Error;

/// Validation failures raised by the value types and usage event model.
///
/// These are synchronous, caller-correctable errors — distinct from the
/// backend-failure and quota-denial taxonomies defined further up the
/// stack (see `usagemeter_domain_billing::QuotaServiceError` and
/// `QuotaExceededError`).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ModelError {
    #[error("tenant id must not be nil")]
    InvalidTenant,

    #[error("unrecognized usage type: {0}")]
    InvalidUsageType(String),

    #[error("limit must be -1 (unlimited) or >= 0, got {0}")]
    InvalidLimit(i64),

    #[error("soft limit {soft_limit} must be in [0, limit) for limit {limit}")]
    InvalidSoftLimit { soft_limit: i64, limit: i64 },

    #[error("period_end ({period_end}) must be >= period_start ({period_start})")]
    InvalidPeriod {
        period_start: String,
        period_end: String,
    },

    #[error("unrecognized reset period: {0}")]
    InvalidResetPeriod(String),

    #[error("unrecognized plan: {0}")]
    InvalidPlan(String),

    #[error("quantity must be >= 0, got {0}")]
    InvalidQuantity(i64),
}

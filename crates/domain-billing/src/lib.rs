//! Core billing logic: quota evaluation, daily usage snapshots, and
//! provider usage reporting. Depends only on the repository and
//! adapter contracts, never on a concrete persistence or HTTP
//! implementation.

mod error;
mod quota_service;
mod reporting_service;
mod snapshot_service;

pub use error::QuotaServiceError;
pub use quota_service::{CheckQuotaRequest, QuotaDecision, QuotaService, UsageSummary, UsageSummaryEntry};
pub use reporting_service::{ReportingConfig, ReportingRunSummary, ReportingService};
pub use snapshot_service::{SnapshotRunSummary, SnapshotService};

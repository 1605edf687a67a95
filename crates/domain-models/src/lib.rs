//! Shared value types, usage event model, and quota model for the
//! usage-metering and billing-reconciliation workspace.
//!
//! This crate has no I/O and no async dependencies: it is the thing
//! every other crate in the workspace depends on, never the other way
//! around.

mod dto;
mod error;
mod metadata;
mod quota;
mod reset_period;
mod usage_record;
mod usage_type;

pub use dto::{
    ReportLogStatus, SubscriptionStatus, TenantSubscription, UsageHistory, UsageMeter,
    UsageReportLog,
};
pub use error::ModelError;
pub use metadata::{Metadata, MetadataValue};
pub use quota::{
    OveragePolicy, QuotaCheckResult, QuotaExceededError, QuotaSet, QuotaStatus, UsageQuota,
    UNLIMITED,
};
pub use reset_period::ResetPeriod;
pub use usage_record::{UsageRecord, UsageRecordBuilder};
pub use usage_type::{UsageType, UsageUnit};

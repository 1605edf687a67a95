//! Persistence-agnostic repository port contracts consumed by the
//! billing core, plus in-memory reference implementations suitable for
//! embedding and tests. No concrete SQL or KV backend lives here —
//! that's an implementer's choice, made outside this workspace.

mod error;
mod resource_counter;
mod tenant;
mod usage_history;
mod usage_meter;
mod usage_quota;
mod usage_record;
mod usage_report_log;

pub use error::RepositoryError;
pub use resource_counter::{CountedResource, InMemoryResourceCounter, ResourceCounter};
pub use tenant::{InMemoryTenantRepository, Tenant, TenantRepository, TenantStatus};
pub use usage_history::{InMemoryUsageHistoryRepository, UsageHistoryRepository, MAX_HISTORY_PAGE};
pub use usage_meter::{InMemoryUsageMeterRepository, UsageMeterRepository};
pub use usage_quota::{InMemoryUsageQuotaRepository, UsageQuotaRepository};
pub use usage_record::{InMemoryUsageRecordRepository, UsageRecordRepository};
pub use usage_report_log::{InMemoryUsageReportLogRepository, UsageReportLogRepository};

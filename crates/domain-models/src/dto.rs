use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::usage_type::UsageType;

/// Cached aggregate snapshot of one `(tenant, usage_type, period)`.
/// Authoritative only within a TTL — `is_fresh` is the caller's cue to
/// recompute from records rather than trust the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMeter {
    pub tenant_id: Uuid,
    pub usage_type: UsageType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_usage: i64,
    pub record_count: i64,
    pub peak_usage: i64,
    pub average_rate: f64,
    pub limit: i64,
    pub remaining: i64,
    pub usage_percent: f64,
    pub computed_at: DateTime<Utc>,
}

impl UsageMeter {
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.computed_at < ttl
    }
}

/// Daily snapshot row. Unique on `(tenant_id, snapshot_date)`; re-running
/// the same day upserts rather than duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageHistory {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub snapshot_date: DateTime<Utc>,
    pub users_count: i64,
    pub products_count: i64,
    pub warehouses_count: i64,
    pub customers_count: i64,
    pub suppliers_count: i64,
    pub orders_count: i64,
    pub storage_bytes: i64,
    pub api_calls_count: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl UsageHistory {
    pub fn new(tenant_id: Uuid, snapshot_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            snapshot_date,
            users_count: 0,
            products_count: 0,
            warehouses_count: 0,
            customers_count: 0,
            suppliers_count: 0,
            orders_count: 0,
            storage_bytes: 0,
            api_calls_count: 0,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }
}

/// Durable attempt record for one `(tenant, subscription_item,
/// usage_type)` submission to the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReportLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_item_id: String,
    pub usage_type: UsageType,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
    pub status: ReportLogStatus,
    pub provider_record_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageReportLog {
    pub fn new_pending(
        tenant_id: Uuid,
        subscription_item_id: impl Into<String>,
        usage_type: UsageType,
        quantity: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            subscription_item_id: subscription_item_id.into(),
            usage_type,
            quantity,
            timestamp: now,
            status: ReportLogStatus::Pending,
            provider_record_id: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_success(&mut self, provider_record_id: impl Into<String>) {
        self.status = ReportLogStatus::Success;
        self.provider_record_id = Some(provider_record_id.into());
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = ReportLogStatus::Failed;
        self.error_message = Some(error_message.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_retrying(&mut self) {
        self.status = ReportLogStatus::Retrying;
        self.retry_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_abandoned(&mut self, error_message: impl Into<String>) {
        self.status = ReportLogStatus::Abandoned;
        self.error_message = Some(error_message.into());
        self.updated_at = Utc::now();
    }
}

/// `PENDING -> SUCCESS | FAILED -> RETRYING -> SUCCESS | ABANDONED`.
/// `SUCCESS` and `ABANDONED` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportLogStatus {
    Pending,
    Success,
    Failed,
    Retrying,
    Abandoned,
}

impl ReportLogStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportLogStatus::Success | ReportLogStatus::Abandoned)
    }

    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, ReportLogStatus::Pending | ReportLogStatus::Retrying)
    }
}

impl fmt::Display for ReportLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportLogStatus::Pending => "PENDING",
            ReportLogStatus::Success => "SUCCESS",
            ReportLogStatus::Failed => "FAILED",
            ReportLogStatus::Retrying => "RETRYING",
            ReportLogStatus::Abandoned => "ABANDONED",
        };
        write!(f, "{s}")
    }
}

/// Provider-side subscription status, mapped from the billing
/// provider's vocabulary. `IsActive = {Active, Trialing}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
    /// Catch-all for provider statuses this system doesn't yet classify;
    /// passed through verbatim rather than dropped.
    Unknown(String),
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    pub fn from_provider_str(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "unpaid" => SubscriptionStatus::Unpaid,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            other => SubscriptionStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Unknown(s) => s,
        };
        write!(f, "{s}")
    }
}

/// Read-model supplied by an external (identity bounded context)
/// repository; the billing core never constructs or owns this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSubscription {
    pub tenant_id: Uuid,
    pub subscription_id: String,
    pub subscription_item_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_log_terminal_states_are_final() {
        assert!(ReportLogStatus::Success.is_terminal());
        assert!(ReportLogStatus::Abandoned.is_terminal());
        assert!(!ReportLogStatus::Pending.is_terminal());
        assert!(!ReportLogStatus::Retrying.is_terminal());
        assert!(!ReportLogStatus::Failed.is_terminal());
    }

    #[test]
    fn active_and_trialing_are_active() {
        assert!(SubscriptionStatus::Active.is_active());
        assert!(SubscriptionStatus::Trialing.is_active());
        assert!(!SubscriptionStatus::PastDue.is_active());
    }

    #[test]
    fn unknown_status_passes_through() {
        let s = SubscriptionStatus::from_provider_str("paused");
        assert_eq!(s.to_string(), "paused");
        assert!(!s.is_active());
    }
}

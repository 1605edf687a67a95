use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use usagemeter_domain_models::SubscriptionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCustomer {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub subscription_id: String,
    pub subscription_item_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    /// Populated only for subscriptions created with
    /// `default_incomplete` payment behavior, so the caller can
    /// complete payment on the client.
    pub latest_invoice_client_secret: Option<String>,
}

/// Proration policy applied when a subscription's price changes
/// mid-period. `CreateProrations` is the provider default and this
/// adapter's default too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProrationPolicy {
    #[default]
    CreateProrations,
    None,
    AlwaysInvoice,
}

impl ProrationPolicy {
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            ProrationPolicy::CreateProrations => "create_prorations",
            ProrationPolicy::None => "none",
            ProrationPolicy::AlwaysInvoice => "always_invoice",
        }
    }
}

/// `ReportUsage`'s `action`. `Increment` is the adapter default;
/// `Set` is what the Reporting Service always uses because it reports
/// an absolute period total, which is what makes duplicate deliveries
/// idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAction {
    Increment,
    Set,
}

impl UsageAction {
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            UsageAction::Increment => "increment",
            UsageAction::Set => "set",
        }
    }
}

impl Default for UsageAction {
    fn default() -> Self {
        UsageAction::Increment
    }
}

#[derive(Debug, Clone)]
pub struct ReportUsageRequest {
    pub subscription_item_id: String,
    pub quantity: i64,
    pub action: UsageAction,
    pub timestamp: DateTime<Utc>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUsageRecord {
    pub id: String,
    pub quantity: i64,
}

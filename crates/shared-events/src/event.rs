use chrono::{DateTime, Utc};
use uuid::Uuid;

use usagemeter_domain_models::UsageType;

/// A fact published on the bus after it has already happened —
/// consumers never block the path that raised it.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    QuotaWarning {
        tenant_id: Uuid,
        usage_type: UsageType,
        current_usage: i64,
        limit: i64,
        soft_limit: Option<i64>,
        occurred_at: DateTime<Utc>,
    },
    QuotaExceeded {
        tenant_id: Uuid,
        usage_type: UsageType,
        current_usage: i64,
        limit: i64,
        occurred_at: DateTime<Utc>,
    },
    TenantPlanChanged {
        tenant_id: Uuid,
        new_plan_id: String,
        occurred_at: DateTime<Utc>,
    },
    TenantActivated {
        tenant_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    TenantSuspended {
        tenant_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    TenantSubscriptionCleared {
        tenant_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn tenant_id(&self) -> Uuid {
        match self {
            DomainEvent::QuotaWarning { tenant_id, .. }
            | DomainEvent::QuotaExceeded { tenant_id, .. }
            | DomainEvent::TenantPlanChanged { tenant_id, .. }
            | DomainEvent::TenantActivated { tenant_id, .. }
            | DomainEvent::TenantSuspended { tenant_id, .. }
            | DomainEvent::TenantSubscriptionCleared { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::QuotaWarning { .. } => "quota.warning",
            DomainEvent::QuotaExceeded { .. } => "quota.exceeded",
            DomainEvent::TenantPlanChanged { .. } => "tenant.plan_changed",
            DomainEvent::TenantActivated { .. } => "tenant.activated",
            DomainEvent::TenantSuspended { .. } => "tenant.suspended",
            DomainEvent::TenantSubscriptionCleared { .. } => "tenant.subscription_cleared",
        }
    }
}

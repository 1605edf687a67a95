use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use usagemeter_domain_models::UsageType;

use crate::event::DomainEvent;

/// Backlog depth for the broadcast channel. A slow or absent
/// subscriber can fall behind by this many events before `recv` starts
/// reporting `Lagged` — publication itself never blocks regardless.
const CHANNEL_CAPACITY: usize = 4096;

/// In-process fan-out for domain events. Publication is fire-and-forget
/// by design: the Quota Service and the Webhook Reconciler both call
/// into this on the hot path and must never stall waiting on a
/// consumer.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DomainEvent) {
        let subscriber_count = self.sender.receiver_count();
        if subscriber_count == 0 {
            tracing::debug!(kind = event.kind(), "no subscribers for event, dropping");
            return;
        }
        if let Err(err) = self.sender.send(event.clone()) {
            tracing::warn!(kind = event.kind(), error = %err, "failed to publish domain event");
        }
    }

    pub fn emit_quota_warning(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
        current_usage: i64,
        limit: i64,
        soft_limit: Option<i64>,
    ) {
        self.publish(DomainEvent::QuotaWarning {
            tenant_id,
            usage_type,
            current_usage,
            limit,
            soft_limit,
            occurred_at: Utc::now(),
        });
    }

    pub fn emit_quota_exceeded(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
        current_usage: i64,
        limit: i64,
    ) {
        self.publish(DomainEvent::QuotaExceeded {
            tenant_id,
            usage_type,
            current_usage,
            limit,
            occurred_at: Utc::now(),
        });
    }

    pub fn emit_tenant_plan_changed(&self, tenant_id: Uuid, new_plan_id: impl Into<String>) {
        self.publish(DomainEvent::TenantPlanChanged {
            tenant_id,
            new_plan_id: new_plan_id.into(),
            occurred_at: Utc::now(),
        });
    }

    pub fn emit_tenant_activated(&self, tenant_id: Uuid) {
        self.publish(DomainEvent::TenantActivated { tenant_id, occurred_at: Utc::now() });
    }

    pub fn emit_tenant_suspended(&self, tenant_id: Uuid) {
        self.publish(DomainEvent::TenantSuspended { tenant_id, occurred_at: Utc::now() });
    }

    pub fn emit_tenant_subscription_cleared(&self, tenant_id: Uuid) {
        self.publish(DomainEvent::TenantSubscriptionCleared {
            tenant_id,
            occurred_at: Utc::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.emit_tenant_activated(Uuid::new_v4());
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let tenant_id = Uuid::new_v4();
        bus.emit_quota_exceeded(tenant_id, UsageType::ApiCalls, 150, 100);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.tenant_id(), tenant_id);
        assert_eq!(event.kind(), "quota.exceeded");
    }
}

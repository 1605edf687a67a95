use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use usagemeter_infra_repository::{Tenant, TenantRepository, TenantStatus};
use usagemeter_shared_events::EventBus;

use crate::error::WebhookError;
use crate::event::{self, DecodedEvent, InvoiceObject, SubscriptionObject};
use crate::signature::verify_signature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    Activated,
    PlanChanged,
    Downgraded,
    Suspended,
    NoOp,
    /// Acknowledged but not acted on — an unknown tenant, an unhandled
    /// event type, or a status transition the handler deliberately
    /// ignores (e.g. `PAST_DUE` on `subscription.updated`).
    Ignored(String),
}

#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub event_id: String,
    pub event_type: String,
    pub tenant_id: Option<Uuid>,
    pub action: WebhookAction,
}

fn unix_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

/// Verifies provider-signed payloads, decodes them, and drives the
/// tenant state-transition rules a subscription lifecycle requires. A
/// missing tenant is never a fatal error — the webhook may legitimately
/// arrive before the tenant exists locally, or for a customer this
/// system doesn't own. Repository failures are always fatal so the
/// provider retries delivery.
pub struct WebhookReconciler {
    tenant_repo: Arc<dyn TenantRepository>,
    events: EventBus,
    webhook_secret: String,
}

impl WebhookReconciler {
    pub fn new(tenant_repo: Arc<dyn TenantRepository>, events: EventBus, webhook_secret: impl Into<String>) -> Self {
        Self { tenant_repo, events, webhook_secret: webhook_secret.into() }
    }

    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        if !verify_signature(&self.webhook_secret, payload, signature) {
            return Err(WebhookError::InvalidSignature);
        }

        let raw = event::parse_envelope(payload)?;
        let event_id = raw.id.clone();
        let event_type = raw.event_type.clone();
        let decoded = event::interpret(&raw)?;

        let (tenant_id, action) = match decoded {
            DecodedEvent::SubscriptionCreated(sub) => self.handle_subscription_created(sub).await?,
            DecodedEvent::SubscriptionUpdated(sub) => self.handle_subscription_updated(sub).await?,
            DecodedEvent::SubscriptionDeleted(sub) => self.handle_subscription_deleted(sub).await?,
            DecodedEvent::InvoicePaid(inv) => self.handle_invoice_paid(inv).await?,
            DecodedEvent::InvoicePaymentFailed(inv) => self.handle_invoice_payment_failed(inv).await?,
            DecodedEvent::Unhandled(kind) => (None, WebhookAction::Ignored(format!("unhandled event type: {kind}"))),
        };

        Ok(WebhookOutcome { event_id, event_type, tenant_id, action })
    }

    /// Sets subscription id, plan, and expiration; activates if the
    /// tenant was suspended/inactive and the provider status is active
    /// or trialing.
    async fn handle_subscription_created(
        &self,
        sub: SubscriptionObject,
    ) -> Result<(Option<Uuid>, WebhookAction), WebhookError> {
        let Some(tenant) = self.tenant_repo.find_by_provider_customer_id(&sub.customer).await? else {
            tracing::info!(customer = %sub.customer, "subscription.created for unknown customer, acknowledging");
            return Ok((None, WebhookAction::Ignored("tenant not found for customer".to_string())));
        };

        self.apply_subscription_state(&tenant, &sub).await
    }

    /// Resolves the tenant by subscription id first, falling back to
    /// customer id (the subscription may not yet be linked locally).
    /// `PAST_DUE`/`UNPAID`/`CANCELED` are logged and otherwise ignored —
    /// cancellation arrives as its own `subscription.deleted` event.
    async fn handle_subscription_updated(
        &self,
        sub: SubscriptionObject,
    ) -> Result<(Option<Uuid>, WebhookAction), WebhookError> {
        let tenant = match self.tenant_repo.find_by_subscription_id(&sub.id).await? {
            Some(t) => Some(t),
            None => self.tenant_repo.find_by_provider_customer_id(&sub.customer).await?,
        };
        let Some(tenant) = tenant else {
            return Ok((None, WebhookAction::Ignored("tenant not found for subscription".to_string())));
        };

        if matches!(sub.status.as_str(), "past_due" | "unpaid" | "canceled") {
            tracing::info!(tenant_id = %tenant.id, status = %sub.status, "subscription.updated status logged only");
            return Ok((Some(tenant.id), WebhookAction::Ignored(format!("status {} logged only", sub.status))));
        }

        self.apply_subscription_state(&tenant, &sub).await
    }

    async fn apply_subscription_state(
        &self,
        tenant: &Tenant,
        sub: &SubscriptionObject,
    ) -> Result<(Option<Uuid>, WebhookAction), WebhookError> {
        self.tenant_repo.set_stripe_subscription_id(tenant.id, &sub.id).await?;

        let mut plan_changed = false;
        if let Some(plan_id) = sub.metadata.get("plan_id") {
            self.tenant_repo.set_plan(tenant.id, plan_id).await?;
            plan_changed = true;
        }
        self.tenant_repo.set_expiration(tenant.id, Some(unix_to_datetime(sub.current_period_end))).await?;

        let is_active_status = matches!(sub.status.as_str(), "active" | "trialing");
        let reactivated = tenant.status == TenantStatus::Suspended && is_active_status;
        if reactivated {
            self.tenant_repo.activate(tenant.id).await?;
            self.events.emit_tenant_activated(tenant.id);
        }
        if plan_changed {
            self.events.emit_tenant_plan_changed(tenant.id, sub.metadata.get("plan_id").cloned().unwrap_or_default());
        }

        let action = if reactivated {
            WebhookAction::Activated
        } else if plan_changed {
            WebhookAction::PlanChanged
        } else {
            WebhookAction::NoOp
        };
        Ok((Some(tenant.id), action))
    }

    /// Clears the subscription link and downgrades to the free plan —
    /// cancellation always means "go back to no subscription", never a
    /// status flag.
    async fn handle_subscription_deleted(
        &self,
        sub: SubscriptionObject,
    ) -> Result<(Option<Uuid>, WebhookAction), WebhookError> {
        let tenant = match self.tenant_repo.find_by_subscription_id(&sub.id).await? {
            Some(t) => Some(t),
            None => self.tenant_repo.find_by_provider_customer_id(&sub.customer).await?,
        };
        let Some(tenant) = tenant else {
            return Ok((None, WebhookAction::Ignored("tenant not found for subscription".to_string())));
        };

        self.tenant_repo.clear_stripe_subscription(tenant.id).await?;
        self.tenant_repo.set_plan(tenant.id, "free").await?;
        self.tenant_repo.set_expiration(tenant.id, None).await?;
        self.events.emit_tenant_subscription_cleared(tenant.id);

        Ok((Some(tenant.id), WebhookAction::Downgraded))
    }

    /// Reactivates a suspended tenant and refreshes expiration. Invoices
    /// not tied to a subscription are acknowledged and ignored.
    async fn handle_invoice_paid(
        &self,
        invoice: InvoiceObject,
    ) -> Result<(Option<Uuid>, WebhookAction), WebhookError> {
        let Some(subscription_id) = invoice.subscription.as_deref() else {
            return Ok((None, WebhookAction::Ignored("invoice not for a subscription".to_string())));
        };
        let Some(tenant) = self.tenant_repo.find_by_subscription_id(subscription_id).await? else {
            return Ok((None, WebhookAction::Ignored("tenant not found for subscription".to_string())));
        };

        self.tenant_repo.set_expiration(tenant.id, Some(unix_to_datetime(invoice.period_end))).await?;

        let reactivated = tenant.status == TenantStatus::Suspended;
        if reactivated {
            self.tenant_repo.activate(tenant.id).await?;
            self.events.emit_tenant_activated(tenant.id);
        }

        Ok((Some(tenant.id), if reactivated { WebhookAction::Activated } else { WebhookAction::NoOp }))
    }

    /// Suspends the tenant unless it's suspended already. Resolves the
    /// tenant by subscription id, falling back to customer id, since a
    /// failed invoice doesn't always carry a subscription reference.
    async fn handle_invoice_payment_failed(
        &self,
        invoice: InvoiceObject,
    ) -> Result<(Option<Uuid>, WebhookAction), WebhookError> {
        let tenant = match invoice.subscription.as_deref() {
            Some(sub_id) => self.tenant_repo.find_by_subscription_id(sub_id).await?,
            None => None,
        };
        let tenant = match tenant {
            Some(t) => Some(t),
            None => self.tenant_repo.find_by_provider_customer_id(&invoice.customer).await?,
        };
        let Some(tenant) = tenant else {
            return Ok((None, WebhookAction::Ignored("tenant not found for invoice".to_string())));
        };

        if tenant.status == TenantStatus::Suspended {
            return Ok((Some(tenant.id), WebhookAction::Ignored("tenant already suspended".to_string())));
        }

        self.tenant_repo.suspend(tenant.id).await?;
        self.events.emit_tenant_suspended(tenant.id);
        Ok((Some(tenant.id), WebhookAction::Suspended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usagemeter_infra_repository::InMemoryTenantRepository;

    const SECRET: &str = "whsec_test";

    fn sign(payload: &[u8]) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn make_reconciler() -> (WebhookReconciler, Arc<InMemoryTenantRepository>) {
        let tenant_repo = Arc::new(InMemoryTenantRepository::new());
        let reconciler =
            WebhookReconciler::new(tenant_repo.clone(), EventBus::new(), SECRET.to_string());
        (reconciler, tenant_repo)
    }

    fn seed(repo: &InMemoryTenantRepository, customer_id: &str) -> Uuid {
        let id = Uuid::new_v4();
        repo.seed(Tenant {
            id,
            plan_id: "free".to_string(),
            status: TenantStatus::Suspended,
            provider_customer_id: Some(customer_id.to_string()),
            stripe_subscription_id: None,
            expires_at: None,
        });
        id
    }

    #[tokio::test]
    async fn rejects_invalid_signature() {
        let (reconciler, _repo) = make_reconciler();
        let payload = br#"{"id":"evt_1","type":"invoice.paid","data":{"object":{}}}"#;
        let err = reconciler.process_webhook(payload, "sha256=deadbeef").await.unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature));
    }

    #[tokio::test]
    async fn subscription_created_activates_and_sets_plan() {
        let (reconciler, repo) = make_reconciler();
        let tenant_id = seed(&repo, "cus_1");

        let payload = br#"{
            "id": "evt_1",
            "type": "subscription.created",
            "data": { "object": {
                "id": "sub_1",
                "customer": "cus_1",
                "status": "active",
                "current_period_end": 1700000000,
                "metadata": {"plan_id": "pro"},
                "items": {"data": [{"id": "si_1"}]}
            }}
        }"#;
        let signature = sign(payload);

        let outcome = reconciler.process_webhook(payload, &signature).await.unwrap();
        assert_eq!(outcome.tenant_id, Some(tenant_id));
        assert_eq!(outcome.action, WebhookAction::Activated);

        let tenant = repo.find_by_id(tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.plan_id, "pro");
        assert_eq!(tenant.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn subscription_created_for_unknown_customer_is_acknowledged() {
        let (reconciler, _repo) = make_reconciler();
        let payload = br#"{
            "id": "evt_2",
            "type": "subscription.created",
            "data": { "object": {
                "id": "sub_2",
                "customer": "cus_unknown",
                "status": "active",
                "current_period_end": 1700000000,
                "metadata": {},
                "items": null
            }}
        }"#;
        let signature = sign(payload);
        let outcome = reconciler.process_webhook(payload, &signature).await.unwrap();
        assert_eq!(outcome.tenant_id, None);
        assert!(matches!(outcome.action, WebhookAction::Ignored(_)));
    }

    #[tokio::test]
    async fn subscription_deleted_downgrades_to_free() {
        let (reconciler, repo) = make_reconciler();
        let tenant_id = seed(&repo, "cus_3");
        repo.set_plan(tenant_id, "pro").await.unwrap();
        repo.set_stripe_subscription_id(tenant_id, "sub_3").await.unwrap();

        let payload = br#"{
            "id": "evt_3",
            "type": "subscription.deleted",
            "data": { "object": {
                "id": "sub_3",
                "customer": "cus_3",
                "status": "canceled",
                "current_period_end": 1700000000,
                "metadata": {},
                "items": null
            }}
        }"#;
        let signature = sign(payload);
        let outcome = reconciler.process_webhook(payload, &signature).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::Downgraded);

        let tenant = repo.find_by_id(tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.plan_id, "free");
        assert!(tenant.stripe_subscription_id.is_none());
    }

    #[tokio::test]
    async fn invoice_payment_failed_suspends_active_tenant() {
        let (reconciler, repo) = make_reconciler();
        let tenant_id = seed(&repo, "cus_4");
        repo.activate(tenant_id).await.unwrap();
        repo.set_stripe_subscription_id(tenant_id, "sub_4").await.unwrap();

        let payload = br#"{
            "id": "evt_4",
            "type": "invoice.payment_failed",
            "data": { "object": {
                "customer": "cus_4",
                "subscription": "sub_4",
                "period_end": 1700000000
            }}
        }"#;
        let signature = sign(payload);
        let outcome = reconciler.process_webhook(payload, &signature).await.unwrap();
        assert_eq!(outcome.action, WebhookAction::Suspended);
    }

    #[tokio::test]
    async fn invoice_paid_without_subscription_is_ignored() {
        let (reconciler, _repo) = make_reconciler();
        let payload = br#"{
            "id": "evt_5",
            "type": "invoice.paid",
            "data": { "object": {
                "customer": "cus_5",
                "subscription": null,
                "period_end": 1700000000
            }}
        }"#;
        let signature = sign(payload);
        let outcome = reconciler.process_webhook(payload, &signature).await.unwrap();
        assert_eq!(outcome.tenant_id, None);
        assert!(matches!(outcome.action, WebhookAction::Ignored(_)));
    }

    #[tokio::test]
    async fn unhandled_event_type_is_acknowledged() {
        let (reconciler, _repo) = make_reconciler();
        let payload = br#"{"id":"evt_6","type":"charge.refunded","data":{"object":{}}}"#;
        let signature = sign(payload);
        let outcome = reconciler.process_webhook(payload, &signature).await.unwrap();
        assert!(matches!(outcome.action, WebhookAction::Ignored(_)));
    }
}

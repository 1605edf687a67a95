use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use usagemeter_domain_models::TenantSubscription;

use crate::error::RepositoryError;

/// Activity state of a tenant aggregate, as far as the billing core
/// needs to know it. The aggregate itself is owned by the identity
/// bounded context; this is the read projection the core is allowed to
/// see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tenant {
    pub id: Uuid,
    pub plan_id: String,
    pub status: TenantStatus,
    pub provider_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The billing core never mutates a tenant's fields directly — it
/// invokes the contracted mutators below, which the identity bounded
/// context's implementation is free to back with whatever consistency
/// model (optimistic locking, event sourcing, ...) it needs.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, RepositoryError>;

    async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Tenant>, RepositoryError>;

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Tenant>, RepositoryError>;

    async fn find_active_subscription(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantSubscription>, RepositoryError>;

    async fn list_active(&self) -> Result<Vec<Tenant>, RepositoryError>;

    async fn set_plan(&self, tenant_id: Uuid, plan_id: &str) -> Result<(), RepositoryError>;

    async fn set_expiration(
        &self,
        tenant_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;

    async fn activate(&self, tenant_id: Uuid) -> Result<(), RepositoryError>;

    async fn suspend(&self, tenant_id: Uuid) -> Result<(), RepositoryError>;

    async fn set_stripe_subscription_id(
        &self,
        tenant_id: Uuid,
        subscription_id: &str,
    ) -> Result<(), RepositoryError>;

    async fn clear_stripe_subscription(&self, tenant_id: Uuid) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: Mutex<HashMap<Uuid, Tenant>>,
    subscriptions: Mutex<HashMap<Uuid, TenantSubscription>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, tenant: Tenant) {
        self.tenants.lock().expect("tenant store poisoned").insert(tenant.id, tenant);
    }

    pub fn seed_subscription(&self, subscription: TenantSubscription) {
        self.subscriptions
            .lock()
            .expect("subscription store poisoned")
            .insert(subscription.tenant_id, subscription);
    }

    fn mutate(
        &self,
        tenant_id: Uuid,
        f: impl FnOnce(&mut Tenant),
    ) -> Result<(), RepositoryError> {
        let mut tenants = self.tenants.lock().expect("tenant store poisoned");
        let tenant = tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tenant {tenant_id}")))?;
        f(tenant);
        Ok(())
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, RepositoryError> {
        Ok(self.tenants.lock().expect("tenant store poisoned").get(&tenant_id).cloned())
    }

    async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Tenant>, RepositoryError> {
        let tenants = self.tenants.lock().expect("tenant store poisoned");
        Ok(tenants
            .values()
            .find(|t| t.provider_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Tenant>, RepositoryError> {
        let tenants = self.tenants.lock().expect("tenant store poisoned");
        Ok(tenants
            .values()
            .find(|t| t.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn find_active_subscription(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantSubscription>, RepositoryError> {
        Ok(self
            .subscriptions
            .lock()
            .expect("subscription store poisoned")
            .get(&tenant_id)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let tenants = self.tenants.lock().expect("tenant store poisoned");
        Ok(tenants.values().filter(|t| t.status == TenantStatus::Active).cloned().collect())
    }

    async fn set_plan(&self, tenant_id: Uuid, plan_id: &str) -> Result<(), RepositoryError> {
        let plan_id = plan_id.to_string();
        self.mutate(tenant_id, |t| t.plan_id = plan_id)
    }

    async fn set_expiration(
        &self,
        tenant_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        self.mutate(tenant_id, |t| t.expires_at = expires_at)
    }

    async fn activate(&self, tenant_id: Uuid) -> Result<(), RepositoryError> {
        self.mutate(tenant_id, |t| t.status = TenantStatus::Active)
    }

    async fn suspend(&self, tenant_id: Uuid) -> Result<(), RepositoryError> {
        self.mutate(tenant_id, |t| t.status = TenantStatus::Suspended)
    }

    async fn set_stripe_subscription_id(
        &self,
        tenant_id: Uuid,
        subscription_id: &str,
    ) -> Result<(), RepositoryError> {
        let subscription_id = subscription_id.to_string();
        self.mutate(tenant_id, |t| t.stripe_subscription_id = Some(subscription_id))
    }

    async fn clear_stripe_subscription(&self, tenant_id: Uuid) -> Result<(), RepositoryError> {
        self.mutate(tenant_id, |t| t.stripe_subscription_id = None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: Uuid) -> Tenant {
        Tenant {
            id,
            plan_id: "free".to_string(),
            status: TenantStatus::Active,
            provider_customer_id: Some("cus_123".to_string()),
            stripe_subscription_id: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn find_by_provider_customer_id_matches_seeded_tenant() {
        let repo = InMemoryTenantRepository::new();
        let id = Uuid::new_v4();
        repo.seed(tenant(id));
        let found = repo.find_by_provider_customer_id("cus_123").await.unwrap();
        assert_eq!(found.unwrap().id, id);
    }

    #[tokio::test]
    async fn mutating_unknown_tenant_is_not_found() {
        let repo = InMemoryTenantRepository::new();
        let err = repo.suspend(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn suspend_then_activate_round_trips() {
        let repo = InMemoryTenantRepository::new();
        let id = Uuid::new_v4();
        repo.seed(tenant(id));
        repo.suspend(id).await.unwrap();
        assert_eq!(repo.find_by_id(id).await.unwrap().unwrap().status, TenantStatus::Suspended);
        repo.activate(id).await.unwrap();
        assert_eq!(repo.find_by_id(id).await.unwrap().unwrap().status, TenantStatus::Active);
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use usagemeter_domain_models::{UsageQuota, UsageType};

use crate::error::RepositoryError;

/// Quota definitions, keyed by plan default or tenant override. The
/// Quota Service resolves the *effective* quota itself (tenant override
/// preferred); this port only exposes the two lookups it needs to do
/// that.
#[async_trait]
pub trait UsageQuotaRepository: Send + Sync {
    async fn get_plan_default(
        &self,
        plan_id: &str,
        usage_type: UsageType,
    ) -> Result<Option<UsageQuota>, RepositoryError>;

    async fn get_tenant_override(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
    ) -> Result<Option<UsageQuota>, RepositoryError>;

    async fn list_plan_defaults(&self, plan_id: &str) -> Result<Vec<UsageQuota>, RepositoryError>;

    async fn list_tenant_overrides(&self, tenant_id: Uuid) -> Result<Vec<UsageQuota>, RepositoryError>;

    async fn upsert(&self, quota: UsageQuota) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryUsageQuotaRepository {
    plan_defaults: Mutex<HashMap<(String, UsageType), UsageQuota>>,
    tenant_overrides: Mutex<HashMap<(Uuid, UsageType), UsageQuota>>,
}

impl InMemoryUsageQuotaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageQuotaRepository for InMemoryUsageQuotaRepository {
    async fn get_plan_default(
        &self,
        plan_id: &str,
        usage_type: UsageType,
    ) -> Result<Option<UsageQuota>, RepositoryError> {
        let defaults = self.plan_defaults.lock().expect("plan default store poisoned");
        Ok(defaults.get(&(plan_id.to_string(), usage_type)).cloned())
    }

    async fn get_tenant_override(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
    ) -> Result<Option<UsageQuota>, RepositoryError> {
        let overrides = self.tenant_overrides.lock().expect("tenant override store poisoned");
        Ok(overrides.get(&(tenant_id, usage_type)).cloned())
    }

    async fn list_plan_defaults(&self, plan_id: &str) -> Result<Vec<UsageQuota>, RepositoryError> {
        let defaults = self.plan_defaults.lock().expect("plan default store poisoned");
        Ok(defaults
            .iter()
            .filter(|((pid, _), _)| pid == plan_id)
            .map(|(_, q)| q.clone())
            .collect())
    }

    async fn list_tenant_overrides(&self, tenant_id: Uuid) -> Result<Vec<UsageQuota>, RepositoryError> {
        let overrides = self.tenant_overrides.lock().expect("tenant override store poisoned");
        Ok(overrides
            .iter()
            .filter(|((tid, _), _)| *tid == tenant_id)
            .map(|(_, q)| q.clone())
            .collect())
    }

    async fn upsert(&self, quota: UsageQuota) -> Result<(), RepositoryError> {
        if let Some(tenant_id) = quota.tenant_id {
            let mut overrides = self.tenant_overrides.lock().expect("tenant override store poisoned");
            overrides.insert((tenant_id, quota.usage_type), quota);
        } else if let Some(plan_id) = quota.plan_id.clone() {
            let mut defaults = self.plan_defaults.lock().expect("plan default store poisoned");
            defaults.insert((plan_id, quota.usage_type), quota);
        } else {
            return Err(RepositoryError::Internal(
                "quota must carry either a plan_id or a tenant_id".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usagemeter_domain_models::{OveragePolicy, ResetPeriod};

    #[tokio::test]
    async fn tenant_override_is_independently_addressable_from_plan_default() {
        let repo = InMemoryUsageQuotaRepository::new();
        let tenant_id = Uuid::new_v4();

        let plan_quota = UsageQuota::new_plan_default(
            "basic",
            UsageType::OrdersCreated,
            100,
            ResetPeriod::Monthly,
            OveragePolicy::Block,
        )
        .unwrap();
        repo.upsert(plan_quota).await.unwrap();

        let override_quota = UsageQuota::new_tenant_override(
            tenant_id,
            UsageType::OrdersCreated,
            500,
            ResetPeriod::Monthly,
            OveragePolicy::Block,
        )
        .unwrap();
        repo.upsert(override_quota).await.unwrap();

        let plan = repo.get_plan_default("basic", UsageType::OrdersCreated).await.unwrap().unwrap();
        let tenant = repo.get_tenant_override(tenant_id, UsageType::OrdersCreated).await.unwrap().unwrap();
        assert_eq!(plan.limit(), 100);
        assert_eq!(tenant.limit(), 500);
    }
}

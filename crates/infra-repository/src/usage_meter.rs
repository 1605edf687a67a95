use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use usagemeter_domain_models::{UsageMeter, UsageType};

use crate::error::RepositoryError;

/// Meter cache plus the live-population calculator for countable usage
/// types. `calculate_meter` consults the resource registry directly
/// (e.g. `COUNT(*)` over an active-users table) rather than an event
/// sum, matching a countable type's aggregation rule.
#[async_trait]
pub trait UsageMeterRepository: Send + Sync {
    async fn calculate_meter(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
    ) -> Result<i64, RepositoryError>;

    async fn get_cached(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
        period_start: DateTime<Utc>,
    ) -> Result<Option<UsageMeter>, RepositoryError>;

    async fn upsert_cached(&self, meter: UsageMeter) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryUsageMeterRepository {
    cache: Mutex<HashMap<(Uuid, UsageType, DateTime<Utc>), UsageMeter>>,
    /// Stand-in for the live resource registry a real deployment would
    /// query for countable types; tests seed this directly.
    populations: Mutex<HashMap<(Uuid, UsageType), i64>>,
}

impl InMemoryUsageMeterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_population(&self, tenant_id: Uuid, usage_type: UsageType, count: i64) {
        self.populations
            .lock()
            .expect("population store poisoned")
            .insert((tenant_id, usage_type), count);
    }
}

#[async_trait]
impl UsageMeterRepository for InMemoryUsageMeterRepository {
    async fn calculate_meter(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
    ) -> Result<i64, RepositoryError> {
        let populations = self.populations.lock().expect("population store poisoned");
        Ok(populations.get(&(tenant_id, usage_type)).copied().unwrap_or(0))
    }

    async fn get_cached(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
        period_start: DateTime<Utc>,
    ) -> Result<Option<UsageMeter>, RepositoryError> {
        let cache = self.cache.lock().expect("meter cache poisoned");
        Ok(cache.get(&(tenant_id, usage_type, period_start)).cloned())
    }

    async fn upsert_cached(&self, meter: UsageMeter) -> Result<(), RepositoryError> {
        let mut cache = self.cache.lock().expect("meter cache poisoned");
        cache.insert((meter.tenant_id, meter.usage_type, meter.period_start), meter);
        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use usagemeter_domain_models::{UsageRecord, UsageType};

use crate::error::RepositoryError;

/// Append-only store for `UsageRecord`s. No update or delete method is
/// exposed — corrections are new records, per the aggregate's own
/// invariant.
#[async_trait]
pub trait UsageRecordRepository: Send + Sync {
    async fn save(&self, record: UsageRecord) -> Result<(), RepositoryError>;

    /// Sum of `quantity` for records of `usage_type` owned by `tenant_id`
    /// whose `recorded_at` falls in `[period_start, period_end]`. Used
    /// for accumulative types on a meter-cache miss.
    async fn sum_by_tenant_and_type(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;
}

/// Reference implementation backed by an in-memory `Vec`, guarded by a
/// `Mutex` since the trait requires `Sync`. Intended for embedding and
/// tests, not for production traffic.
#[derive(Default)]
pub struct InMemoryUsageRecordRepository {
    records: Mutex<HashMap<Uuid, Vec<UsageRecord>>>,
}

impl InMemoryUsageRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageRecordRepository for InMemoryUsageRecordRepository {
    async fn save(&self, record: UsageRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().expect("record store poisoned");
        records.entry(record.tenant_id).or_default().push(record);
        Ok(())
    }

    async fn sum_by_tenant_and_type(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let records = self.records.lock().expect("record store poisoned");
        let sum = records
            .get(&tenant_id)
            .into_iter()
            .flatten()
            .filter(|r| {
                r.usage_type == usage_type
                    && r.recorded_at >= period_start
                    && r.recorded_at <= period_end
            })
            .map(|r| r.quantity)
            .sum();
        Ok(sum)
    }
}

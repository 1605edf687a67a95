use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use usagemeter_domain_models::{ResetPeriod, UsageHistory, UsageType};
use usagemeter_infra_repository::{
    CountedResource, ResourceCounter, TenantRepository, UsageHistoryRepository,
    UsageRecordRepository,
};

use crate::error::QuotaServiceError;

/// Default retention window for daily snapshot rows.
const DEFAULT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone)]
pub struct SnapshotRunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<(Uuid, String)>,
}

/// Rolls a tenant's point-in-time resource counts and accumulative
/// usage totals into one daily row, for reporting and trend queries
/// that don't want to replay raw usage records.
pub struct SnapshotService {
    history_repo: Arc<dyn UsageHistoryRepository>,
    resource_counter: Arc<dyn ResourceCounter>,
    record_repo: Arc<dyn UsageRecordRepository>,
    tenant_repo: Arc<dyn TenantRepository>,
}

impl SnapshotService {
    pub fn new(
        history_repo: Arc<dyn UsageHistoryRepository>,
        resource_counter: Arc<dyn ResourceCounter>,
        record_repo: Arc<dyn UsageRecordRepository>,
        tenant_repo: Arc<dyn TenantRepository>,
    ) -> Self {
        Self { history_repo, resource_counter, record_repo, tenant_repo }
    }

    pub async fn create_snapshot_for_tenant(
        &self,
        tenant_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<UsageHistory, QuotaServiceError> {
        let (day_start, _) = ResetPeriod::Daily.bounds(date);
        let mut history = UsageHistory::new(tenant_id, day_start);

        for resource in CountedResource::ALL {
            let count = match self.resource_counter.count(tenant_id, resource).await {
                Ok(count) => count,
                Err(err) => {
                    tracing::warn!(tenant_id = %tenant_id, resource = ?resource, error = %err, "resource counter failed, skipping");
                    continue;
                }
            };
            match resource {
                CountedResource::Users => history.users_count = count,
                CountedResource::Products => history.products_count = count,
                CountedResource::Warehouses => history.warehouses_count = count,
                CountedResource::Customers => history.customers_count = count,
                CountedResource::Suppliers => history.suppliers_count = count,
                CountedResource::Orders => history.orders_count = count,
            }
        }

        let (_, day_end) = ResetPeriod::Daily.bounds(date);
        history.storage_bytes = self
            .record_repo
            .sum_by_tenant_and_type(tenant_id, UsageType::StorageBytes, day_start, day_end)
            .await?;
        history.api_calls_count = self
            .record_repo
            .sum_by_tenant_and_type(tenant_id, UsageType::ApiCalls, day_start, day_end)
            .await?;

        self.history_repo.upsert(history.clone()).await?;
        Ok(history)
    }

    /// Snapshots every active tenant. One tenant's failure is recorded
    /// in the summary and never aborts the rest of the run.
    pub async fn create_daily_snapshots(&self) -> Result<SnapshotRunSummary, QuotaServiceError> {
        let tenants = self.tenant_repo.list_active().await?;
        let today = Utc::now();
        let mut summary =
            SnapshotRunSummary { total: tenants.len(), successful: 0, failed: 0, errors: Vec::new() };

        for tenant in tenants {
            match self.create_snapshot_for_tenant(tenant.id, today).await {
                Ok(_) => summary.successful += 1,
                Err(err) => {
                    tracing::error!(tenant_id = %tenant.id, error = %err, "daily snapshot failed");
                    summary.failed += 1;
                    summary.errors.push((tenant.id, err.to_string()));
                }
            }
        }

        Ok(summary)
    }

    pub async fn cleanup_old_snapshots(&self) -> Result<u64, QuotaServiceError> {
        self.cleanup_older_than(DEFAULT_RETENTION_DAYS).await
    }

    pub async fn cleanup_older_than(&self, retention_days: i64) -> Result<u64, QuotaServiceError> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        Ok(self.history_repo.delete_older_than(cutoff).await?)
    }

    /// Delegates the page cap to the repository; the Snapshot Service
    /// adds no windowing of its own.
    pub async fn get_usage_history(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageHistory>, QuotaServiceError> {
        Ok(self.history_repo.get_range(tenant_id, start, end).await?)
    }
}

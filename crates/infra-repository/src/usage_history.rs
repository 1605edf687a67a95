use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use usagemeter_domain_models::UsageHistory;

use crate::error::RepositoryError;

/// Hard page cap the Snapshot Service's `GetUsageHistory` enforces
/// regardless of the caller-requested range.
pub const MAX_HISTORY_PAGE: usize = 1000;

#[async_trait]
pub trait UsageHistoryRepository: Send + Sync {
    /// Upserts keyed by `(tenant_id, snapshot_date)`.
    async fn upsert(&self, history: UsageHistory) -> Result<(), RepositoryError>;

    async fn get_range(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageHistory>, RepositoryError>;

    /// Deletes rows with `snapshot_date < cutoff`, returning the count
    /// removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryUsageHistoryRepository {
    rows: Mutex<HashMap<(Uuid, DateTime<Utc>), UsageHistory>>,
}

impl InMemoryUsageHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageHistoryRepository for InMemoryUsageHistoryRepository {
    async fn upsert(&self, history: UsageHistory) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().expect("history store poisoned");
        rows.insert((history.tenant_id, history.snapshot_date), history);
        Ok(())
    }

    async fn get_range(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageHistory>, RepositoryError> {
        let rows = self.rows.lock().expect("history store poisoned");
        let mut matched: Vec<UsageHistory> = rows
            .values()
            .filter(|h| h.tenant_id == tenant_id && h.snapshot_date >= start && h.snapshot_date <= end)
            .cloned()
            .collect();
        matched.sort_by_key(|h| h.snapshot_date);
        matched.truncate(MAX_HISTORY_PAGE);
        Ok(matched)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut rows = self.rows.lock().expect("history store poisoned");
        let before = rows.len();
        rows.retain(|(_, snapshot_date), _| *snapshot_date >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn upsert_on_same_day_replaces_the_row() {
        let repo = InMemoryUsageHistoryRepository::new();
        let tenant_id = Uuid::new_v4();
        let day = Utc::now();

        let mut first = UsageHistory::new(tenant_id, day);
        first.orders_count = 3;
        repo.upsert(first).await.unwrap();

        let mut second = UsageHistory::new(tenant_id, day);
        second.orders_count = 7;
        repo.upsert(second).await.unwrap();

        let rows = repo
            .get_range(tenant_id, day - Duration::hours(1), day + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].orders_count, 7);
    }

    #[tokio::test]
    async fn delete_older_than_removes_expired_rows_only() {
        let repo = InMemoryUsageHistoryRepository::new();
        let tenant_id = Uuid::new_v4();
        let old_day = Utc::now() - Duration::days(120);
        let recent_day = Utc::now();

        repo.upsert(UsageHistory::new(tenant_id, old_day)).await.unwrap();
        repo.upsert(UsageHistory::new(tenant_id, recent_day)).await.unwrap();

        let deleted = repo.delete_older_than(Utc::now() - Duration::days(90)).await.unwrap();
        assert_eq!(deleted, 1);
    }
}

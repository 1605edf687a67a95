use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use usagemeter_domain_models::UsageReportLog;

use crate::error::RepositoryError;

#[async_trait]
pub trait UsageReportLogRepository: Send + Sync {
    async fn save(&self, log: UsageReportLog) -> Result<(), RepositoryError>;

    async fn update(&self, log: UsageReportLog) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UsageReportLog>, RepositoryError>;

    /// Logs eligible for a retry pass: `PENDING` or `RETRYING` with
    /// `retry_count < max_retries`.
    async fn find_retry_eligible(
        &self,
        max_retries: u32,
    ) -> Result<Vec<UsageReportLog>, RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryUsageReportLogRepository {
    logs: Mutex<HashMap<Uuid, UsageReportLog>>,
}

impl InMemoryUsageReportLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageReportLogRepository for InMemoryUsageReportLogRepository {
    async fn save(&self, log: UsageReportLog) -> Result<(), RepositoryError> {
        self.logs.lock().expect("report log store poisoned").insert(log.id, log);
        Ok(())
    }

    async fn update(&self, log: UsageReportLog) -> Result<(), RepositoryError> {
        let mut logs = self.logs.lock().expect("report log store poisoned");
        if !logs.contains_key(&log.id) {
            return Err(RepositoryError::NotFound(format!("usage report log {}", log.id)));
        }
        logs.insert(log.id, log);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UsageReportLog>, RepositoryError> {
        Ok(self.logs.lock().expect("report log store poisoned").get(&id).cloned())
    }

    async fn find_retry_eligible(
        &self,
        max_retries: u32,
    ) -> Result<Vec<UsageReportLog>, RepositoryError> {
        let logs = self.logs.lock().expect("report log store poisoned");
        Ok(logs
            .values()
            .filter(|l| l.status.is_retry_eligible() && l.retry_count < max_retries)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usagemeter_domain_models::UsageType;

    #[tokio::test]
    async fn retry_eligible_excludes_terminal_and_exhausted() {
        let repo = InMemoryUsageReportLogRepository::new();

        let mut pending = UsageReportLog::new_pending(Uuid::new_v4(), "si_1", UsageType::ApiCalls, 10);
        repo.save(pending.clone()).await.unwrap();

        let mut exhausted = UsageReportLog::new_pending(Uuid::new_v4(), "si_2", UsageType::ApiCalls, 10);
        exhausted.retry_count = 5;
        exhausted.status = usagemeter_domain_models::ReportLogStatus::Retrying;
        repo.save(exhausted.clone()).await.unwrap();

        let mut abandoned = UsageReportLog::new_pending(Uuid::new_v4(), "si_3", UsageType::ApiCalls, 10);
        abandoned.mark_abandoned("gave up");
        repo.save(abandoned).await.unwrap();

        let eligible = repo.find_retry_eligible(5).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, pending.id);

        pending.mark_retrying();
        repo.update(pending).await.unwrap();
    }
}

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use usagemeter_domain_models::{UsageReportLog, UsageType};
use usagemeter_infra_billing_adapter::{BillingAdapter, ReportUsageRequest, UsageAction};
use usagemeter_infra_repository::{TenantRepository, UsageReportLogRepository, UsageRecordRepository};

use crate::error::QuotaServiceError;

#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub max_retries: u32,
    pub retry_base_delay: StdDuration,
    pub retry_max_delay: StdDuration,
    pub batch_size: usize,
    pub reporting_interval: StdDuration,
    pub usage_types: Vec<UsageType>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_base_delay: StdDuration::from_secs(1),
            retry_max_delay: StdDuration::from_secs(300),
            batch_size: 100,
            reporting_interval: StdDuration::from_secs(3600),
            usage_types: vec![UsageType::ApiCalls, UsageType::StorageBytes, UsageType::OrdersCreated],
        }
    }
}

/// `delay(n) = min(base * 2^n, max)`, guarded against `n` large enough
/// to overflow the shift.
fn backoff_delay(config: &ReportingConfig, retry_count: u32) -> StdDuration {
    if retry_count > 30 {
        return config.retry_max_delay;
    }
    let scaled = config.retry_base_delay.saturating_mul(1u32 << retry_count);
    scaled.min(config.retry_max_delay)
}

/// Builds the idempotency key the billing provider uses to dedupe
/// retried submissions: tenant, subscription item, usage type, and the
/// submission timestamp truncated to the hour. Truncating means a
/// retry issued within the same hour as the original attempt reuses
/// the same key; one issued an hour later gets a fresh one.
fn idempotency_key(
    tenant_id: Uuid,
    subscription_item_id: &str,
    usage_type: UsageType,
    timestamp: DateTime<Utc>,
) -> String {
    let hour_bucket = (timestamp.timestamp() / 3600) * 3600;
    format!("{tenant_id}:{subscription_item_id}:{usage_type}:{hour_bucket}")
}

#[derive(Debug, Clone, Default)]
pub struct ReportingRunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<(Uuid, String)>,
}

/// Submits accumulated usage to the external billing provider on a
/// per-tenant, per-billing-period basis, and drives the retry queue for
/// attempts the provider rejected transiently.
pub struct ReportingService {
    tenant_repo: Arc<dyn TenantRepository>,
    record_repo: Arc<dyn UsageRecordRepository>,
    report_log_repo: Arc<dyn UsageReportLogRepository>,
    billing_adapter: Arc<BillingAdapter>,
    config: ReportingConfig,
    /// Guards `report_usage_for_all_tenants` against overlapping runs
    /// when the scheduling interval is shorter than one run takes.
    run_guard: Mutex<()>,
}

impl ReportingService {
    pub fn new(
        tenant_repo: Arc<dyn TenantRepository>,
        record_repo: Arc<dyn UsageRecordRepository>,
        report_log_repo: Arc<dyn UsageReportLogRepository>,
        billing_adapter: Arc<BillingAdapter>,
        config: ReportingConfig,
    ) -> Self {
        Self { tenant_repo, record_repo, report_log_repo, billing_adapter, config, run_guard: Mutex::new(()) }
    }

    /// Sums each configured accumulative usage type over the tenant's
    /// current billing period and submits non-zero totals to the
    /// provider. A tenant with no active subscription is skipped, not
    /// an error — there is nothing to bill against.
    ///
    /// Always reports with `UsageAction::Set`, never `Increment`: the
    /// quantity submitted is the period's running total, not a delta
    /// since the last call, and only that framing is safe to retry —
    /// an `Increment` replay would double-count. This assumes the
    /// configured billing period matches the provider's own metering
    /// window; a mismatch would under- or over-report.
    pub async fn report_usage_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<UsageReportLog>, QuotaServiceError> {
        let Some(subscription) = self.tenant_repo.find_active_subscription(tenant_id).await? else {
            return Ok(Vec::new());
        };

        let mut submitted = Vec::new();
        for usage_type in self.config.usage_types.iter().copied().filter(|t| !t.is_countable()) {
            let quantity = self
                .record_repo
                .sum_by_tenant_and_type(
                    tenant_id,
                    usage_type,
                    subscription.current_period_start,
                    subscription.current_period_end,
                )
                .await?;
            if quantity == 0 {
                continue;
            }

            let mut log = UsageReportLog::new_pending(
                tenant_id,
                subscription.subscription_item_id.clone(),
                usage_type,
                quantity,
            );
            if let Err(err) = self.report_log_repo.save(log.clone()).await {
                tracing::warn!(tenant_id = %tenant_id, usage_type = %usage_type, error = %err, "failed to persist usage report log, submitting anyway");
            }

            let key = idempotency_key(tenant_id, &subscription.subscription_item_id, usage_type, log.timestamp);
            let request = ReportUsageRequest {
                subscription_item_id: subscription.subscription_item_id.clone(),
                quantity,
                action: UsageAction::Set,
                timestamp: log.timestamp,
                idempotency_key: key,
            };

            match self.billing_adapter.report_usage(request).await {
                Ok(record) => log.mark_success(record.id),
                Err(err) => {
                    tracing::warn!(tenant_id = %tenant_id, usage_type = %usage_type, error = %err, "usage submission failed");
                    log.mark_failed(err.to_string());
                }
            }
            self.report_log_repo.update(log.clone()).await?;
            submitted.push(log);
        }

        Ok(submitted)
    }

    /// Retries every `PENDING`/`RETRYING` log whose backoff window has
    /// elapsed. The idempotency key is rebuilt from the log's original
    /// `timestamp`, never from the retry's own clock, so a retry inside
    /// the provider's dedupe window collapses onto the first attempt.
    pub async fn retry_failed_reports(&self) -> Result<ReportingRunSummary, QuotaServiceError> {
        let eligible = self.report_log_repo.find_retry_eligible(self.config.max_retries).await?;
        let now = Utc::now();
        let mut summary = ReportingRunSummary { total: eligible.len(), ..Default::default() };

        for mut log in eligible {
            let due_at = log.updated_at
                + ChronoDuration::from_std(backoff_delay(&self.config, log.retry_count)).unwrap_or_default();
            if now < due_at {
                continue;
            }

            let key = idempotency_key(log.tenant_id, &log.subscription_item_id, log.usage_type, log.timestamp);
            let request = ReportUsageRequest {
                subscription_item_id: log.subscription_item_id.clone(),
                quantity: log.quantity,
                action: UsageAction::Set,
                timestamp: log.timestamp,
                idempotency_key: key,
            };

            match self.billing_adapter.report_usage(request).await {
                Ok(record) => {
                    log.mark_success(record.id);
                    summary.successful += 1;
                }
                Err(err) => {
                    if log.retry_count + 1 > 30 {
                        log.mark_abandoned(err.to_string());
                    } else {
                        log.error_message = Some(err.to_string());
                        log.mark_retrying();
                    }
                    summary.failed += 1;
                    summary.errors.push((log.tenant_id, err.to_string()));
                }
            }
            self.report_log_repo.update(log).await?;
        }

        Ok(summary)
    }

    /// Sequentially reports usage for every active tenant. Guarded by a
    /// mutex so a slow run is never overlapped by the next scheduled
    /// tick; one tenant's failure is recorded and never aborts the
    /// batch.
    pub async fn report_usage_for_all_tenants(&self) -> Result<ReportingRunSummary, QuotaServiceError> {
        let _guard = self.run_guard.lock().await;
        let tenants = self.tenant_repo.list_active().await?;
        let mut summary = ReportingRunSummary { total: tenants.len(), ..Default::default() };

        for tenant in tenants {
            match self.report_usage_for_tenant(tenant.id).await {
                Ok(logs) => summary.successful += logs.len(),
                Err(err) => {
                    tracing::error!(tenant_id = %tenant.id, error = %err, "usage reporting failed for tenant");
                    summary.failed += 1;
                    summary.errors.push((tenant.id, err.to_string()));
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usagemeter_domain_models::SubscriptionStatus;
    use usagemeter_infra_billing_adapter::BillingAdapterConfig;
    use usagemeter_infra_repository::{
        InMemoryTenantRepository, InMemoryUsageRecordRepository, InMemoryUsageReportLogRepository,
    };

    fn make_adapter() -> Arc<BillingAdapter> {
        let config = BillingAdapterConfig::new(
            "sk_test_123",
            "pk_test_123",
            "whsec_test",
            true,
            "usd",
            std::collections::HashMap::new(),
        )
        .unwrap();
        Arc::new(BillingAdapter::new(config).unwrap())
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let config = ReportingConfig::default();
        assert_eq!(backoff_delay(&config, 0), StdDuration::from_secs(1));
        assert_eq!(backoff_delay(&config, 1), StdDuration::from_secs(2));
        assert_eq!(backoff_delay(&config, 10), config.retry_max_delay);
        assert_eq!(backoff_delay(&config, 40), config.retry_max_delay);
    }

    #[test]
    fn idempotency_key_is_stable_within_the_same_hour() {
        let tenant_id = Uuid::new_v4();
        let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t2 = t1 + ChronoDuration::minutes(30);
        assert_eq!(
            idempotency_key(tenant_id, "si_1", UsageType::ApiCalls, t1),
            idempotency_key(tenant_id, "si_1", UsageType::ApiCalls, t2)
        );
    }

    #[test]
    fn idempotency_key_changes_across_hour_boundary() {
        let tenant_id = Uuid::new_v4();
        let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t2 = t1 + ChronoDuration::hours(1);
        assert_ne!(
            idempotency_key(tenant_id, "si_1", UsageType::ApiCalls, t1),
            idempotency_key(tenant_id, "si_1", UsageType::ApiCalls, t2)
        );
    }

    #[tokio::test]
    async fn tenant_without_subscription_is_skipped_not_errored() {
        let tenant_repo = Arc::new(InMemoryTenantRepository::new());
        let record_repo = Arc::new(InMemoryUsageRecordRepository::new());
        let report_log_repo = Arc::new(InMemoryUsageReportLogRepository::new());
        let service = ReportingService::new(
            tenant_repo,
            record_repo,
            report_log_repo,
            make_adapter(),
            ReportingConfig::default(),
        );
        let submitted = service.report_usage_for_tenant(Uuid::new_v4()).await.unwrap();
        assert!(submitted.is_empty());
    }

    #[tokio::test]
    async fn zero_usage_produces_no_report_log() {
        let tenant_repo = Arc::new(InMemoryTenantRepository::new());
        let record_repo = Arc::new(InMemoryUsageRecordRepository::new());
        let report_log_repo = Arc::new(InMemoryUsageReportLogRepository::new());
        let tenant_id = Uuid::new_v4();
        tenant_repo.seed_subscription(usagemeter_domain_models::TenantSubscription {
            tenant_id,
            subscription_id: "sub_1".to_string(),
            subscription_item_id: "si_1".to_string(),
            plan_id: "pro".to_string(),
            status: SubscriptionStatus::Active,
            current_period_start: Utc::now() - ChronoDuration::days(1),
            current_period_end: Utc::now() + ChronoDuration::days(29),
        });

        let service = ReportingService::new(
            tenant_repo,
            record_repo,
            report_log_repo,
            make_adapter(),
            ReportingConfig::default(),
        );
        let submitted = service.report_usage_for_tenant(tenant_id).await.unwrap();
        assert!(submitted.is_empty());
    }
}

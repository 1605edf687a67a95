use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use usagemeter_domain_models::{
    OveragePolicy, QuotaCheckResult, QuotaExceededError, QuotaStatus, ResetPeriod, UsageQuota,
    UsageType,
};
use usagemeter_infra_repository::{
    TenantRepository, UsageMeterRepository, UsageQuotaRepository, UsageRecordRepository,
};
use usagemeter_shared_events::EventBus;

use crate::error::QuotaServiceError;

/// How long a cached meter is trusted before the service falls back to
/// recomputing from the record repository.
const METER_FRESHNESS: ChronoDuration = ChronoDuration::minutes(5);

pub struct CheckQuotaRequest {
    pub tenant_id: Uuid,
    pub usage_type: UsageType,
    pub amount: i64,
}

/// Result of `check_quota`: the evaluation plus, only when the
/// operation was denied, the structured error a caller maps to an
/// HTTP 429. Kept separate from the `Result` error channel because
/// evaluating and denying is success, not failure.
pub struct QuotaDecision {
    pub result: QuotaCheckResult,
    pub exceeded_error: Option<QuotaExceededError>,
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        self.result.is_allowed()
    }
}

#[derive(Debug, Clone)]
pub struct UsageSummaryEntry {
    pub usage_type: UsageType,
    pub result: QuotaCheckResult,
}

#[derive(Debug, Clone)]
pub struct UsageSummary {
    pub tenant_id: Uuid,
    pub entries: Vec<UsageSummaryEntry>,
    pub warnings: Vec<UsageType>,
    pub exceeded: Vec<UsageType>,
}

/// The hardest component in the workspace: gates resource operations
/// against layered plan/tenant quotas, never blocking on event
/// publication, and never letting observability failures flip an
/// allow/deny decision.
pub struct QuotaService {
    quota_repo: Arc<dyn UsageQuotaRepository>,
    record_repo: Arc<dyn UsageRecordRepository>,
    meter_repo: Arc<dyn UsageMeterRepository>,
    tenant_repo: Arc<dyn TenantRepository>,
    events: EventBus,
}

impl QuotaService {
    pub fn new(
        quota_repo: Arc<dyn UsageQuotaRepository>,
        record_repo: Arc<dyn UsageRecordRepository>,
        meter_repo: Arc<dyn UsageMeterRepository>,
        tenant_repo: Arc<dyn TenantRepository>,
        events: EventBus,
    ) -> Self {
        Self { quota_repo, record_repo, meter_repo, tenant_repo, events }
    }

    pub async fn check_quota(&self, req: CheckQuotaRequest) -> Result<QuotaDecision, QuotaServiceError> {
        if req.tenant_id.is_nil() {
            return Err(QuotaServiceError::InvalidTenant);
        }
        let amount = if req.amount <= 0 { 1 } else { req.amount };

        let tenant = self
            .tenant_repo
            .find_by_id(req.tenant_id)
            .await?
            .ok_or_else(|| QuotaServiceError::TenantNotFound(req.tenant_id.to_string()))?;

        let quota = self.effective_quota(req.tenant_id, &tenant.plan_id, req.usage_type).await?;

        let Some(quota) = quota else {
            // Missing effective quota means unlimited, not a failure.
            return Ok(QuotaDecision { result: QuotaCheckResult::unlimited(0), exceeded_error: None });
        };

        let current = self.resolve_current_usage(req.tenant_id, req.usage_type, quota.reset_period).await?;
        let projected = current + amount;
        let result = quota.check_usage(projected);

        if matches!(result.status, QuotaStatus::Warning | QuotaStatus::Exceeded) {
            self.emit_quota_events(req.tenant_id, req.usage_type, &result);
        }

        let exceeded_error = if result.status == QuotaStatus::Exceeded && quota.overage_policy == OveragePolicy::Block
        {
            Some(QuotaExceededError::new(req.usage_type, projected, quota.limit()))
        } else {
            None
        };

        Ok(QuotaDecision { result, exceeded_error })
    }

    pub async fn get_usage_summary(
        &self,
        tenant_id: Uuid,
        reset_period: ResetPeriod,
    ) -> Result<UsageSummary, QuotaServiceError> {
        let tenant = self
            .tenant_repo
            .find_by_id(tenant_id)
            .await?
            .ok_or_else(|| QuotaServiceError::TenantNotFound(tenant_id.to_string()))?;

        let quotas = self.all_effective_quotas(tenant_id, &tenant.plan_id).await?;
        let mut entries = Vec::new();
        let mut warnings = Vec::new();
        let mut exceeded = Vec::new();

        for quota in quotas.into_iter().filter(|q| q.reset_period == reset_period) {
            let current = self.resolve_current_usage(tenant_id, quota.usage_type, quota.reset_period).await?;
            let result = quota.check_usage(current);
            match result.status {
                QuotaStatus::Warning => warnings.push(quota.usage_type),
                QuotaStatus::Exceeded => exceeded.push(quota.usage_type),
                _ => {}
            }
            entries.push(UsageSummaryEntry { usage_type: quota.usage_type, result });
        }

        Ok(UsageSummary { tenant_id, entries, warnings, exceeded })
    }

    /// Derivative of `get_usage_summary` that doesn't filter by reset
    /// period: every effective quota the tenant has, each evaluated
    /// against its own period window.
    pub async fn get_quota_status(
        &self,
        tenant_id: Uuid,
    ) -> Result<HashMap<UsageType, QuotaCheckResult>, QuotaServiceError> {
        let tenant = self
            .tenant_repo
            .find_by_id(tenant_id)
            .await?
            .ok_or_else(|| QuotaServiceError::TenantNotFound(tenant_id.to_string()))?;

        let quotas = self.all_effective_quotas(tenant_id, &tenant.plan_id).await?;
        let mut status = HashMap::with_capacity(quotas.len());
        for quota in quotas {
            let current = self.resolve_current_usage(tenant_id, quota.usage_type, quota.reset_period).await?;
            status.insert(quota.usage_type, quota.check_usage(current));
        }
        Ok(status)
    }

    async fn effective_quota(
        &self,
        tenant_id: Uuid,
        plan_id: &str,
        usage_type: UsageType,
    ) -> Result<Option<UsageQuota>, QuotaServiceError> {
        if let Some(quota) = self.quota_repo.get_tenant_override(tenant_id, usage_type).await? {
            return Ok(Some(quota));
        }
        Ok(self.quota_repo.get_plan_default(plan_id, usage_type).await?)
    }

    async fn all_effective_quotas(
        &self,
        tenant_id: Uuid,
        plan_id: &str,
    ) -> Result<Vec<UsageQuota>, QuotaServiceError> {
        let defaults = self.quota_repo.list_plan_defaults(plan_id).await?;
        let overrides = self.quota_repo.list_tenant_overrides(tenant_id).await?;
        let mut by_type: HashMap<UsageType, UsageQuota> =
            defaults.into_iter().map(|q| (q.usage_type, q)).collect();
        for over in overrides {
            by_type.insert(over.usage_type, over);
        }
        Ok(by_type.into_values().collect())
    }

    async fn resolve_current_usage(
        &self,
        tenant_id: Uuid,
        usage_type: UsageType,
        reset_period: ResetPeriod,
    ) -> Result<i64, QuotaServiceError> {
        if usage_type.is_countable() {
            return match self.meter_repo.calculate_meter(tenant_id, usage_type).await {
                Ok(count) => Ok(count),
                Err(err) => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        usage_type = %usage_type,
                        error = %err,
                        "no resource counter available for countable usage type, defaulting to 0"
                    );
                    Ok(0)
                }
            };
        }

        let (period_start, period_end) = reset_period.bounds(Utc::now());
        let now = Utc::now();
        if let Some(meter) = self.meter_repo.get_cached(tenant_id, usage_type, period_start).await? {
            if meter.is_fresh(METER_FRESHNESS, now) {
                return Ok(meter.total_usage);
            }
        }
        Ok(self
            .record_repo
            .sum_by_tenant_and_type(tenant_id, usage_type, period_start, period_end)
            .await?)
    }

    /// Fire-and-forget: emission must never block the decision path nor
    /// propagate a failure to the caller. Dual emission is deliberate —
    /// crossing the hard limit implies having already crossed the soft
    /// one, and a consumer that only watches for warnings must not miss
    /// the hard breach.
    fn emit_quota_events(&self, tenant_id: Uuid, usage_type: UsageType, result: &QuotaCheckResult) {
        let events = self.events.clone();
        let result = result.clone();
        tokio::spawn(async move {
            if result.status == QuotaStatus::Exceeded {
                events.emit_quota_exceeded(tenant_id, usage_type, result.current_usage, result.limit);
                if result.soft_limit.is_some() {
                    events.emit_quota_warning(
                        tenant_id,
                        usage_type,
                        result.current_usage,
                        result.limit,
                        result.soft_limit,
                    );
                }
            } else if result.status == QuotaStatus::Warning {
                events.emit_quota_warning(
                    tenant_id,
                    usage_type,
                    result.current_usage,
                    result.limit,
                    result.soft_limit,
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usagemeter_domain_models::ResetPeriod as RP;
    use usagemeter_infra_repository::{
        InMemoryTenantRepository, InMemoryUsageMeterRepository, InMemoryUsageQuotaRepository,
        InMemoryUsageRecordRepository, Tenant, TenantStatus,
    };

    fn make_service() -> (QuotaService, Arc<InMemoryTenantRepository>, Arc<InMemoryUsageQuotaRepository>) {
        let quota_repo = Arc::new(InMemoryUsageQuotaRepository::new());
        let record_repo = Arc::new(InMemoryUsageRecordRepository::new());
        let meter_repo = Arc::new(InMemoryUsageMeterRepository::new());
        let tenant_repo = Arc::new(InMemoryTenantRepository::new());
        let events = EventBus::new();
        let service = QuotaService::new(
            quota_repo.clone(),
            record_repo,
            meter_repo,
            tenant_repo.clone(),
            events,
        );
        (service, tenant_repo, quota_repo)
    }

    fn seed_tenant(repo: &InMemoryTenantRepository, plan_id: &str) -> Uuid {
        let id = Uuid::new_v4();
        repo.seed(Tenant {
            id,
            plan_id: plan_id.to_string(),
            status: TenantStatus::Active,
            provider_customer_id: None,
            stripe_subscription_id: None,
            expires_at: None,
        });
        id
    }

    #[tokio::test]
    async fn scenario_5_missing_quota_is_unlimited() {
        let (service, tenant_repo, _quota_repo) = make_service();
        let tenant_id = seed_tenant(&tenant_repo, "basic");

        let decision = service
            .check_quota(CheckQuotaRequest { tenant_id, usage_type: UsageType::OrdersCreated, amount: 1 })
            .await
            .unwrap();

        assert!(decision.is_allowed());
        assert_eq!(decision.result.limit, usagemeter_domain_models::UNLIMITED);
        assert_eq!(decision.result.status, QuotaStatus::Ok);
    }

    #[tokio::test]
    async fn block_policy_attaches_exceeded_error() {
        let (service, tenant_repo, quota_repo) = make_service();
        let tenant_id = seed_tenant(&tenant_repo, "basic");
        quota_repo
            .upsert(
                UsageQuota::new_plan_default(
                    "basic",
                    UsageType::OrdersCreated,
                    100,
                    RP::Monthly,
                    OveragePolicy::Block,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let decision = service
            .check_quota(CheckQuotaRequest { tenant_id, usage_type: UsageType::OrdersCreated, amount: 200 })
            .await
            .unwrap();

        assert!(!decision.is_allowed());
        assert!(decision.exceeded_error.is_some());
        assert_eq!(QuotaExceededError::HTTP_STATUS, 429);
    }

    #[tokio::test]
    async fn amount_zero_or_negative_normalizes_to_one() {
        let (service, tenant_repo, quota_repo) = make_service();
        let tenant_id = seed_tenant(&tenant_repo, "basic");
        quota_repo
            .upsert(
                UsageQuota::new_plan_default(
                    "basic",
                    UsageType::OrdersCreated,
                    1,
                    RP::Monthly,
                    OveragePolicy::Block,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let decision = service
            .check_quota(CheckQuotaRequest { tenant_id, usage_type: UsageType::OrdersCreated, amount: 0 })
            .await
            .unwrap();
        assert_eq!(decision.result.status, QuotaStatus::Ok);
    }

    #[tokio::test]
    async fn unknown_tenant_is_reported_as_error() {
        let (service, _tenant_repo, _quota_repo) = make_service();
        let err = service
            .check_quota(CheckQuotaRequest {
                tenant_id: Uuid::new_v4(),
                usage_type: UsageType::OrdersCreated,
                amount: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaServiceError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn countable_type_with_no_counter_proceeds_as_ok() {
        let (service, tenant_repo, quota_repo) = make_service();
        let tenant_id = seed_tenant(&tenant_repo, "basic");
        quota_repo
            .upsert(
                UsageQuota::new_plan_default(
                    "basic",
                    UsageType::ActiveUsers,
                    100,
                    RP::Monthly,
                    OveragePolicy::Block,
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let decision = service
            .check_quota(CheckQuotaRequest { tenant_id, usage_type: UsageType::ActiveUsers, amount: 1 })
            .await
            .unwrap();
        assert_eq!(decision.result.status, QuotaStatus::Ok);
        assert!(decision.is_allowed());
    }
}

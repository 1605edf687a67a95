use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::ModelError;
use crate::reset_period::ResetPeriod;
use crate::usage_type::UsageType;

/// What happens when usage crosses the hard limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OveragePolicy {
    /// Denies further consumption.
    Block,
    /// Permits but flags the operation as over limit.
    Warn,
    /// Permits and signals that overage should be billed.
    Charge,
    /// Permits but signals the caller should degrade service quality.
    Throttle,
}

impl OveragePolicy {
    pub fn denies_on_exceeded(&self) -> bool {
        matches!(self, OveragePolicy::Block)
    }
}

impl fmt::Display for OveragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OveragePolicy::Block => "BLOCK",
            OveragePolicy::Warn => "WARN",
            OveragePolicy::Charge => "CHARGE",
            OveragePolicy::Throttle => "THROTTLE",
        };
        write!(f, "{s}")
    }
}

/// Outcome of evaluating a quota against a usage value.
///
/// Ordering reflects severity for the `OK < WARNING < EXCEEDED`
/// monotonicity invariant; `Inactive` sits outside that scale since an
/// inactive quota is a different branch of evaluation entirely (always
/// permissive, independent of usage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuotaStatus {
    Ok,
    Warning,
    Exceeded,
    Inactive,
}

impl QuotaStatus {
    fn severity(&self) -> u8 {
        match self {
            QuotaStatus::Ok => 0,
            QuotaStatus::Warning => 1,
            QuotaStatus::Exceeded => 2,
            QuotaStatus::Inactive => 0,
        }
    }

    /// Total order used by the monotonicity invariant. `Inactive` is
    /// treated as equivalent to `Ok` here since both are permissive
    /// floors; callers evaluating monotonicity only ever do so while
    /// holding the quota's activity constant.
    pub fn at_least_as_severe_as(&self, other: QuotaStatus) -> bool {
        self.severity() >= other.severity()
    }
}

impl fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuotaStatus::Ok => "OK",
            QuotaStatus::Warning => "WARNING",
            QuotaStatus::Exceeded => "EXCEEDED",
            QuotaStatus::Inactive => "INACTIVE",
        };
        write!(f, "{s}")
    }
}

pub const UNLIMITED: i64 = -1;

/// A limit definition, keyed either by `(plan_id, usage_type)` for a
/// plan default or `(tenant_id, usage_type)` for a tenant override. A
/// tenant override present for the same `usage_type` always wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageQuota {
    pub id: Uuid,
    pub plan_id: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub usage_type: UsageType,
    limit: i64,
    soft_limit: Option<i64>,
    pub reset_period: ResetPeriod,
    pub overage_policy: OveragePolicy,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageQuota {
    pub fn new_plan_default(
        plan_id: impl Into<String>,
        usage_type: UsageType,
        limit: i64,
        reset_period: ResetPeriod,
        overage_policy: OveragePolicy,
    ) -> Result<Self, ModelError> {
        Self::new(Some(plan_id.into()), None, usage_type, limit, reset_period, overage_policy)
    }

    pub fn new_tenant_override(
        tenant_id: Uuid,
        usage_type: UsageType,
        limit: i64,
        reset_period: ResetPeriod,
        overage_policy: OveragePolicy,
    ) -> Result<Self, ModelError> {
        Self::new(None, Some(tenant_id), usage_type, limit, reset_period, overage_policy)
    }

    fn new(
        plan_id: Option<String>,
        tenant_id: Option<Uuid>,
        usage_type: UsageType,
        limit: i64,
        reset_period: ResetPeriod,
        overage_policy: OveragePolicy,
    ) -> Result<Self, ModelError> {
        validate_limit(limit)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            plan_id,
            tenant_id,
            usage_type,
            limit,
            soft_limit: None,
            reset_period,
            overage_policy,
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn soft_limit(&self) -> Option<i64> {
        self.soft_limit
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == UNLIMITED
    }

    pub fn set_limit(&mut self, limit: i64) -> Result<(), ModelError> {
        validate_limit(limit)?;
        if let Some(soft) = self.soft_limit {
            if limit != UNLIMITED && soft >= limit {
                return Err(ModelError::InvalidSoftLimit { soft_limit: soft, limit });
            }
        }
        self.limit = limit;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_soft_limit(&mut self, soft_limit: Option<i64>) -> Result<(), ModelError> {
        if let Some(soft) = soft_limit {
            if soft < 0 {
                return Err(ModelError::InvalidSoftLimit { soft_limit: soft, limit: self.limit });
            }
            if self.limit != UNLIMITED && soft >= self.limit {
                return Err(ModelError::InvalidSoftLimit { soft_limit: soft, limit: self.limit });
            }
        }
        self.soft_limit = soft_limit;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Evaluates `current_usage` against this quota. Does not itself
    /// decide allow/deny for `EXCEEDED` under non-`BLOCK` policies —
    /// that's `QuotaCheckResult::is_allowed`'s job, since the policy is
    /// carried on the result for callers who need to branch on it too.
    pub fn check_usage(&self, current_usage: i64) -> QuotaCheckResult {
        if !self.is_active {
            return QuotaCheckResult {
                status: QuotaStatus::Inactive,
                current_usage,
                limit: self.limit,
                soft_limit: self.soft_limit,
                remaining: 0,
                overage: 0,
                usage_percent: 0.0,
                overage_policy: self.overage_policy,
                is_unlimited: self.is_unlimited(),
            };
        }
        if self.limit == UNLIMITED {
            return QuotaCheckResult {
                status: QuotaStatus::Ok,
                current_usage,
                limit: self.limit,
                soft_limit: self.soft_limit,
                remaining: i64::MAX,
                overage: 0,
                usage_percent: 0.0,
                overage_policy: self.overage_policy,
                is_unlimited: true,
            };
        }

        let remaining = self.limit - current_usage;
        let usage_percent = if self.limit > 0 {
            current_usage as f64 / self.limit as f64 * 100.0
        } else {
            0.0
        };

        let status = if current_usage > self.limit {
            QuotaStatus::Exceeded
        } else if self.soft_limit.is_some_and(|soft| current_usage >= soft) {
            QuotaStatus::Warning
        } else {
            QuotaStatus::Ok
        };

        let overage = if status == QuotaStatus::Exceeded {
            current_usage - self.limit
        } else {
            0
        };

        QuotaCheckResult {
            status,
            current_usage,
            limit: self.limit,
            soft_limit: self.soft_limit,
            remaining,
            overage,
            usage_percent,
            overage_policy: self.overage_policy,
            is_unlimited: false,
        }
    }

    /// `active ⇒ (unlimited ∨ current + amount <= limit)`.
    pub fn can_consume(&self, current: i64, amount: i64) -> bool {
        if !self.is_active {
            return true;
        }
        if self.is_unlimited() {
            return true;
        }
        current + amount <= self.limit
    }
}

fn validate_limit(limit: i64) -> Result<(), ModelError> {
    if limit < UNLIMITED {
        return Err(ModelError::InvalidLimit(limit));
    }
    Ok(())
}

/// Structured denial attached to a `QuotaCheckResult`, not returned
/// through the error channel — evaluating quota and denying the
/// operation is a successful outcome of the service call.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaExceededError {
    pub usage_type: UsageType,
    pub current_usage: i64,
    pub limit: i64,
    pub message: String,
}

impl QuotaExceededError {
    pub fn new(usage_type: UsageType, current_usage: i64, limit: i64) -> Self {
        Self {
            usage_type,
            current_usage,
            limit,
            message: format!(
                "quota exceeded for {usage_type}: {current_usage} of {limit} used"
            ),
        }
    }

    pub const HTTP_STATUS: u16 = 429;
}

impl fmt::Display for QuotaExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for QuotaExceededError {}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaCheckResult {
    pub status: QuotaStatus,
    pub current_usage: i64,
    pub limit: i64,
    pub soft_limit: Option<i64>,
    pub remaining: i64,
    pub overage: i64,
    pub usage_percent: f64,
    pub overage_policy: OveragePolicy,
    pub is_unlimited: bool,
}

impl QuotaCheckResult {
    /// Result for a `(tenant, usage_type)` pair with no effective quota
    /// on record. A missing quota means unlimited, not an error.
    pub fn unlimited(current_usage: i64) -> Self {
        Self {
            status: QuotaStatus::Ok,
            current_usage,
            limit: UNLIMITED,
            soft_limit: None,
            remaining: i64::MAX,
            overage: 0,
            usage_percent: 0.0,
            overage_policy: OveragePolicy::Warn,
            is_unlimited: true,
        }
    }

    /// `IsAllowed = Status ∈ {OK, WARNING, INACTIVE} ∨ (Status ==
    /// EXCEEDED ∧ OveragePolicy != BLOCK)`.
    pub fn is_allowed(&self) -> bool {
        match self.status {
            QuotaStatus::Ok | QuotaStatus::Warning | QuotaStatus::Inactive => true,
            QuotaStatus::Exceeded => !self.overage_policy.denies_on_exceeded(),
        }
    }
}

/// Groups quotas for one `(plan, tenant?)` pair and evaluates all of
/// them against a batch of current-usage readings in one pass.
#[derive(Debug, Clone, Default)]
pub struct QuotaSet {
    quotas: HashMap<UsageType, UsageQuota>,
}

impl QuotaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, quota: UsageQuota) {
        self.quotas.insert(quota.usage_type, quota);
    }

    pub fn get(&self, usage_type: UsageType) -> Option<&UsageQuota> {
        self.quotas.get(&usage_type)
    }

    /// Evaluates every quota in the set against the matching entry in
    /// `current_usage`. A `UsageType` with no quota in the set is
    /// absent from the result — the caller (the Quota Service) is the
    /// one that knows a missing quota means "unlimited".
    pub fn check_all(
        &self,
        current_usage: &HashMap<UsageType, i64>,
    ) -> HashMap<UsageType, QuotaCheckResult> {
        self.quotas
            .iter()
            .map(|(usage_type, quota)| {
                let usage = current_usage.get(usage_type).copied().unwrap_or(0);
                (*usage_type, quota.check_usage(usage))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quota(limit: i64, soft: Option<i64>, policy: OveragePolicy, active: bool) -> UsageQuota {
        let mut q = UsageQuota::new_plan_default(
            "basic",
            UsageType::OrdersCreated,
            limit,
            ResetPeriod::Monthly,
            policy,
        )
        .unwrap();
        q.is_active = active;
        if let Some(s) = soft {
            q.set_soft_limit(Some(s)).unwrap();
        }
        q
    }

    #[test]
    fn scenario_1_within_limit_allow() {
        let q = quota(100, None, OveragePolicy::Block, true);
        let result = q.check_usage(50);
        assert_eq!(result.status, QuotaStatus::Ok);
        assert!(result.is_allowed());
        assert_eq!(result.remaining, 50);
    }

    #[test]
    fn scenario_2_block_policy_denies() {
        let q = quota(100, None, OveragePolicy::Block, true);
        let result = q.check_usage(101);
        assert_eq!(result.status, QuotaStatus::Exceeded);
        assert!(!result.is_allowed());
    }

    #[test]
    fn scenario_3_warn_policy_permits_but_flags() {
        let q = quota(100, None, OveragePolicy::Warn, true);
        let result = q.check_usage(101);
        assert_eq!(result.status, QuotaStatus::Exceeded);
        assert!(result.is_allowed());
    }

    #[test]
    fn scenario_4_soft_limit_warning() {
        let q = quota(100, Some(80), OveragePolicy::Block, true);
        let result = q.check_usage(80);
        assert_eq!(result.status, QuotaStatus::Warning);
        assert!(result.is_allowed());
        assert_eq!(result.soft_limit, Some(80));
    }

    #[test]
    fn unlimited_quota_is_permissive() {
        let q = quota(UNLIMITED, None, OveragePolicy::Block, true);
        let result = q.check_usage(1_000_000);
        assert_eq!(result.status, QuotaStatus::Ok);
        assert!(result.is_unlimited);
        assert!(result.is_allowed());
    }

    #[test]
    fn inactive_quota_is_permissive_regardless_of_usage() {
        let q = quota(100, None, OveragePolicy::Block, false);
        let result = q.check_usage(1_000_000);
        assert_eq!(result.status, QuotaStatus::Inactive);
        assert!(result.is_allowed());
    }

    #[test]
    fn set_soft_limit_rejects_values_above_limit() {
        let mut q = quota(100, None, OveragePolicy::Block, true);
        let err = q.set_soft_limit(Some(100)).unwrap_err();
        assert!(matches!(err, ModelError::InvalidSoftLimit { .. }));
    }

    #[test]
    fn set_limit_rejects_values_below_unlimited_sentinel() {
        let mut q = quota(100, None, OveragePolicy::Block, true);
        let err = q.set_limit(-2).unwrap_err();
        assert_eq!(err, ModelError::InvalidLimit(-2));
    }

    proptest! {
        #[test]
        fn quota_monotonicity(limit in 1i64..10_000, u1 in 0i64..20_000, u2 in 0i64..20_000) {
            prop_assume!(u1 <= u2);
            let q = quota(limit, None, OveragePolicy::Block, true);
            let s1 = q.check_usage(u1).status;
            let s2 = q.check_usage(u2).status;
            prop_assert!(s2.at_least_as_severe_as(s1));
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;
use crate::metadata::Metadata;
use crate::usage_type::{UsageType, UsageUnit};

/// An immutable, append-only usage event. Once constructed, no field
/// mutates; a correction is a new record, never an edit in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub usage_type: UsageType,
    pub quantity: i64,
    pub unit: UsageUnit,
    pub recorded_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Metadata,
}

impl UsageRecord {
    /// Minimal constructor. Validates tenant, quantity, and period
    /// ordering; derives `unit` from `usage_type`; stamps `recorded_at`
    /// with the current time.
    pub fn new(
        tenant_id: Uuid,
        usage_type: UsageType,
        quantity: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        if tenant_id.is_nil() {
            return Err(ModelError::InvalidTenant);
        }
        if quantity < 0 {
            return Err(ModelError::InvalidQuantity(quantity));
        }
        if period_end < period_start {
            return Err(ModelError::InvalidPeriod {
                period_start: period_start.to_rfc3339(),
                period_end: period_end.to_rfc3339(),
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            usage_type,
            quantity,
            unit: usage_type.unit(),
            recorded_at: Utc::now(),
            period_start,
            period_end,
            source_type: None,
            source_id: None,
            user_id: None,
            ip_address: None,
            user_agent: None,
            metadata: Metadata::new(),
        })
    }

    pub fn builder(
        tenant_id: Uuid,
        usage_type: UsageType,
        quantity: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> UsageRecordBuilder {
        UsageRecordBuilder {
            tenant_id,
            usage_type,
            quantity,
            period_start,
            period_end,
            source_type: None,
            source_id: None,
            user_id: None,
            ip_address: None,
            user_agent: None,
            metadata: Metadata::new(),
        }
    }

    /// API-call convenience constructor: tags `source_type = "api"` so
    /// downstream consumers can group records without re-deriving the
    /// convention.
    pub fn api_call(
        tenant_id: Uuid,
        quantity: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        route: impl Into<String>,
    ) -> Result<Self, ModelError> {
        Self::builder(tenant_id, UsageType::ApiCalls, quantity, period_start, period_end)
            .source_type("api")
            .source_id(route.into())
            .build()
    }

    pub fn storage(
        tenant_id: Uuid,
        bytes: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        Self::builder(tenant_id, UsageType::StorageBytes, bytes, period_start, period_end)
            .source_type("storage")
            .build()
    }

    pub fn order_created(
        tenant_id: Uuid,
        order_id: impl Into<String>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        Self::builder(tenant_id, UsageType::OrdersCreated, 1, period_start, period_end)
            .source_type("order")
            .source_id(order_id.into())
            .build()
    }
}

/// Attaches optional provenance to a record before it is persisted.
/// Never mutates an already-built `UsageRecord` — once `build()` runs,
/// the result is immutable like any other record.
pub struct UsageRecordBuilder {
    tenant_id: Uuid,
    usage_type: UsageType,
    quantity: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    source_type: Option<String>,
    source_id: Option<String>,
    user_id: Option<Uuid>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: Metadata,
}

impl UsageRecordBuilder {
    pub fn source_type(mut self, v: impl Into<String>) -> Self {
        self.source_type = Some(v.into());
        self
    }

    pub fn source_id(mut self, v: impl Into<String>) -> Self {
        self.source_id = Some(v.into());
        self
    }

    pub fn user_id(mut self, v: Uuid) -> Self {
        self.user_id = Some(v);
        self
    }

    pub fn ip_address(mut self, v: impl Into<String>) -> Self {
        self.ip_address = Some(v.into());
        self
    }

    pub fn user_agent(mut self, v: impl Into<String>) -> Self {
        self.user_agent = Some(v.into());
        self
    }

    pub fn metadata_entry(mut self, key: impl Into<String>, value: crate::metadata::MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<UsageRecord, ModelError> {
        let mut record = UsageRecord::new(
            self.tenant_id,
            self.usage_type,
            self.quantity,
            self.period_start,
            self.period_end,
        )?;
        record.source_type = self.source_type;
        record.source_id = self.source_id;
        record.user_id = self.user_id;
        record.ip_address = self.ip_address;
        record.user_agent = self.user_agent;
        record.metadata = self.metadata;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now();
        (start, start + Duration::days(1))
    }

    #[test]
    fn rejects_nil_tenant() {
        let (start, end) = period();
        let err = UsageRecord::new(Uuid::nil(), UsageType::ApiCalls, 1, start, end).unwrap_err();
        assert_eq!(err, ModelError::InvalidTenant);
    }

    #[test]
    fn rejects_negative_quantity() {
        let (start, end) = period();
        let err = UsageRecord::new(Uuid::new_v4(), UsageType::ApiCalls, -1, start, end).unwrap_err();
        assert_eq!(err, ModelError::InvalidQuantity(-1));
    }

    #[test]
    fn rejects_inverted_period() {
        let (start, end) = period();
        let err = UsageRecord::new(Uuid::new_v4(), UsageType::ApiCalls, 1, end, start).unwrap_err();
        assert!(matches!(err, ModelError::InvalidPeriod { .. }));
    }

    #[test]
    fn derives_unit_from_usage_type() {
        let (start, end) = period();
        let record = UsageRecord::new(Uuid::new_v4(), UsageType::StorageBytes, 100, start, end).unwrap();
        assert_eq!(record.unit, UsageUnit::Bytes);
    }

    #[test]
    fn api_call_tags_source() {
        let (start, end) = period();
        let record = UsageRecord::api_call(Uuid::new_v4(), 1, start, end, "/v1/orders").unwrap();
        assert_eq!(record.source_type.as_deref(), Some("api"));
        assert_eq!(record.source_id.as_deref(), Some("/v1/orders"));
    }
}

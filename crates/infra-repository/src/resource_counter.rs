use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::RepositoryError;

/// One resource the Snapshot Service counts per tenant per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountedResource {
    Users,
    Products,
    Warehouses,
    Customers,
    Suppliers,
    Orders,
}

impl CountedResource {
    pub const ALL: [CountedResource; 6] = [
        CountedResource::Users,
        CountedResource::Products,
        CountedResource::Warehouses,
        CountedResource::Customers,
        CountedResource::Suppliers,
        CountedResource::Orders,
    ];
}

/// Live population counter consumed only by the Snapshot Service. Kept
/// distinct from `UsageMeterRepository` because a snapshot wants a
/// point-in-time count across several resource kinds in one fan-out,
/// not a single type's meter.
#[async_trait]
pub trait ResourceCounter: Send + Sync {
    async fn count(&self, tenant_id: Uuid, resource: CountedResource) -> Result<i64, RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryResourceCounter {
    counts: Mutex<HashMap<(Uuid, CountedResource), i64>>,
}

impl InMemoryResourceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, tenant_id: Uuid, resource: CountedResource, count: i64) {
        self.counts.lock().expect("counter store poisoned").insert((tenant_id, resource), count);
    }
}

#[async_trait]
impl ResourceCounter for InMemoryResourceCounter {
    async fn count(&self, tenant_id: Uuid, resource: CountedResource) -> Result<i64, RepositoryError> {
        let counts = self.counts.lock().expect("counter store poisoned");
        Ok(counts.get(&(tenant_id, resource)).copied().unwrap_or(0))
    }
}

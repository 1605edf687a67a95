use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ModelError;

/// One unit a usage value is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageUnit {
    Requests,
    Bytes,
    Count,
}

impl fmt::Display for UsageUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageUnit::Requests => write!(f, "requests"),
            UsageUnit::Bytes => write!(f, "bytes"),
            UsageUnit::Count => write!(f, "count"),
        }
    }
}

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;
const TB: f64 = GB * 1024.0;

impl UsageUnit {
    /// Renders a raw value for display. `bytes` gets binary-SI suffixes
    /// (KB/MB/GB/TB) with two decimals above KB; everything else is the
    /// plain integer.
    pub fn format_value(&self, value: i64) -> String {
        match self {
            UsageUnit::Bytes => format_bytes(value),
            UsageUnit::Requests | UsageUnit::Count => value.to_string(),
        }
    }
}

fn format_bytes(value: i64) -> String {
    let v = value as f64;
    let abs = v.abs();
    if abs < KB {
        return format!("{value} B");
    }
    if abs < MB {
        return format!("{:.2} KB", v / KB);
    }
    if abs < GB {
        return format!("{:.2} MB", v / MB);
    }
    if abs < TB {
        return format!("{:.2} GB", v / GB);
    }
    format!("{:.2} TB", v / TB)
}

/// A metered dimension. Extensible: adding a variant only requires
/// updating the four classification functions below, never the
/// services that consume them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    ApiCalls,
    StorageBytes,
    OrdersCreated,
    ActiveUsers,
    Products,
    Warehouses,
    Customers,
    Suppliers,
}

impl UsageType {
    pub const ALL: [UsageType; 8] = [
        UsageType::ApiCalls,
        UsageType::StorageBytes,
        UsageType::OrdersCreated,
        UsageType::ActiveUsers,
        UsageType::Products,
        UsageType::Warehouses,
        UsageType::Customers,
        UsageType::Suppliers,
    ];

    pub fn unit(&self) -> UsageUnit {
        match self {
            UsageType::ApiCalls => UsageUnit::Requests,
            UsageType::StorageBytes => UsageUnit::Bytes,
            UsageType::OrdersCreated
            | UsageType::ActiveUsers
            | UsageType::Products
            | UsageType::Warehouses
            | UsageType::Customers
            | UsageType::Suppliers => UsageUnit::Count,
        }
    }

    /// A countable type measures a current population: aggregation means
    /// asking the live resource registry, not summing events.
    pub fn is_countable(&self) -> bool {
        matches!(
            self,
            UsageType::ActiveUsers
                | UsageType::Products
                | UsageType::Warehouses
                | UsageType::Customers
                | UsageType::Suppliers
        )
    }

    /// An accumulative type measures events over time: aggregation means
    /// summing quantities recorded within the period.
    pub fn is_accumulative(&self) -> bool {
        !self.is_countable()
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, UsageType::StorageBytes)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UsageType::ApiCalls => "API Calls",
            UsageType::StorageBytes => "Storage",
            UsageType::OrdersCreated => "Orders Created",
            UsageType::ActiveUsers => "Active Users",
            UsageType::Products => "Products",
            UsageType::Warehouses => "Warehouses",
            UsageType::Customers => "Customers",
            UsageType::Suppliers => "Suppliers",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::ApiCalls => "api_calls",
            UsageType::StorageBytes => "storage_bytes",
            UsageType::OrdersCreated => "orders_created",
            UsageType::ActiveUsers => "active_users",
            UsageType::Products => "products",
            UsageType::Warehouses => "warehouses",
            UsageType::Customers => "customers",
            UsageType::Suppliers => "suppliers",
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UsageType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_calls" => Ok(UsageType::ApiCalls),
            "storage_bytes" => Ok(UsageType::StorageBytes),
            "orders_created" => Ok(UsageType::OrdersCreated),
            "active_users" => Ok(UsageType::ActiveUsers),
            "products" => Ok(UsageType::Products),
            "warehouses" => Ok(UsageType::Warehouses),
            "customers" => Ok(UsageType::Customers),
            "suppliers" => Ok(UsageType::Suppliers),
            other => Err(ModelError::InvalidUsageType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_total_and_exclusive() {
        for t in UsageType::ALL {
            assert_ne!(t.is_countable(), t.is_accumulative());
        }
    }

    #[test]
    fn storage_is_accumulative() {
        assert!(UsageType::StorageBytes.is_accumulative());
        assert!(UsageType::StorageBytes.is_storage());
    }

    #[test]
    fn format_bytes_uses_binary_si() {
        assert_eq!(UsageUnit::Bytes.format_value(512), "512 B");
        assert_eq!(UsageUnit::Bytes.format_value(2048), "2.00 KB");
        assert_eq!(UsageUnit::Bytes.format_value(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn round_trips_through_str() {
        for t in UsageType::ALL {
            assert_eq!(t.as_str().parse::<UsageType>().unwrap(), t);
        }
    }
}

//! Outbound adapter to the external billing provider. This is the only
//! crate in the workspace that speaks HTTP to something outside the
//! process; everything it returns is already mapped into this
//! workspace's own types.

mod client;
mod config;
mod error;
mod types;

pub use client::BillingAdapter;
pub use config::BillingAdapterConfig;
pub use error::BillingAdapterError;
pub use types::{
    ProrationPolicy, ProviderCustomer, ProviderSubscription, ProviderUsageRecord,
    ReportUsageRequest, UsageAction,
};

use std::collections::HashMap;

use crate::error::BillingAdapterError;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

/// Environment-supplied, startup-validated configuration for the
/// outbound billing provider adapter.
#[derive(Debug, Clone)]
pub struct BillingAdapterConfig {
    pub secret_key: String,
    pub publishable_key: String,
    pub webhook_secret: String,
    pub is_test_mode: bool,
    pub default_currency: String,
    pub price_ids: HashMap<String, String>,
    pub base_url: String,
}

impl BillingAdapterConfig {
    pub fn new(
        secret_key: impl Into<String>,
        publishable_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        is_test_mode: bool,
        default_currency: impl Into<String>,
        price_ids: HashMap<String, String>,
    ) -> Result<Self, BillingAdapterError> {
        let config = Self {
            secret_key: secret_key.into(),
            publishable_key: publishable_key.into(),
            webhook_secret: webhook_secret.into(),
            is_test_mode,
            default_currency: default_currency.into(),
            price_ids,
            base_url: DEFAULT_BASE_URL.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Reads `BILLING_SECRET_KEY`, `BILLING_PUBLISHABLE_KEY`,
    /// `BILLING_WEBHOOK_SECRET`, `BILLING_DEFAULT_CURRENCY` and
    /// `BILLING_PRICE_IDS` (a `plan=price_id,plan=price_id` list) from
    /// the environment, fails fast on anything missing or malformed.
    pub fn from_env() -> Result<Self, BillingAdapterError> {
        let secret_key = require_env("BILLING_SECRET_KEY")?;
        let publishable_key = require_env("BILLING_PUBLISHABLE_KEY")?;
        let webhook_secret = require_env("BILLING_WEBHOOK_SECRET")?;
        let default_currency = require_env("BILLING_DEFAULT_CURRENCY")?;
        let is_test_mode = secret_key.starts_with("sk_test_");

        let price_ids = std::env::var("BILLING_PRICE_IDS")
            .unwrap_or_default()
            .split(',')
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (plan, price_id) = entry.split_once('=').ok_or_else(|| {
                    BillingAdapterError::Config(format!("malformed BILLING_PRICE_IDS entry: {entry}"))
                })?;
                Ok((plan.to_string(), price_id.to_string()))
            })
            .collect::<Result<HashMap<_, _>, BillingAdapterError>>()?;

        Self::new(secret_key, publishable_key, webhook_secret, is_test_mode, default_currency, price_ids)
    }

    fn validate(&self) -> Result<(), BillingAdapterError> {
        if self.secret_key.is_empty() {
            return Err(BillingAdapterError::Config("secret_key must not be empty".to_string()));
        }
        let expected_prefix = if self.is_test_mode { "sk_test_" } else { "sk_live_" };
        if !self.secret_key.starts_with(expected_prefix) {
            return Err(BillingAdapterError::Config(format!(
                "secret_key does not match is_test_mode={}: expected prefix {expected_prefix}",
                self.is_test_mode
            )));
        }
        if self.webhook_secret.is_empty() {
            return Err(BillingAdapterError::Config("webhook_secret must not be empty".to_string()));
        }
        if self.default_currency.is_empty() || self.default_currency != self.default_currency.to_lowercase() {
            return Err(BillingAdapterError::Config(
                "default_currency must be a non-empty lowercase ISO code".to_string(),
            ));
        }
        for (plan, price_id) in &self.price_ids {
            if price_id.is_empty() && plan != "free" {
                return Err(BillingAdapterError::Config(format!(
                    "price id for plan '{plan}' is empty; only the free plan may omit one"
                )));
            }
        }
        Ok(())
    }

    pub fn price_id_for_plan(&self, plan_id: &str) -> Option<&str> {
        self.price_ids.get(plan_id).map(String::as_str)
    }
}

fn require_env(key: &str) -> Result<String, BillingAdapterError> {
    std::env::var(key).map_err(|_| BillingAdapterError::Config(format!("missing required env var {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_key_prefix() {
        let err = BillingAdapterConfig::new(
            "sk_live_abc",
            "pk_test_abc",
            "whsec_abc",
            true,
            "usd",
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingAdapterError::Config(_)));
    }

    #[test]
    fn rejects_uppercase_currency() {
        let err = BillingAdapterConfig::new(
            "sk_test_abc",
            "pk_test_abc",
            "whsec_abc",
            true,
            "USD",
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BillingAdapterError::Config(_)));
    }

    #[test]
    fn allows_empty_price_id_only_for_free_plan() {
        let mut price_ids = HashMap::new();
        price_ids.insert("free".to_string(), String::new());
        let config = BillingAdapterConfig::new(
            "sk_test_abc",
            "pk_test_abc",
            "whsec_abc",
            true,
            "usd",
            price_ids,
        );
        assert!(config.is_ok());

        let mut bad_price_ids = HashMap::new();
        bad_price_ids.insert("pro".to_string(), String::new());
        let err = BillingAdapterConfig::new(
            "sk_test_abc",
            "pk_test_abc",
            "whsec_abc",
            true,
            "usd",
            bad_price_ids,
        )
        .unwrap_err();
        assert!(matches!(err, BillingAdapterError::Config(_)));
    }
}

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde_json::json;

use usagemeter_domain_models::SubscriptionStatus;

use crate::config::BillingAdapterConfig;
use crate::error::BillingAdapterError;
use crate::types::{
    ProrationPolicy, ProviderCustomer, ProviderSubscription, ProviderUsageRecord, ReportUsageRequest,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outbound port to the external billing provider: customer CRUD,
/// subscription lifecycle, usage submission. Holds one long-lived
/// `reqwest::Client` (connection pooling, default auth header) rather
/// than building a client per call.
pub struct BillingAdapter {
    http: reqwest::Client,
    config: BillingAdapterConfig,
}

impl BillingAdapter {
    pub fn new(config: BillingAdapterConfig) -> Result<Self, BillingAdapterError> {
        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", config.secret_key))
            .map_err(|e| BillingAdapterError::Config(format!("secret_key is not a valid header value: {e}")))?;
        headers.insert(AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillingAdapterError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    pub async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<ProviderCustomer, BillingAdapterError> {
        let body = json!({ "email": email, "name": name });
        let resp = self.http.post(self.url("/customers")).json(&body).send().await.map_err(transport)?;
        handle_response(resp).await
    }

    pub async fn get_customer(&self, customer_id: &str) -> Result<ProviderCustomer, BillingAdapterError> {
        let resp = self
            .http
            .get(self.url(&format!("/customers/{customer_id}")))
            .send()
            .await
            .map_err(transport)?;
        handle_response(resp).await
    }

    pub async fn update_customer(
        &self,
        customer_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<ProviderCustomer, BillingAdapterError> {
        let body = json!({ "email": email, "name": name });
        let resp = self
            .http
            .post(self.url(&format!("/customers/{customer_id}")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        handle_response(resp).await
    }

    pub async fn delete_customer(&self, customer_id: &str) -> Result<(), BillingAdapterError> {
        let resp = self
            .http
            .delete(self.url(&format!("/customers/{customer_id}")))
            .send()
            .await
            .map_err(transport)?;
        handle_response::<serde_json::Value>(resp).await.map(|_| ())
    }

    /// A `"free"` plan with no configured price id creates no remote
    /// subscription.
    pub async fn create_subscription(
        &self,
        customer_id: &str,
        plan_id: &str,
        trial_days: u32,
    ) -> Result<ProviderSubscription, BillingAdapterError> {
        let price_id = self.config.price_id_for_plan(plan_id).unwrap_or_default();
        if plan_id == "free" && price_id.is_empty() {
            let now = Utc::now();
            return Ok(ProviderSubscription {
                subscription_id: String::new(),
                subscription_item_id: String::new(),
                status: SubscriptionStatus::Active,
                current_period_start: now,
                current_period_end: now + chrono::Duration::days(36_500),
                latest_invoice_client_secret: None,
            });
        }

        let mut body = json!({
            "customer": customer_id,
            "items": [{ "price": price_id }],
            "payment_behavior": "default_incomplete",
            "expand": ["latest_invoice.payment_intent"],
        });
        if trial_days > 0 {
            body["trial_period_days"] = json!(trial_days);
        }

        let resp = self.http.post(self.url("/subscriptions")).json(&body).send().await.map_err(transport)?;
        handle_response(resp).await
    }

    /// Fetches the current remote subscription to find the single-item
    /// id and previous price, then submits the new price with a
    /// proration policy.
    pub async fn update_subscription(
        &self,
        subscription_id: &str,
        new_plan_id: &str,
        proration: ProrationPolicy,
    ) -> Result<ProviderSubscription, BillingAdapterError> {
        let current: ProviderSubscription = {
            let resp = self
                .http
                .get(self.url(&format!("/subscriptions/{subscription_id}")))
                .send()
                .await
                .map_err(transport)?;
            handle_response(resp).await?
        };

        let new_price_id = self
            .config
            .price_id_for_plan(new_plan_id)
            .ok_or_else(|| BillingAdapterError::Provider {
                status: 400,
                message: format!("no price configured for plan {new_plan_id}"),
            })?;

        let body = json!({
            "items": [{
                "id": current.subscription_item_id,
                "price": new_price_id,
            }],
            "proration_behavior": proration.as_provider_str(),
        });

        let resp = self
            .http
            .post(self.url(&format!("/subscriptions/{subscription_id}")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        handle_response(resp).await
    }

    /// Branches on `cancel_at_period_end`: a delayed cancellation
    /// updates the flag, an immediate one deletes the subscription.
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Result<ProviderSubscription, BillingAdapterError> {
        if cancel_at_period_end {
            let body = json!({ "cancel_at_period_end": true });
            let resp = self
                .http
                .post(self.url(&format!("/subscriptions/{subscription_id}")))
                .json(&body)
                .send()
                .await
                .map_err(transport)?;
            handle_response(resp).await
        } else {
            let resp = self
                .http
                .delete(self.url(&format!("/subscriptions/{subscription_id}")))
                .send()
                .await
                .map_err(transport)?;
            handle_response(resp).await
        }
    }

    pub async fn resume_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingAdapterError> {
        let body = json!({ "cancel_at_period_end": false });
        let resp = self
            .http
            .post(self.url(&format!("/subscriptions/{subscription_id}")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        handle_response(resp).await
    }

    pub async fn get_subscription_status(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingAdapterError> {
        let resp = self
            .http
            .get(self.url(&format!("/subscriptions/{subscription_id}")))
            .send()
            .await
            .map_err(transport)?;
        handle_response(resp).await
    }

    pub async fn list_subscriptions(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ProviderSubscription>, BillingAdapterError> {
        let resp = self
            .http
            .get(self.url("/subscriptions"))
            .query(&[("customer", customer_id)])
            .send()
            .await
            .map_err(transport)?;
        handle_response(resp).await
    }

    /// Validates `subscription_item_id` non-empty and `quantity >= 0`;
    /// defaults `action = Increment`; passes the caller's idempotency
    /// key through unmodified.
    pub async fn report_usage(
        &self,
        request: ReportUsageRequest,
    ) -> Result<ProviderUsageRecord, BillingAdapterError> {
        if request.subscription_item_id.is_empty() {
            return Err(BillingAdapterError::Provider {
                status: 400,
                message: "subscription_item_id must not be empty".to_string(),
            });
        }
        if request.quantity < 0 {
            return Err(BillingAdapterError::Provider {
                status: 400,
                message: format!("quantity must be >= 0, got {}", request.quantity),
            });
        }

        let body = json!({
            "quantity": request.quantity,
            "action": request.action.as_provider_str(),
            "timestamp": request.timestamp.timestamp(),
        });

        let resp = self
            .http
            .post(self.url(&format!(
                "/subscription_items/{}/usage_records",
                request.subscription_item_id
            )))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        handle_response(resp).await
    }
}

fn transport(err: reqwest::Error) -> BillingAdapterError {
    BillingAdapterError::Transport(err.to_string())
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BillingAdapterError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after_secs = resp
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(BillingAdapterError::RateLimited { retry_after_secs });
    }
    if status.as_u16() == 404 {
        let message = resp.text().await.unwrap_or_default();
        return Err(BillingAdapterError::NotFound(message));
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(BillingAdapterError::Provider { status: status.as_u16(), message });
    }
    resp.json::<T>().await.map_err(transport)
}

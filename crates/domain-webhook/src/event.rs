use std::collections::HashMap;

use serde::Deserialize;

use crate::error::WebhookError;

/// Envelope shape shared by every provider event: an id, a dotted type
/// string, and the affected object nested under `data.object`. Payload
/// fields the system doesn't consume are left untyped (`serde_json`
/// ignores unknown fields by default).
#[derive(Debug, Deserialize)]
pub struct RawWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: RawWebhookData,
}

#[derive(Debug, Deserialize)]
pub struct RawWebhookData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_end: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItems {
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItem {
    pub id: String,
}

impl SubscriptionObject {
    pub fn subscription_item_id(&self) -> Option<&str> {
        self.items.as_ref()?.data.first().map(|item| item.id.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct InvoiceObject {
    pub customer: String,
    #[serde(default)]
    pub subscription: Option<String>,
    pub period_end: i64,
}

/// What the event actually is, after the generic envelope has been
/// matched on `event_type` and its `data.object` re-deserialized into
/// the shape that handler expects.
#[derive(Debug)]
pub enum DecodedEvent {
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaid(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    /// An event type the reconciler doesn't (yet) act on. Not an error —
    /// acknowledging unknown event types is what keeps the provider
    /// from endlessly retrying delivery of something this system will
    /// never choose to handle.
    Unhandled(String),
}

pub fn parse_envelope(payload: &[u8]) -> Result<RawWebhookEvent, WebhookError> {
    serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
}

pub fn interpret(raw: &RawWebhookEvent) -> Result<DecodedEvent, WebhookError> {
    let decode_subscription = || {
        serde_json::from_value::<SubscriptionObject>(raw.data.object.clone())
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    };
    let decode_invoice = || {
        serde_json::from_value::<InvoiceObject>(raw.data.object.clone())
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    };

    match raw.event_type.as_str() {
        "subscription.created" => Ok(DecodedEvent::SubscriptionCreated(decode_subscription()?)),
        "subscription.updated" => Ok(DecodedEvent::SubscriptionUpdated(decode_subscription()?)),
        "subscription.deleted" => Ok(DecodedEvent::SubscriptionDeleted(decode_subscription()?)),
        "invoice.paid" => Ok(DecodedEvent::InvoicePaid(decode_invoice()?)),
        "invoice.payment_failed" => Ok(DecodedEvent::InvoicePaymentFailed(decode_invoice()?)),
        other => Ok(DecodedEvent::Unhandled(other.to_string())),
    }
}

#[cfg(test)]
pub fn decode(payload: &[u8]) -> Result<DecodedEvent, WebhookError> {
    let raw = parse_envelope(payload)?;
    interpret(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_subscription_created_with_item_id() {
        let payload = br#"{
            "id": "evt_1",
            "type": "subscription.created",
            "data": {
                "object": {
                    "id": "sub_1",
                    "customer": "cus_1",
                    "status": "active",
                    "current_period_end": 1700000000,
                    "metadata": {"plan_id": "pro"},
                    "items": {"data": [{"id": "si_1"}]}
                }
            }
        }"#;
        match decode(payload).unwrap() {
            DecodedEvent::SubscriptionCreated(sub) => {
                assert_eq!(sub.subscription_item_id(), Some("si_1"));
                assert_eq!(sub.metadata.get("plan_id").map(String::as_str), Some("pro"));
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_decodes_as_unhandled() {
        let payload = br#"{"id":"evt_2","type":"charge.refunded","data":{"object":{}}}"#;
        match decode(payload).unwrap() {
            DecodedEvent::Unhandled(kind) => assert_eq!(kind, "charge.refunded"),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, WebhookError::MalformedPayload(_)));
    }
}

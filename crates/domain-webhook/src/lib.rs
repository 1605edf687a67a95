//! Verifies and reconciles inbound billing-provider webhooks against
//! tenant state. Depends only on the repository contracts, never on a
//! concrete persistence implementation.

mod error;
mod event;
mod reconciler;
mod signature;

pub use error::WebhookError;
pub use event::{DecodedEvent, InvoiceObject, RawWebhookEvent, SubscriptionObject};
pub use reconciler::{WebhookAction, WebhookOutcome, WebhookReconciler};

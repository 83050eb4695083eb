//! Notification dispatch
//!
//! Delivery (push / SMS / email) is an external collaborator. The lifecycle
//! manager hands every successful transition to a [`Notifier`]; the default
//! sink writes a structured log line that the delivery pipeline tails.
//! Dispatch is fire-and-forget: a failing sink never fails the transition.

use async_trait::async_trait;
use shared::order::OrderStatus;
use std::sync::Arc;

/// One status-change notification for the shopper (or shop)
#[derive(Debug, Clone)]
pub struct StatusNotification {
    pub order_id: i64,
    pub shop_id: i64,
    pub shopper_id: i64,
    pub status: OrderStatus,
    pub message: String,
}

impl StatusNotification {
    pub fn new(order: &shared::models::Order, message: impl Into<String>) -> Self {
        Self {
            order_id: order.id,
            shop_id: order.shop_id,
            shopper_id: order.shopper_id,
            status: order.status,
            message: message.into(),
        }
    }
}

/// Sink for outbound notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, note: StatusNotification);
}

/// Default sink: structured log lines under the `notify` target
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, note: StatusNotification) {
        tracing::info!(
            target: "notify",
            order_id = note.order_id,
            shop_id = note.shop_id,
            shopper_id = note.shopper_id,
            status = %note.status,
            "{}",
            note.message
        );
    }
}

/// Shared handle used across services
pub type NotifierHandle = Arc<dyn Notifier>;

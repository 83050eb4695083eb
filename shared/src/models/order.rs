//! Order Models

use crate::order::{OrderLineInput, OrderStatus, PricingKind};
use serde::{Deserialize, Serialize};

/// Order row
///
/// `total_cents` always equals the sum of `line_total_cents` over the lines
/// currently marked available; both are only rewritten inside the same
/// transaction. Status timestamps are stamped by the transition that sets the
/// corresponding status and never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub shop_id: i64,
    pub shopper_id: i64,
    /// Raw daily sequence value
    pub display_seq: i64,
    /// Human-facing per-shop-per-day number (`#007`)
    pub display_number: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub commission_cents: i64,
    pub denial_reason: Option<String>,
    /// Generated once at acceptance, immutable afterwards
    pub pickup_token: Option<String>,
    pub rating_score: Option<i64>,
    pub rating_comment: Option<String>,
    pub estimated_ready_at: Option<i64>,
    /// Deadline after which the pending order is swept to AUTO_CANCELLED
    pub expires_at: i64,
    pub created_at: i64,
    pub accepted_at: Option<i64>,
    pub ready_at: Option<i64>,
    pub picked_up_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub updated_at: i64,
}

/// Order line row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    /// Product name snapshot at order time
    pub name: String,
    pub pricing_kind: PricingKind,
    pub quantity: i64,
    pub weight_grams: Option<i64>,
    /// Cents per unit / per kilogram, snapshot at order time
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub available: bool,
}

/// Order creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreate {
    pub shop_id: i64,
    pub lines: Vec<OrderLineInput>,
}

/// Full order with its lines, as returned by the query endpoints
///
/// The pickup token is ownership-filtered: only the shopper (who presents it
/// at the counter) and platform admins see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderDetail {
    /// Strip the pickup token for callers who must not see it
    pub fn without_token(mut self) -> Self {
        self.order.pickup_token = None;
        self
    }
}

/// Compact order row for staff list views
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderSummary {
    pub id: i64,
    pub display_number: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub estimated_ready_at: Option<i64>,
    pub created_at: i64,
}

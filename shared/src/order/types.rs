//! Shared request types for order operations

use serde::{Deserialize, Serialize};

/// How a product is priced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingKind {
    /// Fixed price per unit
    #[default]
    Unit,
    /// Priced per kilogram, ordered by weight in grams
    Weight,
}

/// One requested line of a new order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub product_id: i64,
    /// Number of units (unit-priced) or number of weighed packs (weight-priced)
    pub quantity: i64,
    /// Ordered weight per pack in grams; required for weight-priced products
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_grams: Option<i64>,
    /// Cart hold backing this line; the line takes the offer price and the
    /// hold is consumed when the order is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_id: Option<i64>,
}

/// Shopper's answer to a partial denial
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialResponse {
    /// Keep the order with the remaining available lines
    Continue,
    /// Give up the whole order
    CancelOrder,
}

/// Shopper's answer to a weight adjustment above the approval threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightReviewResponse {
    /// Accept the adjusted weights and totals
    Approve,
    /// Give up the whole order
    CancelOrder,
}

/// Actual weight recorded for one order line during preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightEntry {
    pub line_id: i64,
    pub weight_grams: i64,
}

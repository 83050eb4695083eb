//! Offer and Hold Models
//!
//! 限时特价：数量有限，购物车内短时锁定

use serde::{Deserialize, Serialize};

/// Time-boxed, limited-quantity discounted offer
///
/// Invariant: `0 <= reserved_in_cart <= remaining_qty <= total_qty`.
/// `reserved_in_cart` tracks quantity currently locked by live holds; it is
/// only ever mutated through the conditional-update reserve/release paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Offer {
    pub id: i64,
    pub shop_id: i64,
    pub product_id: i64,
    pub price_cents: i64,
    pub total_qty: i64,
    pub remaining_qty: i64,
    pub reserved_in_cart: i64,
    pub starts_at: i64,
    pub expires_at: i64,
    pub created_at: i64,
}

impl Offer {
    /// Quantity a new hold could still claim
    pub fn available_qty(&self) -> i64 {
        (self.remaining_qty - self.reserved_in_cart).max(0)
    }
}

/// Ephemeral cart reservation against an offer
///
/// Either consumed into an order line (offer quantity permanently
/// decremented) or released by expiry sweep / explicit cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OfferHold {
    pub id: i64,
    pub offer_id: i64,
    pub quantity: i64,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Offer creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferCreate {
    pub product_id: i64,
    pub price_cents: i64,
    pub total_qty: i64,
    pub starts_at: i64,
    pub expires_at: i64,
}

/// Hold request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub quantity: i64,
}

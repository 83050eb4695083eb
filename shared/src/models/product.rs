//! Product Model

use crate::order::PricingKind;
use serde::{Deserialize, Serialize};

/// Snooze kind — why/how long a product is off the shelf
///
/// `in_stock` is false whenever the kind is not `NONE`. The reconciliation
/// sweep only ever releases `PRESET` and `CUSTOM` snoozes whose end time has
/// passed; `INDEFINITE` stays until staff lift it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnoozeKind {
    #[default]
    None,
    /// One of the fixed preset durations (30m / 1h / 2h / rest of day)
    Preset,
    /// Staff-chosen end time
    Custom,
    /// Until staff lift it
    Indefinite,
}

/// Product entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub pricing_kind: PricingKind,
    /// Cents per unit, or cents per kilogram for weight-priced products
    pub price_cents: i64,
    pub in_stock: bool,
    pub snooze_kind: SnoozeKind,
    pub snooze_started_at: Option<i64>,
    /// End of the snooze window; NULL for `INDEFINITE`
    pub snooze_until: Option<i64>,
    pub snooze_reason: Option<String>,
    /// Promotional price while the promotion is live
    pub promo_price_cents: Option<i64>,
    pub promo_ends_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Product {
    /// Effective price: the promotion wins while it is live
    pub fn effective_price_cents(&self, now: i64) -> i64 {
        match (self.promo_price_cents, self.promo_ends_at) {
            (Some(promo), Some(ends_at)) if ends_at > now => promo,
            _ => self.price_cents,
        }
    }
}

/// Snooze request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnoozeRequest {
    pub kind: SnoozeKind,
    /// Duration for `PRESET` snoozes
    pub minutes: Option<i64>,
    /// Absolute end for `CUSTOM` snoozes (millis)
    pub until: Option<i64>,
    pub reason: Option<String>,
}

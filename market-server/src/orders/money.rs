//! 金额计算
//!
//! All money is integer cents; weight-priced lines round once at the line
//! level so repeated recomputation is stable.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use shared::error::{AppError, AppResult};
use shared::order::PricingKind;

/// Line total in cents.
///
/// Unit pricing: `unit_price * quantity`.
/// Weight pricing: `round(weight_grams / 1000 * price_per_kg) * quantity`,
/// rounded half-up at the single-pack level.
pub fn line_total_cents(
    kind: PricingKind,
    unit_price_cents: i64,
    quantity: i64,
    weight_grams: Option<i64>,
) -> AppResult<i64> {
    if quantity <= 0 {
        return Err(AppError::validation("Quantity must be positive"));
    }
    match kind {
        PricingKind::Unit => Ok(unit_price_cents * quantity),
        PricingKind::Weight => {
            let grams = weight_grams
                .ok_or_else(|| AppError::validation("Weight is required for weight-priced lines"))?;
            if grams <= 0 {
                return Err(AppError::validation("Weight must be positive"));
            }
            Ok(per_pack_weight_cents(grams, unit_price_cents) * quantity)
        }
    }
}

/// One weighed pack: `round(grams / 1000 * cents_per_kg)`, half-up
pub fn per_pack_weight_cents(grams: i64, price_per_kg_cents: i64) -> i64 {
    (grams * price_per_kg_cents + 500) / 1000
}

/// Platform commission, rounded half-up
pub fn commission_cents(total_cents: i64, rate_bps: i64) -> i64 {
    (total_cents * rate_bps + 5_000) / 10_000
}

/// Incremental running mean for shop ratings, 2 decimal places
pub fn next_rating_avg(old_avg: f64, old_count: i64, score: i64) -> f64 {
    let old_avg = Decimal::from_f64_retain(old_avg).unwrap_or_default();
    let next = (old_avg * Decimal::from(old_count) + Decimal::from(score))
        / Decimal::from(old_count + 1);
    next.round_dp(2).to_f64().unwrap_or(0.0)
}

/// Whether an actual weight deviates from the ordered weight by more than
/// `threshold_pct` percent (the weight-review gate)
pub fn weight_deviation_exceeds(ordered_grams: i64, actual_grams: i64, threshold_pct: i64) -> bool {
    if ordered_grams <= 0 {
        return false;
    }
    (actual_grams - ordered_grams).abs() * 100 > ordered_grams * threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_line_total() {
        let total = line_total_cents(PricingKind::Unit, 450, 3, None).unwrap();
        assert_eq!(total, 1350);
    }

    #[test]
    fn test_unit_rejects_zero_quantity() {
        assert!(line_total_cents(PricingKind::Unit, 450, 0, None).is_err());
        assert!(line_total_cents(PricingKind::Unit, 450, -1, None).is_err());
    }

    #[test]
    fn test_weight_line_total() {
        // 250 g at 12.80 €/kg -> 320 cents per pack
        let total = line_total_cents(PricingKind::Weight, 1280, 1, Some(250)).unwrap();
        assert_eq!(total, 320);
        // two packs
        let total = line_total_cents(PricingKind::Weight, 1280, 2, Some(250)).unwrap();
        assert_eq!(total, 640);
    }

    #[test]
    fn test_weight_rounding_half_up() {
        // 125 g at 9.99 €/kg = 124.875 cents -> 125
        assert_eq!(per_pack_weight_cents(125, 999), 125);
        // 333 g at 2.99 €/kg = 99.567 cents -> 100
        assert_eq!(per_pack_weight_cents(333, 299), 100);
        // 100 g at 1.00 €/kg = 10 cents exactly
        assert_eq!(per_pack_weight_cents(100, 100), 10);
    }

    #[test]
    fn test_weight_requires_weight() {
        assert!(line_total_cents(PricingKind::Weight, 1280, 1, None).is_err());
        assert!(line_total_cents(PricingKind::Weight, 1280, 1, Some(0)).is_err());
    }

    #[test]
    fn test_commission_rounding() {
        // 10% of 4200 = 420
        assert_eq!(commission_cents(4200, 1000), 420);
        // 12.5% of 999 = 124.875 -> 125
        assert_eq!(commission_cents(999, 1250), 125);
        assert_eq!(commission_cents(0, 1000), 0);
    }

    #[test]
    fn test_next_rating_avg() {
        // first rating
        assert_eq!(next_rating_avg(0.0, 0, 4), 4.0);
        // (4.0 * 1 + 5) / 2 = 4.5
        assert_eq!(next_rating_avg(4.0, 1, 5), 4.5);
        // (4.5 * 2 + 2) / 3 = 3.666... -> 3.67
        assert_eq!(next_rating_avg(4.5, 2, 2), 3.67);
    }

    #[test]
    fn test_weight_deviation_gate() {
        // 10% of 200 g is 20 g: 219 passes, 221 trips
        assert!(!weight_deviation_exceeds(200, 219, 10));
        assert!(!weight_deviation_exceeds(200, 220, 10));
        assert!(weight_deviation_exceeds(200, 221, 10));
        assert!(weight_deviation_exceeds(200, 179, 10));
        assert!(!weight_deviation_exceeds(200, 180, 10));
    }
}

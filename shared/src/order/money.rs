//! Money calculation utilities using rust_decimal for precision
//!
//! All arithmetic is done on `Decimal` internally, then converted to
//! `f64` for storage/serialization. Floats cross the wire; they never
//! accumulate.

use super::model::CartItem;
use rust_decimal::prelude::*;

/// Rounding for monetary values (2 decimal places, half away from zero)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Convert f64 to Decimal (NaN/Infinity collapse to zero)
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64, rounded to 2 decimal places
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

/// Total for a cart: sum of price * quantity per line
pub fn cart_total(items: &[CartItem]) -> f64 {
    let total = items
        .iter()
        .map(|i| to_decimal(i.price) * Decimal::from(i.quantity))
        .sum::<Decimal>();
    to_f64(total)
}

/// Change owed when `given` cash covers `total`; None when it does not
pub fn change_due(total: f64, given: f64) -> Option<f64> {
    let diff = to_decimal(given) - to_decimal(total);
    if diff < Decimal::ZERO {
        return None;
    }
    Some(to_f64(diff))
}

/// Compare two monetary values for equality (within 0.01 tolerance)
pub fn money_eq(a: f64, b: f64) -> bool {
    (to_decimal(a) - to_decimal(b)).abs() <= MONEY_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_total() {
        let items = vec![
            CartItem::new("Veg Atho", 3, 110.0),
            CartItem::new("Water Bottle", 1, 20.0),
        ];
        assert_eq!(cart_total(&items), 350.0);
    }

    #[test]
    fn test_cart_total_empty() {
        assert_eq!(cart_total(&[]), 0.0);
    }

    #[test]
    fn test_cart_total_avoids_float_drift() {
        // 0.1 + 0.2 style accumulation must stay exact
        let items = vec![CartItem::new("Sample", 3, 0.1)];
        assert_eq!(cart_total(&items), 0.3);
    }

    #[test]
    fn test_change_due() {
        assert_eq!(change_due(350.0, 500.0), Some(150.0));
        assert_eq!(change_due(350.0, 350.0), Some(0.0));
        assert_eq!(change_due(350.0, 300.0), None);
    }

    #[test]
    fn test_money_eq() {
        assert!(money_eq(100.0, 100.0));
        assert!(money_eq(100.0, 100.005));
        assert!(!money_eq(100.0, 100.02));
    }

    #[test]
    fn test_non_finite_collapses_to_zero() {
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
        assert_eq!(to_decimal(f64::INFINITY), Decimal::ZERO);
    }
}

// In crates/risk/src/tolerance.rs

//! Comparison tolerances, chosen per quantity rather than one shared constant.
//! Decimal arithmetic is exact, so these only absorb noise from values that were
//! derived from floats upstream (engine output, percent conversions).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// USD amounts: position sizes, notional and open-interest values.
pub const USD_EPSILON: Decimal = dec!(0.000001);

/// Prices compared against each other (entry vs stop vs target).
pub const PRICE_EPSILON: Decimal = dec!(0.000000001);

/// Dimensionless ratios and percentages.
pub const RATIO_EPSILON: Decimal = dec!(0.000000001);

pub fn strictly_greater(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    a - b > epsilon
}

pub fn at_least(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    a + epsilon >= b
}

pub fn exceeds(a: Decimal, cap: Decimal, epsilon: Decimal) -> bool {
    a > cap + epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values_are_tolerated() {
        assert!(at_least(dec!(1.9999999999), dec!(2), RATIO_EPSILON));
        assert!(!at_least(dec!(1.99), dec!(2), RATIO_EPSILON));
        assert!(!exceeds(dec!(5000.0000001), dec!(5000), USD_EPSILON));
        assert!(exceeds(dec!(5000.01), dec!(5000), USD_EPSILON));
        assert!(!strictly_greater(dec!(100), dec!(100), PRICE_EPSILON));
    }
}

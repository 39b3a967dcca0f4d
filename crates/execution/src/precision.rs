// In crates/execution/src/precision.rs

use api_client::ExchangeAdapter;
use core_types::Symbol;
use rust_decimal::Decimal;

/// Decimal places used when the venue cannot format for us.
pub const FALLBACK_DECIMALS: u32 = 8;

pub fn fallback_format(value: Decimal) -> String {
    format!("{:.8}", value.round_dp(FALLBACK_DECIMALS))
}

/// Formats a price with the venue's precision, falling back to a fixed-precision
/// string when the adapter has no formatter or the formatter fails.
pub async fn format_price(exchange: &dyn ExchangeAdapter, symbol: &Symbol, price: Decimal) -> String {
    match exchange.precision() {
        Some(formatter) => match formatter.format_price(symbol, price).await {
            Ok(formatted) => formatted,
            Err(e) => {
                tracing::warn!(%symbol, %price, error = %e, "Venue price formatting failed; using fallback.");
                fallback_format(price)
            }
        },
        None => fallback_format(price),
    }
}

pub async fn format_size(exchange: &dyn ExchangeAdapter, symbol: &Symbol, size: Decimal) -> String {
    match exchange.precision() {
        Some(formatter) => match formatter.format_size(symbol, size).await {
            Ok(formatted) => formatted,
            Err(e) => {
                tracing::warn!(%symbol, %size, error = %e, "Venue size formatting failed; using fallback.");
                fallback_format(size)
            }
        },
        None => fallback_format(size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fallback_pads_and_rounds_to_eight_places() {
        assert_eq!(fallback_format(dec!(1.5)), "1.50000000");
        assert_eq!(fallback_format(dec!(0.123456789)), "0.12345679");
    }
}

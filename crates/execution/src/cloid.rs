// In crates/execution/src/cloid.rs

use chrono::{DateTime, Utc};
use core_types::{Action, Symbol};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Builds the deterministic client order id for a submission.
///
/// The key covers trader, symbol, action, quantity and the UTC minute, so any
/// resubmission of the same order inside that minute carries the same id and the
/// venue can drop the duplicate. Format: `0x` + 32 hex chars (16 bytes of SHA-256).
pub fn client_order_id(
    trader_id: &str,
    symbol: &Symbol,
    action: Action,
    quantity: Decimal,
    now: DateTime<Utc>,
) -> String {
    let raw = format!(
        "{}|{}|{}|{:.6}|{}",
        trader_id,
        symbol.as_str().to_ascii_uppercase(),
        action.as_str(),
        quantity.round_dp(6),
        now.format("%Y%m%dT%H%M"),
    );
    let digest = Sha256::digest(raw.as_bytes());
    format!("0x{}", hex::encode(&digest[..16]))
}

// In crates/strategies/src/types.rs

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MomentumSettings {
    /// Minimum absolute 1h change (in percent) before a candidate is traded.
    pub entry_change_pct: f64,
    /// A held position is closed once the 1h change moves this far against it.
    pub exit_change_pct: f64,
    /// Stop-loss distance as a fraction of entry price.
    pub stop_loss_pct: Decimal,
    /// Take-profit distance as a fraction of entry price.
    pub take_profit_pct: Decimal,
    /// Position size as a fraction of account equity.
    pub position_size_pct: Decimal,
    pub base_confidence: i32,
    pub max_opens_per_cycle: usize,
}

impl Default for MomentumSettings {
    fn default() -> Self {
        Self {
            entry_change_pct: 1.5,
            exit_change_pct: 1.0,
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.05),
            position_size_pct: dec!(0.1),
            base_confidence: 65,
            max_opens_per_cycle: 2,
        }
    }
}

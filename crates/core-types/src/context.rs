// In crates/core-types/src/context.rs

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{AccountState, AssetInfo, MarketSnapshot, Position, Symbol};

/// Account figures as presented to the decision engine and the validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub total_equity: Decimal,
    pub available_balance: Decimal,
    pub margin_used: Decimal,
    pub unrealized_pnl: Decimal,
    /// `margin_used / total_equity * 100`, zero when equity is not positive.
    pub margin_used_pct: Decimal,
    pub position_count: usize,
}

impl AccountSnapshot {
    pub fn from_state(state: &AccountState, position_count: usize) -> Self {
        let margin_used_pct = if state.total_equity > Decimal::ZERO {
            state.margin_used / state.total_equity * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        Self {
            total_equity: state.total_equity,
            available_balance: state.available_balance(),
            margin_used: state.margin_used,
            unrealized_pnl: state.unrealized_pnl,
            margin_used_pct,
            position_count,
        }
    }
}

/// A symbol proposed to the decision engine as worth looking at this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCoin {
    pub symbol: Symbol,
    pub score: f64,
    pub source: String,
}

/// Allowed position size expressed as multiples of account equity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueBand {
    pub min_multiple: Decimal,
    pub max_multiple: Decimal,
}

/// Resolved guard thresholds. A `None` means the guard is disabled for this cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardThresholds {
    pub max_margin_usage_pct: Option<Decimal>,
    pub liquidity_threshold_usd: Option<Decimal>,
    pub major_value_band: Option<ValueBand>,
    pub altcoin_value_band: Option<ValueBand>,
    pub cooldown_after_close_secs: Option<i64>,
}

impl GuardThresholds {
    pub fn cooldown_after_close(&self) -> Option<TimeDelta> {
        self.cooldown_after_close_secs
            .filter(|secs| *secs > 0)
            .map(TimeDelta::seconds)
    }

    pub fn value_band_for(&self, symbol: &Symbol) -> Option<ValueBand> {
        if symbol.is_major() {
            self.major_value_band
        } else {
            self.altcoin_value_band
        }
    }
}

/// Read-only performance feedback handed to the decision engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceView {
    /// `None` until enough equity samples exist.
    pub sharpe_ratio: Option<f64>,
    pub success_ratio: f64,
    pub total_actions: u64,
    pub max_drawdown_pct: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything a decision engine and the validator see for one cycle.
/// Built fresh every cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub trader_id: String,
    pub generated_at: DateTime<Utc>,
    pub account: AccountSnapshot,
    pub positions: Vec<Position>,
    pub candidates: Vec<CandidateCoin>,
    pub market: BTreeMap<Symbol, MarketSnapshot>,
    pub asset_meta: BTreeMap<Symbol, AssetInfo>,
    pub guards: GuardThresholds,
    /// Last close time per symbol, used for the cooldown guard.
    pub recently_closed: BTreeMap<Symbol, DateTime<Utc>>,
    pub performance: Option<PerformanceView>,
    pub major_coin_leverage: u32,
    pub altcoin_leverage: u32,
}

impl Context {
    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.iter().find(|p| &p.symbol == symbol)
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.position(symbol).is_some()
    }

    pub fn snapshot(&self, symbol: &Symbol) -> Option<&MarketSnapshot> {
        self.market.get(symbol)
    }

    pub fn asset(&self, symbol: &Symbol) -> Option<&AssetInfo> {
        self.asset_meta.get(symbol)
    }

    /// Default leverage for the symbol's asset class.
    pub fn default_leverage(&self, symbol: &Symbol) -> u32 {
        if symbol.is_major() {
            self.major_coin_leverage
        } else {
            self.altcoin_leverage
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn margin_used_pct_from_state() {
        let state = AccountState {
            total_equity: dec!(10000),
            margin_used: dec!(2500),
            unrealized_pnl: dec!(12.5),
        };
        let snapshot = AccountSnapshot::from_state(&state, 2);
        assert_eq!(snapshot.margin_used_pct, dec!(25));
        assert_eq!(snapshot.available_balance, dec!(7500));
    }

    #[test]
    fn zero_cooldown_disables_guard() {
        let guards = GuardThresholds {
            cooldown_after_close_secs: Some(0),
            ..Default::default()
        };
        assert!(guards.cooldown_after_close().is_none());
    }
}

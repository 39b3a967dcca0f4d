// In crates/risk/src/types.rs

use chrono::TimeDelta;
use core_types::{GuardThresholds, Symbol, ValueBand};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Hard per-trader limits. Immutable once the trader is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    pub max_positions: usize,
    pub max_position_size_usd: Decimal,
    /// Cap on margin used as a percentage of equity (0-100].
    pub max_margin_usage_pct: Decimal,
    pub major_coin_leverage: u32,
    pub altcoin_leverage: u32,
    pub min_risk_reward_ratio: Decimal,
    pub min_confidence: i32,
}

impl RiskParameters {
    /// Configured leverage cap for the symbol's asset class.
    pub fn leverage_cap_for(&self, symbol: &Symbol) -> u32 {
        if symbol.is_major() {
            self.major_coin_leverage
        } else {
            self.altcoin_leverage
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_positions == 0 {
            return Err(Error::InvalidParameters("max_positions must be > 0".into()));
        }
        if self.max_position_size_usd <= Decimal::ZERO {
            return Err(Error::InvalidParameters("max_position_size_usd must be > 0".into()));
        }
        if self.max_margin_usage_pct <= Decimal::ZERO || self.max_margin_usage_pct > Decimal::ONE_HUNDRED {
            return Err(Error::InvalidParameters("max_margin_usage_pct must be within (0, 100]".into()));
        }
        if self.major_coin_leverage == 0 || self.altcoin_leverage == 0 {
            return Err(Error::InvalidParameters("leverage caps must be > 0".into()));
        }
        if self.min_risk_reward_ratio <= Decimal::ZERO {
            return Err(Error::InvalidParameters("min_risk_reward_ratio must be > 0".into()));
        }
        if !(0..=100).contains(&self.min_confidence) {
            return Err(Error::InvalidParameters("min_confidence must be within [0, 100]".into()));
        }
        Ok(())
    }
}

/// Optional extended gates. Every guard carries an enable flag that defaults to on;
/// a zero threshold leaves the guard inert even when enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionGuards {
    pub enable_max_new_positions: bool,
    /// Zero means no per-cycle limit beyond the free position slots.
    pub max_new_positions_per_cycle: usize,

    pub enable_liquidity_guard: bool,
    pub liquidity_threshold_usd: Decimal,

    pub enable_margin_guard: bool,
    /// Overrides `RiskParameters::max_margin_usage_pct` when set.
    pub max_margin_usage_pct: Option<Decimal>,

    pub enable_value_band: bool,
    pub major_min_equity_multiple: Decimal,
    pub major_max_equity_multiple: Decimal,
    pub altcoin_min_equity_multiple: Decimal,
    pub altcoin_max_equity_multiple: Decimal,

    pub enable_cooldown: bool,
    pub cooldown_after_close_secs: u64,

    pub enable_sharpe_pause: bool,
    pub sharpe_pause_threshold: Option<f64>,
    pub pause_duration_on_breach_secs: u64,

    pub candidate_limit: usize,
}

impl Default for ExecutionGuards {
    fn default() -> Self {
        Self {
            enable_max_new_positions: true,
            max_new_positions_per_cycle: 0,
            enable_liquidity_guard: true,
            liquidity_threshold_usd: Decimal::ZERO,
            enable_margin_guard: true,
            max_margin_usage_pct: None,
            enable_value_band: true,
            major_min_equity_multiple: Decimal::ZERO,
            major_max_equity_multiple: Decimal::ZERO,
            altcoin_min_equity_multiple: Decimal::ZERO,
            altcoin_max_equity_multiple: Decimal::ZERO,
            enable_cooldown: true,
            cooldown_after_close_secs: 0,
            enable_sharpe_pause: true,
            sharpe_pause_threshold: None,
            pause_duration_on_breach_secs: 0,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }
}

pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

impl ExecutionGuards {
    /// Collapses the enable flags and thresholds into the values the validator reads.
    pub fn thresholds(&self, params: &RiskParameters) -> GuardThresholds {
        let max_margin_usage_pct = self
            .enable_margin_guard
            .then(|| self.max_margin_usage_pct.unwrap_or(params.max_margin_usage_pct))
            .filter(|pct| *pct > Decimal::ZERO);

        let liquidity_threshold_usd = (self.enable_liquidity_guard
            && self.liquidity_threshold_usd > Decimal::ZERO)
            .then_some(self.liquidity_threshold_usd);

        let band = |min: Decimal, max: Decimal| {
            (self.enable_value_band && (min > Decimal::ZERO || max > Decimal::ZERO)).then_some(ValueBand {
                min_multiple: min,
                max_multiple: max,
            })
        };

        let cooldown_after_close_secs = (self.enable_cooldown && self.cooldown_after_close_secs > 0)
            .then(|| i64::try_from(self.cooldown_after_close_secs).unwrap_or(i64::MAX));

        GuardThresholds {
            max_margin_usage_pct,
            liquidity_threshold_usd,
            major_value_band: band(self.major_min_equity_multiple, self.major_max_equity_multiple),
            altcoin_value_band: band(self.altcoin_min_equity_multiple, self.altcoin_max_equity_multiple),
            cooldown_after_close_secs,
        }
    }

    /// Per-cycle limit on new opens, if the guard is active.
    pub fn max_new_positions(&self) -> Option<usize> {
        (self.enable_max_new_positions && self.max_new_positions_per_cycle > 0)
            .then_some(self.max_new_positions_per_cycle)
    }

    /// Threshold and pause length for Sharpe gating, if both are configured.
    pub fn sharpe_gate(&self) -> Option<(f64, TimeDelta)> {
        if !self.enable_sharpe_pause || self.pause_duration_on_breach_secs == 0 {
            return None;
        }
        let threshold = self.sharpe_pause_threshold.filter(|t| *t != 0.0 && t.is_finite())?;
        let secs = i64::try_from(self.pause_duration_on_breach_secs).ok()?;
        Some((threshold, TimeDelta::try_seconds(secs)?))
    }

    pub fn candidate_limit(&self) -> usize {
        if self.candidate_limit == 0 {
            DEFAULT_CANDIDATE_LIMIT
        } else {
            self.candidate_limit
        }
    }

    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("liquidity_threshold_usd", self.liquidity_threshold_usd),
            ("major_min_equity_multiple", self.major_min_equity_multiple),
            ("major_max_equity_multiple", self.major_max_equity_multiple),
            ("altcoin_min_equity_multiple", self.altcoin_min_equity_multiple),
            ("altcoin_max_equity_multiple", self.altcoin_max_equity_multiple),
        ];
        for (name, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(Error::InvalidParameters(format!("{name} must be >= 0")));
            }
        }
        if let Some(pct) = self.max_margin_usage_pct {
            if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                return Err(Error::InvalidParameters(
                    "exec_guards.max_margin_usage_pct must be within [0, 100]".into(),
                ));
            }
        }
        let bands = [
            (self.major_min_equity_multiple, self.major_max_equity_multiple),
            (self.altcoin_min_equity_multiple, self.altcoin_max_equity_multiple),
        ];
        for (min, max) in bands {
            if max > Decimal::ZERO && min > max {
                return Err(Error::InvalidParameters(format!(
                    "value band minimum {min} exceeds maximum {max}"
                )));
            }
        }
        if let Some(threshold) = self.sharpe_pause_threshold {
            if !threshold.is_finite() {
                return Err(Error::InvalidParameters("sharpe_pause_threshold must be finite".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_params() -> RiskParameters {
        RiskParameters {
            max_positions: 3,
            max_position_size_usd: dec!(5000),
            max_margin_usage_pct: dec!(80),
            major_coin_leverage: 10,
            altcoin_leverage: 5,
            min_risk_reward_ratio: dec!(2),
            min_confidence: 60,
        }
    }

    #[test]
    fn guards_default_to_enabled_but_inert() {
        let guards = ExecutionGuards::default();
        let thresholds = guards.thresholds(&make_params());
        assert_eq!(thresholds.max_margin_usage_pct, Some(dec!(80)));
        assert!(thresholds.liquidity_threshold_usd.is_none());
        assert!(thresholds.major_value_band.is_none());
        assert!(thresholds.cooldown_after_close().is_none());
        assert!(guards.max_new_positions().is_none());
        assert!(guards.sharpe_gate().is_none());
        assert_eq!(guards.candidate_limit(), 10);
    }

    #[test]
    fn disabled_flag_turns_guard_off() {
        let guards = ExecutionGuards {
            enable_liquidity_guard: false,
            liquidity_threshold_usd: dec!(1_000_000),
            enable_margin_guard: false,
            ..Default::default()
        };
        let thresholds = guards.thresholds(&make_params());
        assert!(thresholds.liquidity_threshold_usd.is_none());
        assert!(thresholds.max_margin_usage_pct.is_none());
    }

    #[test]
    fn sharpe_gate_requires_threshold_and_duration() {
        let mut guards = ExecutionGuards {
            sharpe_pause_threshold: Some(-0.5),
            ..Default::default()
        };
        assert!(guards.sharpe_gate().is_none());
        guards.pause_duration_on_breach_secs = 600;
        assert_eq!(guards.sharpe_gate(), Some((-0.5, TimeDelta::seconds(600))));
    }

    #[test]
    fn params_validation_catches_bad_values() {
        let mut params = make_params();
        assert!(params.validate().is_ok());
        params.max_margin_usage_pct = dec!(120);
        assert!(matches!(params.validate(), Err(Error::InvalidParameters(_))));
        params = make_params();
        params.min_confidence = 101;
        assert!(params.validate().is_err());
    }

    #[test]
    fn guards_validation_rejects_inverted_band() {
        let guards = ExecutionGuards {
            altcoin_min_equity_multiple: dec!(2),
            altcoin_max_equity_multiple: dec!(1),
            ..Default::default()
        };
        assert!(guards.validate().is_err());
    }
}

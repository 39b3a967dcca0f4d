// In crates/analytics/src/types.rs

use chrono::{DateTime, Utc};
use core_types::PerformanceView;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A struct to hold a point in a trader's equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

/// Running performance figures for one trader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_actions: u64,
    pub successful_actions: u64,
    /// Success ratio over the actions of the most recent cycle.
    pub last_cycle_success_ratio: f64,
    /// Equity change since the first sample in the window.
    pub total_pnl: Decimal,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown_pct: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PerformanceMetrics {
    /// Lifetime success ratio over every executed action.
    pub fn success_ratio(&self) -> f64 {
        if self.total_actions == 0 {
            0.0
        } else {
            self.successful_actions as f64 / self.total_actions as f64
        }
    }

    pub fn to_view(&self) -> PerformanceView {
        PerformanceView {
            sharpe_ratio: self.sharpe_ratio,
            success_ratio: self.success_ratio(),
            total_actions: self.total_actions,
            max_drawdown_pct: self.max_drawdown_pct,
            updated_at: self.updated_at,
        }
    }
}

// In crates/analytics/src/engine.rs

use crate::types::{EquityPoint, PerformanceMetrics};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::collections::VecDeque;

/// Minimum number of period returns before a Sharpe ratio is reported.
const MIN_RETURNS_FOR_SHARPE: usize = 2;

/// Stateless metric calculations over an equity curve.
#[derive(Default)]
pub struct AnalyticsEngine;

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-period Sharpe ratio: mean of period returns over their standard deviation.
    /// Not annualized; the sampling period is the sync interval.
    pub fn sharpe_ratio(&self, equity_curve: &[EquityPoint]) -> Option<f64> {
        let returns: Vec<f64> = equity_curve
            .windows(2)
            .filter(|w| w[0].value > dec!(0))
            .map(|w| (w[1].value / w[0].value - dec!(1)).to_f64().unwrap_or(0.0))
            .collect();
        if returns.len() < MIN_RETURNS_FOR_SHARPE {
            return None;
        }
        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let std_dev = {
            let variance = returns.iter().map(|r| (*r - mean_return).powi(2)).sum::<f64>() / returns.len() as f64;
            variance.sqrt()
        };
        if std_dev > 0.0 {
            Some(mean_return / std_dev)
        } else {
            Some(0.0)
        }
    }

    /// Largest peak-to-trough decline, in percent of the peak.
    pub fn max_drawdown_pct(&self, equity_curve: &[EquityPoint]) -> f64 {
        let mut peak_equity = dec!(0);
        let mut max_drawdown_pct = dec!(0);
        for point in equity_curve {
            peak_equity = peak_equity.max(point.value);
            if peak_equity > dec!(0) {
                let drawdown = (peak_equity - point.value) / peak_equity * dec!(100);
                max_drawdown_pct = max_drawdown_pct.max(drawdown);
            }
        }
        max_drawdown_pct.to_f64().unwrap_or(0.0)
    }
}

/// Rolling window of equity samples plus action counters for one trader.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    window: usize,
    equity_curve: VecDeque<EquityPoint>,
    metrics: PerformanceMetrics,
}

impl PerformanceTracker {
    pub const DEFAULT_WINDOW: usize = 256;

    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            equity_curve: VecDeque::with_capacity(window.max(2)),
            metrics: PerformanceMetrics::default(),
        }
    }

    /// Adds an equity sample and recomputes the curve-based metrics.
    pub fn record_equity(&mut self, timestamp: DateTime<Utc>, value: Decimal) {
        self.equity_curve.push_back(EquityPoint { timestamp, value });
        while self.equity_curve.len() > self.window {
            self.equity_curve.pop_front();
        }

        let curve: Vec<EquityPoint> = self.equity_curve.iter().cloned().collect();
        let engine = AnalyticsEngine::new();
        self.metrics.sharpe_ratio = engine.sharpe_ratio(&curve);
        self.metrics.max_drawdown_pct = engine.max_drawdown_pct(&curve);
        if let (Some(first), Some(last)) = (curve.first(), curve.last()) {
            self.metrics.total_pnl = last.value - first.value;
        }
        self.metrics.updated_at = Some(timestamp);
    }

    /// Folds one cycle's execution results into the counters.
    pub fn record_cycle(&mut self, timestamp: DateTime<Utc>, attempted: usize, succeeded: usize) {
        if attempted == 0 {
            return;
        }
        self.metrics.total_actions += attempted as u64;
        self.metrics.successful_actions += succeeded as u64;
        self.metrics.last_cycle_success_ratio = succeeded as f64 / attempted as f64;
        self.metrics.updated_at = Some(timestamp);
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn equity_curve(&self) -> impl Iterator<Item = &EquityPoint> {
        self.equity_curve.iter()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

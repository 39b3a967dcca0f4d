// In crates/engine/src/trader.rs

use analytics::{PerformanceMetrics, PerformanceTracker};
use api_client::{ExchangeAdapter, MarketCache};
use app_config::TraderConfig;
use chrono::{DateTime, TimeDelta, Utc};
use core_types::{AccountState, PerformanceView, Symbol, TraderState};
use risk::RiskManager;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use strategies::DecisionEngine;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// The trader's slice of the shared capital pool, as of the last position sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceAllocation {
    pub allocation_pct: Decimal,
    pub current_equity_usd: Decimal,
    pub available_balance_usd: Decimal,
    pub margin_used_usd: Decimal,
    pub unrealized_pnl_usd: Decimal,
    pub synced_at: Option<DateTime<Utc>>,
}

/// A point-in-time copy of a trader's mutable state.
#[derive(Debug, Clone, Serialize)]
pub struct TraderStatus {
    pub id: String,
    pub name: String,
    pub state: TraderState,
    pub last_decision_at: Option<DateTime<Utc>>,
    pub pause_until: Option<DateTime<Utc>>,
    pub allocation: ResourceAllocation,
    pub performance: PerformanceMetrics,
    pub cycle_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct TraderRuntime {
    state: TraderState,
    last_decision_at: Option<DateTime<Utc>>,
    pause_until: Option<DateTime<Utc>>,
    cooldowns: BTreeMap<Symbol, DateTime<Utc>>,
    allocation: ResourceAllocation,
    performance: PerformanceTracker,
    cycle_count: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
}

/// One strategy instance: a config bound to an exchange, a market source and a
/// decision engine. Identity and bindings never change after registration; all
/// mutable fields sit behind one lock per trader.
pub struct VirtualTrader {
    id: String,
    name: String,
    config: TraderConfig,
    exchange: Arc<dyn ExchangeAdapter>,
    market: Arc<MarketCache>,
    decision_engine: Arc<dyn DecisionEngine>,
    risk_manager: Arc<dyn RiskManager>,
    decision_interval: TimeDelta,
    runtime: RwLock<TraderRuntime>,
}

impl VirtualTrader {
    pub fn new(
        config: TraderConfig,
        exchange: Arc<dyn ExchangeAdapter>,
        market: Arc<MarketCache>,
        decision_engine: Arc<dyn DecisionEngine>,
        risk_manager: Arc<dyn RiskManager>,
    ) -> Self {
        tracing::info!(trader_id = %config.id, engine = decision_engine.name(), "Creating new virtual trader.");
        let decision_interval =
            TimeDelta::try_seconds(i64::try_from(config.decision_interval_secs).unwrap_or(i64::MAX))
                .unwrap_or(TimeDelta::MAX);
        let allocation = ResourceAllocation {
            allocation_pct: config.allocation_pct,
            ..Default::default()
        };
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            config,
            exchange,
            market,
            decision_engine,
            risk_manager,
            decision_interval,
            runtime: RwLock::new(TraderRuntime {
                state: TraderState::Stopped,
                last_decision_at: None,
                pause_until: None,
                cooldowns: BTreeMap::new(),
                allocation,
                performance: PerformanceTracker::default(),
                cycle_count: 0,
                consecutive_failures: 0,
                last_error: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    pub fn exchange(&self) -> &dyn ExchangeAdapter {
        self.exchange.as_ref()
    }

    pub fn market(&self) -> &MarketCache {
        &self.market
    }

    pub fn decision_engine(&self) -> &dyn DecisionEngine {
        self.decision_engine.as_ref()
    }

    pub fn risk_manager(&self) -> &dyn RiskManager {
        self.risk_manager.as_ref()
    }

    pub async fn state(&self) -> TraderState {
        self.runtime.read().await.state
    }

    /// `Stopped`/`Paused` to `Running`. Refused from `Error`; that needs a stop first.
    /// Returns the state before the call.
    pub async fn start(&self) -> Result<TraderState> {
        let mut runtime = self.runtime.write().await;
        let from = runtime.state;
        match from {
            TraderState::Error => {
                return Err(Error::InvalidTransition {
                    trader_id: self.id.clone(),
                    from,
                    action: "start",
                });
            }
            TraderState::Stopped | TraderState::Paused => {
                runtime.state = TraderState::Running;
                tracing::info!(trader_id = %self.id, %from, "Trader started.");
            }
            TraderState::Running => {}
        }
        Ok(from)
    }

    pub async fn resume(&self) -> Result<TraderState> {
        self.start().await
    }

    /// `Running` to `Paused`; any other state is left alone.
    pub async fn pause(&self) -> TraderState {
        let mut runtime = self.runtime.write().await;
        let from = runtime.state;
        if from == TraderState::Running {
            runtime.state = TraderState::Paused;
            tracing::info!(trader_id = %self.id, "Trader paused.");
        }
        from
    }

    /// Any state to `Stopped`. Also clears the failure streak.
    pub async fn stop(&self) -> TraderState {
        let mut runtime = self.runtime.write().await;
        let from = runtime.state;
        runtime.state = TraderState::Stopped;
        runtime.consecutive_failures = 0;
        runtime.last_error = None;
        if from != TraderState::Stopped {
            tracing::info!(trader_id = %self.id, %from, "Trader stopped.");
        }
        from
    }

    /// Moves the trader to `Error`. It is skipped until an operator stops it.
    pub async fn fail(&self, reason: impl Into<String>) -> TraderState {
        let reason = reason.into();
        let mut runtime = self.runtime.write().await;
        let from = runtime.state;
        runtime.state = TraderState::Error;
        tracing::error!(trader_id = %self.id, %from, %reason, "Trader moved to error state.");
        runtime.last_error = Some(reason);
        from
    }

    /// True when the trader is running, not inside a pause window, and its
    /// decision interval has elapsed (or it never decided).
    pub async fn should_make_decision(&self, now: DateTime<Utc>) -> bool {
        let runtime = self.runtime.read().await;
        if runtime.state != TraderState::Running {
            return false;
        }
        if runtime.pause_until.is_some_and(|until| now < until) {
            return false;
        }
        match runtime.last_decision_at {
            None => true,
            Some(last) => now - last >= self.decision_interval,
        }
    }

    /// Pauses new decisions while the rolling Sharpe ratio sits below the
    /// configured threshold. Returns true when the cycle must be skipped.
    pub async fn apply_sharpe_gate(&self, now: DateTime<Utc>) -> bool {
        let Some((threshold, pause)) = self.config.exec_guards.sharpe_gate() else {
            return false;
        };
        let mut runtime = self.runtime.write().await;
        let Some(sharpe) = runtime.performance.metrics().sharpe_ratio else {
            return false;
        };
        if sharpe >= threshold {
            return false;
        }
        let until = now + pause;
        if runtime.pause_until.is_none_or(|current| current < until) {
            runtime.pause_until = Some(until);
        }
        tracing::warn!(trader_id = %self.id, sharpe, threshold, pause_until = %until, "Sharpe ratio below threshold; pausing decisions.");
        true
    }

    /// Bumps the cycle counter and returns the new cycle number.
    pub async fn begin_cycle(&self) -> u64 {
        let mut runtime = self.runtime.write().await;
        runtime.cycle_count += 1;
        runtime.cycle_count
    }

    pub async fn record_decision(&self, now: DateTime<Utc>) {
        self.runtime.write().await.last_decision_at = Some(now);
    }

    /// Starts the cooldown for `symbol`.
    pub async fn record_close(&self, symbol: &Symbol, now: DateTime<Utc>) {
        self.runtime.write().await.cooldowns.insert(symbol.clone(), now);
    }

    /// Folds one cycle into the counters. A failed cycle extends the failure
    /// streak; once it reaches `max_failures` (non-zero) the trader moves to
    /// `Error`, and the previous state is returned.
    pub async fn finish_cycle(
        &self,
        now: DateTime<Utc>,
        attempted: usize,
        succeeded: usize,
        failure: Option<&str>,
        max_failures: u32,
    ) -> Option<TraderState> {
        let mut runtime = self.runtime.write().await;
        runtime.performance.record_cycle(now, attempted, succeeded);
        let Some(reason) = failure else {
            runtime.consecutive_failures = 0;
            return None;
        };

        runtime.consecutive_failures += 1;
        runtime.last_error = Some(reason.to_string());
        if max_failures == 0 || runtime.consecutive_failures < max_failures || runtime.state == TraderState::Error {
            return None;
        }
        let from = runtime.state;
        runtime.state = TraderState::Error;
        tracing::error!(
            trader_id = %self.id,
            failures = runtime.consecutive_failures,
            %reason,
            "Too many consecutive failed cycles; trader moved to error state."
        );
        Some(from)
    }

    /// Stores freshly synced account figures and appends an equity sample.
    pub async fn apply_sync(&self, account: &AccountState, now: DateTime<Utc>) {
        let mut runtime = self.runtime.write().await;
        runtime.allocation = ResourceAllocation {
            allocation_pct: self.config.allocation_pct,
            current_equity_usd: account.total_equity,
            available_balance_usd: account.available_balance(),
            margin_used_usd: account.margin_used,
            unrealized_pnl_usd: account.unrealized_pnl,
            synced_at: Some(now),
        };
        runtime.performance.record_equity(now, account.total_equity);
    }

    /// Close times still inside the cooldown window. Older entries are dropped.
    pub async fn recent_closes(&self, now: DateTime<Utc>) -> BTreeMap<Symbol, DateTime<Utc>> {
        let window = self
            .config
            .exec_guards
            .thresholds(&self.config.risk_params)
            .cooldown_after_close();
        let mut runtime = self.runtime.write().await;
        if let Some(window) = window {
            runtime.cooldowns.retain(|_, closed_at| now - *closed_at <= window);
        }
        runtime.cooldowns.clone()
    }

    pub async fn performance_view(&self) -> PerformanceView {
        self.runtime.read().await.performance.metrics().to_view()
    }

    pub async fn allocation(&self) -> ResourceAllocation {
        self.runtime.read().await.allocation.clone()
    }

    pub async fn status(&self) -> TraderStatus {
        let runtime = self.runtime.read().await;
        TraderStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            state: runtime.state,
            last_decision_at: runtime.last_decision_at,
            pause_until: runtime.pause_until,
            allocation: runtime.allocation.clone(),
            performance: runtime.performance.metrics().clone(),
            cycle_count: runtime.cycle_count,
            consecutive_failures: runtime.consecutive_failures,
            last_error: runtime.last_error.clone(),
        }
    }
}

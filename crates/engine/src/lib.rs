// In crates/engine/src/lib.rs

pub mod context;
pub mod cycle;
pub mod error;
pub mod reconciler;
pub mod strategy_factory;
pub mod trader;

use api_client::{ExchangeAdapter, MarketCache, MarketDataAdapter};
use app_config::{EngineSettings, TraderConfig};
use chrono::{DateTime, Utc};
use core_types::TraderState;
use events::{AuditSink, EngineEvent};
use execution::Executor;
use risk::GuardedRiskManager;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::time::{MissedTickBehavior, interval};

use crate::cycle::{CycleSettings, run_cycle};
use crate::reconciler::sync_trader_positions;
use crate::strategy_factory::DecisionEngineFactory;
use crate::trader::{TraderStatus, VirtualTrader};

pub use error::{Error, Result};
pub use reconciler::StateReconciler;
pub use strategy_factory::BuiltinEngineFactory;

/// The top-level orchestrator: owns the trader registry and drives every
/// running trader through its decision cycle on a fixed tick.
///
/// Traders are processed one after another within a tick, sorted by id. The
/// registry itself may be read and changed concurrently from other tasks.
pub struct Engine {
    settings: EngineSettings,
    exchanges: HashMap<String, Arc<dyn ExchangeAdapter>>,
    markets: HashMap<String, Arc<MarketCache>>,
    factory: Arc<dyn DecisionEngineFactory>,
    executor: Arc<dyn Executor>,
    sink: Arc<dyn AuditSink>,
    traders: RwLock<BTreeMap<String, Arc<VirtualTrader>>>,
    stop_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        executor: Arc<dyn Executor>,
        factory: Arc<dyn DecisionEngineFactory>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            settings,
            exchanges: HashMap::new(),
            markets: HashMap::new(),
            factory,
            executor,
            sink,
            traders: RwLock::new(BTreeMap::new()),
            stop_tx,
        }
    }

    /// Makes an exchange adapter available to traders under `name`.
    pub fn with_exchange(mut self, name: impl Into<String>, exchange: Arc<dyn ExchangeAdapter>) -> Self {
        self.exchanges.insert(name.into(), exchange);
        self
    }

    /// Makes a market source available under `name`, behind its own cache.
    pub fn with_market(mut self, name: impl Into<String>, market: Arc<dyn MarketDataAdapter>) -> Self {
        self.markets.insert(name.into(), Arc::new(MarketCache::new(market)));
        self
    }

    /// Same as [`Engine::with_market`] with a pre-built cache (custom TTLs).
    pub fn with_market_cache(mut self, name: impl Into<String>, cache: Arc<MarketCache>) -> Self {
        self.markets.insert(name.into(), cache);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            context_timeout: self.settings.context_timeout(),
            decision_timeout: self.settings.decision_timeout(),
            max_consecutive_failures: self.settings.max_consecutive_failures,
        }
    }

    fn emit_transition(&self, trader_id: &str, from: TraderState, to: TraderState) {
        if from != to {
            self.sink.emit(EngineEvent::TraderStateChanged {
                trader_id: trader_id.to_string(),
                from,
                to,
                at: Utc::now(),
            });
        }
    }

    /// Validates `config`, resolves its adapters and decision engine, and adds the
    /// trader. Nothing in the registry changes unless every check passes.
    pub async fn register_trader(&self, config: TraderConfig) -> Result<Arc<VirtualTrader>> {
        config.validate()?;
        if self.traders.read().await.contains_key(&config.id) {
            return Err(Error::DuplicateTrader(config.id));
        }

        let exchange = self
            .exchanges
            .get(&config.exchange_provider)
            .cloned()
            .ok_or_else(|| Error::UnknownExchange(config.exchange_provider.clone()))?;
        let market = self
            .markets
            .get(&config.market_provider)
            .cloned()
            .ok_or_else(|| Error::UnknownMarket(config.market_provider.clone()))?;
        let decision_engine = self.factory.create(&config)?;
        let risk_manager = Arc::new(GuardedRiskManager::new(config.risk_params.clone()));
        let auto_start = config.auto_start;

        let trader = {
            let mut traders = self.traders.write().await;
            if traders.contains_key(&config.id) {
                return Err(Error::DuplicateTrader(config.id));
            }
            let allocated: Decimal = traders.values().map(|t| t.config().allocation_pct).sum();
            let available = self.settings.allocatable_pct() - allocated;
            if config.allocation_pct > available {
                return Err(Error::AllocationExceeded {
                    requested: config.allocation_pct,
                    available,
                });
            }

            let trader = Arc::new(VirtualTrader::new(config, exchange, market, decision_engine, risk_manager));
            traders.insert(trader.id().to_string(), trader.clone());
            trader
        };
        tracing::info!(trader_id = %trader.id(), name = %trader.name(), auto_start, "Trader registered.");

        if auto_start {
            let from = trader.start().await?;
            self.emit_transition(trader.id(), from, TraderState::Running);
        }
        Ok(trader)
    }

    /// Stops the trader (best effort) and removes it from the registry.
    pub async fn unregister_trader(&self, id: &str) -> Result<()> {
        let trader = self.trader(id).await.ok_or_else(|| Error::TraderNotFound(id.to_string()))?;
        let from = trader.stop().await;
        self.emit_transition(id, from, TraderState::Stopped);
        self.traders.write().await.remove(id);
        tracing::info!(trader_id = %id, "Trader unregistered.");
        Ok(())
    }

    pub async fn trader(&self, id: &str) -> Option<Arc<VirtualTrader>> {
        self.traders.read().await.get(id).cloned()
    }

    /// Running traders, sorted by id.
    pub async fn active_traders(&self) -> Vec<Arc<VirtualTrader>> {
        let all: Vec<Arc<VirtualTrader>> = self.traders.read().await.values().cloned().collect();
        let mut active = Vec::with_capacity(all.len());
        for trader in all {
            if trader.state().await == TraderState::Running {
                active.push(trader);
            }
        }
        active
    }

    pub async fn statuses(&self) -> Vec<TraderStatus> {
        let all: Vec<Arc<VirtualTrader>> = self.traders.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(all.len());
        for trader in all {
            statuses.push(trader.status().await);
        }
        statuses
    }

    async fn require(&self, id: &str) -> Result<Arc<VirtualTrader>> {
        self.trader(id).await.ok_or_else(|| Error::TraderNotFound(id.to_string()))
    }

    pub async fn start_trader(&self, id: &str) -> Result<()> {
        let trader = self.require(id).await?;
        let from = trader.start().await?;
        self.emit_transition(id, from, TraderState::Running);
        Ok(())
    }

    pub async fn resume_trader(&self, id: &str) -> Result<()> {
        let trader = self.require(id).await?;
        let from = trader.resume().await?;
        self.emit_transition(id, from, TraderState::Running);
        Ok(())
    }

    pub async fn pause_trader(&self, id: &str) -> Result<()> {
        let trader = self.require(id).await?;
        let from = trader.pause().await;
        if from == TraderState::Running {
            self.emit_transition(id, from, TraderState::Paused);
        }
        Ok(())
    }

    pub async fn stop_trader(&self, id: &str) -> Result<()> {
        let trader = self.require(id).await?;
        let from = trader.stop().await;
        self.emit_transition(id, from, TraderState::Stopped);
        Ok(())
    }

    /// One scheduler tick: every running trader that is due runs one cycle.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let settings = self.cycle_settings();
        for trader in self.active_traders().await {
            if !trader.should_make_decision(now).await {
                continue;
            }
            if trader.apply_sharpe_gate(now).await {
                continue;
            }

            let report = run_cycle(&trader, self.executor.as_ref(), &settings, now).await;
            if let Some(from) = report.entered_error_from {
                self.emit_transition(trader.id(), from, TraderState::Error);
            }
            self.sink.emit(EngineEvent::CycleCompleted(Box::new(report.record)));
        }
    }

    /// Runs the scheduler loop until `cancel` resolves or [`Engine::stop`] is called.
    pub async fn run(&self, cancel: impl Future<Output = ()>) -> Result<()> {
        let mut ticker = interval(self.settings.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::pin!(cancel);

        let trader_count = self.traders.read().await.len();
        tracing::info!(
            tick_ms = self.settings.tick_interval_ms,
            traders = trader_count,
            "Scheduler loop started."
        );
        loop {
            tokio::select! {
                _ = &mut cancel => {
                    tracing::info!("Scheduler cancelled.");
                    break;
                }
                _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => {
                    tracing::info!("Scheduler stopped.");
                    break;
                }
                _ = ticker.tick() => self.tick(Utc::now()).await,
            }
        }
        Ok(())
    }

    /// Asks a running loop to return. Safe to call any number of times.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Syncs every registered trader. Returns how many syncs failed.
    pub async fn sync_all_positions(&self, now: DateTime<Utc>) -> usize {
        let all: Vec<Arc<VirtualTrader>> = self.traders.read().await.values().cloned().collect();
        let mut failed = 0;
        for trader in all {
            if let Err(e) = sync_trader_positions(&trader, now).await {
                failed += 1;
                tracing::warn!(trader_id = %trader.id(), kind = %e.kind(), error = %e, "Position sync failed.");
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trader::tests::{make_config, t0};
    use api_client::InMemoryMarket;
    use events::BroadcastSink;
    use execution::{OrderExecutor, SimulatedExchange};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn make_engine(sink: Arc<BroadcastSink>) -> Engine {
        let settings = EngineSettings {
            reserve_pct: dec!(10),
            tick_interval_ms: 10,
            ..EngineSettings::default()
        };
        Engine::new(
            settings,
            Arc::new(OrderExecutor::default()),
            Arc::new(BuiltinEngineFactory),
            sink,
        )
        .with_exchange("paper", Arc::new(SimulatedExchange::new("paper", Default::default())))
        .with_market("paper", Arc::new(InMemoryMarket::new("paper")))
    }

    #[tokio::test]
    async fn registration_rejects_duplicates_and_unknown_providers() {
        let engine = make_engine(Arc::new(BroadcastSink::new(16)));
        engine.register_trader(make_config("a")).await.expect("register");

        assert!(matches!(
            engine.register_trader(make_config("a")).await,
            Err(Error::DuplicateTrader(_))
        ));

        let mut config = make_config("b");
        config.exchange_provider = "binance".to_string();
        assert!(matches!(engine.register_trader(config).await, Err(Error::UnknownExchange(_))));

        let mut config = make_config("c");
        config.market_provider = "nowhere".to_string();
        assert!(matches!(engine.register_trader(config).await, Err(Error::UnknownMarket(_))));

        let mut config = make_config("d");
        config.decision_engine = "oracle".to_string();
        assert!(matches!(
            engine.register_trader(config).await,
            Err(Error::EngineConstruction(_))
        ));

        let mut config = make_config("e");
        config.risk_params.min_confidence = 101;
        assert!(matches!(engine.register_trader(config).await, Err(Error::InvalidConfig(_))));

        assert_eq!(engine.statuses().await.len(), 1);
    }

    #[tokio::test]
    async fn allocation_total_is_bounded_by_reserve() {
        let engine = make_engine(Arc::new(BroadcastSink::new(16)));
        for id in ["a", "b", "c"] {
            engine.register_trader(make_config(id)).await.expect("register");
        }
        let mut config = make_config("d");
        config.allocation_pct = dec!(20);
        assert!(matches!(
            engine.register_trader(config).await,
            Err(Error::AllocationExceeded { .. })
        ));
        config = make_config("d");
        config.allocation_pct = dec!(15);
        assert!(engine.register_trader(config).await.is_ok());
    }

    #[tokio::test]
    async fn lifecycle_by_id_emits_state_changes() {
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        let engine = make_engine(sink);
        engine.register_trader(make_config("a")).await.expect("register");

        engine.start_trader("a").await.expect("start");
        engine.pause_trader("a").await.expect("pause");
        engine.resume_trader("a").await.expect("resume");
        assert_eq!(engine.active_traders().await.len(), 1);
        engine.stop_trader("a").await.expect("stop");
        assert!(engine.active_traders().await.is_empty());

        let mut transitions = Vec::new();
        while let Ok(EngineEvent::TraderStateChanged { to, .. }) = rx.try_recv() {
            transitions.push(to);
        }
        assert_eq!(
            transitions,
            vec![TraderState::Running, TraderState::Paused, TraderState::Running, TraderState::Stopped]
        );
        assert!(matches!(engine.start_trader("zz").await, Err(Error::TraderNotFound(_))));
    }

    #[tokio::test]
    async fn auto_start_and_unregister() {
        let engine = make_engine(Arc::new(BroadcastSink::new(16)));
        let mut config = make_config("a");
        config.auto_start = true;
        let trader = engine.register_trader(config).await.expect("register");
        assert_eq!(trader.state().await, TraderState::Running);

        engine.unregister_trader("a").await.expect("unregister");
        assert!(engine.trader("a").await.is_none());
        assert_eq!(trader.state().await, TraderState::Stopped);
        assert!(matches!(engine.unregister_trader("a").await, Err(Error::TraderNotFound(_))));
    }

    #[tokio::test]
    async fn active_traders_are_sorted_by_id() {
        let engine = make_engine(Arc::new(BroadcastSink::new(16)));
        for id in ["c", "a", "b"] {
            let mut config = make_config(id);
            config.auto_start = true;
            engine.register_trader(config).await.expect("register");
        }
        let ids: Vec<String> = engine
            .active_traders()
            .await
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stop_ends_run_loop_and_is_idempotent() {
        let engine = Arc::new(make_engine(Arc::new(BroadcastSink::new(16))));
        let runner = engine.clone();
        let handle = tokio::spawn(async move { runner.run(std::future::pending()).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.stop();
        engine.stop();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert!(engine.is_stopped());
    }

    #[tokio::test]
    async fn cancel_signal_ends_run_loop() {
        let engine = make_engine(Arc::new(BroadcastSink::new(16)));
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            engine.run(tokio::time::sleep(Duration::from_millis(20))),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn tick_skips_traders_that_are_not_due() {
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        let engine = make_engine(sink);
        let mut config = make_config("a");
        config.auto_start = true;
        engine.register_trader(config).await.expect("register");
        while rx.try_recv().is_ok() {}

        engine.tick(t0()).await;
        engine.tick(t0() + chrono::TimeDelta::seconds(10)).await;

        let mut cycles = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::CycleCompleted(_)) {
                cycles += 1;
            }
        }
        assert_eq!(cycles, 1);
        assert_eq!(engine.statuses().await[0].cycle_count, 1);
    }
}

// In crates/engine/src/reconciler.rs

use chrono::{DateTime, Utc};
use core_types::{AccountSnapshot, Position};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};

use crate::Engine;
use crate::trader::VirtualTrader;

/// Pulls account and positions from the trader's exchange and stores them as
/// the trader's resource allocation. Each sync also adds an equity sample to the
/// trader's rolling performance window.
pub async fn sync_trader_positions(
    trader: &VirtualTrader,
    now: DateTime<Utc>,
) -> api_client::Result<(AccountSnapshot, Vec<Position>)> {
    let exchange = trader.exchange();
    let account = exchange.account_state().await?;
    let positions = exchange.positions().await?;

    trader.apply_sync(&account, now).await;
    tracing::debug!(
        trader_id = %trader.id(),
        equity = %account.total_equity,
        margin_used = %account.margin_used,
        positions = positions.len(),
        "Trader positions synced."
    );
    Ok((AccountSnapshot::from_state(&account, positions.len()), positions))
}

/// A background task that periodically reconciles every registered trader's
/// state with what its exchange reports, independently of decision cycles.
pub struct StateReconciler {
    engine: Arc<Engine>,
    interval: Duration,
}

impl StateReconciler {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// The main reconciliation loop. Returns once `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("State reconciler shutting down.");
                    return;
                }
                _ = ticker.tick() => {
                    let failed = self.engine.sync_all_positions(Utc::now()).await;
                    if failed > 0 {
                        tracing::warn!(failed, "Some traders failed to reconcile.");
                    }
                }
            }
        }
    }
}

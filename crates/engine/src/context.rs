// In crates/engine/src/context.rs

use api_client::Result;
use chrono::{DateTime, Utc};
use core_types::{AccountSnapshot, CandidateCoin, Context, MarketSnapshot, Symbol};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::trader::VirtualTrader;

/// Upper bound on assets scanned for candidates in one cycle.
pub const MAX_SCANNED_ASSETS: usize = 200;

pub const CANDIDATE_SOURCE: &str = "rank_1h_abs";

/// Ranks snapshots by absolute 1h change, strongest first, ties broken by symbol.
/// Snapshots below the liquidity threshold (or without open interest while a
/// threshold is set) are dropped.
pub fn rank_candidates(
    snapshots: &[MarketSnapshot],
    liquidity_threshold_usd: Option<Decimal>,
    limit: usize,
) -> Vec<CandidateCoin> {
    let mut ranked: Vec<&MarketSnapshot> = snapshots
        .iter()
        .filter(|s| s.change_1h.is_finite() && s.price > Decimal::ZERO)
        .filter(|s| match liquidity_threshold_usd {
            Some(threshold) => s.open_interest_usd().is_some_and(|oi| oi >= threshold),
            None => true,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.change_1h
            .abs()
            .partial_cmp(&a.change_1h.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|s| CandidateCoin {
            symbol: s.symbol.clone(),
            score: s.change_1h.abs(),
            source: CANDIDATE_SOURCE.to_string(),
        })
        .collect()
}

/// Builds the per-cycle `Context` for one trader from its exchange, its market
/// cache and its own runtime state.
pub struct ContextAssembler<'a> {
    trader: &'a VirtualTrader,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(trader: &'a VirtualTrader) -> Self {
        Self { trader }
    }

    pub async fn assemble(&self, now: DateTime<Utc>) -> Result<Context> {
        let trader = self.trader;
        let config = trader.config();
        let exchange = trader.exchange();
        let market = trader.market();

        let account = exchange.account_state().await?;
        let mut positions = exchange.positions().await?;
        let directory = market.assets().await?;

        let guards = config.exec_guards.thresholds(&config.risk_params);
        let held: BTreeSet<Symbol> = positions.iter().map(|p| p.symbol.clone()).collect();

        let mut scanned = Vec::new();
        for asset in directory.iter().filter(|a| a.is_active).take(MAX_SCANNED_ASSETS) {
            match market.snapshot(&asset.symbol).await {
                Ok(snapshot) => scanned.push(snapshot),
                Err(e) => {
                    tracing::debug!(trader_id = %trader.id(), symbol = %asset.symbol, error = %e, "Skipping candidate without snapshot.");
                }
            }
        }
        let candidates = rank_candidates(
            &scanned,
            guards.liquidity_threshold_usd,
            config.exec_guards.candidate_limit(),
        );

        let wanted: BTreeSet<Symbol> = held
            .iter()
            .cloned()
            .chain(candidates.iter().map(|c| c.symbol.clone()))
            .collect();

        let mut snapshots: BTreeMap<Symbol, MarketSnapshot> =
            scanned.into_iter().map(|s| (s.symbol.clone(), s)).collect();
        let mut market_view = BTreeMap::new();
        let mut asset_meta = BTreeMap::new();
        for symbol in &wanted {
            let snapshot = match snapshots.remove(symbol) {
                Some(snapshot) => Some(snapshot),
                None => match market.snapshot(symbol).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        tracing::warn!(trader_id = %trader.id(), %symbol, error = %e, "No market snapshot for held symbol.");
                        None
                    }
                },
            };
            if let Some(snapshot) = snapshot {
                market_view.insert(symbol.clone(), snapshot);
            }
            if let Some(asset) = directory.get(symbol) {
                asset_meta.insert(symbol.clone(), asset.clone());
            }
        }

        for position in &mut positions {
            if let Some(snapshot) = market_view.get(&position.symbol) {
                position.mark_price = snapshot.price;
            }
        }

        Ok(Context {
            trader_id: trader.id().to_string(),
            generated_at: now,
            account: AccountSnapshot::from_state(&account, positions.len()),
            positions,
            candidates,
            market: market_view,
            asset_meta,
            guards,
            recently_closed: trader.recent_closes(now).await,
            performance: Some(trader.performance_view().await),
            major_coin_leverage: config.risk_params.major_coin_leverage,
            altcoin_leverage: config.risk_params.altcoin_leverage,
        })
    }
}

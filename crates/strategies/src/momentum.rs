// In crates/strategies/src/momentum.rs

use crate::types::MomentumSettings;
use crate::{DecisionEngine, Result};
use async_trait::async_trait;
use core_types::{Action, Context, Decision, DecisionBatch, PerformanceView, Position, Side, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

/// A rule-based engine that follows strong one-hour moves.
///
/// Closes positions whose market has turned against them, then opens in the
/// direction of the strongest candidate moves. Needs no external model, so it
/// doubles as the paper-trading engine.
#[derive(Debug)]
pub struct MomentumEngine {
    settings: MomentumSettings,
    performance: RwLock<Option<PerformanceView>>,
}

impl MomentumEngine {
    pub fn new(settings: MomentumSettings) -> Self {
        Self {
            settings,
            performance: RwLock::new(None),
        }
    }

    fn close_decision(&self, position: &Position, change_1h: f64) -> Option<Decision> {
        let exit = self.settings.exit_change_pct;
        let (reversed, action) = match position.side {
            Side::Long => (change_1h <= -exit, Action::CloseLong),
            Side::Short => (change_1h >= exit, Action::CloseShort),
        };
        reversed.then(|| Decision {
            confidence: self.settings.base_confidence,
            reasoning: format!("1h change {change_1h:.2}% reversed against {:?} position", position.side),
            ..Decision::new(position.symbol.clone(), action)
        })
    }

    fn open_decision(&self, context: &Context, symbol: &Symbol, size_scale: Decimal) -> Option<Decision> {
        let snapshot = context.snapshot(symbol)?;
        let change = snapshot.change_1h;
        let entry = self.settings.entry_change_pct;
        if !change.is_finite() || change.abs() < entry || snapshot.price <= Decimal::ZERO {
            return None;
        }

        let price = snapshot.price;
        let (action, stop_loss, take_profit) = if change > 0.0 {
            (
                Action::OpenLong,
                price * (dec!(1) - self.settings.stop_loss_pct),
                price * (dec!(1) + self.settings.take_profit_pct),
            )
        } else {
            (
                Action::OpenShort,
                price * (dec!(1) + self.settings.stop_loss_pct),
                price * (dec!(1) - self.settings.take_profit_pct),
            )
        };

        let mut leverage = context.default_leverage(symbol);
        if let Some(asset) = context.asset(symbol) {
            if asset.max_leverage > 0 {
                leverage = leverage.min(asset.max_leverage);
            }
        }

        let position_size_usd =
            (context.account.total_equity * self.settings.position_size_pct * size_scale).round_dp(2);
        if position_size_usd <= Decimal::ZERO || leverage == 0 {
            return None;
        }

        // Stronger moves earn more confidence, capped below certainty.
        let strength = ((change.abs() / entry - 1.0) * 10.0).round();
        let confidence = (self.settings.base_confidence + strength as i32).clamp(0, 95);

        Some(Decision {
            symbol: symbol.clone(),
            action,
            leverage,
            position_size_usd,
            entry_price: price,
            stop_loss,
            take_profit,
            confidence,
            risk_usd: (position_size_usd * self.settings.stop_loss_pct).round_dp(2),
            reasoning: format!("1h change {change:.2}% exceeds entry threshold {entry:.2}%"),
        })
    }
}

#[async_trait]
impl DecisionEngine for MomentumEngine {
    fn name(&self) -> &'static str {
        "Momentum"
    }

    async fn decide(&self, context: &Context) -> Result<DecisionBatch> {
        let mut decisions = Vec::new();

        for position in &context.positions {
            if let Some(snapshot) = context.snapshot(&position.symbol) {
                decisions.extend(self.close_decision(position, snapshot.change_1h));
            }
        }

        // Trade smaller while risk-adjusted returns are negative.
        let size_scale = match self.performance.read().await.as_ref().and_then(|p| p.sharpe_ratio) {
            Some(sharpe) if sharpe < 0.0 => dec!(0.5),
            _ => dec!(1),
        };

        let mut opens = 0;
        for candidate in &context.candidates {
            if opens >= self.settings.max_opens_per_cycle {
                break;
            }
            if context.has_position(&candidate.symbol) {
                continue;
            }
            if let Some(decision) = self.open_decision(context, &candidate.symbol, size_scale) {
                decisions.push(decision);
                opens += 1;
            }
        }

        let reasoning = if decisions.is_empty() {
            "No momentum setups this cycle.".to_string()
        } else {
            format!("{} momentum decision(s).", decisions.len())
        };
        tracing::debug!(trader_id = %context.trader_id, count = decisions.len(), "Momentum engine decided.");

        Ok(DecisionBatch {
            decisions,
            reasoning,
            prompt_digest: None,
            generated_at: context.generated_at,
        })
    }

    async fn update_performance(&self, view: PerformanceView) {
        *self.performance.write().await = Some(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{AccountSnapshot, CandidateCoin, GuardThresholds, MarketSnapshot};
    use std::collections::BTreeMap;

    fn make_snapshot(symbol: &str, price: Decimal, change_1h: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: Symbol::new(symbol),
            price,
            change_1h,
            change_4h: change_1h,
            indicators: Default::default(),
            open_interest: None,
            funding: None,
        }
    }

    fn make_context(positions: Vec<Position>, snapshots: Vec<MarketSnapshot>) -> Context {
        let candidates = snapshots
            .iter()
            .map(|s| CandidateCoin {
                symbol: s.symbol.clone(),
                score: s.change_1h.abs(),
                source: "test".into(),
            })
            .collect();
        Context {
            trader_id: "momo".into(),
            generated_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).single().expect("valid timestamp"),
            account: AccountSnapshot {
                total_equity: dec!(10000),
                available_balance: dec!(10000),
                ..Default::default()
            },
            positions,
            candidates,
            market: snapshots.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
            asset_meta: BTreeMap::new(),
            guards: GuardThresholds::default(),
            recently_closed: BTreeMap::new(),
            performance: None,
            major_coin_leverage: 10,
            altcoin_leverage: 5,
        }
    }

    #[tokio::test]
    async fn opens_in_direction_of_strong_move() {
        let engine = MomentumEngine::new(MomentumSettings::default());
        let ctx = make_context(
            vec![],
            vec![
                make_snapshot("SOL", dec!(150), 3.0),
                make_snapshot("BTC", dec!(60000), -2.0),
                make_snapshot("DOGE", dec!(0.1), 0.5),
            ],
        );
        let batch = engine.decide(&ctx).await.expect("decide");
        assert_eq!(batch.decisions.len(), 2);

        let sol = &batch.decisions[0];
        assert_eq!(sol.action, Action::OpenLong);
        assert_eq!(sol.leverage, 5);
        assert_eq!(sol.position_size_usd, dec!(1000));
        assert_eq!(sol.stop_loss, dec!(147));
        assert_eq!(sol.take_profit, dec!(157.5));
        assert_eq!(sol.confidence, 75);

        let btc = &batch.decisions[1];
        assert_eq!(btc.action, Action::OpenShort);
        assert_eq!(btc.leverage, 10);
        assert!(btc.stop_loss > btc.entry_price && btc.entry_price > btc.take_profit);
    }

    #[tokio::test]
    async fn closes_reversed_positions_and_skips_held_symbols() {
        let engine = MomentumEngine::new(MomentumSettings::default());
        let held = Position {
            symbol: Symbol::new("SOL"),
            side: Side::Long,
            quantity: dec!(5),
            entry_price: dec!(160),
            mark_price: dec!(150),
            leverage: 5,
            unrealized_pnl: dec!(-50),
            liquidation_price: None,
        };
        let ctx = make_context(vec![held], vec![make_snapshot("SOL", dec!(150), -2.5)]);
        let batch = engine.decide(&ctx).await.expect("decide");
        assert_eq!(batch.decisions.len(), 1);
        assert_eq!(batch.decisions[0].action, Action::CloseLong);
    }

    #[tokio::test]
    async fn negative_sharpe_halves_size() {
        let engine = MomentumEngine::new(MomentumSettings::default());
        engine
            .update_performance(PerformanceView {
                sharpe_ratio: Some(-0.4),
                ..Default::default()
            })
            .await;
        let ctx = make_context(vec![], vec![make_snapshot("SOL", dec!(150), 3.0)]);
        let batch = engine.decide(&ctx).await.expect("decide");
        assert_eq!(batch.decisions[0].position_size_usd, dec!(500));
    }
}

// In crates/risk/src/guarded_manager.rs

use core_types::{Context, Decision, Symbol};
use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::error::Rejection;
use crate::tolerance::{RATIO_EPSILON, exceeds};
use crate::types::RiskParameters;
use crate::validator::validate_decision;
use crate::{Result, RiskManager, Verdict};

/// The production risk manager: the full rule set plus batch-level checks.
#[derive(Debug, Clone)]
pub struct GuardedRiskManager {
    params: RiskParameters,
}

impl GuardedRiskManager {
    pub fn new(params: RiskParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }
}

impl RiskManager for GuardedRiskManager {
    fn name(&self) -> &'static str {
        "GuardedRiskManager"
    }

    fn evaluate(&self, decision: &Decision, context: &Context) -> Result<()> {
        validate_decision(&self.params, context, decision)?;
        Ok(())
    }

    fn evaluate_batch(&self, decisions: Vec<Decision>, context: &Context) -> Verdict {
        let mut verdict = Verdict::default();
        let mut opened: HashSet<Symbol> = HashSet::new();
        let mut pending_margin = Decimal::ZERO;

        for decision in decisions {
            if let Err(rejection) = validate_decision(&self.params, context, &decision) {
                tracing::warn!(
                    trader_id = %context.trader_id,
                    symbol = %decision.symbol,
                    action = %decision.action,
                    reason = %rejection,
                    "Risk manager rejected decision."
                );
                verdict.rejected.push((decision, rejection));
                continue;
            }

            if decision.action.is_open() {
                // The context is a snapshot, so opens accepted earlier in this batch
                // still count against the symbol, the slot limit and the margin cap.
                if opened.contains(&decision.symbol) {
                    let symbol = decision.symbol.clone();
                    verdict.rejected.push((decision, Rejection::PositionExists(symbol)));
                    continue;
                }
                let open = context.positions.len() + opened.len();
                if open >= self.params.max_positions {
                    verdict.rejected.push((
                        decision,
                        Rejection::PositionLimitReached {
                            open,
                            max: self.params.max_positions,
                        },
                    ));
                    continue;
                }
                let added_margin = decision.position_size_usd / Decimal::from(decision.leverage);
                if let Some(cap_pct) = context.guards.max_margin_usage_pct {
                    let equity = context.account.total_equity;
                    let projected_pct =
                        (context.account.margin_used + pending_margin + added_margin) / equity * Decimal::ONE_HUNDRED;
                    if exceeds(projected_pct, cap_pct, RATIO_EPSILON) {
                        tracing::warn!(
                            trader_id = %context.trader_id,
                            symbol = %decision.symbol,
                            %projected_pct,
                            %cap_pct,
                            "Risk manager rejected open: batch margin over cap."
                        );
                        verdict
                            .rejected
                            .push((decision, Rejection::MarginUsageExceeded { projected_pct, cap_pct }));
                        continue;
                    }
                }
                pending_margin += added_margin;
                opened.insert(decision.symbol.clone());
            }
            verdict.approved.push(decision);
        }

        verdict
    }
}

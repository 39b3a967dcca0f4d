// In crates/engine/src/cycle.rs

use api_client::ErrorKind;
use chrono::{DateTime, Utc};
use core_types::{AccountSnapshot, Context, Decision, DecisionBatch, Position};
use events::{ActionRecord, CycleRecord, MarketDigest};
use execution::{ExecutionOutcome, ExecutionRequest, Executor};
use risk::{ExecutionGuards, Rejection, RiskParameters};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use crate::context::ContextAssembler;
use crate::reconciler::sync_trader_positions;
use crate::trader::VirtualTrader;

#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    pub context_timeout: Duration,
    pub decision_timeout: Duration,
    /// Failed cycles in a row before the trader is moved to `Error`. Zero disables.
    pub max_consecutive_failures: u32,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            context_timeout: Duration::from_secs(10),
            decision_timeout: Duration::from_secs(60),
            max_consecutive_failures: 5,
        }
    }
}

/// Result of one cycle, handed back to the scheduler.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub record: CycleRecord,
    /// The state the trader left if the cycle pushed it into `Error`.
    pub entered_error_from: Option<core_types::TraderState>,
}

/// Stable sort putting every close before every open, then everything else.
/// Within a priority class decisions are ordered by symbol.
pub fn sort_decisions_close_first(decisions: &mut [Decision]) {
    decisions.sort_by(|a, b| {
        a.action
            .priority()
            .cmp(&b.action.priority())
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}

/// Keeps at most `limit` opens, preserving the relative order of everything.
/// Returns the kept decisions and the opens that were cut.
pub fn split_open_cap(decisions: Vec<Decision>, limit: usize) -> (Vec<Decision>, Vec<Decision>) {
    let mut kept = Vec::with_capacity(decisions.len());
    let mut dropped = Vec::new();
    let mut opens = 0;
    for decision in decisions {
        if decision.action.is_open() {
            if opens >= limit {
                dropped.push(decision);
                continue;
            }
            opens += 1;
        }
        kept.push(decision);
    }
    (kept, dropped)
}

pub fn cap_new_open_decisions(decisions: Vec<Decision>, remaining_slots: usize) -> Vec<Decision> {
    split_open_cap(decisions, remaining_slots).0
}

/// `min(free position slots, per-cycle cap)`.
pub fn open_limit(params: &RiskParameters, guards: &ExecutionGuards, open_positions: usize) -> usize {
    let slots = params.max_positions.saturating_sub(open_positions);
    guards.max_new_positions().map_or(slots, |cap| cap.min(slots))
}

pub fn context_digest(context: &Context) -> String {
    match serde_json::to_vec(context) {
        Ok(bytes) => hex::encode(Sha256::digest(&bytes)),
        Err(e) => {
            tracing::warn!(trader_id = %context.trader_id, error = %e, "Failed to serialize context for digest.");
            String::new()
        }
    }
}

struct CycleState {
    started: Instant,
    cycle_number: u64,
    now: DateTime<Utc>,
    context: Option<Context>,
    batch: Option<DecisionBatch>,
    actions: Vec<ActionRecord>,
    failure: Option<String>,
    attempted: usize,
    succeeded: usize,
}

impl CycleState {
    fn into_record(self, trader_id: &str, positions_after: Option<(AccountSnapshot, Vec<Position>)>) -> CycleRecord {
        let (account, positions) = match (positions_after, &self.context) {
            (Some(after), _) => after,
            (None, Some(context)) => (context.account.clone(), context.positions.clone()),
            (None, None) => (AccountSnapshot::default(), Vec::new()),
        };
        let (context_digest, candidates, market_digest) = match &self.context {
            Some(context) => (
                context_digest(context),
                context.candidates.iter().map(|c| c.symbol.clone()).collect(),
                context
                    .market
                    .iter()
                    .map(|(symbol, snapshot)| (symbol.clone(), MarketDigest::from(snapshot)))
                    .collect(),
            ),
            None => (String::new(), Vec::new(), Default::default()),
        };
        let (decisions, reasoning, prompt_digest) = match self.batch {
            Some(batch) => (batch.decisions, batch.reasoning, batch.prompt_digest),
            None => (Vec::new(), String::new(), None),
        };
        let action_failed = self.actions.iter().any(|a| a.status == events::ActionStatus::Error);

        CycleRecord {
            timestamp: self.now,
            trader_id: trader_id.to_string(),
            cycle_number: self.cycle_number,
            context_digest,
            prompt_digest,
            decisions,
            reasoning,
            account,
            positions,
            candidates,
            market_digest,
            actions: self.actions,
            success: self.failure.is_none() && !action_failed,
            error_message: self.failure,
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Runs one assemble, decide, validate, execute, record pass for `trader`.
///
/// Nothing here returns an error: every failure ends up in the cycle record, and
/// the scheduler moves on to the next trader.
pub async fn run_cycle(
    trader: &VirtualTrader,
    executor: &dyn Executor,
    settings: &CycleSettings,
    now: DateTime<Utc>,
) -> CycleReport {
    let mut state = CycleState {
        started: Instant::now(),
        cycle_number: trader.begin_cycle().await,
        now,
        context: None,
        batch: None,
        actions: Vec::new(),
        failure: None,
        attempted: 0,
        succeeded: 0,
    };
    let trader_id = trader.id();
    let engine = trader.decision_engine();

    // 1. Read-only performance feedback.
    engine.update_performance(trader.performance_view().await).await;

    // 2. Context.
    let assembler = ContextAssembler::new(trader);
    match tokio::time::timeout(settings.context_timeout, assembler.assemble(now)).await {
        Ok(Ok(context)) => state.context = Some(context),
        Ok(Err(e)) => {
            tracing::error!(trader_id, kind = %e.kind(), error = %e, "Context assembly failed.");
            state.failure = Some(format!("context assembly failed: {e}"));
        }
        Err(_) => {
            tracing::error!(trader_id, timeout = ?settings.context_timeout, "Context assembly timed out.");
            state.failure = Some(format!("context assembly timed out after {:?}", settings.context_timeout));
        }
    }

    // 3. Decide.
    if let Some(context) = &state.context {
        match tokio::time::timeout(settings.decision_timeout, engine.decide(context)).await {
            Ok(Ok(batch)) => state.batch = Some(batch),
            Ok(Err(e)) => {
                tracing::error!(trader_id, engine = engine.name(), error = %e, "Decision engine failed.");
                state.failure = Some(format!("decision engine failed: {e}"));
                state.batch = Some(DecisionBatch::empty(now));
            }
            Err(_) => {
                tracing::error!(trader_id, engine = engine.name(), "Decision engine timed out.");
                state.failure = Some(format!("decision engine timed out after {:?}", settings.decision_timeout));
                state.batch = Some(DecisionBatch::empty(now));
            }
        }
    }

    // 4-6. Order, cap, validate, execute.
    if let (Some(context), Some(batch)) = (&state.context, &state.batch) {
        let config = trader.config();
        let mut decisions = batch.decisions.clone();
        sort_decisions_close_first(&mut decisions);

        let limit = open_limit(&config.risk_params, &config.exec_guards, context.positions.len());
        let (kept, capped) = split_open_cap(decisions, limit);
        let slots_exhausted = context.positions.len() >= config.risk_params.max_positions;
        for decision in capped {
            let rejection = if slots_exhausted {
                Rejection::PositionLimitReached {
                    open: context.positions.len(),
                    max: config.risk_params.max_positions,
                }
            } else {
                Rejection::OpenCapReached
            };
            tracing::warn!(trader_id, symbol = %decision.symbol, action = %decision.action, reason = %rejection, "Open dropped by per-cycle cap.");
            state.actions.push(ActionRecord::rejected(&decision, rejection));
        }

        let verdict = trader.risk_manager().evaluate_batch(kept, context);
        for (decision, rejection) in &verdict.rejected {
            state.actions.push(ActionRecord::rejected(decision, rejection));
        }

        let mut halted: Option<String> = None;
        for decision in &verdict.approved {
            if let Some(reason) = &halted {
                state.actions.push(ActionRecord::failed(decision, format!("skipped: {reason}")));
                continue;
            }
            let request = ExecutionRequest {
                trader_id,
                decision,
                risk: &config.risk_params,
                exchange: trader.exchange(),
                market: trader.market(),
                now,
            };
            let counts = decision.action.is_open() || decision.action.is_close();
            if counts {
                state.attempted += 1;
            }
            match executor.execute(request).await {
                Ok(outcome) => {
                    if matches!(outcome, ExecutionOutcome::Closed { .. }) {
                        trader.record_close(&decision.symbol, now).await;
                    }
                    if counts {
                        state.succeeded += 1;
                    }
                    state.actions.push(ActionRecord::ok(decision));
                }
                Err(e) => {
                    let kind = e.kind();
                    tracing::error!(trader_id, symbol = %decision.symbol, action = %decision.action, %kind, error = %e, "Execution failed.");
                    if kind == ErrorKind::ExchangeDown {
                        halted = Some(format!("exchange down: {e}"));
                    }
                    state.actions.push(ActionRecord::failed(decision, format!("{kind}: {e}")));
                }
            }
        }
        if let Some(reason) = halted {
            state.failure = Some(reason);
        }
    }

    // 7. Record and re-sync.
    trader.record_decision(now).await;
    let entered_error_from = trader
        .finish_cycle(
            now,
            state.attempted,
            state.succeeded,
            state.failure.as_deref(),
            settings.max_consecutive_failures,
        )
        .await;

    let positions_after = if state.context.is_some() {
        match sync_trader_positions(trader, now).await {
            Ok(synced) => Some(synced),
            Err(e) => {
                tracing::warn!(trader_id, error = %e, "Post-cycle position sync failed.");
                None
            }
        }
    } else {
        None
    };

    let record = state.into_record(trader_id, positions_after);
    tracing::info!(
        trader_id,
        cycle = record.cycle_number,
        decisions = record.decisions.len(),
        executed = record.count(events::ActionStatus::Ok),
        rejected = record.count(events::ActionStatus::Rejected),
        failed = record.count(events::ActionStatus::Error),
        success = record.success,
        duration_ms = record.duration_ms,
        "Decision cycle finished."
    );

    CycleReport {
        record,
        entered_error_from,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Action;
    use rust_decimal_macros::dec;

    fn make(symbol: &str, action: Action) -> Decision {
        Decision::new(symbol, action)
    }

    fn labels(decisions: &[Decision]) -> Vec<String> {
        decisions
            .iter()
            .map(|d| format!("{}:{}", d.action, d.symbol))
            .collect()
    }

    #[test]
    fn closes_sort_before_opens_with_symbol_ties() {
        let mut decisions = vec![
            make("SOL", Action::OpenLong),
            make("ETH", Action::Hold),
            make("BTC", Action::CloseShort),
            make("ARB", Action::OpenShort),
            make("AVAX", Action::CloseLong),
        ];
        sort_decisions_close_first(&mut decisions);
        assert_eq!(
            labels(&decisions),
            vec!["close_long:AVAX", "close_short:BTC", "open_short:ARB", "open_long:SOL", "hold:ETH"]
        );
    }

    #[test]
    fn zero_slots_keep_only_non_opens_in_order() {
        let decisions = vec![
            make("A", Action::CloseLong),
            make("B", Action::OpenLong),
            make("C", Action::Wait),
            make("D", Action::OpenShort),
            make("E", Action::CloseShort),
        ];
        let kept = cap_new_open_decisions(decisions, 0);
        assert_eq!(labels(&kept), vec!["close_long:A", "wait:C", "close_short:E"]);
    }

    #[test]
    fn cap_keeps_first_opens() {
        let decisions = vec![
            make("A", Action::OpenLong),
            make("B", Action::OpenLong),
            make("C", Action::CloseLong),
            make("D", Action::OpenShort),
        ];
        let (kept, dropped) = split_open_cap(decisions, 1);
        assert_eq!(labels(&kept), vec!["open_long:A", "close_long:C"]);
        assert_eq!(labels(&dropped), vec!["open_long:B", "open_short:D"]);
    }

    #[test]
    fn open_limit_is_min_of_slots_and_guard() {
        let params = RiskParameters {
            max_positions: 3,
            max_position_size_usd: dec!(1000),
            max_margin_usage_pct: dec!(80),
            major_coin_leverage: 10,
            altcoin_leverage: 5,
            min_risk_reward_ratio: dec!(2),
            min_confidence: 60,
        };
        let mut guards = ExecutionGuards::default();
        assert_eq!(open_limit(&params, &guards, 1), 2);
        assert_eq!(open_limit(&params, &guards, 5), 0);

        guards.max_new_positions_per_cycle = 1;
        assert_eq!(open_limit(&params, &guards, 0), 1);

        guards.enable_max_new_positions = false;
        assert_eq!(open_limit(&params, &guards, 0), 3);
    }
}

// In crates/events/src/lib.rs

//! Audit records for decision cycles and the events the engine publishes.

use chrono::{DateTime, Utc};
use core_types::{AccountSnapshot, Action, Decision, MarketSnapshot, Position, Symbol, TraderState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod sinks;

pub use sinks::{AuditSink, BroadcastSink, FanoutSink, LogSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Ok,
    Rejected,
    Error,
}

/// What happened to one decision of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub symbol: Symbol,
    pub action: Action,
    pub leverage: u32,
    pub position_size_usd: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub confidence: i32,
    pub status: ActionStatus,
    /// Rejection reason or execution error; empty on success.
    pub error: Option<String>,
}

impl ActionRecord {
    pub fn ok(decision: &Decision) -> Self {
        Self::from_decision(decision, ActionStatus::Ok, None)
    }

    pub fn rejected(decision: &Decision, reason: impl ToString) -> Self {
        Self::from_decision(decision, ActionStatus::Rejected, Some(reason.to_string()))
    }

    pub fn failed(decision: &Decision, error: impl ToString) -> Self {
        Self::from_decision(decision, ActionStatus::Error, Some(error.to_string()))
    }

    fn from_decision(decision: &Decision, status: ActionStatus, error: Option<String>) -> Self {
        Self {
            symbol: decision.symbol.clone(),
            action: decision.action,
            leverage: decision.leverage,
            position_size_usd: decision.position_size_usd,
            entry_price: decision.entry_price,
            stop_loss: decision.stop_loss,
            take_profit: decision.take_profit,
            confidence: decision.confidence,
            status,
            error,
        }
    }
}

/// The market fields an auditor needs to replay a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDigest {
    pub price: Decimal,
    pub change_1h: f64,
    pub change_4h: f64,
    pub open_interest: Option<Decimal>,
    pub funding_rate: Option<f64>,
}

impl From<&MarketSnapshot> for MarketDigest {
    fn from(snapshot: &MarketSnapshot) -> Self {
        Self {
            price: snapshot.price,
            change_1h: snapshot.change_1h,
            change_4h: snapshot.change_4h,
            open_interest: snapshot.open_interest.map(|oi| oi.latest),
            funding_rate: snapshot.funding.map(|f| f.rate),
        }
    }
}

/// One decision cycle of one trader, as written to the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub timestamp: DateTime<Utc>,
    pub trader_id: String,
    pub cycle_number: u64,
    /// SHA-256 hex of the serialized context the engine saw.
    pub context_digest: String,
    pub prompt_digest: Option<String>,
    pub decisions: Vec<Decision>,
    pub reasoning: String,
    pub account: AccountSnapshot,
    pub positions: Vec<Position>,
    pub candidates: Vec<Symbol>,
    pub market_digest: BTreeMap<Symbol, MarketDigest>,
    pub actions: Vec<ActionRecord>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl CycleRecord {
    pub fn count(&self, status: ActionStatus) -> usize {
        self.actions.iter().filter(|a| a.status == status).count()
    }
}

/// Everything the engine publishes to audit sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    CycleCompleted(Box<CycleRecord>),
    TraderStateChanged {
        trader_id: String,
        from: TraderState,
        to: TraderState,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn trader_id(&self) -> &str {
        match self {
            EngineEvent::CycleCompleted(record) => &record.trader_id,
            EngineEvent::TraderStateChanged { trader_id, .. } => trader_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_record_copies_decision_fields() {
        let decision = Decision {
            leverage: 4,
            position_size_usd: dec!(250),
            ..Decision::new("sol", Action::OpenShort)
        };
        let record = ActionRecord::rejected(&decision, "cooldown active");
        assert_eq!(record.symbol, Symbol::new("SOL"));
        assert_eq!(record.status, ActionStatus::Rejected);
        assert_eq!(record.error.as_deref(), Some("cooldown active"));
        assert_eq!(record.position_size_usd, dec!(250));
    }

    #[test]
    fn events_serialize_with_type_and_payload() {
        let event = EngineEvent::TraderStateChanged {
            trader_id: "alpha".to_string(),
            from: TraderState::Stopped,
            to: TraderState::Running,
            at: DateTime::<Utc>::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "TraderStateChanged");
        assert_eq!(json["payload"]["to"], "running");
        assert_eq!(event.trader_id(), "alpha");
    }

    #[test]
    fn action_status_uses_lowercase_labels() {
        assert_eq!(serde_json::to_string(&ActionStatus::Error).expect("serialize"), "\"error\"");
    }
}

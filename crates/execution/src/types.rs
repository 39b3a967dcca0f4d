// In crates/execution/src/types.rs

use api_client::{ExchangeAdapter, MarketDataAdapter};
use chrono::{DateTime, Utc};
use core_types::{Decision, Position, Symbol};
use risk::RiskParameters;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// The maker fee for the exchange (e.g., 0.0002 for 0.02%).
    pub maker_fee: f64,

    /// The taker fee for the exchange (e.g., 0.0004 for 0.04%).
    pub taker_fee: f64,

    /// The simulated slippage percentage for IOC orders (e.g., 0.0005 for 0.05%).
    pub slippage_percent: f64,

    /// Starting cash balance of the simulated account.
    pub initial_equity: Decimal,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            maker_fee: 0.0002,
            taker_fee: 0.0004,
            slippage_percent: 0.0,
            initial_equity: dec!(10000),
        }
    }
}

/// Represents the state of the simulated trading account.
#[derive(Debug, Clone)]
pub struct Portfolio {
    /// The total cash balance of the portfolio (e.g., in USDC).
    pub cash: Decimal,

    /// A map holding the currently open positions, keyed by symbol.
    pub open_positions: HashMap<Symbol, Position>,

    pub realized_pnl: Decimal,
}

impl Portfolio {
    /// Creates a new portfolio with an initial cash balance.
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            open_positions: HashMap::new(),
            realized_pnl: Decimal::ZERO,
        }
    }
}

/// Everything the orchestrator needs to carry out one decision for one trader.
pub struct ExecutionRequest<'a> {
    pub trader_id: &'a str,
    pub decision: &'a Decision,
    pub risk: &'a RiskParameters,
    pub exchange: &'a dyn ExchangeAdapter,
    /// Price source when the decision carries no entry price.
    pub market: &'a dyn MarketDataAdapter,
    pub now: DateTime<Utc>,
}

/// Whether the protective orders were attached after an open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtectiveStatus {
    pub stop_loss: bool,
    pub take_profit: bool,
}

/// What the orchestrator did with a decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Opened {
        cloid: String,
        asset: u32,
        order_id: u64,
        quantity: Decimal,
        price: String,
        size: String,
        leverage: u32,
        protective: ProtectiveStatus,
    },
    Closed {
        order_id: u64,
    },
    NoOp,
}

// In crates/core-types/src/lib.rs

pub mod context;
pub mod decision;
pub mod error;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use context::{AccountSnapshot, CandidateCoin, Context, GuardThresholds, PerformanceView, ValueBand};
pub use decision::{Action, Decision, DecisionBatch};
pub use error::{Error, Result};
pub use types::{
    AccountState, AssetInfo, Funding, Indicators, MarketSnapshot, OpenInterest, OrderAck,
    OrderRequest, OrderStatus, Position, Side, Symbol, TimeInForce, TraderState,
};

// In crates/engine/src/error.rs

use core_types::TraderState;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Trader '{0}' is already registered")]
    DuplicateTrader(String),

    #[error("Trader '{0}' not found")]
    TraderNotFound(String),

    #[error("Unknown exchange provider '{0}'")]
    UnknownExchange(String),

    #[error("Unknown market provider '{0}'")]
    UnknownMarket(String),

    #[error("Invalid trader configuration: {0}")]
    InvalidConfig(#[from] app_config::Error),

    #[error("Failed to construct decision engine: {0}")]
    EngineConstruction(#[from] anyhow::Error),

    #[error("Trader '{trader_id}' cannot {action} from state {from}")]
    InvalidTransition {
        trader_id: String,
        from: TraderState,
        action: &'static str,
    },

    #[error("Allocation {requested}% exceeds the {available}% still unallocated")]
    AllocationExceeded { requested: Decimal, available: Decimal },
}

pub type Result<T> = std::result::Result<T, Error>;

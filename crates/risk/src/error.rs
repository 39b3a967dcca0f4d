// In crates/risk/src/error.rs

use core_types::{Side, Symbol};
use rust_decimal::Decimal;
use thiserror::Error;

/// The specific rule a decision broke.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("symbol is required")]
    MissingSymbol,

    #[error("leverage must be positive, got {0}")]
    NonPositiveLeverage(u32),

    #[error("position size must be positive, got {0}")]
    NonPositiveSize(Decimal),

    #[error("entry, stop-loss and take-profit must all be positive")]
    NonPositivePrices,

    #[error("confidence {0} is outside 0..=100")]
    ConfidenceOutOfRange(i32),

    #[error("confidence {confidence} is below minimum {minimum}")]
    ConfidenceBelowMinimum { confidence: i32, minimum: i32 },

    #[error("{side:?} prices are mis-ordered (entry {entry}, stop {stop_loss}, target {take_profit})")]
    PriceOrdering {
        side: Side,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    },

    #[error("reward/risk {ratio:.3} is below minimum {minimum}")]
    RewardRiskTooLow { ratio: Decimal, minimum: Decimal },

    #[error("leverage {requested} exceeds cap {cap}")]
    LeverageAboveCap { requested: u32, cap: u32 },

    #[error("open interest value {open_interest_usd:.2} is below liquidity threshold {threshold}")]
    Illiquid {
        open_interest_usd: Decimal,
        threshold: Decimal,
    },

    #[error("position value {size} is outside band [{min}, {max}]")]
    OutsideValueBand { size: Decimal, min: Decimal, max: Decimal },

    #[error("account equity is not positive")]
    NoEquity,

    #[error("margin usage would reach {projected_pct:.2}%, above cap {cap_pct}%")]
    MarginUsageExceeded { projected_pct: Decimal, cap_pct: Decimal },

    #[error("{symbol} is cooling down after a close ({remaining_secs}s left)")]
    CooldownActive { symbol: Symbol, remaining_secs: i64 },

    #[error("position limit reached ({open}/{max})")]
    PositionLimitReached { open: usize, max: usize },

    #[error("a position on {0} already exists")]
    PositionExists(Symbol),

    #[error("position size {size} exceeds cap {cap}")]
    SizeAboveCap { size: Decimal, cap: Decimal },

    #[error("no {side:?} position on {symbol} to close")]
    NoPositionToClose { symbol: Symbol, side: Side },

    #[error("new-position cap for this cycle reached")]
    OpenCapReached,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Decision was vetoed by risk manager: {0}")]
    Vetoed(#[from] Rejection),

    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Error>;

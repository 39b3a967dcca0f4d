// In crates/execution/src/error.rs

use api_client::ErrorKind;
use core_types::Symbol;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Decision has no symbol")]
    MissingSymbol,

    #[error("Position size must be positive, got {0}")]
    InvalidSize(Decimal),

    #[error("{what} {value} exceeds limit {limit}")]
    LimitExceeded {
        what: &'static str,
        value: Decimal,
        limit: Decimal,
    },

    #[error("No usable price for {0}")]
    PriceUnavailable(Symbol),

    #[error("Quantity from size {size} at price {price} is not positive")]
    InvalidQuantity { size: Decimal, price: Decimal },

    #[error("Open order {order_id} on {symbol} did not fill")]
    NotFilled { symbol: Symbol, order_id: u64 },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: &'static str, after: Duration },

    #[error("API client error: {0}")]
    ApiClientError(#[from] api_client::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingSymbol
            | Error::InvalidSize(_)
            | Error::PriceUnavailable(_)
            | Error::InvalidQuantity { .. } => ErrorKind::InvalidParam,
            Error::LimitExceeded { .. } | Error::NotFilled { .. } => ErrorKind::RiskRejected,
            Error::Timeout { .. } => ErrorKind::Temporary,
            Error::ApiClientError(err) => err.kind(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::ApiClientError(err) => err.retry_after(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// In crates/api-client/src/error.rs

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an adapter failure, used to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network hiccup or timeout; safe to retry.
    Temporary,
    /// Venue throttling; retry after the hinted delay.
    RateLimited,
    /// Bad precision, format or parameter; retrying cannot help.
    InvalidParam,
    /// Venue-side risk rejection (leverage, margin, guard).
    RiskRejected,
    /// Not enough balance or margin.
    Insufficient,
    /// Venue is down; give up on this cycle.
    ExchangeDown,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Temporary | ErrorKind::RateLimited | ErrorKind::Unknown)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Temporary => "temporary",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidParam => "invalid_param",
            ErrorKind::RiskRejected => "risk_rejected",
            ErrorKind::Insufficient => "insufficient",
            ErrorKind::ExchangeDown => "exchange_down",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited by venue")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
    #[error("Rejected by venue risk checks: {0}")]
    RiskRejected(String),
    #[error("Insufficient balance or margin: {0}")]
    Insufficient(String),
    #[error("Exchange unavailable: {0}")]
    ExchangeDown(String),
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("API error: code {code}, msg: {msg}")]
    ApiError { code: i64, msg: String },
    #[error("API client error: {0}")]
    CustomError(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout(_) | Error::Network(_) => ErrorKind::Temporary,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::InvalidParam(_) | Error::UnknownSymbol(_) => ErrorKind::InvalidParam,
            Error::RiskRejected(_) => ErrorKind::RiskRejected,
            Error::Insufficient(_) => ErrorKind::Insufficient,
            Error::ExchangeDown(_) => ErrorKind::ExchangeDown,
            Error::ApiError { code, msg } => classify_api_error(*code, msg),
            Error::CustomError(_) => ErrorKind::Unknown,
        }
    }

    /// Delay the venue asked for before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Maps a raw venue error code and message onto the taxonomy.
fn classify_api_error(code: i64, msg: &str) -> ErrorKind {
    match code {
        429 => return ErrorKind::RateLimited,
        408 => return ErrorKind::Temporary,
        500..=599 => return ErrorKind::ExchangeDown,
        _ => {}
    }
    let msg = msg.to_ascii_lowercase();
    if msg.contains("rate limit") || msg.contains("too many requests") {
        ErrorKind::RateLimited
    } else if msg.contains("insufficient") || msg.contains("margin") {
        ErrorKind::Insufficient
    } else if msg.contains("leverage") || msg.contains("reduce only") || msg.contains("risk") {
        ErrorKind::RiskRejected
    } else if msg.contains("tick") || msg.contains("precision") || msg.contains("invalid") {
        ErrorKind::InvalidParam
    } else if msg.contains("timeout") || msg.contains("timed out") {
        ErrorKind::Temporary
    } else if msg.contains("maintenance") || msg.contains("unavailable") {
        ErrorKind::ExchangeDown
    } else {
        ErrorKind::Unknown
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_kinds() {
        assert_eq!(Error::Timeout("info".into()).kind(), ErrorKind::Temporary);
        assert_eq!(Error::RateLimited { retry_after: None }.kind(), ErrorKind::RateLimited);
        assert_eq!(Error::UnknownSymbol("XYZ".into()).kind(), ErrorKind::InvalidParam);
        assert_eq!(Error::CustomError("?".into()).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn api_errors_are_classified_by_code_then_message() {
        let api = |code, msg: &str| Error::ApiError { code, msg: msg.into() }.kind();
        assert_eq!(api(429, ""), ErrorKind::RateLimited);
        assert_eq!(api(503, "bad gateway"), ErrorKind::ExchangeDown);
        assert_eq!(api(400, "Insufficient margin to place order"), ErrorKind::Insufficient);
        assert_eq!(api(400, "Price must be divisible by tick size"), ErrorKind::InvalidParam);
        assert_eq!(api(400, "Leverage exceeds max for asset"), ErrorKind::RiskRejected);
        assert_eq!(api(400, "something odd"), ErrorKind::Unknown);
    }

    #[test]
    fn retry_hint_is_exposed() {
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_millis(250)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(250)));
        assert!(err.kind().is_retryable());
        assert!(!ErrorKind::Insufficient.is_retryable());
    }
}

// In crates/strategies/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Decision engine is unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse decision output: {0}")]
    Parse(String),

    #[error("Decision engine error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown decision action: {0}")]
    UnknownAction(String),

    #[error("Unknown trader state: {0}")]
    UnknownState(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// In crates/execution/src/lib.rs

use async_trait::async_trait;

pub mod cloid;
pub mod error;
pub mod orchestrator;
pub mod precision;
pub mod retry;
pub mod simulated;
pub mod types;

// Re-export public types
pub use cloid::client_order_id;
pub use error::{Error, Result};
pub use orchestrator::OrderExecutor;
pub use retry::RetryPolicy;
pub use simulated::SimulatedExchange;
pub use types::{ExecutionOutcome, ExecutionRequest, ProtectiveStatus, SimulationSettings};

/// The universal interface for an execution handler.
///
/// An `Executor` takes one decision that already passed the risk manager and
/// carries it out against the trader's exchange. It re-checks the hard limits
/// itself, so a bug upstream cannot push an oversized order through.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The name of the executor (e.g., "OrderExecutor").
    fn name(&self) -> &'static str;

    /// Executes a single decision.
    ///
    /// # Returns
    ///
    /// What was done on the venue, or an `Error` whose `kind()` tells the caller
    /// whether the failure was transient.
    async fn execute<'a>(&self, request: ExecutionRequest<'a>) -> Result<ExecutionOutcome>;
}

// In crates/strategies/src/lib.rs

use async_trait::async_trait;
use core_types::{Context, DecisionBatch, PerformanceView};

pub mod error;
pub mod momentum;
pub mod types;

pub use error::{Error, Result};
pub use momentum::MomentumEngine;

/// The universal interface for a decision engine.
///
/// A decision engine looks at a fully assembled `Context` and proposes trade
/// decisions. It never talks to the exchange; everything it returns is validated
/// and executed by the engine crate.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    /// The name of the decision engine.
    fn name(&self) -> &'static str;

    /// Produces the decisions for one cycle.
    async fn decide(&self, context: &Context) -> Result<DecisionBatch>;

    /// Receives read-only performance feedback before each cycle.
    async fn update_performance(&self, view: PerformanceView);
}

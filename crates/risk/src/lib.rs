// In crates/risk/src/lib.rs

use core_types::{Context, Decision};

pub mod error;
pub mod guarded_manager;
pub mod tolerance;
pub mod types;
pub mod validator;

// Re-export public types
pub use error::{Error, Rejection, Result};
pub use guarded_manager::GuardedRiskManager;
pub use types::{ExecutionGuards, RiskParameters};
pub use validator::validate_decision;

/// Outcome of checking a batch: decisions that may proceed, in their original
/// order, and the ones that were dropped together with the reason.
#[derive(Debug, Default)]
pub struct Verdict {
    pub approved: Vec<Decision>,
    pub rejected: Vec<(Decision, Rejection)>,
}

/// The universal interface for a risk management module.
///
/// A `RiskManager` gates every decision before it reaches the exchange. It never
/// mutates state: the same decision and context always produce the same answer.
pub trait RiskManager: Send + Sync {
    /// The name of the risk management strategy.
    fn name(&self) -> &'static str;

    /// Checks a single decision.
    ///
    /// # Returns
    ///
    /// * `Ok(())`: the decision may be executed.
    /// * `Err(Error::Vetoed)`: the decision broke a rule and must be dropped.
    fn evaluate(&self, decision: &Decision, context: &Context) -> Result<()>;

    /// Checks a batch in order. A rejection drops only that decision.
    fn evaluate_batch(&self, decisions: Vec<Decision>, context: &Context) -> Verdict {
        let mut verdict = Verdict::default();
        for decision in decisions {
            match self.evaluate(&decision, context) {
                Ok(()) => verdict.approved.push(decision),
                Err(Error::Vetoed(rejection)) => verdict.rejected.push((decision, rejection)),
                Err(err) => {
                    tracing::error!(manager = self.name(), error = %err, "Risk manager failed to evaluate decision.");
                }
            }
        }
        verdict
    }
}

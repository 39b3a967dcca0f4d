// In crates/analytics/src/lib.rs

pub mod engine;
pub mod types;

pub use engine::{AnalyticsEngine, PerformanceTracker};
pub use types::{EquityPoint, PerformanceMetrics};

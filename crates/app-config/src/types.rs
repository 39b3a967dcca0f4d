// In crates/app-config/src/types.rs

use core_types::Symbol;
use execution::SimulationSettings;
use risk::{ExecutionGuards, RiskParameters};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strategies::types::MomentumSettings;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    /// Simulated exchange and market used by `fleet run`.
    pub paper: Option<PaperSettings>,
    #[serde(default)]
    pub traders: Vec<TraderConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Scheduler timing and failure handling.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    pub context_timeout_secs: u64,
    pub decision_timeout_secs: u64,
    pub sync_interval_secs: u64,
    /// Failed cycles in a row before a trader is moved to `Error`. Zero disables.
    pub max_consecutive_failures: u32,
    /// Share of the account (percent) never handed out as trader allocation.
    pub reserve_pct: Decimal,
    /// Capacity of the in-process event channel.
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            context_timeout_secs: 10,
            decision_timeout_secs: 60,
            sync_interval_secs: 60,
            max_consecutive_failures: 5,
            reserve_pct: Decimal::ZERO,
            event_buffer: 256,
        }
    }
}

impl EngineSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn context_timeout(&self) -> Duration {
        Duration::from_secs(self.context_timeout_secs)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    /// Upper bound on the summed allocation of all traders, in percent.
    pub fn allocatable_pct(&self) -> Decimal {
        Decimal::ONE_HUNDRED - self.reserve_pct
    }
}

/// Retry and timeout policy for exchange calls.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExecutionSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: u32,
    pub call_timeout_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 3_000,
            backoff_multiplier: 2,
            call_timeout_secs: 10,
        }
    }
}

impl ExecutionSettings {
    pub fn retry_policy(&self) -> execution::RetryPolicy {
        execution::RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PaperSettings {
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub assets: Vec<PaperAsset>,
}

/// One tradable asset in the paper venue, with its starting market values.
#[derive(Deserialize, Debug, Clone)]
pub struct PaperAsset {
    pub symbol: Symbol,
    pub price: Decimal,
    #[serde(default)]
    pub change_1h: f64,
    #[serde(default)]
    pub change_4h: f64,
    #[serde(default)]
    pub open_interest: Decimal,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    #[serde(default = "default_size_decimals")]
    pub size_decimals: u32,
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u32,
}

// Define the container for all strategy settings
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct StrategySettings {
    // Each decision engine has its own optional settings block
    pub momentum: Option<MomentumSettings>,
}

/// Everything needed to register one virtual trader.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TraderConfig {
    pub id: String,
    pub name: String,
    pub exchange_provider: String,
    pub market_provider: String,
    #[serde(default = "default_decision_engine")]
    pub decision_engine: String,
    pub prompt_template: Option<PathBuf>,
    #[serde(default = "default_decision_interval")]
    pub decision_interval_secs: u64,
    /// Share of the account assigned to this trader, in percent.
    #[serde(default)]
    pub allocation_pct: Decimal,
    #[serde(default)]
    pub auto_start: bool,
    pub risk_params: RiskParameters,
    #[serde(default)]
    pub exec_guards: ExecutionGuards,
    #[serde(default)]
    pub strategy: StrategySettings,
}

impl TraderConfig {
    pub fn decision_interval(&self) -> Duration {
        Duration::from_secs(self.decision_interval_secs)
    }
}

/// A standalone file holding only `[[traders]]` tables.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Roster {
    #[serde(default)]
    pub traders: Vec<TraderConfig>,
}

/// Helper functions for serde defaults
fn default_log_level() -> String { "info".to_string() }
fn default_decision_engine() -> String { "momentum".to_string() }
fn default_decision_interval() -> u64 { 180 }
fn default_max_leverage() -> u32 { 20 }
fn default_size_decimals() -> u32 { 4 }
fn default_price_decimals() -> u32 { 2 }

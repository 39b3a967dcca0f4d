// In crates/app-config/src/lib.rs

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{
    AppSettings, EngineSettings, ExecutionSettings, PaperAsset, PaperSettings, Roster, Settings, StrategySettings,
    TraderConfig,
};

/// Loads the application settings from the `config/` directory.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
pub fn load_settings() -> Result<Settings> {
    load_settings_from("config")
}

/// Same layering as [`load_settings`], rooted at `dir`. The result is validated.
pub fn load_settings_from(dir: impl AsRef<Path>) -> Result<Settings> {
    let dir = dir.as_ref();
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name(&dir.join("base").to_string_lossy()))
        .add_source(File::with_name(&dir.join(&environment).to_string_lossy()).required(false))
        // Environment variables, e.g. `APP_ENGINE__TICK_INTERVAL_MS=500`.
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

/// Loads an extra roster of traders (a file of `[[traders]]` tables).
pub fn load_roster(path: impl AsRef<Path>) -> Result<Vec<TraderConfig>> {
    let content = std::fs::read_to_string(path)?;
    let roster: Roster = toml::from_str(&content)?;
    for trader in &roster.traders {
        trader.validate()?;
    }
    Ok(roster.traders)
}

impl Settings {
    /// Checks engine settings and the whole trader roster together.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        validate_roster(&self.traders, self.engine.allocatable_pct())
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.reserve_pct < Decimal::ZERO || self.reserve_pct > Decimal::ONE_HUNDRED {
            return Err(Error::Invalid("engine.reserve_pct must be within [0, 100]".into()));
        }
        if self.decision_timeout_secs == 0 || self.context_timeout_secs == 0 {
            return Err(Error::Invalid("engine timeouts must be > 0".into()));
        }
        Ok(())
    }
}

/// Validates each trader, id uniqueness, and the summed allocation.
pub fn validate_roster(traders: &[TraderConfig], allocatable_pct: Decimal) -> Result<()> {
    let mut seen = HashSet::new();
    let mut total = Decimal::ZERO;
    for trader in traders {
        trader.validate()?;
        if !seen.insert(trader.id.as_str()) {
            return Err(Error::Invalid(format!("duplicate trader id '{}'", trader.id)));
        }
        total += trader.allocation_pct;
    }
    if total > allocatable_pct {
        return Err(Error::Invalid(format!(
            "total allocation {total}% exceeds the allocatable {allocatable_pct}%"
        )));
    }
    Ok(())
}

impl TraderConfig {
    /// Checks one trader in isolation. Registry-wide rules live in [`validate_roster`].
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("id", &self.id),
            ("name", &self.name),
            ("exchange_provider", &self.exchange_provider),
            ("market_provider", &self.market_provider),
            ("decision_engine", &self.decision_engine),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Invalid(format!("trader '{}': {field} must not be empty", self.id)));
            }
        }

        if let Some(path) = &self.prompt_template {
            std::fs::File::open(path).map_err(|e| {
                Error::Invalid(format!(
                    "trader '{}': prompt template {} is not readable: {e}",
                    self.id,
                    path.display()
                ))
            })?;
        }

        if self.decision_interval_secs == 0 {
            return Err(Error::Invalid(format!("trader '{}': decision_interval_secs must be > 0", self.id)));
        }
        if self.allocation_pct < Decimal::ZERO || self.allocation_pct > Decimal::ONE_HUNDRED {
            return Err(Error::Invalid(format!(
                "trader '{}': allocation_pct must be within [0, 100]",
                self.id
            )));
        }

        let risk_error = |source| Error::Risk {
            trader_id: self.id.clone(),
            source,
        };
        self.risk_params.validate().map_err(risk_error)?;
        self.exec_guards.validate().map_err(risk_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use rust_decimal_macros::dec;

    const TRADER: &str = r#"
        [[traders]]
        id = "alpha"
        name = "Alpha"
        exchange_provider = "paper"
        market_provider = "paper"
        allocation_pct = 40

        [traders.risk_params]
        max_positions = 3
        max_position_size_usd = 5000
        max_margin_usage_pct = 80
        major_coin_leverage = 10
        altcoin_leverage = 5
        min_risk_reward_ratio = 2
        min_confidence = 60
    "#;

    fn parse(extra: &str) -> Settings {
        let source = format!("[app]\nenvironment = \"test\"\n{extra}");
        Config::builder()
            .add_source(File::from_str(&source, FileFormat::Toml))
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize")
    }

    fn make_trader(id: &str, allocation: Decimal) -> TraderConfig {
        let mut trader = parse(TRADER).traders.remove(0);
        trader.id = id.to_string();
        trader.allocation_pct = allocation;
        trader
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let settings = parse(TRADER);
        assert_eq!(settings.app.log_level, "info");
        assert_eq!(settings.engine, EngineSettings::default());
        assert_eq!(settings.execution.retry_policy(), execution::RetryPolicy::default());

        let trader = &settings.traders[0];
        assert_eq!(trader.decision_engine, "momentum");
        assert_eq!(trader.decision_interval_secs, 180);
        assert!(!trader.auto_start);
        assert!(trader.exec_guards.enable_cooldown);
        assert!(trader.exec_guards.enable_margin_guard);
        assert_eq!(trader.exec_guards.candidate_limit(), 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn guard_flags_can_be_switched_off() {
        let settings = parse(&format!(
            "{TRADER}\n[traders.exec_guards]\nenable_cooldown = false\ncooldown_after_close_secs = 900\n"
        ));
        let guards = &settings.traders[0].exec_guards;
        assert!(!guards.enable_cooldown);
        assert!(guards.enable_liquidity_guard);
        assert_eq!(guards.cooldown_after_close_secs, 900);
    }

    #[test]
    fn paper_section_parses_assets() {
        let settings = parse(
            "[paper.simulation]\ntaker_fee = 0.0005\n\n[[paper.assets]]\nsymbol = \"btc\"\nprice = 60000\nchange_1h = 2.5\n",
        );
        let paper = settings.paper.expect("paper");
        assert_eq!(paper.simulation.initial_equity, dec!(10000));
        assert_eq!(paper.assets[0].symbol.as_str(), "BTC");
        assert_eq!(paper.assets[0].max_leverage, 20);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let traders = vec![make_trader("a", dec!(10)), make_trader("a", dec!(10))];
        assert!(matches!(validate_roster(&traders, dec!(100)), Err(Error::Invalid(_))));
    }

    #[test]
    fn allocation_total_respects_reserve() {
        let traders = vec![make_trader("a", dec!(50)), make_trader("b", dec!(40))];
        assert!(validate_roster(&traders, dec!(100)).is_ok());
        assert!(validate_roster(&traders, dec!(80)).is_err());
    }

    #[test]
    fn bad_risk_params_name_the_trader() {
        let mut trader = make_trader("beta", dec!(10));
        trader.risk_params.max_positions = 0;
        match trader.validate() {
            Err(Error::Risk { trader_id, .. }) => assert_eq!(trader_id, "beta"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn empty_provider_is_rejected() {
        let mut trader = make_trader("gamma", dec!(10));
        trader.exchange_provider = "  ".to_string();
        assert!(matches!(trader.validate(), Err(Error::Invalid(_))));
    }

    #[test]
    fn missing_prompt_template_is_rejected() {
        let mut trader = make_trader("delta", dec!(10));
        trader.prompt_template = Some("/definitely/not/here/prompt.txt".into());
        assert!(matches!(trader.validate(), Err(Error::Invalid(_))));
    }

    #[test]
    fn roster_file_parses_with_toml() {
        let roster: Roster = toml::from_str(TRADER).expect("roster");
        assert_eq!(roster.traders.len(), 1);
        assert_eq!(roster.traders[0].risk_params.altcoin_leverage, 5);
    }
}

//! This module provides a factory for creating decision engines from trader configuration.

use app_config::TraderConfig;
use std::sync::Arc;
use strategies::{DecisionEngine, MomentumEngine};

/// Builds the decision engine instance a trader is bound to.
pub trait DecisionEngineFactory: Send + Sync {
    fn create(&self, config: &TraderConfig) -> anyhow::Result<Arc<dyn DecisionEngine>>;
}

/// Knows the engines that ship with the workspace.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinEngineFactory;

impl DecisionEngineFactory for BuiltinEngineFactory {
    fn create(&self, config: &TraderConfig) -> anyhow::Result<Arc<dyn DecisionEngine>> {
        match config.decision_engine.as_str() {
            "momentum" => {
                let settings = config.strategy.momentum.clone().unwrap_or_default();
                Ok(Arc::new(MomentumEngine::new(settings)))
            }
            other => {
                tracing::warn!(trader_id = %config.id, engine = %other, "Attempted to create unknown decision engine.");
                anyhow::bail!("unknown decision engine '{other}' for trader '{}'", config.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trader::tests::make_config;

    #[test]
    fn momentum_is_built_in() {
        let engine = BuiltinEngineFactory.create(&make_config("t1")).expect("engine");
        assert_eq!(engine.name(), "Momentum");
    }

    #[test]
    fn unknown_engine_is_an_error() {
        let mut config = make_config("t1");
        config.decision_engine = "oracle".to_string();
        assert!(BuiltinEngineFactory.create(&config).is_err());
    }
}

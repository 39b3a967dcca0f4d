// In crates/core-types/src/decision.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Side, Symbol};

/// The action a decision engine asks a trader to take on one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    Hold,
    Wait,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::OpenLong => "open_long",
            Action::OpenShort => "open_short",
            Action::CloseLong => "close_long",
            Action::CloseShort => "close_short",
            Action::Hold => "hold",
            Action::Wait => "wait",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Action::OpenLong | Action::OpenShort)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Action::CloseLong | Action::CloseShort)
    }

    /// The position side this action opens or closes, if any.
    pub fn side(&self) -> Option<Side> {
        match self {
            Action::OpenLong | Action::CloseLong => Some(Side::Long),
            Action::OpenShort | Action::CloseShort => Some(Side::Short),
            Action::Hold | Action::Wait => None,
        }
    }

    /// Sort priority inside a cycle: closes first, then opens, then everything else.
    pub fn priority(&self) -> u8 {
        if self.is_close() {
            0
        } else if self.is_open() {
            1
        } else {
            2
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open_long" => Ok(Action::OpenLong),
            "open_short" => Ok(Action::OpenShort),
            "close_long" => Ok(Action::CloseLong),
            "close_short" => Ok(Action::CloseShort),
            "hold" => Ok(Action::Hold),
            "wait" => Ok(Action::Wait),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

/// One trade decision produced by a decision engine. Lives for a single cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: Symbol,
    pub action: Action,
    #[serde(default)]
    pub leverage: u32,
    #[serde(default)]
    pub position_size_usd: Decimal,
    #[serde(default)]
    pub entry_price: Decimal,
    #[serde(default)]
    pub stop_loss: Decimal,
    #[serde(default)]
    pub take_profit: Decimal,
    /// 0 to 100. Kept signed so out-of-range engine output can be rejected explicitly.
    #[serde(default)]
    pub confidence: i32,
    #[serde(default)]
    pub risk_usd: Decimal,
    #[serde(default)]
    pub reasoning: String,
}

impl Decision {
    /// A bare decision with every numeric field zeroed.
    pub fn new(symbol: impl Into<Symbol>, action: Action) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            leverage: 0,
            position_size_usd: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            confidence: 0,
            risk_usd: Decimal::ZERO,
            reasoning: String::new(),
        }
    }

    /// Reward over risk, measured from entry to take-profit and entry to stop-loss.
    /// `None` when the risk leg is not strictly positive for the decision's side.
    pub fn reward_risk_ratio(&self) -> Option<Decimal> {
        let (reward, risk) = match self.action.side()? {
            Side::Long => (self.take_profit - self.entry_price, self.entry_price - self.stop_loss),
            Side::Short => (self.entry_price - self.take_profit, self.stop_loss - self.entry_price),
        };
        if risk <= Decimal::ZERO {
            return None;
        }
        reward.checked_div(risk)
    }
}

/// The full output of one decision-engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionBatch {
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub reasoning: String,
    /// Digest of the prompt the engine built, when the engine works from a prompt.
    #[serde(default)]
    pub prompt_digest: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl DecisionBatch {
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            decisions: Vec::new(),
            reasoning: String::new(),
            prompt_digest: None,
            generated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn actions_parse_from_engine_labels() {
        assert_eq!("OPEN_LONG".parse::<Action>(), Ok(Action::OpenLong));
        assert_eq!(" wait ".parse::<Action>(), Ok(Action::Wait));
        assert!(matches!("buy".parse::<Action>(), Err(Error::UnknownAction(_))));
    }

    #[test]
    fn action_priority_orders_close_before_open() {
        assert!(Action::CloseShort.priority() < Action::OpenLong.priority());
        assert!(Action::OpenShort.priority() < Action::Hold.priority());
    }

    #[test]
    fn decision_deserializes_with_defaults() {
        let raw = r#"{"symbol":"btc","action":"hold"}"#;
        let decision: Decision = serde_json::from_str(raw).expect("valid decision json");
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.symbol.as_str(), "BTC");
        assert_eq!(decision.position_size_usd, Decimal::ZERO);
    }

    #[test]
    fn reward_risk_ratio_for_both_sides() {
        let mut long = Decision::new("SOL", Action::OpenLong);
        long.entry_price = dec!(100);
        long.stop_loss = dec!(90);
        long.take_profit = dec!(130);
        assert_eq!(long.reward_risk_ratio(), Some(dec!(3)));

        let mut short = Decision::new("SOL", Action::OpenShort);
        short.entry_price = dec!(100);
        short.stop_loss = dec!(105);
        short.take_profit = dec!(90);
        assert_eq!(short.reward_risk_ratio(), Some(dec!(2)));

        short.stop_loss = dec!(95);
        assert_eq!(short.reward_risk_ratio(), None);
    }
}

// In crates/core-types/src/types.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A trading symbol, always stored in canonical (trimmed, upper-case) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub struct Symbol(pub String);

impl Symbol {
    /// Canonicalizes the raw symbol so that `btc`, ` BTC ` and `BTC` share one key.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// BTC and ETH (and their USDT pairs) get the major-coin leverage cap and value band.
    pub fn is_major(&self) -> bool {
        matches!(self.0.as_str(), "BTC" | "ETH" | "BTCUSDT" | "ETHUSDT")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The venue label used for protective orders.
    pub fn label(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

/// An open position as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    /// Absolute size in base units.
    pub quantity: Decimal,
    pub entry_price: Decimal,
    /// Latest known mark price; filled in during context assembly.
    pub mark_price: Decimal,
    pub leverage: u32,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Option<Decimal>,
}

impl Position {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.mark_or_entry()
    }

    pub fn mark_or_entry(&self) -> Decimal {
        if self.mark_price > Decimal::ZERO {
            self.mark_price
        } else {
            self.entry_price
        }
    }

    /// Unrealized move relative to entry, in percent of entry price.
    pub fn pnl_pct(&self) -> Decimal {
        if self.entry_price <= Decimal::ZERO || self.mark_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let change = (self.mark_price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED;
        match self.side {
            Side::Long => change,
            Side::Short => -change,
        }
    }
}

/// Account-level balances from the exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub total_equity: Decimal,
    pub margin_used: Decimal,
    pub unrealized_pnl: Decimal,
}

impl AccountState {
    pub fn available_balance(&self) -> Decimal {
        (self.total_equity - self.margin_used).max(Decimal::ZERO)
    }
}

/// Venue metadata for one tradable asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub symbol: Symbol,
    /// Index used by the exchange to address the asset in orders.
    pub index: u32,
    /// Number of decimals allowed in order sizes.
    pub size_decimals: u32,
    /// Number of decimals allowed in order prices.
    pub price_decimals: u32,
    pub max_leverage: u32,
    #[serde(default)]
    pub only_isolated: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub ema: BTreeMap<String, f64>,
    #[serde(default)]
    pub rsi: BTreeMap<String, f64>,
    #[serde(default)]
    pub macd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    /// Latest open interest in base units.
    pub latest: Decimal,
    pub average: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Funding {
    pub rate: f64,
}

/// A point-in-time view of one market, as returned by the market data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    pub price: Decimal,
    /// Percent change over the last hour.
    pub change_1h: f64,
    /// Percent change over the last four hours.
    pub change_4h: f64,
    #[serde(default)]
    pub indicators: Indicators,
    pub open_interest: Option<OpenInterest>,
    pub funding: Option<Funding>,
}

impl MarketSnapshot {
    /// Open interest valued in USD at the current price.
    pub fn open_interest_usd(&self) -> Option<Decimal> {
        self.open_interest.map(|oi| oi.latest * self.price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Ioc,
    Gtc,
}

/// A single order as handed to the exchange adapter. Prices and sizes are already
/// formatted to venue precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub asset: u32,
    pub symbol: Symbol,
    pub is_buy: bool,
    pub limit_price: String,
    pub size: String,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
    /// Client order id used for idempotent submission.
    pub cloid: Option<String>,
    pub trigger_price: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OrderStatus {
    Filled { average_price: Decimal, filled_size: Decimal },
    Resting,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: u64,
    pub cloid: Option<String>,
    pub status: OrderStatus,
}

impl OrderAck {
    pub fn filled_size(&self) -> Option<Decimal> {
        match self.status {
            OrderStatus::Filled { filled_size, .. } => Some(filled_size),
            _ => None,
        }
    }
}

/// Lifecycle state of a virtual trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraderState {
    Stopped,
    Running,
    Paused,
    Error,
}

impl fmt::Display for TraderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TraderState::Stopped => "stopped",
            TraderState::Running => "running",
            TraderState::Paused => "paused",
            TraderState::Error => "error",
        };
        f.write_str(label)
    }
}

impl FromStr for TraderState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(TraderState::Stopped),
            "running" => Ok(TraderState::Running),
            "paused" => Ok(TraderState::Paused),
            "error" => Ok(TraderState::Error),
            other => Err(Error::UnknownState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn symbol_is_canonicalized() {
        assert_eq!(Symbol::new(" btc "), Symbol::new("BTC"));
        assert_eq!(Symbol::from("eth").as_str(), "ETH");
    }

    #[test]
    fn major_coins_include_usdt_pairs() {
        assert!(Symbol::new("btc").is_major());
        assert!(Symbol::new("ETHUSDT").is_major());
        assert!(!Symbol::new("SOL").is_major());
    }

    #[test]
    fn available_balance_never_negative() {
        let account = AccountState {
            total_equity: dec!(100),
            margin_used: dec!(150),
            unrealized_pnl: dec!(0),
        };
        assert_eq!(account.available_balance(), Decimal::ZERO);
    }

    #[test]
    fn short_pnl_pct_is_mirrored() {
        let position = Position {
            symbol: Symbol::new("SOL"),
            side: Side::Short,
            quantity: dec!(2),
            entry_price: dec!(100),
            mark_price: dec!(90),
            leverage: 3,
            unrealized_pnl: dec!(20),
            liquidation_price: None,
        };
        assert_eq!(position.pnl_pct(), dec!(10));
    }

    #[test]
    fn trader_state_round_trips_through_str() {
        for state in [TraderState::Stopped, TraderState::Running, TraderState::Paused, TraderState::Error] {
            assert_eq!(state.to_string().parse::<TraderState>(), Ok(state));
        }
        assert!(matches!("zombie".parse::<TraderState>(), Err(Error::UnknownState(_))));
    }
}

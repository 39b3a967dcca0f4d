// In crates/execution/src/simulated.rs

use crate::types::{Portfolio, SimulationSettings};
use api_client::{BulkCancel, Error, ExchangeAdapter, PrecisionFormatter, ProtectiveOrders, Result};
use async_trait::async_trait;
use core_types::{AccountState, AssetInfo, OrderAck, OrderRequest, OrderStatus, Position, Side, Symbol, TimeInForce};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::str::FromStr;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestingKind {
    Limit,
    StopLoss,
    TakeProfit,
}

/// An order sitting on the simulated book.
#[derive(Debug, Clone, PartialEq)]
pub struct RestingOrder {
    pub order_id: u64,
    pub symbol: Symbol,
    pub kind: RestingKind,
    /// Side of the position this order protects (or would open, for plain limits).
    pub side: Side,
    pub quantity: Decimal,
    pub trigger: Decimal,
}

#[derive(Debug)]
struct SimState {
    portfolio: Portfolio,
    marks: HashMap<Symbol, Decimal>,
    leverage: HashMap<u32, u32>,
    acks_by_cloid: HashMap<String, OrderAck>,
    resting: Vec<RestingOrder>,
    placed: Vec<OrderRequest>,
    next_order_id: u64,
    scripted_failures: VecDeque<Error>,
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_order_id += 1;
        self.next_order_id
    }

    fn mark_for(&self, position: &Position) -> Decimal {
        self.marks.get(&position.symbol).copied().unwrap_or(position.entry_price)
    }

    fn unrealized(&self, position: &Position) -> Decimal {
        let mark = self.mark_for(position);
        match position.side {
            Side::Long => (mark - position.entry_price) * position.quantity,
            Side::Short => (position.entry_price - mark) * position.quantity,
        }
    }

    fn margin_used(&self) -> Decimal {
        self.portfolio
            .open_positions
            .values()
            .map(|p| p.quantity * self.mark_for(p) / Decimal::from(p.leverage.max(1)))
            .sum()
    }

    fn account(&self) -> AccountState {
        let unrealized_pnl: Decimal = self.portfolio.open_positions.values().map(|p| self.unrealized(p)).sum();
        AccountState {
            total_equity: self.portfolio.cash + unrealized_pnl,
            margin_used: self.margin_used(),
            unrealized_pnl,
        }
    }

    /// Realizes PnL on `quantity` of the position at `price` and returns what is left.
    fn realize(&mut self, symbol: &Symbol, quantity: Decimal, price: Decimal) -> Option<Position> {
        let mut position = self.portfolio.open_positions.remove(symbol)?;
        let closed = quantity.min(position.quantity);
        let pnl = match position.side {
            Side::Long => (price - position.entry_price) * closed,
            Side::Short => (position.entry_price - price) * closed,
        };
        self.portfolio.cash += pnl;
        self.portfolio.realized_pnl += pnl;
        position.quantity -= closed;
        if position.quantity > Decimal::ZERO {
            self.portfolio.open_positions.insert(symbol.clone(), position.clone());
            Some(position)
        } else {
            self.resting.retain(|o| &o.symbol != symbol);
            None
        }
    }
}

/// A paper exchange: fills IOC orders against mark prices with slippage and fees,
/// keeps a cash-plus-positions portfolio, and de-duplicates client order ids.
pub struct SimulatedExchange {
    name: String,
    settings: SimulationSettings,
    assets: BTreeMap<Symbol, AssetInfo>,
    state: Mutex<SimState>,
}

impl SimulatedExchange {
    pub fn new(name: impl Into<String>, settings: SimulationSettings) -> Self {
        let portfolio = Portfolio::new(settings.initial_equity);
        Self {
            name: name.into(),
            settings,
            assets: BTreeMap::new(),
            state: Mutex::new(SimState {
                portfolio,
                marks: HashMap::new(),
                leverage: HashMap::new(),
                acks_by_cloid: HashMap::new(),
                resting: Vec::new(),
                placed: Vec::new(),
                next_order_id: 0,
                scripted_failures: VecDeque::new(),
            }),
        }
    }

    pub fn with_asset(mut self, asset: AssetInfo) -> Self {
        self.assets.insert(asset.symbol.clone(), asset);
        self
    }

    fn asset(&self, symbol: &Symbol) -> Result<&AssetInfo> {
        self.assets
            .get(symbol)
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))
    }

    fn asset_by_index(&self, index: u32) -> Result<&AssetInfo> {
        self.assets
            .values()
            .find(|a| a.index == index)
            .ok_or_else(|| Error::InvalidParam(format!("unknown asset index {index}")))
    }

    fn fraction(value: f64) -> Decimal {
        Decimal::try_from(value).unwrap_or(Decimal::ZERO)
    }

    /// Updates the mark price and fires any protective order it crosses.
    pub async fn set_mark_price(&self, symbol: &Symbol, price: Decimal) {
        let mut state = self.state.lock().await;
        state.marks.insert(symbol.clone(), price);

        let triggered = state.resting.iter().find(|o| {
            &o.symbol == symbol
                && match (o.kind, o.side) {
                    (RestingKind::StopLoss, Side::Long) | (RestingKind::TakeProfit, Side::Short) => price <= o.trigger,
                    (RestingKind::StopLoss, Side::Short) | (RestingKind::TakeProfit, Side::Long) => price >= o.trigger,
                    (RestingKind::Limit, _) => false,
                }
        });
        if let Some(order) = triggered.cloned() {
            tracing::info!(
                exchange = %self.name,
                %symbol,
                kind = ?order.kind,
                trigger = %order.trigger,
                "Protective order triggered."
            );
            state.realize(symbol, order.quantity, order.trigger);
            state.resting.retain(|o| o.order_id != order.order_id);
        }
    }

    /// Makes the next adapter call fail with `error`. Calls consume failures in order.
    pub async fn fail_next(&self, error: Error) {
        self.state.lock().await.scripted_failures.push_back(error);
    }

    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.placed.clone()
    }

    pub async fn resting_orders(&self) -> Vec<RestingOrder> {
        self.state.lock().await.resting.clone()
    }

    pub async fn leverage_for(&self, asset: u32) -> Option<u32> {
        self.state.lock().await.leverage.get(&asset).copied()
    }

    pub async fn realized_pnl(&self) -> Decimal {
        self.state.lock().await.portfolio.realized_pnl
    }

    fn take_failure(state: &mut SimState) -> Result<()> {
        match state.scripted_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn parse(field: &str, raw: &str) -> Result<Decimal> {
        Decimal::from_str(raw).map_err(|_| Error::InvalidParam(format!("{field} '{raw}' is not a number")))
    }

    fn fill(&self, state: &mut SimState, order: &OrderRequest, asset: &AssetInfo) -> Result<OrderStatus> {
        let size = Self::parse("size", &order.size)?;
        let limit = Self::parse("price", &order.limit_price)?;
        if size <= Decimal::ZERO || limit <= Decimal::ZERO {
            return Err(Error::InvalidParam("size and price must be positive".to_string()));
        }

        let side = if order.is_buy { Side::Long } else { Side::Short };
        let existing = state.portfolio.open_positions.get(&order.symbol).cloned();

        if order.reduce_only && existing.as_ref().is_none_or(|p| p.side == side) {
            return Ok(OrderStatus::Cancelled);
        }

        let reference = state.marks.get(&order.symbol).copied().unwrap_or(limit);
        let crosses = if order.is_buy { reference <= limit } else { reference >= limit };
        if !crosses {
            return Ok(OrderStatus::Cancelled);
        }

        let slippage = Self::fraction(self.settings.slippage_percent);
        let price = if order.is_buy {
            (reference * (Decimal::ONE + slippage)).min(limit)
        } else {
            (reference * (Decimal::ONE - slippage)).max(limit)
        };

        let notional = size * price;
        let fee = notional * Self::fraction(self.settings.taker_fee);
        let leverage = state.leverage.get(&asset.index).copied().unwrap_or(1).max(1);

        let opens_exposure = existing.as_ref().is_none_or(|p| p.side == side);
        if opens_exposure {
            let required = notional / Decimal::from(leverage) + fee;
            let available = state.account().available_balance();
            if required > available {
                return Err(Error::Insufficient(format!(
                    "margin required {required} exceeds available {available}"
                )));
            }
        }

        state.portfolio.cash -= fee;

        match existing {
            Some(mut position) if position.side == side => {
                let total = position.quantity + size;
                position.entry_price = (position.entry_price * position.quantity + price * size) / total;
                position.quantity = total;
                position.leverage = leverage;
                state.portfolio.open_positions.insert(order.symbol.clone(), position);
            }
            Some(position) => {
                let remainder = size - position.quantity;
                state.realize(&order.symbol, size, price);
                if remainder > Decimal::ZERO && !order.reduce_only {
                    state.portfolio.open_positions.insert(
                        order.symbol.clone(),
                        Self::new_position(&order.symbol, side, remainder, price, leverage),
                    );
                }
            }
            None => {
                state
                    .portfolio
                    .open_positions
                    .insert(order.symbol.clone(), Self::new_position(&order.symbol, side, size, price, leverage));
            }
        }

        Ok(OrderStatus::Filled {
            average_price: price,
            filled_size: size,
        })
    }

    fn new_position(symbol: &Symbol, side: Side, quantity: Decimal, price: Decimal, leverage: u32) -> Position {
        Position {
            symbol: symbol.clone(),
            side,
            quantity,
            entry_price: price,
            mark_price: price,
            leverage,
            unrealized_pnl: Decimal::ZERO,
            liquidation_price: None,
        }
    }

    async fn rest_protective(
        &self,
        kind: RestingKind,
        symbol: &Symbol,
        side: Side,
        quantity: Decimal,
        trigger: Decimal,
    ) -> Result<()> {
        self.asset(symbol)?;
        if quantity <= Decimal::ZERO || trigger <= Decimal::ZERO {
            return Err(Error::InvalidParam("protective order needs positive size and trigger".to_string()));
        }
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        match state.portfolio.open_positions.get(symbol) {
            Some(p) if p.side == side => {}
            _ => return Err(Error::InvalidParam(format!("no {} position on {symbol} to protect", side.label()))),
        }
        let order_id = state.next_id();
        state.resting.retain(|o| !(&o.symbol == symbol && o.kind == kind));
        state.resting.push(RestingOrder {
            order_id,
            symbol: symbol.clone(),
            kind,
            side,
            quantity,
            trigger,
        });
        Ok(())
    }
}

#[async_trait]
impl ExchangeAdapter for SimulatedExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn account_state(&self) -> Result<AccountState> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        Ok(state.account())
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        let mut positions: Vec<Position> = state
            .portfolio
            .open_positions
            .values()
            .map(|p| Position {
                mark_price: state.mark_for(p),
                unrealized_pnl: state.unrealized(p),
                ..p.clone()
            })
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn asset_index(&self, symbol: &Symbol) -> Result<u32> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        Ok(self.asset(symbol)?.index)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;

        if let Some(cloid) = &order.cloid {
            if let Some(ack) = state.acks_by_cloid.get(cloid) {
                tracing::info!(exchange = %self.name, %cloid, "Duplicate client order id; returning first acknowledgement.");
                return Ok(ack.clone());
            }
        }

        let asset = self.asset(&order.symbol)?;
        if asset.index != order.asset {
            return Err(Error::InvalidParam(format!(
                "asset index {} does not match {}",
                order.asset, order.symbol
            )));
        }
        if !asset.is_active {
            return Err(Error::InvalidParam(format!("{} is not tradable", order.symbol)));
        }

        let status = match order.time_in_force {
            TimeInForce::Ioc => self.fill(&mut state, order, asset)?,
            TimeInForce::Gtc => OrderStatus::Resting,
        };

        let order_id = state.next_id();
        if status == OrderStatus::Resting {
            let side = if order.is_buy { Side::Long } else { Side::Short };
            state.resting.push(RestingOrder {
                order_id,
                symbol: order.symbol.clone(),
                kind: RestingKind::Limit,
                side,
                quantity: Self::parse("size", &order.size)?,
                trigger: Self::parse("price", &order.limit_price)?,
            });
        }

        let ack = OrderAck {
            order_id,
            cloid: order.cloid.clone(),
            status,
        };
        if let Some(cloid) = &order.cloid {
            state.acks_by_cloid.insert(cloid.clone(), ack.clone());
        }
        state.placed.push(order.clone());
        Ok(ack)
    }

    async fn cancel_order(&self, asset: u32, order_id: u64) -> Result<()> {
        let symbol = self.asset_by_index(asset)?.symbol.clone();
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        let before = state.resting.len();
        state.resting.retain(|o| !(o.order_id == order_id && o.symbol == symbol));
        if state.resting.len() == before {
            return Err(Error::InvalidParam(format!("no resting order {order_id} on {symbol}")));
        }
        Ok(())
    }

    async fn close_position(&self, symbol: &Symbol) -> Result<OrderAck> {
        self.asset(symbol)?;
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        let position = state
            .portfolio
            .open_positions
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::InvalidParam(format!("no open position on {symbol}")))?;

        let price = state.mark_for(&position);
        let fee = position.quantity * price * Self::fraction(self.settings.taker_fee);
        state.portfolio.cash -= fee;
        state.realize(symbol, position.quantity, price);
        state.resting.retain(|o| &o.symbol != symbol);

        let order_id = state.next_id();
        tracing::info!(exchange = %self.name, %symbol, %price, quantity = %position.quantity, "Simulated position closed.");
        Ok(OrderAck {
            order_id,
            cloid: None,
            status: OrderStatus::Filled {
                average_price: price,
                filled_size: position.quantity,
            },
        })
    }

    async fn update_leverage(&self, asset: u32, _is_cross: bool, leverage: u32) -> Result<()> {
        let info = self.asset_by_index(asset)?;
        if leverage == 0 || leverage > info.max_leverage {
            return Err(Error::RiskRejected(format!(
                "leverage {leverage} outside 1..={} for {}",
                info.max_leverage, info.symbol
            )));
        }
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        state.leverage.insert(asset, leverage);
        Ok(())
    }

    fn precision(&self) -> Option<&dyn PrecisionFormatter> {
        Some(self)
    }

    fn protective_orders(&self) -> Option<&dyn ProtectiveOrders> {
        Some(self)
    }

    fn bulk_cancel(&self) -> Option<&dyn BulkCancel> {
        Some(self)
    }
}

#[async_trait]
impl PrecisionFormatter for SimulatedExchange {
    async fn format_price(&self, symbol: &Symbol, price: Decimal) -> Result<String> {
        let asset = self.asset(symbol)?;
        let rounded = price.round_dp(asset.price_decimals).normalize();
        if rounded <= Decimal::ZERO {
            return Err(Error::InvalidParam(format!("price {price} rounds to zero for {symbol}")));
        }
        Ok(rounded.to_string())
    }

    async fn format_size(&self, symbol: &Symbol, size: Decimal) -> Result<String> {
        let asset = self.asset(symbol)?;
        let rounded = size
            .round_dp_with_strategy(asset.size_decimals, RoundingStrategy::ToZero)
            .normalize();
        if rounded <= Decimal::ZERO {
            return Err(Error::InvalidParam(format!("size {size} is below the lot size of {symbol}")));
        }
        Ok(rounded.to_string())
    }
}

#[async_trait]
impl ProtectiveOrders for SimulatedExchange {
    async fn set_stop_loss(&self, symbol: &Symbol, side: Side, quantity: Decimal, trigger: Decimal) -> Result<()> {
        self.rest_protective(RestingKind::StopLoss, symbol, side, quantity, trigger).await
    }

    async fn set_take_profit(&self, symbol: &Symbol, side: Side, quantity: Decimal, trigger: Decimal) -> Result<()> {
        self.rest_protective(RestingKind::TakeProfit, symbol, side, quantity, trigger).await
    }
}

#[async_trait]
impl BulkCancel for SimulatedExchange {
    async fn cancel_all_by_symbol(&self, symbol: &Symbol) -> Result<usize> {
        let mut state = self.state.lock().await;
        Self::take_failure(&mut state)?;
        let before = state.resting.len();
        state.resting.retain(|o| &o.symbol != symbol);
        Ok(before - state.resting.len())
    }
}

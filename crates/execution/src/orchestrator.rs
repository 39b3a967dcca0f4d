// In crates/execution/src/orchestrator.rs

use async_trait::async_trait;
use core_types::{Action, Decision, OrderRequest, Side, Symbol, TimeInForce};
use risk::tolerance::{USD_EPSILON, exceeds};
use rust_decimal::Decimal;
use std::time::Duration;

use crate::cloid::client_order_id;
use crate::precision::{format_price, format_size};
use crate::retry::RetryPolicy;
use crate::types::{ExecutionOutcome, ExecutionRequest, ProtectiveStatus};
use crate::{Error, Executor, Result};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns approved decisions into exchange orders.
///
/// Opens re-check the hard limits, push leverage, resolve a price, size the order
/// in base units, and submit a limit IOC order under a deterministic client order
/// id. Protective stop-loss and take-profit orders are attached afterwards on a
/// best-effort basis. Closes cancel resting orders first and then close at market.
#[derive(Debug, Clone)]
pub struct OrderExecutor {
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl Default for OrderExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), DEFAULT_CALL_TIMEOUT)
    }
}

impl OrderExecutor {
    pub fn new(retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self { retry, call_timeout }
    }

    async fn open(&self, request: &ExecutionRequest<'_>, side: Side) -> Result<ExecutionOutcome> {
        let ExecutionRequest {
            trader_id,
            decision,
            risk,
            exchange,
            market,
            now,
        } = *request;
        let symbol = &decision.symbol;

        if decision.position_size_usd <= Decimal::ZERO {
            return Err(Error::InvalidSize(decision.position_size_usd));
        }
        if exceeds(decision.position_size_usd, risk.max_position_size_usd, USD_EPSILON) {
            return Err(Error::LimitExceeded {
                what: "position size",
                value: decision.position_size_usd,
                limit: risk.max_position_size_usd,
            });
        }

        let cap = risk.leverage_cap_for(symbol);
        let leverage = if decision.leverage == 0 { cap } else { decision.leverage };
        if leverage > cap {
            return Err(Error::LimitExceeded {
                what: "leverage",
                value: Decimal::from(leverage),
                limit: Decimal::from(cap),
            });
        }

        let asset = self
            .retry
            .run("asset_index", self.call_timeout, move || exchange.asset_index(symbol))
            .await?;

        match tokio::time::timeout(self.call_timeout, exchange.update_leverage(asset, true, leverage)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(trader_id, %symbol, leverage, kind = %e.kind(), error = %e, "Leverage update failed; venue keeps its previous setting.");
            }
            Err(_) => {
                tracing::warn!(trader_id, %symbol, leverage, "Leverage update timed out; venue keeps its previous setting.");
            }
        }

        let price = self.resolve_price(decision, market).await?;
        let quantity = decision
            .position_size_usd
            .checked_div(price)
            .filter(|q| *q > Decimal::ZERO)
            .ok_or(Error::InvalidQuantity {
                size: decision.position_size_usd,
                price,
            })?;

        let limit_price = format_price(exchange, symbol, price).await;
        let size = format_size(exchange, symbol, quantity).await;
        let cloid = client_order_id(trader_id, symbol, decision.action, quantity, now);

        let order = OrderRequest {
            asset,
            symbol: symbol.clone(),
            is_buy: side == Side::Long,
            limit_price: limit_price.clone(),
            size: size.clone(),
            reduce_only: false,
            time_in_force: TimeInForce::Ioc,
            cloid: Some(cloid.clone()),
            trigger_price: None,
        };
        let ack = {
            let order = &order;
            self.retry
                .run("place_order", self.call_timeout, move || exchange.place_order(order))
                .await?
        };

        let Some(filled) = ack.filled_size().filter(|q| *q > Decimal::ZERO) else {
            tracing::warn!(
                trader_id,
                %symbol,
                side = side.label(),
                %cloid,
                order_id = ack.order_id,
                price = %limit_price,
                status = ?ack.status,
                "Open order did not fill; no protection attached."
            );
            return Err(Error::NotFilled {
                symbol: symbol.clone(),
                order_id: ack.order_id,
            });
        };
        tracing::info!(
            trader_id,
            %symbol,
            side = side.label(),
            %cloid,
            order_id = ack.order_id,
            price = %limit_price,
            size = %size,
            leverage,
            "Open order filled."
        );

        let protective = self.attach_protection(request, side, filled).await;

        Ok(ExecutionOutcome::Opened {
            cloid,
            asset,
            order_id: ack.order_id,
            quantity: filled,
            price: limit_price,
            size,
            leverage,
            protective,
        })
    }

    async fn resolve_price(&self, decision: &Decision, market: &dyn api_client::MarketDataAdapter) -> Result<Decimal> {
        if decision.entry_price > Decimal::ZERO {
            return Ok(decision.entry_price);
        }
        let symbol = &decision.symbol;
        let snapshot = self
            .retry
            .run("market_snapshot", self.call_timeout, move || market.snapshot(symbol))
            .await
            .map_err(|e| {
                tracing::warn!(%symbol, error = %e, "No entry price and market lookup failed.");
                Error::PriceUnavailable(symbol.clone())
            })?;
        if snapshot.price <= Decimal::ZERO {
            return Err(Error::PriceUnavailable(symbol.clone()));
        }
        Ok(snapshot.price)
    }

    async fn attach_protection(&self, request: &ExecutionRequest<'_>, side: Side, quantity: Decimal) -> ProtectiveStatus {
        let decision = request.decision;
        let symbol = &decision.symbol;
        let mut status = ProtectiveStatus::default();
        let Some(protective) = request.exchange.protective_orders() else {
            return status;
        };

        if decision.stop_loss > Decimal::ZERO {
            match tokio::time::timeout(
                self.call_timeout,
                protective.set_stop_loss(symbol, side, quantity, decision.stop_loss),
            )
            .await
            {
                Ok(Ok(())) => status.stop_loss = true,
                Ok(Err(e)) => {
                    tracing::warn!(trader_id = request.trader_id, %symbol, error = %e, "Stop-loss placement failed; position is open without it.");
                }
                Err(_) => {
                    tracing::warn!(trader_id = request.trader_id, %symbol, "Stop-loss placement timed out.");
                }
            }
        }
        if decision.take_profit > Decimal::ZERO {
            match tokio::time::timeout(
                self.call_timeout,
                protective.set_take_profit(symbol, side, quantity, decision.take_profit),
            )
            .await
            {
                Ok(Ok(())) => status.take_profit = true,
                Ok(Err(e)) => {
                    tracing::warn!(trader_id = request.trader_id, %symbol, error = %e, "Take-profit placement failed; position is open without it.");
                }
                Err(_) => {
                    tracing::warn!(trader_id = request.trader_id, %symbol, "Take-profit placement timed out.");
                }
            }
        }
        status
    }

    async fn close(&self, request: &ExecutionRequest<'_>, symbol: &Symbol) -> Result<ExecutionOutcome> {
        let exchange = request.exchange;

        if let Some(bulk) = exchange.bulk_cancel() {
            match tokio::time::timeout(self.call_timeout, bulk.cancel_all_by_symbol(symbol)).await {
                Ok(Ok(cancelled)) => {
                    tracing::debug!(trader_id = request.trader_id, %symbol, cancelled, "Resting orders cancelled before close.");
                }
                Ok(Err(e)) => {
                    tracing::warn!(trader_id = request.trader_id, %symbol, error = %e, "Cancelling resting orders failed; closing anyway.");
                }
                Err(_) => {
                    tracing::warn!(trader_id = request.trader_id, %symbol, "Cancelling resting orders timed out; closing anyway.");
                }
            }
        }

        let ack = self
            .retry
            .run("close_position", self.call_timeout, move || exchange.close_position(symbol))
            .await?;
        tracing::info!(trader_id = request.trader_id, %symbol, order_id = ack.order_id, "Position closed.");
        Ok(ExecutionOutcome::Closed { order_id: ack.order_id })
    }
}

#[async_trait]
impl Executor for OrderExecutor {
    fn name(&self) -> &'static str {
        "OrderExecutor"
    }

    async fn execute<'a>(&self, request: ExecutionRequest<'a>) -> Result<ExecutionOutcome> {
        let decision = request.decision;
        if decision.symbol.is_empty() {
            return Err(Error::MissingSymbol);
        }
        match decision.action {
            Action::OpenLong => self.open(&request, Side::Long).await,
            Action::OpenShort => self.open(&request, Side::Short).await,
            Action::CloseLong | Action::CloseShort => self.close(&request, &decision.symbol).await,
            Action::Hold | Action::Wait => Ok(ExecutionOutcome::NoOp),
        }
    }
}

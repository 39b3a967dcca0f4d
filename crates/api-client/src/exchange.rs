// In crates/api-client/src/exchange.rs

use async_trait::async_trait;
use core_types::{AccountState, OrderAck, OrderRequest, Position, Side, Symbol};
use rust_decimal::Decimal;

use crate::Result;

/// The operations every exchange integration must provide.
///
/// Optional venue features are exposed as capability segments: the accessor
/// returns `None` when the venue lacks the feature and callers fall back.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// A short, stable name for logs (e.g., "paper", "hyperliquid").
    fn name(&self) -> &str;

    async fn account_state(&self) -> Result<AccountState>;

    async fn positions(&self) -> Result<Vec<Position>>;

    /// Resolves the venue's numeric asset index for a symbol.
    async fn asset_index(&self, symbol: &Symbol) -> Result<u32>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    async fn cancel_order(&self, asset: u32, order_id: u64) -> Result<()>;

    /// Closes the whole position on `symbol` at market.
    async fn close_position(&self, symbol: &Symbol) -> Result<OrderAck>;

    async fn update_leverage(&self, asset: u32, is_cross: bool, leverage: u32) -> Result<()>;

    fn precision(&self) -> Option<&dyn PrecisionFormatter> {
        None
    }

    fn protective_orders(&self) -> Option<&dyn ProtectiveOrders> {
        None
    }

    fn bulk_cancel(&self) -> Option<&dyn BulkCancel> {
        None
    }
}

/// Formats prices and sizes to the venue's tick and lot precision.
#[async_trait]
pub trait PrecisionFormatter: Send + Sync {
    async fn format_price(&self, symbol: &Symbol, price: Decimal) -> Result<String>;

    async fn format_size(&self, symbol: &Symbol, size: Decimal) -> Result<String>;
}

/// Reduce-only stop-loss and take-profit orders attached to a position.
#[async_trait]
pub trait ProtectiveOrders: Send + Sync {
    async fn set_stop_loss(&self, symbol: &Symbol, side: Side, quantity: Decimal, trigger: Decimal) -> Result<()>;

    async fn set_take_profit(&self, symbol: &Symbol, side: Side, quantity: Decimal, trigger: Decimal) -> Result<()>;
}

/// Cancels every resting order on one symbol.
#[async_trait]
pub trait BulkCancel: Send + Sync {
    async fn cancel_all_by_symbol(&self, symbol: &Symbol) -> Result<usize>;
}

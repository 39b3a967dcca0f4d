// In crates/api-client/src/market.rs

use async_trait::async_trait;
use core_types::{AssetInfo, MarketSnapshot, Symbol};

use crate::Result;

/// Source of market snapshots and the tradable-asset directory.
#[async_trait]
pub trait MarketDataAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot>;

    async fn list_assets(&self) -> Result<Vec<AssetInfo>>;
}

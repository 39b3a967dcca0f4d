// In crates/api-client/src/in_memory.rs

use async_trait::async_trait;
use core_types::{AssetInfo, MarketSnapshot, OpenInterest, Symbol};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::{Error, MarketDataAdapter, Result};

/// A market data source backed by values pushed in by the caller.
/// Used for paper trading and as a deterministic source in tests.
#[derive(Debug)]
pub struct InMemoryMarket {
    name: String,
    snapshots: RwLock<BTreeMap<Symbol, MarketSnapshot>>,
    assets: RwLock<BTreeMap<Symbol, AssetInfo>>,
    unavailable: AtomicBool,
    snapshot_calls: AtomicUsize,
    asset_calls: AtomicUsize,
}

impl InMemoryMarket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snapshots: RwLock::new(BTreeMap::new()),
            assets: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
            snapshot_calls: AtomicUsize::new(0),
            asset_calls: AtomicUsize::new(0),
        }
    }

    pub fn upsert_snapshot(&self, snapshot: MarketSnapshot) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(snapshot.symbol.clone(), snapshot);
    }

    pub fn upsert_asset(&self, asset: AssetInfo) {
        let mut assets = self.assets.write().unwrap_or_else(PoisonError::into_inner);
        assets.insert(asset.symbol.clone(), asset);
    }

    /// Makes every call fail with `ExchangeDown` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn asset_calls(&self) -> usize {
        self.asset_calls.load(Ordering::SeqCst)
    }

    /// An active asset with two price decimals and four size decimals.
    pub fn make_asset(symbol: &str, index: u32, max_leverage: u32) -> AssetInfo {
        AssetInfo {
            symbol: Symbol::new(symbol),
            index,
            size_decimals: 4,
            price_decimals: 2,
            max_leverage,
            only_isolated: false,
            is_active: true,
        }
    }

    pub fn make_snapshot(symbol: &str, price: Decimal, change_1h: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: Symbol::new(symbol),
            price,
            change_1h,
            change_4h: change_1h,
            indicators: Default::default(),
            open_interest: Some(OpenInterest {
                latest: Decimal::ONE_THOUSAND * Decimal::ONE_THOUSAND,
                average: Decimal::ONE_THOUSAND * Decimal::ONE_THOUSAND,
            }),
            funding: None,
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::ExchangeDown(format!("{} market is unavailable", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataAdapter for InMemoryMarket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))
    }

    async fn list_assets(&self) -> Result<Vec<AssetInfo>> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let assets = self.assets.read().unwrap_or_else(PoisonError::into_inner);
        Ok(assets.values().cloned().collect())
    }
}

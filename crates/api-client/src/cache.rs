// In crates/api-client/src/cache.rs

use async_trait::async_trait;
use core_types::{AssetInfo, MarketSnapshot, Symbol};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{MarketDataAdapter, Result};

pub const SNAPSHOT_TTL: Duration = Duration::from_secs(15);
pub const ASSET_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// The tradable-asset directory, indexed by canonical symbol.
#[derive(Debug, Default)]
pub struct AssetDirectory {
    assets: Vec<AssetInfo>,
    by_symbol: HashMap<Symbol, usize>,
}

impl AssetDirectory {
    pub fn new(assets: Vec<AssetInfo>) -> Self {
        let by_symbol = assets
            .iter()
            .enumerate()
            .map(|(i, asset)| (Symbol::new(asset.symbol.as_str()), i))
            .collect();
        Self { assets, by_symbol }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&AssetInfo> {
        self.by_symbol.get(symbol).and_then(|i| self.assets.get(*i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetInfo> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Read-through cache in front of a market data adapter.
///
/// Entries expire by age only. Snapshots are cached per symbol; the asset
/// directory is always refreshed as a whole. Concurrent misses on the same key
/// each hit the source; refreshes are plain reads so that is harmless.
pub struct MarketCache {
    source: Arc<dyn MarketDataAdapter>,
    snapshot_ttl: Duration,
    asset_ttl: Duration,
    snapshots: RwLock<HashMap<Symbol, CacheEntry<MarketSnapshot>>>,
    assets: RwLock<Option<CacheEntry<Arc<AssetDirectory>>>>,
}

impl MarketCache {
    pub fn new(source: Arc<dyn MarketDataAdapter>) -> Self {
        Self::with_ttls(source, SNAPSHOT_TTL, ASSET_TTL)
    }

    pub fn with_ttls(source: Arc<dyn MarketDataAdapter>, snapshot_ttl: Duration, asset_ttl: Duration) -> Self {
        Self {
            source,
            snapshot_ttl,
            asset_ttl,
            snapshots: RwLock::new(HashMap::new()),
            assets: RwLock::new(None),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot> {
        let key = Symbol::new(symbol.as_str());
        if let Some(entry) = self.snapshots.read().await.get(&key) {
            if entry.is_fresh(self.snapshot_ttl) {
                return Ok(entry.value.clone());
            }
        }

        let snapshot = self.source.snapshot(&key).await?;
        self.snapshots
            .write()
            .await
            .insert(key, CacheEntry::new(snapshot.clone()));
        Ok(snapshot)
    }

    /// The full asset directory, refreshed when older than the asset TTL.
    pub async fn assets(&self) -> Result<Arc<AssetDirectory>> {
        if let Some(entry) = self.assets.read().await.as_ref() {
            if entry.is_fresh(self.asset_ttl) {
                return Ok(entry.value.clone());
            }
        }
        self.refresh_assets().await
    }

    /// Looks up one asset. A symbol missing from a fresh directory triggers one
    /// full refresh before giving up.
    pub async fn asset(&self, symbol: &Symbol) -> Result<Option<AssetInfo>> {
        let key = Symbol::new(symbol.as_str());
        let directory = self.assets().await?;
        if let Some(asset) = directory.get(&key) {
            return Ok(Some(asset.clone()));
        }
        let directory = self.refresh_assets().await?;
        Ok(directory.get(&key).cloned())
    }

    async fn refresh_assets(&self) -> Result<Arc<AssetDirectory>> {
        let assets = self.source.list_assets().await?;
        let directory = Arc::new(AssetDirectory::new(assets));
        tracing::debug!(source = %self.source.name(), count = directory.len(), "Refreshed asset directory.");
        *self.assets.write().await = Some(CacheEntry::new(directory.clone()));
        Ok(directory)
    }
}

#[async_trait]
impl MarketDataAdapter for MarketCache {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot> {
        MarketCache::snapshot(self, symbol).await
    }

    async fn list_assets(&self) -> Result<Vec<AssetInfo>> {
        Ok(self.assets().await?.iter().cloned().collect())
    }
}

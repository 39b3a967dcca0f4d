// In app/src/paper.rs

use api_client::InMemoryMarket;
use app_config::{PaperAsset, PaperSettings};
use core_types::{AssetInfo, MarketSnapshot, OpenInterest};
use execution::SimulatedExchange;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Name under which the paper venue is registered for both exchange and market.
pub const PAPER_PROVIDER: &str = "paper";

/// A simulated exchange and a static market feed seeded from the same asset list.
pub struct PaperVenue {
    pub exchange: Arc<SimulatedExchange>,
    pub market: Arc<InMemoryMarket>,
}

fn asset_info(asset: &PaperAsset, index: u32) -> AssetInfo {
    AssetInfo {
        symbol: asset.symbol.clone(),
        index,
        size_decimals: asset.size_decimals,
        price_decimals: asset.price_decimals,
        max_leverage: asset.max_leverage,
        only_isolated: false,
        is_active: true,
    }
}

fn snapshot(asset: &PaperAsset) -> MarketSnapshot {
    MarketSnapshot {
        symbol: asset.symbol.clone(),
        price: asset.price,
        change_1h: asset.change_1h,
        change_4h: asset.change_4h,
        indicators: Default::default(),
        open_interest: (asset.open_interest > Decimal::ZERO).then_some(OpenInterest {
            latest: asset.open_interest,
            average: asset.open_interest,
        }),
        funding: None,
    }
}

/// Builds the paper venue. Asset indices follow the order of `settings.assets`.
pub async fn build(settings: &PaperSettings) -> PaperVenue {
    let market = Arc::new(InMemoryMarket::new(PAPER_PROVIDER));
    let mut exchange = SimulatedExchange::new(PAPER_PROVIDER, settings.simulation.clone());

    for (index, asset) in (0u32..).zip(&settings.assets) {
        let info = asset_info(asset, index);
        market.upsert_asset(info.clone());
        market.upsert_snapshot(snapshot(asset));
        exchange = exchange.with_asset(info);
    }

    let exchange = Arc::new(exchange);
    for asset in &settings.assets {
        exchange.set_mark_price(&asset.symbol, asset.price).await;
    }
    tracing::info!(assets = settings.assets.len(), equity = %settings.simulation.initial_equity, "Paper venue ready.");

    PaperVenue { exchange, market }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::{ExchangeAdapter, MarketDataAdapter};
    use core_types::Symbol;
    use rust_decimal_macros::dec;

    fn make_asset(symbol: &str, price: Decimal, open_interest: Decimal) -> PaperAsset {
        PaperAsset {
            symbol: Symbol::new(symbol),
            price,
            change_1h: 1.2,
            change_4h: -0.4,
            open_interest,
            max_leverage: 20,
            size_decimals: 3,
            price_decimals: 1,
        }
    }

    #[tokio::test]
    async fn venue_shares_assets_between_exchange_and_market() {
        let settings = PaperSettings {
            simulation: Default::default(),
            assets: vec![
                make_asset("BTC", dec!(60000), dec!(100)),
                make_asset("SOL", dec!(150), Decimal::ZERO),
            ],
        };
        let venue = build(&settings).await;

        assert_eq!(venue.exchange.asset_index(&Symbol::new("SOL")).await.expect("index"), 1);
        let assets = venue.market.list_assets().await.expect("assets");
        assert_eq!(assets.len(), 2);

        let btc = venue.market.snapshot(&Symbol::new("BTC")).await.expect("snapshot");
        assert_eq!(btc.open_interest_usd(), Some(dec!(6000000)));
        let sol = venue.market.snapshot(&Symbol::new("SOL")).await.expect("snapshot");
        assert!(sol.open_interest.is_none());

        let account = venue.exchange.account_state().await.expect("account");
        assert_eq!(account.total_equity, settings.simulation.initial_equity);
    }
}

// In crates/api-client/src/lib.rs

pub mod cache;
pub mod error;
pub mod exchange;
pub mod in_memory;
pub mod market;

// Re-export public types
pub use cache::{AssetDirectory, MarketCache};
pub use error::{Error, ErrorKind, Result};
pub use exchange::{BulkCancel, ExchangeAdapter, PrecisionFormatter, ProtectiveOrders};
pub use in_memory::InMemoryMarket;
pub use market::MarketDataAdapter;

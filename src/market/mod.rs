//! Market data model and storage
//!
//! - `bar`: the PriceBar OHLCV model and its invariant
//! - `cache`: TTL-based cache store fed by the market data gateway
//! - `history`: read-only CSV archive used for indicator warm-up

pub mod bar;
pub mod cache;
pub mod history;

pub use bar::PriceBar;
pub use cache::{CacheStore, CachedBar, Freshness};
pub use history::HistoricalStore;

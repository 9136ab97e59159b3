//! Gateway trait definitions
//!
//! The two traits here are the process boundary: everything the bot knows
//! about the outside world goes through `MarketDataGateway` (prices in)
//! and `ExchangeGateway` (orders out). Both are object-safe so the
//! scheduler and executor can hold them as trait objects chosen at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::gateway::errors::GatewayResult;
use crate::gateway::types::{OrderAck, OrderRequest};
use crate::market::bar::PriceBar;

/// Supplies raw price bars on demand.
///
/// Implementations must distinguish transient from permanent failures via
/// `GatewayError::is_transient()` so the cache store can decide whether to
/// serve stale data or propagate the failure.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Fetch bars for one instrument over a half-open time range
    /// `[start, end)`. Returned bars are ordered by bucket start; gaps
    /// (holidays, outages) are simply absent, never synthesized.
    async fn fetch(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<PriceBar>>;

    /// Gateway name identifier for logs (e.g. "rest", "mock")
    fn gateway_name(&self) -> &'static str;
}

/// Places and queries orders.
///
/// Submitting the same `client_order_id` twice must never create two live
/// orders; the exchange side de-duplicates on that key.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Submit an order. The returned ack carries the order status as the
    /// exchange saw it at submission time.
    async fn submit_order(&self, order: OrderRequest) -> GatewayResult<OrderAck>;

    /// Look up an order by its client_order_id. `Ok(None)` means the
    /// exchange has no record of the id — the submission never arrived.
    async fn get_order(&self, client_order_id: &str) -> GatewayResult<Option<OrderAck>>;

    /// Gateway name identifier for logs (e.g. "rest", "mock")
    fn gateway_name(&self) -> &'static str;
}

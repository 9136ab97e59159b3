//! Wire types shared by the gateway traits and their implementations

use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// HTTP Client Constants
// =============================================================================

/// HTTP request timeout (seconds)
const HTTP_TIMEOUT_SECS: u64 = 10;
/// HTTP connection timeout (milliseconds) — fail fast if host unreachable
const HTTP_CONNECT_TIMEOUT_MS: u64 = 2_000;
/// Max idle connections per host in connection pool
const HTTP_POOL_MAX_IDLE: usize = 5;
/// How long idle connections stay in the pool (seconds)
const HTTP_POOL_IDLE_TIMEOUT_SECS: u64 = 60;
/// TCP keepalive interval (seconds)
const HTTP_TCP_KEEPALIVE_SECS: u64 = 30;

/// Create the HTTP client shared by the REST gateways.
///
/// Connection pooling + keepalive tuned for a periodic polling loop.
pub fn create_http_client(gateway_name: &str) -> reqwest::Client {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .pool_max_idle_per_host(HTTP_POOL_MAX_IDLE)
        .pool_idle_timeout(Duration::from_secs(HTTP_POOL_IDLE_TIMEOUT_SECS))
        .tcp_keepalive(Duration::from_secs(HTTP_TCP_KEEPALIVE_SECS))
        .connect_timeout(Duration::from_millis(HTTP_CONNECT_TIMEOUT_MS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    tracing::info!(
        phase = "init",
        gateway = %gateway_name,
        timeout_s = HTTP_TIMEOUT_SECS,
        connect_timeout_ms = HTTP_CONNECT_TIMEOUT_MS,
        pool_max_idle = HTTP_POOL_MAX_IDLE,
        "HTTP client configured"
    );
    client
}

// =============================================================================
// Order Types
// =============================================================================

/// Side of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Accepted,
    PartiallyFilled,
    Filled,
    Rejected,
    Cancelled,
    /// Ambiguous outcome (network cut mid-submit, unparseable reply).
    /// The executor must query by client_order_id before acting on this.
    Unknown,
}

impl OrderStatus {
    /// Terminal states: the order can never fill further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }
}

/// Order submission request
///
/// `client_order_id` is the idempotency key: it is generated once per
/// logical order and reused on every retry of that order, so the exchange
/// gateway can de-duplicate resubmissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub quantity: f64,
}

impl OrderRequest {
    pub fn market(
        client_order_id: String,
        instrument: String,
        side: OrderSide,
        quantity: f64,
    ) -> Self {
        Self {
            client_order_id,
            instrument,
            side,
            quantity,
        }
    }
}

/// Acknowledgement / status report for an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub client_order_id: String,
    /// Exchange-assigned id, if the order reached the exchange
    pub exchange_order_id: Option<String>,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    /// Average fill price; 0.0 until something fills
    pub fill_price: f64,
}

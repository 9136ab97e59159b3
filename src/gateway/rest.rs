//! REST gateway implementations
//!
//! Concrete `MarketDataGateway` / `ExchangeGateway` over a broker's HTTP
//! API. The wire protocol is deliberately narrow: bars in, orders out,
//! status by client order id. Credentials come from the environment, never
//! from configuration files.
//!
//! Error mapping drives the retry policy upstream: timeouts, connection
//! failures, 429 and 5xx are transient; other 4xx are permanent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::gateway::errors::{GatewayError, GatewayResult};
use crate::gateway::traits::{ExchangeGateway, MarketDataGateway};
use crate::gateway::types::{create_http_client, OrderAck, OrderRequest};
use crate::market::bar::PriceBar;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "BROKER_API_KEY";
/// Environment variable holding the API secret
pub const API_SECRET_ENV: &str = "BROKER_API_SECRET";

const API_KEY_HEADER: &str = "X-Api-Key";
const API_SECRET_HEADER: &str = "X-Api-Secret";

fn map_reqwest_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(0)
    } else if e.is_connect() {
        GatewayError::Connection(e.to_string())
    } else if e.is_decode() {
        GatewayError::InvalidResponse(e.to_string())
    } else {
        GatewayError::Connection(e.to_string())
    }
}

fn map_error_status(status: StatusCode, body: String) -> GatewayError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::RateLimited(body)
    } else if status.is_server_error() {
        // Transient: the broker may recover
        GatewayError::Connection(format!("server error {status}: {body}"))
    } else if status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::FORBIDDEN {
        GatewayError::Rejected(format!("{status}: {body}"))
    } else {
        GatewayError::InvalidResponse(format!("unexpected status {status}: {body}"))
    }
}

// =============================================================================
// Market data
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireBar {
    #[serde(rename = "t")]
    bucket_start: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Vec<WireBar>,
}

/// Bars over HTTP: `GET /v1/bars?symbol=&start=&end=`
pub struct RestMarketData {
    client: reqwest::Client,
    base_url: String,
}

impl RestMarketData {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: create_http_client("market-data"),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MarketDataGateway for RestMarketData {
    async fn fetch(
        &self,
        instrument: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<PriceBar>> {
        let url = format!("{}/v1/bars", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", instrument),
                ("start", &start.to_rfc3339()),
                ("end", &end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status, body));
        }

        let payload: BarsResponse = response.json().await.map_err(map_reqwest_error)?;
        debug!(instrument, bars = payload.bars.len(), "Bars fetched");
        Ok(payload
            .bars
            .into_iter()
            .map(|w| PriceBar {
                instrument: instrument.to_string(),
                bucket_start: w.bucket_start,
                open: w.open,
                high: w.high,
                low: w.low,
                close: w.close,
                volume: w.volume,
            })
            .collect())
    }

    fn gateway_name(&self) -> &'static str {
        "rest"
    }
}

// =============================================================================
// Exchange
// =============================================================================

/// Orders over HTTP: `POST /v1/orders`, `GET /v1/orders/by-client-id/{id}`
///
/// The broker de-duplicates on client_order_id: resubmitting an id that is
/// already live returns the existing order instead of creating a new one.
pub struct RestExchange {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl RestExchange {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: create_http_client("exchange"),
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Build from environment credentials. Missing credentials are a
    /// configuration error and fatal at startup.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, AppError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| AppError::Config(format!("{API_KEY_ENV} not set")))?;
        let api_secret = std::env::var(API_SECRET_ENV)
            .map_err(|_| AppError::Config(format!("{API_SECRET_ENV} not set")))?;
        Ok(Self::new(base_url, api_key, api_secret))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_SECRET_HEADER, &self.api_secret)
    }
}

#[async_trait]
impl ExchangeGateway for RestExchange {
    async fn submit_order(&self, order: OrderRequest) -> GatewayResult<OrderAck> {
        let url = format!("{}/v1/orders", self.base_url);
        let response = self
            .authed(self.client.post(&url))
            .json(&order)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status, body));
        }
        response.json().await.map_err(map_reqwest_error)
    }

    async fn get_order(&self, client_order_id: &str) -> GatewayResult<Option<OrderAck>> {
        let url = format!(
            "{}/v1/orders/by-client-id/{client_order_id}",
            self.base_url
        );
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status, body));
        }
        let ack: OrderAck = response.json().await.map_err(map_reqwest_error)?;
        Ok(Some(ack))
    }

    fn gateway_name(&self) -> &'static str {
        "rest"
    }
}

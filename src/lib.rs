//! swing_bot — periodic automated trading process
//!
//! A single recurring control loop couples a TTL-based market-data cache,
//! a pluggable strategy engine, and an idempotent order-execution path
//! backed by an append-only, crash-recoverable trade ledger:
//! - Gateways (market data in, orders out) behind narrow async traits
//! - Cache store with staleness tagging and degraded fallback
//! - Strategy engine: pure evaluation, risk-clamped sizing
//! - Order executor: client-order-id idempotency, reconcile before resubmit
//! - Trade ledger as the durable source of truth for positions

pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod ledger;
pub mod market;
pub mod strategy;

pub use error::AppError;

//! Application-wide error types using thiserror
//!
//! All errors in the application should be wrapped in AppError
//! to provide consistent error handling across the codebase.

use crate::gateway::errors::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A stored record (ledger, cache, history) is corrupt or inconsistent.
    /// Fatal at startup for the ledger; quarantined mid-run elsewhere.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Retry budget exhausted without reaching a terminal order state.
    /// Recoverable: the next tick re-evaluates from scratch.
    #[error("Order abandoned: {client_order_id} after {attempts} attempts")]
    OrderAbandoned {
        client_order_id: String,
        attempts: u32,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

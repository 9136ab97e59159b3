//! Gateway error types
//!
//! All gateway-related failures are wrapped in the GatewayError enum.
//! The transient-vs-permanent split drives retry policy: the cache store
//! and order executor retry transient failures with backoff, while
//! permanent failures are surfaced immediately.

use thiserror::Error;

/// Gateway-specific error types for market-data and exchange operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network operation timed out
    #[error("Network timeout after {0}ms")]
    Timeout(u64),

    /// Connection to the gateway failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Gateway asked us to slow down
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The exchange refused the order; retrying will not help
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// Invalid or unexpected response from the gateway
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_) | GatewayError::Connection(_) | GatewayError::RateLimited(_)
        )
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = GatewayError::Timeout(5000);
        assert_eq!(err.to_string(), "Network timeout after 5000ms");
    }

    #[test]
    fn test_connection_display() {
        let err = GatewayError::Connection("dns failure".to_string());
        assert_eq!(err.to_string(), "Connection failed: dns failure");
    }

    #[test]
    fn test_rejected_display() {
        let err = GatewayError::Rejected("insufficient buying power".to_string());
        assert_eq!(err.to_string(), "Order rejected: insufficient buying power");
    }

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Timeout(100).is_transient());
        assert!(GatewayError::Connection("reset".into()).is_transient());
        assert!(GatewayError::RateLimited("429".into()).is_transient());
        assert!(!GatewayError::Rejected("bad symbol".into()).is_transient());
        assert!(!GatewayError::InvalidResponse("malformed JSON".into()).is_transient());
    }
}

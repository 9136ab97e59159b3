//! Retry timing with exponential backoff
//!
//! Shared by the order executor for submit retries and status polling.
//! Delays double per attempt up to a cap, with random jitter to avoid
//! thundering-herd retries when several instruments fail at once.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Jitter added on top of each backoff delay (0..200ms)
const JITTER_RANGE_MS: u64 = 200;

/// Configuration for retry attempts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before the operation is abandoned
    pub max_attempts: u32,
    /// Initial delay in milliseconds (doubles each attempt)
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_attempts == 0 {
            return Err(AppError::Config(
                "retry: max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.initial_delay_ms == 0 || self.max_delay_ms < self.initial_delay_ms {
            return Err(AppError::Config(format!(
                "retry: delays must satisfy 0 < initial ({}) <= max ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Base delay for a given attempt (0-indexed), before jitter.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.min(20);
        std::cmp::min(
            self.initial_delay_ms.saturating_mul(1u64 << shift),
            self.max_delay_ms,
        )
    }

    /// Sleep for the attempt's backoff delay plus jitter.
    pub async fn wait(&self, attempt: u32) {
        let jitter = rand::random::<u64>() % JITTER_RANGE_MS;
        let delay = self.base_delay_ms(attempt) + jitter;
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_delay_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 6,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        };
        assert_eq!(config.base_delay_ms(0), 500);
        assert_eq!(config.base_delay_ms(1), 1000);
        assert_eq!(config.base_delay_ms(2), 2000);
        assert_eq!(config.base_delay_ms(3), 4000);
        assert_eq!(config.base_delay_ms(4), 5000);
        assert_eq!(config.base_delay_ms(10), 5000);
        // Huge attempt counts must not overflow the shift
        assert_eq!(config.base_delay_ms(63), 5000);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 100,
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_wait_sleeps_at_least_base_delay() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 100,
        };
        let start = std::time::Instant::now();
        config.wait(1).await;
        // Base for attempt 1 is 20ms; jitter only adds on top
        assert!(start.elapsed().as_millis() >= 20);
    }
}

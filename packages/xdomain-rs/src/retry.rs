//! Backoff and error classification for domain queries
//!
//! The watcher and relayer keep polling through transient domain failures;
//! these helpers decide how long to back off and whether an error is worth
//! retrying at all.

use std::time::Duration;

/// Query retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs = self.initial_backoff.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.min(63) as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Classifies domain errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues)
    Transient,
    /// Permanent failure - do not retry (invalid params, unknown method)
    Permanent,
    /// Unknown error - treated as permanent by the watcher
    Unknown,
}

/// Classify an error message for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
        || error_lower.contains("header not found")
    {
        return ErrorClass::Transient;
    }

    if error_lower.contains("invalid params")
        || error_lower.contains("invalid parameters")
        || error_lower.contains("method not found")
        || error_lower.contains("invalid argument")
        || error_lower.contains("unauthorized")
        || error_lower.contains("forbidden")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.backoff_for_attempt(4), Duration::from_secs(32));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(60)); // capped
        assert_eq!(config.backoff_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("connection refused"), ErrorClass::Transient);
        assert_eq!(classify_error("HTTP 503 Service Unavailable"), ErrorClass::Transient);
        assert_eq!(classify_error("Too Many Requests"), ErrorClass::Transient);
        assert_eq!(classify_error("invalid params"), ErrorClass::Permanent);
        assert_eq!(classify_error("the method eth_foo does not exist/is not available: method not found"), ErrorClass::Permanent);
        assert_eq!(classify_error("some unknown error"), ErrorClass::Unknown);
    }
}

use std::time::Duration;

/// Retry and timeout parameters attached to every request.
///
/// A zero `timeout`, `stall_timeout` or `connection_timeout` disables that timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryParameters {
    /// Maximum number of attempts (including the first). At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Relative jitter: each delay is scaled by `1 + U(-fuzz, fuzz)`.
    pub fuzz_factor: f64,
    /// Whole-request timeout, enforced by the transport plugin.
    pub timeout: Duration,
    /// Maximum gap between progress events once bytes are flowing.
    pub stall_timeout: Duration,
    /// Maximum wait for the first byte.
    pub connection_timeout: Duration,
}

impl Default for RetryParameters {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            fuzz_factor: 0.5,
            timeout: Duration::from_millis(30_000),
            stall_timeout: Duration::from_millis(5_000),
            connection_timeout: Duration::from_millis(10_000),
        }
    }
}

/// The parameters used when a request does not bring its own.
pub fn default_retry_parameters() -> RetryParameters {
    RetryParameters::default()
}

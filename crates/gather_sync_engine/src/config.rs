//! Configuration for the sync engine.

use gather_sync_protocol::SyncPolicy;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote store.
    pub base_url: String,
    /// Conflict policy per synchronized collection.
    pub policy: SyncPolicy,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            policy: SyncPolicy::default(),
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-collection conflict policy table.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per cycle.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the wait before the given attempt (0-indexed).
    ///
    /// Attempt 0 runs immediately. Each later attempt waits
    /// `initial_delay` scaled geometrically by `backoff_multiplier`,
    /// saturating at `max_delay`, with up to 25% extra when jitter is
    /// enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(backoffs) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let scaled =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(backoffs.min(63) as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());

        if !self.add_jitter {
            return Duration::from_secs_f64(capped);
        }
        Duration::from_secs_f64(capped * (1.0 + clock_jitter() / 4.0))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Jitter fraction in `[0, 1)`, folded out of the clock's subsecond
/// nanoseconds so the engine carries no RNG dependency.
fn clock_jitter() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 997) / 997.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use gather_sync_protocol::ConflictPolicy;

    #[test]
    fn sync_config_builder() {
        let policy = SyncPolicy {
            settings: ConflictPolicy::ServerWins,
            ..SyncPolicy::default()
        };
        let config = SyncConfig::new("https://api.gather.example")
            .with_policy(policy)
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.base_url, "https://api.gather.example");
        assert_eq!(config.policy.settings, ConflictPolicy::ServerWins);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn first_attempt_waits_for_nothing() {
        assert_eq!(RetryConfig::default().delay_for_attempt(0), Duration::ZERO);
        assert_eq!(RetryConfig::no_retry().delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_geometrically_with_bounded_jitter() {
        let config = RetryConfig::new(4)
            .with_initial_delay(Duration::from_millis(80))
            .with_backoff_multiplier(3.0);

        let first = config.delay_for_attempt(1);
        assert!(first >= Duration::from_millis(80));
        assert!(first <= Duration::from_millis(100));

        let third = config.delay_for_attempt(3);
        assert!(third >= Duration::from_millis(720));
        assert!(third <= Duration::from_millis(900));
    }

    #[test]
    fn backoff_saturates_at_the_ceiling() {
        let config = RetryConfig::new(8)
            .with_initial_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(3))
            .with_backoff_multiplier(4.0);

        let late = config.delay_for_attempt(7);
        assert!(late >= Duration::from_secs(3));
        assert!(late <= Duration::from_millis(3750));
    }

    #[test]
    fn jitter_can_be_switched_off() {
        let mut config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(500));
        config.add_jitter = false;

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(1));
    }
}

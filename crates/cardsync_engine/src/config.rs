//! Configuration for the sync engine.

use cardsync_dedupe::DUPLICATE_THRESHOLD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to a local contact whose remote object disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrphanPolicy {
    /// Delete the local contact along with its mapping.
    #[default]
    DeleteLocal,
    /// Keep the local contact; only the mapping is dropped.
    KeepLocal,
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retry configuration for individual remote calls.
    pub retry: RetryConfig,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
    /// Orphaned local contacts handling.
    pub orphan_policy: OrphanPolicy,
    /// Re-run URL validation (including DNS) before every connect.
    pub revalidate_before_connect: bool,
    /// Pin the HTTP client to the addresses seen during validation.
    pub pin_resolved_addresses: bool,
    /// Similarity threshold for "possible duplicate" hints on staged imports.
    pub duplicate_threshold: f64,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// How long resolved conflicts are kept before a run prunes them.
    pub resolved_conflict_retention: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            orphan_policy: OrphanPolicy::default(),
            revalidate_before_connect: true,
            pin_resolved_addresses: true,
            duplicate_threshold: DUPLICATE_THRESHOLD,
            user_agent: concat!("cardsync/", env!("CARGO_PKG_VERSION")).to_string(),
            resolved_conflict_retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the orphan policy.
    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    /// Enables or disables URL revalidation before connecting.
    pub fn with_revalidation(mut self, enabled: bool) -> Self {
        self.revalidate_before_connect = enabled;
        self
    }

    /// Enables or disables DNS pinning.
    pub fn with_address_pinning(mut self, enabled: bool) -> Self {
        self.pin_resolved_addresses = enabled;
        self
    }

    /// Sets the duplicate hint threshold.
    pub fn with_duplicate_threshold(mut self, threshold: f64) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets how long resolved conflicts are kept.
    pub fn with_resolved_conflict_retention(mut self, retention: Duration) -> Self {
        self.resolved_conflict_retention = retention;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
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
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
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

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top.
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

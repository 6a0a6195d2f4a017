//! Retry policy for blocking remote operations
//!
//! Every attempt runs in place on the calling thread; failed attempts sleep
//! with an exponential backoff (`base_delay`, `2 * base_delay`, `4 * base_delay`, ...).

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts for connect and read operations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first failed attempt (in milliseconds)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (values below 1 are treated as 1)
    pub max_attempts: u32,

    /// Delay after the first failure; doubles on every further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy that retries without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Run `operation` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the error of the last attempt on exhaustion.
    pub fn run<T, E, F>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("{} attempt {}/{}", label, attempt, attempts);

            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    warn!("{} failed after {} attempts: {}", label, attempts, e);
                    return Err(e);
                },
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}...",
                        label, attempt, attempts, e, delay
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                },
            }
        }
    }
}

//! Bounded retry around a single upload attempt

use std::time::Duration;

use super::stop::StopToken;
use crate::config::UploadConfig;
use crate::types::UploadResult;

/// Retry budget and pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Pause before each retry, interrupted by a stop
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(1),
        }
    }
}

/// Result of the last attempt plus how many attempts ran
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub result: UploadResult,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    /// Run `attempt` until it succeeds, the budget is spent, or `stop` fires.
    ///
    /// The closure receives the zero-based attempt index. Attempt 0 runs immediately;
    /// every later attempt waits `delay` first. Only the final attempt's result is kept.
    pub fn run<F>(&self, stop: &StopToken, mut attempt: F) -> RetryOutcome
    where
        F: FnMut(u32) -> UploadResult,
    {
        let mut index = 0;
        loop {
            let result = attempt(index);
            let attempts = index + 1;

            if !result.is_error() || stop.is_stopped() || index >= self.max_retries {
                return RetryOutcome { result, attempts };
            }

            tracing::warn!(
                "Upload attempt {}/{} failed, retrying in {:?}",
                attempts,
                self.max_retries + 1,
                self.delay
            );

            if stop.wait_timeout(self.delay) {
                tracing::debug!("Stop requested during retry backoff");
                return RetryOutcome { result, attempts };
            }

            index += 1;
        }
    }
}

// src/crawl/retry.rs
// =============================================================================
// The retry policy, kept apart from the orchestrator so it can be tested
// without a network or a runtime.
//
// After a failed attempt the orchestrator asks `decide` what to do:
// - 4xx: the server has definitively said no. Drop the URL, no retry
// - attempts left and the error is retryable: wait attempt x base, retry
// - otherwise: give up and report a terminal failure
// =============================================================================

use crate::fetch::FetchError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again
    Retry { backoff: Duration },
    /// Terminal and silent: the URL produces no result
    Drop,
    /// Terminal: report a failure for the URL
    GiveUp,
}

impl RetryPolicy {
    // Parameters:
    //   attempt: 1-based number of the attempt that just failed
    //   error: why it failed
    pub fn decide(&self, attempt: u32, error: &FetchError) -> RetryDecision {
        if error.is_client_error() {
            RetryDecision::Drop
        } else if !error.is_retryable() || attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                backoff: self.backoff(attempt),
            }
        }
    }

    /// Linear backoff: attempt x base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

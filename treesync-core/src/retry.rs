//! Fixed-delay retry loop for filesystem operations that may hit a transient
//! lock.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_DELAY_MS: u64 = 250;

/// How many times to run an operation and how long to wait between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// A policy with no delay between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// Blocks the calling thread for [`Self::delay`] between attempts. The
    /// error of the last attempt is returned unchanged.
    pub fn attempt<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut remaining = self.attempts.max(1);
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    remaining -= 1;
                    if remaining == 0 {
                        return Err(err);
                    }
                    tracing::debug!(error = %err, remaining, "operation failed, retrying");
                    let delay = self.delay();
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }
}

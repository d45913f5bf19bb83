//! Blocking HTTP helpers shared by the live collaborators.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use tracing::debug;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded retry with exponential back-off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub initial_delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// Sleeps `initial_delay`, then `initial_delay × backoff`, ... between attempts.
    pub fn run<T, E: Display>(&self, mut op: impl FnMut() -> Result<T, E>) -> Result<T, String> {
        let attempts = self.attempts.max(1);
        let mut delay = self.initial_delay;
        let mut last_err = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                thread::sleep(delay);
                delay = delay.mul_f64(self.backoff);
            }
            match op() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    debug!(attempt, error = %e, "request attempt failed");
                    last_err = e.to_string();
                }
            }
        }
        Err(format!("failed after {attempts} attempts: {last_err}"))
    }
}

pub fn build_client() -> Result<Client, String> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

/// Turn a non-2xx response into an error.
pub fn check_status(resp: Response) -> Result<Response, String> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(format!("HTTP status {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn retries_until_success() {
        let mut calls = 0;
        let out = instant().run(|| {
            calls += 1;
            if calls < 3 { Err("flaky") } else { Ok(calls) }
        });
        assert_eq!(out, Ok(3));
    }

    #[test]
    fn gives_up_after_attempts() {
        let mut calls = 0;
        let out: Result<(), String> = instant().run(|| {
            calls += 1;
            Err("down")
        });
        assert_eq!(calls, 3);
        assert!(out.unwrap_err().contains("down"));
    }
}

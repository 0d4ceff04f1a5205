use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::time::{sleep, Instant};

use crate::{PrerenderError, Result};

/// Tunes the exponential backoff between upstream attempts.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// First wait in milliseconds.
    pub initial_interval_ms: u64,
    /// Growth factor applied after every wait.
    pub multiplier: f64,
    /// Ceiling for a single wait in milliseconds.
    pub max_interval_ms: u64,
    /// Jitter ratio in `[0, 1]`; each wait is drawn from `interval * (1 ± factor)`.
    pub randomization_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 50,
            multiplier: 1.5,
            max_interval_ms: 30_000,
            randomization_factor: 0.5,
        }
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Stop and return the value.
    Success(T),
    /// Wait and try again while the budget allows it.
    Transient(PrerenderError),
    /// Stop immediately with this error.
    Permanent(PrerenderError),
}

/// Backoff bookkeeping for one logical fetch.
#[derive(Debug)]
pub struct RetryState {
    policy: BackoffPolicy,
    budget: Option<Duration>,
    current: Duration,
    started: Instant,
    attempts: u32,
}

impl RetryState {
    /// A zero `budget` never runs out.
    pub fn new(policy: BackoffPolicy, budget: Duration) -> Self {
        Self {
            policy,
            budget: (!budget.is_zero()).then_some(budget),
            current: Duration::from_millis(policy.initial_interval_ms),
            started: Instant::now(),
            attempts: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the wait before the next attempt, or `None` once waiting would
    /// overrun the budget.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let delay = randomize(self.current, self.policy.randomization_factor);
        self.current = self.grow(self.current);

        if let Some(budget) = self.budget {
            if self.elapsed() + delay > budget {
                return None;
            }
        }
        Some(delay)
    }

    fn grow(&self, interval: Duration) -> Duration {
        let max = Duration::from_millis(self.policy.max_interval_ms);
        let next = interval.as_secs_f64() * self.policy.multiplier.max(1.0);
        if next >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(next)
        }
    }
}

fn randomize(interval: Duration, factor: f64) -> Duration {
    let factor = if factor.is_finite() {
        factor.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if factor == 0.0 || interval.is_zero() {
        return interval;
    }
    let base = interval.as_secs_f64();
    let delta = base * factor;
    Duration::from_secs_f64(rand::rng().random_range((base - delta)..=(base + delta)))
}

/// Runs `operation` until it succeeds, fails permanently, or `budget` runs
/// out. The closure receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(policy: BackoffPolicy, budget: Duration, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let mut state = RetryState::new(policy, budget);
    loop {
        state.attempts += 1;
        match operation(state.attempts).await {
            Outcome::Success(value) => return Ok(value),
            Outcome::Permanent(err) => return Err(err),
            Outcome::Transient(err) => {
                let Some(delay) = state.next_backoff() else {
                    return Err(PrerenderError::RetriesExhausted {
                        attempts: state.attempts,
                        elapsed: state.elapsed(),
                        last: Box::new(err),
                    });
                };

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt = state.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying prerender fetch"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = err;

                sleep(delay).await;
            }
        }
    }
}

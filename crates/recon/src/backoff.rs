//! Exponential backoff with jitter, bounded by attempt count and/or a total
//! time budget.
//!
//! A [`Backoff`] is owned by exactly one retry sequence. Each call to
//! [`Backoff::next`] advances its state; it is not a pure query.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Retry limits. `max_attempts` always applies; `max_interval` and
/// `max_elapsed` are independent optional bounds and may be combined.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries permitted after the first attempt.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub initial_interval: Duration,
    /// Hard ceiling on a single wait (before jitter).
    pub max_interval: Option<Duration>,
    /// Budget for the whole sequence, measured from the first attempt.
    pub max_elapsed: Option<Duration>,
    /// Fraction of the backoff added as uniform random jitter, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(200),
            max_interval: Some(Duration::from_secs(2)),
            max_elapsed: None,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RetryState {
    pub attempt: u32,
    pub last_backoff: Duration,
    pub start: Instant,
}

/// Snapshot for logging. Has no effect on retry decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryMetrics {
    pub attempt: u32,
    pub last_backoff: Duration,
    pub elapsed: Duration,
}

pub struct Backoff {
    policy: RetryPolicy,
    state: RetryState,
    /// Un-jittered wait from the previous call; doubled on the next one.
    base: Duration,
    rng: StdRng,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// Use a caller-supplied generator (seeded in tests for repeatable jitter).
    pub fn with_rng(policy: RetryPolicy, rng: StdRng) -> Self {
        Self {
            state: RetryState {
                attempt: 0,
                last_backoff: Duration::ZERO,
                start: Instant::now(),
            },
            base: Duration::ZERO,
            policy,
            rng,
        }
    }

    /// Measure the time budget from `start` instead of construction time.
    pub fn started_at(mut self, start: Instant) -> Self {
        self.state.start = start;
        self
    }

    fn remaining(&self) -> Option<Duration> {
        self.policy
            .max_elapsed
            .map(|budget| budget.saturating_sub(self.state.start.elapsed()))
    }

    /// Whether another attempt is permitted right now.
    pub fn should_retry(&self) -> bool {
        if self.state.attempt >= self.policy.max_attempts {
            return false;
        }
        match self.remaining() {
            Some(left) => !left.is_zero(),
            None => true,
        }
    }

    /// Wait before the next attempt, or `None` to stop retrying.
    ///
    /// Never returns a zero-length wait together with permission to retry.
    pub fn next(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        let remaining = self.remaining();

        let mut base = if self.state.attempt == 0 {
            self.policy.initial_interval
        } else {
            self.base.saturating_mul(2)
        };
        if let Some(ceiling) = self.policy.max_interval {
            base = base.min(ceiling);
        }
        if let Some(left) = remaining {
            base = base.min(left);
        }
        if base.is_zero() {
            return None;
        }

        let jitter = base.mul_f64(self.rng.gen::<f64>() * self.policy.jitter);
        let mut wait = base.saturating_add(jitter);
        if let Some(left) = remaining {
            wait = wait.min(left);
        }

        self.base = base;
        self.state.last_backoff = wait;
        self.state.attempt += 1;
        Some(wait)
    }

    pub fn metrics(&self) -> RetryMetrics {
        RetryMetrics {
            attempt: self.state.attempt,
            last_backoff: self.state.last_backoff,
            elapsed: self.state.start.elapsed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The error was not worth retrying. `attempts` counts the transient
    /// failures that preceded it plus the failing call itself.
    Permanent { attempts: u32, error: E },
    /// The policy denied another attempt.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of times the operation ran.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent { error, .. } => error,
            Self::Exhausted { last_error, .. } => last_error,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent { error, .. } => write!(f, "{error}"),
            Self::Exhausted { attempts, elapsed, last_error } => write!(
                f,
                "retries exhausted after {attempts} attempt(s) in {:.1}s: {last_error}",
                elapsed.as_secs_f64()
            ),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy stops it. Sleeps the calling thread between attempts.
pub fn retry<T, E, F, P>(
    policy: &RetryPolicy,
    op_name: &str,
    is_transient: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let mut backoff = Backoff::new(policy.clone());
    loop {
        match op() {
            Ok(value) => {
                let attempt = backoff.metrics().attempt;
                if attempt > 0 {
                    log::debug!("{op_name}: succeeded after {} attempt(s)", attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if !is_transient(&e) => {
                return Err(RetryError::Permanent {
                    attempts: backoff.metrics().attempt + 1,
                    error: e,
                })
            }
            Err(e) => match backoff.next() {
                Some(wait) => {
                    let m = backoff.metrics();
                    log::debug!(
                        "{op_name}: retry {}/{} in {}ms ({e})",
                        m.attempt,
                        policy.max_attempts,
                        wait.as_millis(),
                    );
                    thread::sleep(wait);
                }
                None => {
                    let m = backoff.metrics();
                    log::warn!("{op_name}: giving up after {} attempt(s): {e}", m.attempt + 1);
                    return Err(RetryError::Exhausted {
                        attempts: m.attempt + 1,
                        elapsed: m.elapsed,
                        last_error: e,
                    });
                }
            },
        }
    }
}

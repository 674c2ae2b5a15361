//! # Condition polling
//!
//! Bounded-time retry of a tri-state [`Condition`]. Every wait in the harness
//! is built on [`Poller`].
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use systemtest::poll::{poll_fn, Poller, Probe};
//!
//! # async fn example() -> systemtest::Result<()> {
//! let mut attempts = 0;
//! let value = Poller::new("third time lucky", Duration::from_secs(1), Duration::from_secs(10))?
//!     .until(poll_fn(|| {
//!         attempts += 1;
//!         let current = attempts;
//!         async move {
//!             if current == 3 { Probe::Ready(current) } else { Probe::Pending }
//!         }
//!     }))
//!     .await?;
//! assert_eq!(value, 3);
//! # Ok(())
//! # }
//! ```

mod ensemble;
mod job;
mod waits;

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, trace};

use crate::config::{GLOBAL_POLL_INTERVAL, GLOBAL_TIMEOUT};
use crate::{Error, Result};

pub use ensemble::{broker_api_versions, wait_for_ensemble_status};
pub use job::{job_pod_name, job_state, wait_for_job_success, JobCompletion};
pub use waits::{wait_for_namespace_deletion, wait_for_pod_deletion, wait_for_secret};

/// Result of a single condition evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The awaited state has been reached.
    Ready(T),
    /// Not there yet; evaluate again after the poll interval.
    Pending,
    /// A terminal bad state was observed. Polling stops immediately.
    Failed(String),
}

impl From<bool> for Probe<()> {
    fn from(ready: bool) -> Self {
        if ready {
            Probe::Ready(())
        } else {
            Probe::Pending
        }
    }
}

/// A check of external state, re-evaluated until it settles.
///
/// Implementations only observe; they must not mutate harness state.
pub trait Condition: Send {
    type Output: Send;

    fn evaluate(&mut self) -> impl Future<Output = Probe<Self::Output>> + Send;
}

/// Adapter turning an async closure into a [`Condition`].
pub struct FnCondition<F>(F);

/// Build a condition from a closure returning a `Probe` future.
pub fn poll_fn<F>(check: F) -> FnCondition<F> {
    FnCondition(check)
}

impl<F, Fut, T> Condition for FnCondition<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Probe<T>> + Send,
    T: Send,
{
    type Output = T;

    fn evaluate(&mut self) -> impl Future<Output = Probe<T>> + Send {
        (self.0)()
    }
}

/// Validated polling cadence and deadline for one wait.
#[derive(Debug, Clone)]
pub struct Poller {
    description: String,
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    /// The interval must be non-zero and strictly shorter than the timeout.
    pub fn new(description: impl Into<String>, interval: Duration, timeout: Duration) -> Result<Self> {
        let description = description.into();
        if interval.is_zero() {
            return Err(Error::InvalidPollSettings(format!(
                "{description}: poll interval must be positive"
            )));
        }
        if timeout <= interval {
            return Err(Error::InvalidPollSettings(format!(
                "{description}: timeout {timeout:?} must exceed poll interval {interval:?}"
            )));
        }
        Ok(Self {
            description,
            interval,
            timeout,
        })
    }

    /// Poller with the global 1s / 300s cadence.
    pub fn global(description: impl Into<String>) -> Result<Self> {
        Self::new(description, GLOBAL_POLL_INTERVAL, GLOBAL_TIMEOUT)
    }

    fn timed_out(&self) -> Error {
        Error::TimedOut {
            description: self.description.clone(),
            timeout: self.timeout,
        }
    }

    /// Evaluate `condition` now and after every interval until it is ready,
    /// fails, or the deadline passes.
    ///
    /// The deadline also bounds each evaluation: one still running when it
    /// passes is dropped and the wait times out, whatever it would have returned.
    pub async fn until<C: Condition>(&self, mut condition: C) -> Result<C::Output> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        debug!(description = %self.description, timeout = ?self.timeout, "Waiting for condition");

        loop {
            let Ok(outcome) = timeout_at(deadline, condition.evaluate()).await else {
                debug!(description = %self.description, "Evaluation still running at the deadline");
                return Err(self.timed_out());
            };
            match outcome {
                Probe::Ready(value) => {
                    debug!(
                        description = %self.description,
                        elapsed = ?started.elapsed(),
                        "Condition met"
                    );
                    return Ok(value);
                }
                Probe::Failed(reason) => {
                    return Err(Error::HardFailure {
                        description: self.description.clone(),
                        reason,
                    });
                }
                Probe::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out());
            }
            let pause = self.interval.min(deadline - now);
            trace!(description = %self.description, ?pause, "Condition not met yet");
            sleep(pause).await;
        }
    }

    /// Like [`Poller::until`], but runs `on_timeout` before surfacing a timeout.
    pub async fn until_or_else<C, D, Fut>(&self, condition: C, on_timeout: D) -> Result<C::Output>
    where
        C: Condition,
        D: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        match self.until(condition).await {
            Err(e) if e.is_timeout() => {
                on_timeout().await;
                Err(e)
            }
            other => other,
        }
    }
}

/// Wait for `condition` with explicit cadence.
pub async fn await_condition<C: Condition>(
    description: &str,
    interval: Duration,
    timeout: Duration,
    condition: C,
) -> Result<C::Output> {
    Poller::new(description, interval, timeout)?
        .until(condition)
        .await
}

/// Wait for `condition`, running `on_timeout` diagnostics before raising a timeout.
pub async fn await_condition_or_fail<C, D, Fut>(
    description: &str,
    interval: Duration,
    timeout: Duration,
    condition: C,
    on_timeout: D,
) -> Result<C::Output>
where
    C: Condition,
    D: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    Poller::new(description, interval, timeout)?
        .until_or_else(condition, on_timeout)
        .await
}

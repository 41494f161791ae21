//! Bounded, cancellable polling
//!
//! Volume-ready and instance-running waits are polling loops with a poll
//! interval and an overall timeout taken from configuration. The loop checks
//! the interrupt flag between polls (in short slices, so Ctrl-C is honoured
//! well before the next poll is due). Timing out or being interrupted never
//! rolls anything back.

use std::thread;
use std::time::{Duration, Instant};

use crate::signal::Interrupt;

/// Upper bound for the poll interval, in seconds
pub const MAX_POLL_INTERVAL_SECONDS: u64 = 60;

/// Upper bound for any wait, in seconds
pub const MAX_WAIT_SECONDS: u64 = 86_400;

/// Granularity at which the interrupt flag is checked while sleeping
const INTERRUPT_CHECK_SLICE: Duration = Duration::from_millis(100);

/// Poll interval and timeout for one kind of wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Overall wait budget
    pub timeout: Duration,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Build from whole seconds, validating bounds
    pub fn from_seconds(
        poll_interval_seconds: u64,
        timeout_seconds: u64,
    ) -> Result<Self, WaitPolicyError> {
        if poll_interval_seconds == 0 || poll_interval_seconds > MAX_POLL_INTERVAL_SECONDS {
            return Err(WaitPolicyError::IntervalOutOfBounds {
                value: poll_interval_seconds,
            });
        }
        if timeout_seconds == 0 || timeout_seconds > MAX_WAIT_SECONDS {
            return Err(WaitPolicyError::TimeoutOutOfBounds {
                value: timeout_seconds,
            });
        }
        if timeout_seconds < poll_interval_seconds {
            return Err(WaitPolicyError::TimeoutBelowInterval {
                timeout: timeout_seconds,
                interval: poll_interval_seconds,
            });
        }
        Ok(Self::new(
            Duration::from_secs(poll_interval_seconds),
            Duration::from_secs(timeout_seconds),
        ))
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(600))
    }
}

/// Wait policy validation errors
#[derive(Debug, thiserror::Error)]
pub enum WaitPolicyError {
    #[error("poll_interval_seconds must be in (0, 60], got {value}")]
    IntervalOutOfBounds { value: u64 },

    #[error("wait timeout must be in (0, 86400] seconds, got {value}")]
    TimeoutOutOfBounds { value: u64 },

    #[error("wait timeout {timeout}s is shorter than poll interval {interval}s")]
    TimeoutBelowInterval { timeout: u64, interval: u64 },
}

/// Outcome of a single poll
#[derive(Debug)]
pub enum Poll<T> {
    /// Target state reached
    Ready(T),
    /// Still transitioning; the value is the last observed status
    Pending(String),
    /// Terminal failure state observed
    Failed(String),
}

/// Why a wait ended without reaching its target
#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    #[error("reached failure status '{status}'")]
    Failed { status: String },

    #[error("timed out after {waited:?} (last status '{last_status}')")]
    TimedOut { waited: Duration, last_status: String },

    #[error("interrupted while waiting")]
    Interrupted,

    #[error("{0}")]
    Poll(E),
}

/// Poll `check` until it reports ready, failure, timeout or interruption.
///
/// `check` runs once immediately, then once per poll interval.
pub fn poll_until<T, E, F>(
    policy: &WaitPolicy,
    interrupt: &Interrupt,
    mut check: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Result<Poll<T>, E>,
{
    let start = Instant::now();

    loop {
        if interrupt.is_set() {
            return Err(WaitError::Interrupted);
        }

        let last_status = match check().map_err(WaitError::Poll)? {
            Poll::Ready(value) => return Ok(value),
            Poll::Failed(status) => return Err(WaitError::Failed { status }),
            Poll::Pending(status) => status,
        };

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(WaitError::TimedOut {
                waited: elapsed,
                last_status,
            });
        }

        let nap = policy.poll_interval.min(policy.timeout - elapsed);
        if !sleep_unless_interrupted(nap, interrupt) {
            return Err(WaitError::Interrupted);
        }
    }
}

/// Sleep for `total`, returning false early if the interrupt flag is raised.
fn sleep_unless_interrupted(total: Duration, interrupt: &Interrupt) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if interrupt.is_set() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(INTERRUPT_CHECK_SLICE.min(deadline - now));
    }
}

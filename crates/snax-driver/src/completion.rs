// SPDX-License-Identifier: AGPL-3.0-only

//! Completion waiting
//!
//! The accelerators signal completion only through a busy bit, so the
//! compute unit spins on the status register. The spin is bounded by a
//! [`WaitPolicy`]: a poll budget, a wall-clock deadline, or both. A policy
//! with neither bound reproduces the original unbounded spin.

use crate::device::{CompletionStatus, DeviceHandle, RegisterBus};
use crate::error::{Result, SnaxError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default poll budget per launch.
pub const DEFAULT_MAX_POLLS: u64 = 10_000_000;

/// Default wall-clock bound per launch.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// Default number of polls between scheduler yields.
pub const DEFAULT_YIELD_INTERVAL: u32 = 1024;

/// Bounds on a completion wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Give up after this many status reads
    pub max_polls: Option<u64>,
    /// Give up after this much wall time
    pub deadline: Option<Duration>,
    /// Yield the thread every this many polls (0 never yields)
    pub yield_interval: u32,
}

impl WaitPolicy {
    /// Spin until the device finishes, however long that takes.
    pub const fn unbounded() -> Self {
        Self {
            max_polls: None,
            deadline: None,
            yield_interval: DEFAULT_YIELD_INTERVAL,
        }
    }

    /// Bound the wait by a poll count only.
    pub const fn polls(max_polls: u64) -> Self {
        Self {
            max_polls: Some(max_polls),
            deadline: None,
            yield_interval: DEFAULT_YIELD_INTERVAL,
        }
    }

    /// Replace the poll budget.
    #[must_use]
    pub const fn with_max_polls(mut self, max_polls: u64) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// Replace the wall-clock deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Replace the yield interval.
    #[must_use]
    pub const fn with_yield_interval(mut self, interval: u32) -> Self {
        self.yield_interval = interval;
        self
    }

    /// True if neither bound is set.
    pub const fn is_unbounded(&self) -> bool {
        self.max_polls.is_none() && self.deadline.is_none()
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_polls: Some(DEFAULT_MAX_POLLS),
            deadline: Some(DEFAULT_DEADLINE),
            yield_interval: DEFAULT_YIELD_INTERVAL,
        }
    }
}

/// Outcome of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Status reads, the final "done" read included
    pub polls: u64,
    /// Time spent polling
    pub elapsed: Duration,
}

/// Blocks the calling unit until a started device reports completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionWaiter {
    policy: WaitPolicy,
}

impl CompletionWaiter {
    /// Create a waiter with the given bounds.
    pub const fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    /// Bounds in use.
    pub const fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Poll `device` until it is no longer busy, then clear it back to idle.
    ///
    /// # Errors
    ///
    /// Returns [`SnaxError::Timeout`] when a bound is exceeded (the device is
    /// left running), or any error from the status read or clear write.
    pub fn wait<B: RegisterBus>(&self, device: &mut DeviceHandle<B>) -> Result<Completion> {
        let start = Instant::now();
        let mut polls = 0u64;

        loop {
            polls += 1;
            if device.poll()? == CompletionStatus::Done {
                break;
            }

            let over_polls = self.policy.max_polls.is_some_and(|max| polls >= max);
            let over_time = self.policy.deadline.is_some_and(|d| start.elapsed() >= d);
            if over_polls || over_time {
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                warn!(
                    "{}: no completion after {polls} polls ({elapsed_ms}ms)",
                    device.map().name
                );
                return Err(SnaxError::Timeout { polls, elapsed_ms });
            }

            if self.policy.yield_interval != 0 && polls % u64::from(self.policy.yield_interval) == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }

        device.clear()?;
        let elapsed = start.elapsed();
        debug!("{}: done after {polls} polls in {elapsed:?}", device.map().name);
        Ok(Completion { polls, elapsed })
    }
}

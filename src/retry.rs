//! Retry-on-fail: resending an unanswered read to the next mirror.
//!
//! A retrying read is sent to the read group's first mirror. While no reply
//! has arrived, every `interval` the *same* datagram (same correlation id,
//! same bytes) is resent to the key's shard on the next mirror, wrapping
//! around, until the retry budget is spent. Whichever mirror answers first
//! completes the call; later answers are unmatched and dropped.
//!
//! ```text
//! t=0          send → mirror 0
//! t=interval   no reply? resend → mirror 1
//! t=2·interval no reply? resend → mirror 2 (or 0 if only two mirrors)
//! ...          at most `max_retries` resends, always within the call timeout
//! ```
//!
//! The schedule runs as a task attached to the pending call, so completion,
//! timeout or cancellation abort it and release its packet handle.

use crate::correlator::{Registration, RequestCorrelator};
use crate::metrics;
use crate::routing::Router;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

/// How many times, and how often, to resend an unanswered read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of resends after the initial send.
    pub max_retries: u32,

    /// Delay before each resend.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }

    /// Fast retries for tests.
    pub fn testing() -> Self {
        Self {
            max_retries: 3,
            interval: Duration::from_millis(10),
        }
    }

    /// Time from the initial send to the last resend.
    pub fn span(&self) -> Duration {
        self.interval.saturating_mul(self.max_retries)
    }
}

/// Mirror rotation of one retrying call.
///
/// Pure state machine; the scheduler drives it.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    mirrors: usize,
    current: usize,
    remaining: u32,
}

impl RetryPlan {
    /// Plan for a call first sent to mirror 0 of `mirrors`.
    pub fn new(mirrors: usize, max_retries: u32) -> Self {
        Self {
            mirrors: mirrors.max(1),
            current: 0,
            remaining: max_retries,
        }
    }

    /// Mirror the latest send went to.
    pub fn current_mirror(&self) -> usize {
        self.current
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Advance to the mirror for the next resend, or `None` once the budget
    /// is spent.
    pub fn next_mirror(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.current = (self.current + 1) % self.mirrors;
        Some(self.current)
    }
}

/// Start the resend schedule of a read that was just sent to mirror 0.
///
/// The task holds its own handle to `packet` and drops it when the schedule
/// ends or is aborted.
pub(crate) fn spawn_retries(
    router: Arc<Router>,
    correlator: Arc<RequestCorrelator>,
    registration: Registration,
    key: String,
    packet: Bytes,
    policy: RetryPolicy,
    runtime: &Handle,
) {
    if policy.max_retries == 0 {
        return;
    }

    let watcher = Arc::clone(&correlator);
    let task = runtime.spawn(async move {
        let mut plan = RetryPlan::new(router.topology().read_mirrors().len(), policy.max_retries);

        while let Some(mirror) = plan.next_mirror() {
            tokio::time::sleep(policy.interval).await;
            if !watcher.is_pending(registration) {
                return;
            }
            debug!(
                id = registration.id,
                mirror,
                remaining = plan.remaining(),
                "No reply yet, resending to next mirror"
            );
            metrics::record_retry(mirror);
            router.send_to_read_mirror(mirror, &key, packet.clone());
        }

        debug!(id = registration.id, "Retries exhausted");
        metrics::record_retries_exhausted();
    });
    correlator.attach_timer(registration, task.abort_handle());
}

//! Pacing and concurrency limits for talking to the group.
//!
//! - [`PollSchedule`]: delays between member-state polls while a joined
//!   instance settles
//! - [`Bulkhead`]: caps how many member queries a fan-out runs at once

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Delays and limits for the wait-for-stable loop.
///
/// Built from [`crate::config::WaitStableConfig::poll_schedule`]. Only
/// polling follows it; the join request itself is issued once.
///
/// ```text
/// poll n waits interval * backoff_factor^(n-1), capped at max_interval
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    pub max_polls: usize,
    pub interval: Duration,
    pub max_interval: Duration,
    /// 1.0 polls at a fixed interval.
    pub backoff_factor: f64,
    /// Budget for a single member-state query.
    pub query_timeout: Duration,
}

impl PollSchedule {
    /// Delay before poll `poll` (1-indexed). Poll 0 is treated as the first.
    pub fn delay_before(&self, poll: usize) -> Duration {
        let exponent = poll.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Caps concurrent member queries across every running fan-out.
#[derive(Debug)]
pub struct Bulkhead {
    slots: Arc<Semaphore>,
}

impl Bulkhead {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Wait for a free slot; the slot is released when the permit drops.
    ///
    /// `None` only if the semaphore was closed, which this crate never does.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slots).acquire_owned().await.ok()
    }
}

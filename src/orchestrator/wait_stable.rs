//! Wait-for-stable polling after the join request.
//!
//! Each poll sleeps on a tokio timer (interruptible by [`Cancellation`]),
//! then reads the candidate's member state under a per-query timeout. The
//! observation is classified:
//!
//! | Observation | Class |
//! |-------------|-------|
//! | `ONLINE` | Stable |
//! | `RECOVERING`, `UNREACHABLE` | Transient |
//! | `OFFLINE` before recovery started | Transient |
//! | `OFFLINE` after a `RECOVERING` poll | Fatal |
//! | transient query error, query timeout | Transient |
//! | `ERROR` | Fatal |
//! | communication error | Fatal |
//!
//! The loop ends at the first stable or fatal poll, on cancellation, or when
//! the poll count or wall-clock deadline is exhausted.

use super::types::RejoinAttempt;
use crate::error::{RejoinError, Result};
use crate::group::GroupCommunication;
use crate::instance::MemberState;
use crate::metrics;
use crate::resilience::PollSchedule;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// How a single poll observation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Stable,
    Transient,
    Fatal,
}

/// Classify one member-state observation.
///
/// `recovered` is whether an earlier poll already saw RECOVERING; going
/// OFFLINE after that means the member left the group again.
pub fn classify(observed: &Result<MemberState>, recovered: bool) -> StateClass {
    match observed {
        Ok(MemberState::Online) => StateClass::Stable,
        Ok(MemberState::Offline) if recovered => StateClass::Fatal,
        Ok(MemberState::Recovering | MemberState::Offline | MemberState::Unreachable) => {
            StateClass::Transient
        }
        Ok(MemberState::Error) => StateClass::Fatal,
        Err(e) if e.is_retryable() => StateClass::Transient,
        Err(_) => StateClass::Fatal,
    }
}

/// Cancel signal for one attempt: the caller's channel, if any, and the
/// orchestrator's shutdown channel. Either one set to `true` cancels.
pub(crate) struct Cancellation {
    caller: Option<watch::Receiver<bool>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    pub(crate) fn new(caller: Option<watch::Receiver<bool>>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            caller,
            shutdown: Some(shutdown),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        [&self.caller, &self.shutdown]
            .into_iter()
            .flatten()
            .any(|rx| *rx.borrow())
    }

    /// Resolves once either channel reads `true`. Never resolves when both
    /// senders are gone.
    async fn cancelled(&mut self) {
        tokio::select! {
            _ = until_true(&mut self.caller) => {}
            _ = until_true(&mut self.shutdown) => {}
        }
    }
}

/// A dropped sender means that channel can no longer cancel.
async fn until_true(slot: &mut Option<watch::Receiver<bool>>) {
    loop {
        let Some(rx) = slot.as_mut() else {
            return std::future::pending().await;
        };
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            *slot = None;
        }
    }
}

/// How the wait ended.
#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Online,
    TimedOut,
    Fatal(RejoinError),
    Cancelled,
}

/// Poll `instance_id` until it is ONLINE or the budget runs out.
///
/// `attempt.polls` and `attempt.deadline` are kept current.
pub(crate) async fn wait_for_stable<G: GroupCommunication + ?Sized>(
    group: &G,
    attempt: &mut RejoinAttempt,
    schedule: &PollSchedule,
    timeout: Duration,
    cancel: &mut Cancellation,
) -> WaitOutcome {
    let deadline = Instant::now() + timeout;
    attempt.deadline = Some(deadline);
    let instance_id = attempt.instance_id.clone();
    let mut recovered = false;

    for poll in 1..=schedule.max_polls {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }

        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut;
        }

        let delay = schedule.delay_before(poll).min(deadline - now);
        if sleep_or_cancel(delay, cancel).await {
            return WaitOutcome::Cancelled;
        }

        attempt.polls = poll;
        let observed = match tokio::time::timeout(
            schedule.query_timeout,
            group.member_state(&instance_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RejoinError::transient(
                instance_id.as_str(),
                format!("member state query timed out after {:?}", schedule.query_timeout),
            )),
        };

        let label = match &observed {
            Ok(state) => state.to_string(),
            Err(e) => e.kind().to_string(),
        };
        metrics::record_poll(&instance_id, &label);

        let class = classify(&observed, recovered);
        recovered |= matches!(observed, Ok(MemberState::Recovering));
        match class {
            StateClass::Stable => {
                debug!(instance_id = %instance_id, poll, "Member is ONLINE");
                return WaitOutcome::Online;
            }
            StateClass::Transient => {
                debug!(instance_id = %instance_id, poll, observed = %label, "Member not yet stable");
            }
            StateClass::Fatal => {
                let error = match observed {
                    Err(e) => e,
                    Ok(MemberState::Offline) => RejoinError::communication(
                        "wait_stable",
                        instance_id.as_str(),
                        "member went OFFLINE after starting recovery",
                    ),
                    Ok(state) => RejoinError::communication(
                        "wait_stable",
                        instance_id.as_str(),
                        format!("member entered {} state", state),
                    ),
                };
                return WaitOutcome::Fatal(error);
            }
        }
    }

    WaitOutcome::TimedOut
}

/// Sleep for `delay`; returns `true` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &mut Cancellation) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = cancel.cancelled() => true,
    }
}

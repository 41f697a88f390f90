//! Attempt state types.
//!
//! Defines the state machine one rejoin attempt walks through.
//!
//! # State Transitions
//!
//! ```text
//!          rejoin()
//! Init ─────────────→ Validating ──────────────────────────┐
//!                         │                                │ (rejection,
//!                         │ (all checks Allowed)           │  fatal error)
//!                         ↓                                ↓
//!                   JoinRequested ───────────────────→ Rejected
//!                         │                                ↑
//!                         │ (join acknowledged)            │
//!                         ↓                                │
//!                     WaitStable ──────────────────────────┘
//!                      │      │
//!             (ONLINE) │      │ (budget exhausted)
//!                      ↓      ↓
//!                   Online  TimedOut
//! ```
//!
//! States only move forward. `Online`, `TimedOut` and `Rejected` are
//! terminal; the attempt is dropped once it reaches one of them.

use crate::error::{RejoinError, Result};
use crate::verdict::{Rejection, Warning};
use std::time::Duration;
use tokio::time::Instant;

/// State of one rejoin attempt.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejoinState {
    /// Attempt created, nothing queried yet.
    Init,

    /// Gathering snapshots and running the admission checks.
    Validating,

    /// All checks passed; the join primitive has been issued.
    JoinRequested,

    /// Join acknowledged; polling the candidate's member state.
    WaitStable,

    /// Candidate reported ONLINE.
    Online,

    /// Poll budget exhausted before the candidate stabilised.
    TimedOut,

    /// A check refused the candidate or a fatal error ended the attempt.
    Rejected,
}

impl RejoinState {
    fn rank(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Validating => 1,
            Self::JoinRequested => 2,
            Self::WaitStable => 3,
            Self::Online | Self::TimedOut | Self::Rejected => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Online | Self::TimedOut | Self::Rejected)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: RejoinState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            // Any live state may end in rejection
            Self::Rejected => true,
            Self::Online | Self::TimedOut => self == Self::WaitStable,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl std::fmt::Display for RejoinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejoinState::Init => write!(f, "Init"),
            RejoinState::Validating => write!(f, "Validating"),
            RejoinState::JoinRequested => write!(f, "JoinRequested"),
            RejoinState::WaitStable => write!(f, "WaitStable"),
            RejoinState::Online => write!(f, "Online"),
            RejoinState::TimedOut => write!(f, "TimedOut"),
            RejoinState::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Bookkeeping for a single attempt, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct RejoinAttempt {
    pub instance_id: String,
    state: RejoinState,
    /// Member-state polls issued during WaitStable.
    pub polls: usize,
    /// Wall-clock end of the wait budget, set on entering WaitStable.
    pub deadline: Option<Instant>,
    /// Set once the join primitive has been acknowledged.
    pub join_requested: bool,
    started: Instant,
    history: Vec<RejoinState>,
}

impl RejoinAttempt {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            state: RejoinState::Init,
            polls: 0,
            deadline: None,
            join_requested: false,
            started: Instant::now(),
            history: vec![RejoinState::Init],
        }
    }

    pub fn state(&self) -> RejoinState {
        self.state
    }

    /// States visited so far, in order, starting with `Init`.
    pub fn history(&self) -> &[RejoinState] {
        &self.history
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, refusing any backward or skipping transition.
    pub fn advance(&mut self, next: RejoinState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(RejoinError::InvalidState {
                expected: format!("successor of {}", self.state),
                actual: next.to_string(),
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

/// Final result of an attempt (or of a dry-run check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejoinResult {
    /// Every check passed. Only returned by a dry run.
    Allowed,
    /// A check refused the candidate.
    Rejected(Rejection),
    /// The candidate did not stabilise within the budget.
    TimedOut { polls: usize, elapsed: Duration },
    /// The candidate is an ONLINE member again.
    Online,
}

impl RejoinResult {
    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Rejected(_) => "rejected",
            Self::TimedOut { .. } => "timed_out",
            Self::Online => "online",
        }
    }
}

/// Everything the caller gets back from an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejoinOutcome {
    pub result: RejoinResult,
    /// Warnings and notes, in emission order.
    pub warnings: Vec<Warning>,
    /// State history of the attempt.
    pub history: Vec<RejoinState>,
}

impl RejoinOutcome {
    pub fn is_online(&self) -> bool {
        self.result == RejoinResult::Online
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match &self.result {
            RejoinResult::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Stable reason code when rejected.
    pub fn reason_code(&self) -> Option<&'static str> {
        self.rejection().map(|r| r.reason.code())
    }
}

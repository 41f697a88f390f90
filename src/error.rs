// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the rejoin controller.
//!
//! Validation failures are not errors: they come back as
//! [`RejoinResult::Rejected`](crate::orchestrator::RejoinResult::Rejected)
//! with their diagnostics. The errors here are about reaching the cluster and
//! driving the state machine.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transient` | Yes | Member still settling, probe failed while a peer joins |
//! | `Communication` | No | Group layer unreachable, join primitive failed |
//! | `NoQuorumView` | No | No cluster member could be queried |
//! | `RejoinInProgress` | No | Another attempt holds the instance |
//! | `AlreadyMember` | No | Candidate is already ONLINE or RECOVERING |
//! | `Cancelled` | No | Caller cancelled between polls |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | State machine violation |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Only transient errors are retried, and only inside the wait-for-stable
//! loop. A failed membership change is never retried: repeating it risks a
//! duplicate or partial effect.

use thiserror::Error;

/// Result type alias for rejoin operations.
pub type Result<T> = std::result::Result<T, RejoinError>;

/// Errors that can occur while admitting or rejoining an instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejoinError {
    /// The cluster is mid-transition; the same query may succeed shortly.
    ///
    /// Retried silently up to the wait budget.
    #[error("Transient cluster error ({instance_id}): {message}")]
    Transient { instance_id: String, message: String },

    /// The group-communication layer failed or could not be reached.
    ///
    /// Fatal once a join has been requested.
    #[error("Communication error ({operation} on {instance_id}): {message}")]
    Communication {
        operation: String,
        instance_id: String,
        message: String,
    },

    /// Every cluster member was unreachable; there is no view to validate against.
    #[error("No reachable ONLINE cluster member: {unreachable} of {total} members could not be queried")]
    NoQuorumView { unreachable: usize, total: usize },

    /// Another rejoin for the same instance is running.
    #[error("A rejoin of instance '{0}' is already in progress")]
    RejoinInProgress(String),

    /// The candidate is already part of the group.
    #[error("The instance '{instance_id}' is already a member of the cluster ({state})")]
    AlreadyMember { instance_id: String, state: String },

    /// Cancelled by the caller between polls.
    ///
    /// When `join_requested` is set the join may already have taken effect.
    #[error("Rejoin of '{instance_id}' cancelled in state {state} (join requested: {join_requested})")]
    Cancelled {
        instance_id: String,
        state: String,
        join_requested: bool,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// State machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RejoinError {
    /// Create a transient error.
    pub fn transient(instance_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            instance_id: instance_id.into(),
            message: message.into(),
        }
    }

    /// Create a communication error.
    pub fn communication(
        operation: impl Into<String>,
        instance_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Communication {
            operation: operation.into(),
            instance_id: instance_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Communication { .. } => false, // Membership changes are never repeated
            Self::NoQuorumView { .. } => false,
            Self::RejoinInProgress(_) => false,
            Self::AlreadyMember { .. } => false,
            Self::Cancelled { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Communication { .. } => "communication",
            Self::NoQuorumView { .. } => "no_quorum_view",
            Self::RejoinInProgress(_) => "in_progress",
            Self::AlreadyMember { .. } => "already_member",
            Self::Cancelled { .. } => "cancelled",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
            Self::Internal(_) => "internal",
        }
    }
}

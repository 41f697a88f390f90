//! Admission verdicts, rejection reasons and operator warnings.
//!
//! Every validator returns a [`Verdict`]. A rejection carries a stable
//! reason code (parsed by operator tooling), a one-line summary, and the
//! ordered diagnostic detail captured at decision time. The detail list is
//! the machine-readable part: one entry per line, never re-derived later.
//!
//! | Reason | Code | Detail entries |
//! |--------|------|----------------|
//! | `AsyncChannelsPresent` | `AsyncChannelsPresent` | `channel (status)` |
//! | `ErrantTransactions` | `ErrantTransactions` | `uuid:interval` |
//! | `EmptyGtidSet` | `EmptyGTIDSet` | none |
//! | `MissingPurgedTransactions` | `MissingPurgedTransactions` | `uuid:interval` |
//! | `UnsupportedAddressFamily` | `UnsupportedAddressFamily` | offending address |
//! | `UnsupportedConfigOption` | `UnsupportedConfigOption` | offending option |

use crate::gtid::GtidSet;
use std::fmt;

/// Why a candidate was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Asynchronous replication channels are configured on the candidate.
    AsyncChannelsPresent,
    /// Transactions on the candidate that no cluster member knows about.
    ErrantTransactions(GtidSet),
    /// The candidate has no transaction history at all.
    EmptyGtidSet,
    /// Transactions purged cluster-wide that the candidate never applied.
    MissingPurgedTransactions(GtidSet),
    /// Address family not routable by the group layer at the cluster's version.
    UnsupportedAddressFamily,
    /// An option value or name the candidate/cluster cannot honour.
    UnsupportedConfigOption,
}

impl RejectReason {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AsyncChannelsPresent => "AsyncChannelsPresent",
            Self::ErrantTransactions(_) => "ErrantTransactions",
            Self::EmptyGtidSet => "EmptyGTIDSet",
            Self::MissingPurgedTransactions(_) => "MissingPurgedTransactions",
            Self::UnsupportedAddressFamily => "UnsupportedAddressFamily",
            Self::UnsupportedConfigOption => "UnsupportedConfigOption",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A refusal with its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    /// One-line description naming the instance.
    pub summary: String,
    /// Ordered diagnostic entries, one per line.
    pub detail: Vec<String>,
    /// Optional remediation text for the operator.
    pub hint: Option<String>,
}

impl Rejection {
    pub fn new(reason: RejectReason, summary: impl Into<String>) -> Self {
        Self {
            reason,
            summary: summary.into(),
            detail: Vec::new(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Vec<String>) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Render as operator text: summary, hint, then detail one per line.
    pub fn render(&self) -> String {
        let mut out = self.summary.clone();
        if let Some(hint) = &self.hint {
            out.push('\n');
            out.push_str(hint);
        }
        for line in &self.detail {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason.code(), self.summary)
    }
}

/// Result of a single admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Allowed => None,
            Self::Rejected(r) => Some(r),
        }
    }

    /// Reason code if rejected.
    pub fn reason_code(&self) -> Option<&'static str> {
        self.rejection().map(|r| r.reason.code())
    }

    /// Run the next check only if this one allowed; first rejection wins.
    pub fn and_then(self, next: impl FnOnce() -> Verdict) -> Verdict {
        match self {
            Self::Allowed => next(),
            rejected => rejected,
        }
    }
}

/// Severity of an advisory message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningLevel {
    Note,
    Warning,
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note => write!(f, "NOTE"),
            Self::Warning => write!(f, "WARNING"),
        }
    }
}

/// Non-blocking advisory surfaced to the caller in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub level: WarningLevel,
    pub message: String,
}

impl Warning {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarningLevel::Warning,
            message: message.into(),
        }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self {
            level: WarningLevel::Note,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

//! GTID reconciliation between a candidate and the cluster.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. empty candidate history → `EmptyGtidSet`
//! 2. `candidate − cluster_executed` → `ErrantTransactions`
//! 3. `cluster_purged − candidate` → `MissingPurgedTransactions`
//!
//! Errant transactions are reported before purge gaps: an instance can show
//! both, and foreign history is the condition that risks silent data loss.

use crate::gtid::GtidSet;
use crate::verdict::{RejectReason, Rejection, Verdict};

/// Decide whether `candidate` history is consistent with the cluster.
///
/// `instance` is the endpoint label used in the rejection summary.
pub fn reconcile(
    instance: &str,
    candidate: &GtidSet,
    cluster_executed: &GtidSet,
    cluster_purged: &GtidSet,
) -> Verdict {
    if candidate.is_empty() {
        return Verdict::Rejected(
            Rejection::new(
                RejectReason::EmptyGtidSet,
                format!("The instance '{}' has an empty GTID set.", instance),
            )
            .with_hint(
                "An instance without transaction history cannot be verified and must be provisioned instead of rejoined.",
            ),
        );
    }

    let errant = candidate.difference(cluster_executed);
    if !errant.is_empty() {
        let detail = entry_lines(&errant);
        return Verdict::Rejected(
            Rejection::new(
                RejectReason::ErrantTransactions(errant),
                format!(
                    "The instance '{}' contains errant transactions that did not originate from the cluster.",
                    instance
                ),
            )
            .with_hint(format!(
                "{} has the following errant GTIDs that do not exist in the cluster:",
                instance
            ))
            .with_detail(detail),
        );
    }

    let missing = cluster_purged.difference(candidate);
    if !missing.is_empty() {
        let detail = entry_lines(&missing);
        return Verdict::Rejected(
            Rejection::new(
                RejectReason::MissingPurgedTransactions(missing),
                format!(
                    "The instance '{}' is missing transactions that were purged from all cluster members.",
                    instance
                ),
            )
            .with_hint(format!(
                "{} is missing the following GTIDs that are no longer available in the cluster:",
                instance
            ))
            .with_detail(detail),
        );
    }

    Verdict::Allowed
}

fn entry_lines(set: &GtidSet) -> Vec<String> {
    set.entries().iter().map(ToString::to_string).collect()
}

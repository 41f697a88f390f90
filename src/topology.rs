//! Replication topology check for the candidate.
//!
//! A configured asynchronous channel is disqualifying whether it is running
//! or stopped: an unmanaged channel keeps pointing at its source when the
//! primary role moves, so presence alone is the unsafe condition.
//!
//! Channels named in the exemption list are system-managed and skipped. The
//! list is empty unless the operator configures it.

use crate::instance::ReplicationChannel;
use crate::verdict::{RejectReason, Rejection, Verdict};

/// Reject the candidate if any non-exempt channel is configured.
pub fn validate_topology(
    instance: &str,
    channels: &[ReplicationChannel],
    exempt: &[String],
) -> Verdict {
    let offending: Vec<&ReplicationChannel> = channels
        .iter()
        .filter(|c| !exempt.iter().any(|e| e == &c.name))
        .collect();

    if offending.is_empty() {
        return Verdict::Allowed;
    }

    let detail = offending
        .iter()
        .map(|c| format!("{} ({})", display_name(&c.name), c.status))
        .collect();

    Verdict::Rejected(
        Rejection::new(
            RejectReason::AsyncChannelsPresent,
            format!(
                "The instance '{}' has asynchronous replication configured.",
                instance
            ),
        )
        .with_hint(format!(
            "Cannot rejoin instance '{}' to the cluster because it has asynchronous (source-replica) replication channel(s) configured. \
             Manually configured channels are not managed by the cluster (e.g. when PRIMARY moves to another member) \
             which may cause replication to break or even create split-brain scenarios (data loss).",
            instance
        ))
        .with_detail(detail),
    )
}

fn display_name(name: &str) -> &str {
    // The default channel has an empty name on the server.
    if name.is_empty() {
        "<default>"
    } else {
        name
    }
}

//! Cluster-wide view used to validate a candidate.
//!
//! The view is a scatter-gather over every registered member except the
//! candidate. Each member is queried under the shared [`Bulkhead`] with its
//! own timeout; a member that fails or exceeds the timeout is excluded and
//! listed in [`ClusterState::unreachable_members`]. The view is rebuilt for
//! every attempt.
//!
//! ```text
//!                 ┌──────────────┐
//!   members ────► │  join_all    │──► ONLINE  → executed ∪, purged ∩, min version
//!   (minus        │  (bulkhead + │──► RECOVERING → min version only
//!    candidate)   │   timeout)   │──► failed / timed out → unreachable
//!                 └──────────────┘
//! ```

use crate::config::FanOutConfig;
use crate::error::{RejoinError, Result};
use crate::group::GroupCommunication;
use crate::gtid::GtidSet;
use crate::instance::MemberState;
use crate::metrics;
use crate::resilience::Bulkhead;
use crate::version::Version;
use futures::future::join_all;
use std::time::Instant;
use tracing::{debug, warn};

/// Aggregate of the reachable group members.
#[derive(Debug, Clone)]
pub struct ClusterState {
    /// Union of executed sets over ONLINE members.
    pub executed: GtidSet,
    /// Intersection of purged sets over ONLINE members.
    pub purged: GtidSet,
    /// Lowest server version among ONLINE and RECOVERING members.
    pub min_version: Version,
    pub online_members: Vec<String>,
    pub recovering_members: Vec<String>,
    /// Members excluded because they could not be queried.
    pub unreachable_members: Vec<String>,
}

/// What one member contributed.
enum MemberView {
    Online {
        id: String,
        executed: GtidSet,
        purged: GtidSet,
        version: Version,
    },
    /// In the group but still catching up; only its version counts.
    Recovering { id: String, version: Version },
    /// Reachable but not contributing (OFFLINE, ERROR).
    Other(String, MemberState),
    Unreachable(String),
}

/// Query every member of `cluster_id` except `candidate` and aggregate.
///
/// Fails with [`RejoinError::NoQuorumView`] when no ONLINE member answered.
pub async fn gather_cluster_state<G: GroupCommunication + ?Sized>(
    group: &G,
    cluster_id: &str,
    candidate: &str,
    fan_out: &FanOutConfig,
    bulkhead: &Bulkhead,
) -> Result<ClusterState> {
    let start = Instant::now();
    let members: Vec<String> = group
        .cluster_members(cluster_id)
        .await?
        .into_iter()
        .filter(|m| m != candidate)
        .collect();
    let total = members.len();

    let views = join_all(
        members
            .iter()
            .map(|member| query_member(group, member, fan_out, bulkhead)),
    )
    .await;

    let mut executed = GtidSet::empty();
    let mut purged: Option<GtidSet> = None;
    let mut min_version: Option<Version> = None;
    let mut online_members = Vec::new();
    let mut recovering_members = Vec::new();
    let mut unreachable_members = Vec::new();

    for view in views {
        match view {
            MemberView::Online {
                id,
                executed: member_executed,
                purged: member_purged,
                version,
            } => {
                executed = executed.union(&member_executed);
                purged = Some(match purged {
                    Some(acc) => acc.intersection(&member_purged),
                    None => member_purged,
                });
                min_version = Some(min_version.map_or(version, |v| v.min(version)));
                online_members.push(id);
            }
            MemberView::Recovering { id, version } => {
                min_version = Some(min_version.map_or(version, |v| v.min(version)));
                recovering_members.push(id);
            }
            MemberView::Other(id, state) => {
                debug!(member_id = %id, state = %state, "Member not contributing to cluster view");
            }
            MemberView::Unreachable(id) => unreachable_members.push(id),
        }
    }

    metrics::record_fan_out(total, unreachable_members.len(), start.elapsed());

    // RECOVERING members lower the minimum but cannot form a view alone
    let (false, Some(min_version)) = (online_members.is_empty(), min_version) else {
        return Err(RejoinError::NoQuorumView {
            unreachable: unreachable_members.len(),
            total,
        });
    };

    debug!(
        cluster_id = %cluster_id,
        online = online_members.len(),
        recovering = recovering_members.len(),
        unreachable = unreachable_members.len(),
        min_version = %min_version,
        "Cluster view gathered"
    );

    Ok(ClusterState {
        executed,
        purged: purged.unwrap_or_else(GtidSet::empty),
        min_version,
        online_members,
        recovering_members,
        unreachable_members,
    })
}

async fn query_member<G: GroupCommunication + ?Sized>(
    group: &G,
    member: &str,
    fan_out: &FanOutConfig,
    bulkhead: &Bulkhead,
) -> MemberView {
    let Some(_permit) = bulkhead.acquire().await else {
        return MemberView::Unreachable(member.to_string());
    };

    let budget = fan_out.member_timeout_duration();
    match tokio::time::timeout(budget, read_member(group, member)).await {
        Ok(Ok(view)) => view,
        Ok(Err((operation, e))) => {
            warn!(member_id = %member, operation, error = %e, "Excluding member from cluster view");
            metrics::record_member_query_failure(member, operation);
            MemberView::Unreachable(member.to_string())
        }
        Err(_) => {
            warn!(member_id = %member, timeout = ?budget, "Member query timed out, excluding from cluster view");
            metrics::record_member_query_failure(member, "timeout");
            MemberView::Unreachable(member.to_string())
        }
    }
}

async fn read_member<G: GroupCommunication + ?Sized>(
    group: &G,
    member: &str,
) -> std::result::Result<MemberView, (&'static str, RejoinError)> {
    let state = group
        .member_state(member)
        .await
        .map_err(|e| ("member_state", e))?;

    match state {
        MemberState::Online => {}
        MemberState::Recovering => {
            let info = group
                .instance_info(member)
                .await
                .map_err(|e| ("instance_info", e))?;
            return Ok(MemberView::Recovering {
                id: member.to_string(),
                version: info.version,
            });
        }
        MemberState::Unreachable => return Ok(MemberView::Unreachable(member.to_string())),
        other => return Ok(MemberView::Other(member.to_string(), other)),
    }

    let executed = group
        .executed_gtids(member)
        .await
        .map_err(|e| ("executed_gtids", e))?;
    let purged = group
        .purged_gtids(member)
        .await
        .map_err(|e| ("purged_gtids", e))?;
    let info = group
        .instance_info(member)
        .await
        .map_err(|e| ("instance_info", e))?;

    Ok(MemberView::Online {
        id: member.to_string(),
        executed,
        purged,
        version: info.version,
    })
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Rejoin orchestrator.
//!
//! Ties together:
//! - Candidate and cluster snapshots via [`crate::group::GroupCommunication`]
//! - Cluster aggregation via [`crate::cluster::gather_cluster_state`]
//! - The admission checks ([`crate::topology`], [`crate::reconciler`],
//!   [`crate::capability`]), run in that order
//! - The join request and the wait-for-stable poll loop
//!
//! # Attempt Lifecycle
//!
//! 1. Claims the instance (a second concurrent attempt fails with
//!    [`RejoinError::RejoinInProgress`])
//! 2. Validates against fresh snapshots; first rejection wins
//! 3. Issues the join with the negotiated options (never retried)
//! 4. Polls until ONLINE, fatal state, cancellation or budget exhaustion
//! 5. On ONLINE: probes the protocol version and persists configuration,
//!    both advisory

mod types;
mod wait_stable;

pub use types::{RejoinAttempt, RejoinOutcome, RejoinResult, RejoinState};
pub use wait_stable::{classify, StateClass};

use crate::capability::{negotiate, NegotiationRequest, RejoinOptions};
use crate::cluster::gather_cluster_state;
use crate::config::RejoinConfig;
use crate::error::{RejoinError, Result};
use crate::group::GroupCommunication;
use crate::instance::{InstanceSnapshot, MemberState};
use crate::metrics;
use crate::reconciler::reconcile;
use crate::resilience::Bulkhead;
use crate::topology::validate_topology;
use crate::verdict::{Rejection, Verdict, Warning};
use crate::version::SET_PERSIST_MIN;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wait_stable::{wait_for_stable, Cancellation, WaitOutcome};

/// Admission controller and rejoin driver for one cluster.
///
/// Cheap to share behind an `Arc`; attempts for different instances run
/// concurrently, attempts for the same instance are mutually exclusive.
pub struct RejoinOrchestrator<G: GroupCommunication> {
    config: RejoinConfig,

    /// Group-communication layer (passed from the shell)
    group: Arc<G>,

    /// Instances with an attempt in progress
    in_flight: Arc<DashSet<String>>,

    /// Limits concurrent member queries across all attempts
    bulkhead: Arc<Bulkhead>,

    /// Shutdown signal sender
    shutdown_tx: watch::Sender<bool>,

    /// Shutdown signal receiver
    shutdown_rx: watch::Receiver<bool>,
}

impl<G: GroupCommunication> RejoinOrchestrator<G> {
    /// Create an orchestrator. Fails if the configuration is invalid.
    pub fn new(config: RejoinConfig, group: Arc<G>) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let bulkhead = Arc::new(Bulkhead::new(config.settings.fan_out.max_concurrent));

        info!(
            cluster_id = %config.cluster_id,
            max_polls = config.settings.wait_stable.max_polls,
            timeout = %config.settings.wait_stable.timeout,
            "Rejoin orchestrator created"
        );

        Ok(Self {
            config,
            group,
            in_flight: Arc::new(DashSet::new()),
            bulkhead,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn config(&self) -> &RejoinConfig {
        &self.config
    }

    pub fn group(&self) -> &Arc<G> {
        &self.group
    }

    /// Whether an attempt for `instance_id` is running.
    pub fn is_in_flight(&self, instance_id: &str) -> bool {
        self.in_flight.contains(instance_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Rejoin `instance_id`, stopping early only on [`shutdown()`](Self::shutdown).
    pub async fn rejoin(&self, instance_id: &str, options: &RejoinOptions) -> Result<RejoinOutcome> {
        let mut cancel = Cancellation::new(None, self.shutdown_rx.clone());
        self.run(instance_id, options, &mut cancel).await
    }

    /// Rejoin `instance_id`; setting `cancel` to `true` stops the attempt
    /// at the next poll boundary. [`shutdown()`](Self::shutdown) still applies.
    ///
    /// Cancelling after the join request does not undo it: the error
    /// reports `join_requested: true` and the instance may still come ONLINE.
    pub async fn rejoin_with_cancel(
        &self,
        instance_id: &str,
        options: &RejoinOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<RejoinOutcome> {
        let mut cancel = Cancellation::new(Some(cancel), self.shutdown_rx.clone());
        self.run(instance_id, options, &mut cancel).await
    }

    async fn run(
        &self,
        instance_id: &str,
        options: &RejoinOptions,
        cancel: &mut Cancellation,
    ) -> Result<RejoinOutcome> {
        let _guard = self.claim(instance_id)?;
        let mut attempt = RejoinAttempt::new(instance_id);
        let mut warnings = Vec::new();

        let result = self
            .drive(&mut attempt, options, cancel, &mut warnings, false)
            .await;
        self.finish(attempt, result, warnings)
    }

    /// Run the admission checks without joining.
    ///
    /// Returns [`RejoinResult::Allowed`] or [`RejoinResult::Rejected`].
    pub async fn check_rejoin(&self, instance_id: &str, options: &RejoinOptions) -> Result<RejoinOutcome> {
        let _guard = self.claim(instance_id)?;
        let mut attempt = RejoinAttempt::new(instance_id);
        let mut warnings = Vec::new();
        let mut cancel = Cancellation::new(None, self.shutdown_rx.clone());

        let result = self
            .drive(&mut attempt, options, &mut cancel, &mut warnings, true)
            .await;
        self.finish(attempt, result, warnings)
    }

    /// Signal every running attempt and dry run to stop at its next poll
    /// boundary, including those started with a caller-owned cancel channel.
    pub fn shutdown(&self) {
        info!(in_flight = self.in_flight.len(), "Shutting down rejoin orchestrator");
        let _ = self.shutdown_tx.send(true);
    }

    fn claim(&self, instance_id: &str) -> Result<InFlightGuard> {
        if !self.in_flight.insert(instance_id.to_string()) {
            warn!(instance_id = %instance_id, "Rejoin already in progress");
            return Err(RejoinError::RejoinInProgress(instance_id.to_string()));
        }
        metrics::set_in_flight(self.in_flight.len());
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            instance_id: instance_id.to_string(),
        })
    }

    fn transition(&self, attempt: &mut RejoinAttempt, next: RejoinState) -> Result<()> {
        let from = attempt.state();
        attempt.advance(next)?;
        info!(instance_id = %attempt.instance_id, from = %from, to = %next, "Rejoin state transition");
        metrics::set_attempt_state(&attempt.instance_id, &next.to_string());
        Ok(())
    }

    async fn drive(
        &self,
        attempt: &mut RejoinAttempt,
        options: &RejoinOptions,
        cancel: &mut Cancellation,
        warnings: &mut Vec<Warning>,
        dry_run: bool,
    ) -> Result<RejoinResult> {
        let instance_id = attempt.instance_id.clone();
        self.transition(attempt, RejoinState::Validating)?;
        check_cancelled(attempt, cancel)?;

        self.precheck(&instance_id).await?;
        let snapshot = self.snapshot(&instance_id).await?;
        let cluster = gather_cluster_state(
            self.group.as_ref(),
            &self.config.cluster_id,
            &instance_id,
            &self.config.settings.fan_out,
            &self.bulkhead,
        )
        .await?;

        if !cluster.unreachable_members.is_empty() {
            warn!(
                instance_id = %instance_id,
                unreachable = ?cluster.unreachable_members,
                "Validating against a partial cluster view"
            );
        }

        let label = snapshot.endpoint.to_string();
        let verdict = validate_topology(
            &label,
            &snapshot.channels,
            &self.config.settings.topology.exempt_channels,
        )
        .and_then(|| reconcile(&label, &snapshot.executed, &cluster.executed, &cluster.purged));

        if let Verdict::Rejected(rejection) = verdict {
            return self.reject(attempt, rejection);
        }

        let negotiation = negotiate(NegotiationRequest {
            endpoint: &snapshot.endpoint,
            address_family: snapshot.address_family,
            candidate_version: snapshot.version,
            cluster_min_version: cluster.min_version,
            options,
        });
        warnings.extend(negotiation.warnings);
        if let Verdict::Rejected(rejection) = negotiation.verdict {
            return self.reject(attempt, rejection);
        }
        let effective = negotiation.effective_options;

        if dry_run {
            debug!(instance_id = %instance_id, "Dry run: all checks passed");
            return Ok(RejoinResult::Allowed);
        }

        check_cancelled(attempt, cancel)?;
        self.transition(attempt, RejoinState::JoinRequested)?;
        info!(
            instance_id = %instance_id,
            cluster_id = %self.config.cluster_id,
            options = effective.len(),
            "Requesting group join"
        );
        self.group
            .request_join(&instance_id, &self.config.cluster_id, &effective)
            .await
            .map_err(|e| match e {
                RejoinError::Communication { .. } => e,
                other => RejoinError::communication("request_join", instance_id.as_str(), other.to_string()),
            })?;
        attempt.join_requested = true;

        self.transition(attempt, RejoinState::WaitStable)?;
        let wait = &self.config.settings.wait_stable;
        let outcome = wait_for_stable(
            self.group.as_ref(),
            attempt,
            &wait.poll_schedule(),
            wait.timeout_duration(),
            cancel,
        )
        .await;

        match outcome {
            WaitOutcome::Online => {
                self.transition(attempt, RejoinState::Online)?;
                self.after_online(&snapshot, &effective, warnings).await;
                Ok(RejoinResult::Online)
            }
            WaitOutcome::TimedOut => {
                self.transition(attempt, RejoinState::TimedOut)?;
                warn!(
                    instance_id = %instance_id,
                    polls = attempt.polls,
                    elapsed = ?attempt.elapsed(),
                    "Instance did not become ONLINE within the wait budget"
                );
                Ok(RejoinResult::TimedOut {
                    polls: attempt.polls,
                    elapsed: attempt.elapsed(),
                })
            }
            WaitOutcome::Fatal(e) => Err(e),
            WaitOutcome::Cancelled => Err(RejoinError::Cancelled {
                instance_id,
                state: attempt.state().to_string(),
                join_requested: true,
            }),
        }
    }

    /// The candidate must not already be a member, and must be reachable.
    async fn precheck(&self, instance_id: &str) -> Result<()> {
        match self.group.member_state(instance_id).await? {
            state @ (MemberState::Online | MemberState::Recovering) => Err(RejoinError::AlreadyMember {
                instance_id: instance_id.to_string(),
                state: state.to_string(),
            }),
            MemberState::Unreachable => Err(RejoinError::communication(
                "member_state",
                instance_id,
                "instance is UNREACHABLE",
            )),
            MemberState::Offline | MemberState::Error => Ok(()),
        }
    }

    async fn snapshot(&self, instance_id: &str) -> Result<InstanceSnapshot> {
        let group = self.group.as_ref();
        let (info, executed, purged, channels) = futures::try_join!(
            group.instance_info(instance_id),
            group.executed_gtids(instance_id),
            group.purged_gtids(instance_id),
            group.replication_channels(instance_id),
        )?;

        debug!(
            instance_id = %instance_id,
            endpoint = %info.endpoint,
            version = %info.version,
            executed = %executed,
            channels = channels.len(),
            "Candidate snapshot taken"
        );

        Ok(InstanceSnapshot {
            instance_id: instance_id.to_string(),
            address_family: info.endpoint.address_family(),
            endpoint: info.endpoint,
            version: info.version,
            executed,
            purged,
            channels,
        })
    }

    fn reject(&self, attempt: &mut RejoinAttempt, rejection: Rejection) -> Result<RejoinResult> {
        info!(
            instance_id = %attempt.instance_id,
            reason = rejection.reason.code(),
            summary = %rejection.summary,
            "Rejoin rejected"
        );
        self.transition(attempt, RejoinState::Rejected)?;
        Ok(RejoinResult::Rejected(rejection))
    }

    /// Advisory steps once the member is ONLINE. Never fail the attempt.
    async fn after_online(&self, snapshot: &InstanceSnapshot, effective: &RejoinOptions, warnings: &mut Vec<Warning>) {
        let instance_id = snapshot.instance_id.as_str();
        let query_timeout = self.config.settings.wait_stable.query_timeout_duration();

        let probe = tokio::time::timeout(query_timeout, self.group.communication_protocol_version(instance_id))
            .await
            .unwrap_or_else(|_| Err(RejoinError::transient(instance_id, "protocol version query timed out")));
        match probe {
            Ok(version) => {
                debug!(instance_id = %instance_id, protocol = %version, "Group communication protocol version");
            }
            Err(e) => {
                info!(instance_id = %instance_id, error = %e, "Unable to determine group protocol version");
                warnings.push(Warning::note(format!(
                    "Unable to determine the Group Replication protocol version, while verifying if a protocol upgrade would be possible: {}",
                    error_message(&e)
                )));
            }
        }

        if snapshot.version < SET_PERSIST_MIN {
            return;
        }
        if let Err(e) = self.group.persist_configuration(instance_id, effective).await {
            warn!(instance_id = %instance_id, error = %e, "Failed to persist group configuration");
            warnings.push(Warning::warning(format!(
                "Unable to persist the Group Replication configuration on instance '{}': {}. Please persist it manually.",
                snapshot.endpoint,
                error_message(&e)
            )));
        }
    }

    fn finish(
        &self,
        mut attempt: RejoinAttempt,
        result: Result<RejoinResult>,
        warnings: Vec<Warning>,
    ) -> Result<RejoinOutcome> {
        let elapsed = attempt.elapsed();
        for warning in &warnings {
            metrics::record_warning(&warning.level.to_string());
        }

        match result {
            Ok(result) => {
                if let RejoinResult::Rejected(rejection) = &result {
                    metrics::record_rejection(&attempt.instance_id, rejection.reason.code());
                }
                metrics::record_attempt_complete(&attempt.instance_id, result.label(), elapsed);
                Ok(RejoinOutcome {
                    result,
                    warnings,
                    history: attempt.history().to_vec(),
                })
            }
            Err(e) => {
                if !attempt.state().is_terminal() && self.transition(&mut attempt, RejoinState::Rejected).is_err() {
                    debug!(instance_id = %attempt.instance_id, "Attempt already terminal");
                }
                warn!(
                    instance_id = %attempt.instance_id,
                    error = %e,
                    join_requested = attempt.join_requested,
                    history = ?attempt.history(),
                    "Rejoin failed"
                );
                metrics::record_error(&attempt.instance_id, e.kind());
                metrics::record_attempt_complete(&attempt.instance_id, "error", elapsed);
                Err(e)
            }
        }
    }
}

fn check_cancelled(attempt: &RejoinAttempt, cancel: &Cancellation) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RejoinError::Cancelled {
            instance_id: attempt.instance_id.clone(),
            state: attempt.state().to_string(),
            join_requested: attempt.join_requested,
        });
    }
    Ok(())
}

/// The underlying message without the error-kind prefix.
fn error_message(e: &RejoinError) -> String {
    match e {
        RejoinError::Transient { message, .. } | RejoinError::Communication { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Releases the instance claim when the attempt ends, however it ends.
struct InFlightGuard {
    in_flight: Arc<DashSet<String>>,
    instance_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.instance_id);
        metrics::set_in_flight(self.in_flight.len());
    }
}

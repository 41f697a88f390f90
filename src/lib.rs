//! # Rejoin Controller
//!
//! Admission control for instances rejoining a group-replicated cluster.
//!
//! Decides whether an instance that left the cluster may safely become a
//! member again, and drives the rejoin until the instance is ONLINE.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          RejoinOrchestrator                               │
//! │                                                                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌─────────────┐   ┌─────────────┐  │
//! │  │ snapshot +   │──►│ topology     │──►│ reconciler  │──►│ capability  │  │
//! │  │ cluster view │   │ (channels)   │   │ (GTID sets) │   │ (versions)  │  │
//! │  └──────────────┘   └──────────────┘   └─────────────┘   └─────────────┘  │
//! │         ▲                                                       │         │
//! │         │ join_all + bulkhead                  request_join +   ▼         │
//! │  ┌──────────────────────────────────────────────────────────────────────┐ │
//! │  │              GroupCommunication (shell-provided)                     │ │
//! │  └──────────────────────────────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Checks
//!
//! 1. **Topology**: no asynchronous replication channels on the candidate
//! 2. **GTID reconciliation**: no errant transactions, no purged gaps
//! 3. **Capability negotiation**: address family, option names, persistence
//!
//! The first rejection wins and is returned as data with a stable reason
//! code and ordered diagnostics. Errors are reserved for failures to reach
//! the cluster or drive the state machine.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rejoin_controller::{RejoinConfig, RejoinOptions, RejoinOrchestrator, RejoinResult};
//! # use rejoin_controller::group::GroupCommunication;
//! use std::sync::Arc;
//!
//! # async fn example<G: GroupCommunication>(shell: G) -> rejoin_controller::Result<()> {
//! let config = RejoinConfig::from_json_file("rejoin.json")?;
//! let orchestrator = RejoinOrchestrator::new(config, Arc::new(shell))?;
//!
//! let options = RejoinOptions::new().with("ipAllowlist", "10.0.0.0/8");
//! let outcome = orchestrator.rejoin("db2:3306", &options).await?;
//! for warning in &outcome.warnings {
//!     println!("{}", warning);
//! }
//! if let RejoinResult::Rejected(rejection) = &outcome.result {
//!     eprintln!("{}", rejection.render());
//! }
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod cluster;
pub mod config;
pub mod error;
pub mod group;
pub mod gtid;
pub mod instance;
pub mod metrics;
pub mod orchestrator;
pub mod reconciler;
pub mod resilience;
pub mod topology;
pub mod verdict;
pub mod version;

// Re-exports for convenience
pub use capability::{negotiate, Negotiation, NegotiationRequest, RejoinOptions};
pub use cluster::{gather_cluster_state, ClusterState};
pub use config::{FanOutConfig, RejoinConfig, RejoinSettings, TopologyConfig, WaitStableConfig};
pub use error::{RejoinError, Result};
pub use group::{BoxFuture, GroupCommunication};
pub use gtid::{GtidEntry, GtidParseError, GtidSet, Interval};
pub use instance::{
    AddressFamily, ChannelStatus, Endpoint, InstanceInfo, InstanceSnapshot, MemberState,
    ReplicationChannel,
};
pub use orchestrator::{RejoinAttempt, RejoinOrchestrator, RejoinOutcome, RejoinResult, RejoinState};
pub use reconciler::reconcile;
pub use topology::validate_topology;
pub use verdict::{RejectReason, Rejection, Verdict, Warning, WarningLevel};
pub use version::Version;

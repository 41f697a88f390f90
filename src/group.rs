// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Group-communication layer integration trait.
//!
//! The controller never talks to servers directly. Everything it needs from
//! the cluster (member states, GTID introspection, channel listing, and the
//! join primitive itself) goes through [`GroupCommunication`], which the
//! embedding shell implements on top of its session layer.
//!
//! Implementations classify their own failures: a query that may succeed
//! once membership settles returns [`RejoinError::Transient`]; anything else
//! returns [`RejoinError::Communication`].
//!
//! # Example
//!
//! ```rust,no_run
//! use rejoin_controller::group::{BoxFuture, GroupCommunication};
//! use rejoin_controller::gtid::GtidSet;
//! use rejoin_controller::instance::{InstanceInfo, MemberState, ReplicationChannel};
//! use rejoin_controller::capability::RejoinOptions;
//!
//! struct MyShell { /* sessions ... */ }
//!
//! impl GroupCommunication for MyShell {
//!     fn cluster_members(&self, _cluster_id: &str) -> BoxFuture<'_, Vec<String>> {
//!         Box::pin(async move { Ok(vec!["db1:3306".to_string()]) })
//!     }
//!     fn member_state(&self, _instance_id: &str) -> BoxFuture<'_, MemberState> {
//!         Box::pin(async move { Ok(MemberState::Online) })
//!     }
//!     fn instance_info(&self, _instance_id: &str) -> BoxFuture<'_, InstanceInfo> {
//!         unimplemented!()
//!     }
//!     fn executed_gtids(&self, _instance_id: &str) -> BoxFuture<'_, GtidSet> {
//!         Box::pin(async move { Ok(GtidSet::empty()) })
//!     }
//!     fn purged_gtids(&self, _instance_id: &str) -> BoxFuture<'_, GtidSet> {
//!         Box::pin(async move { Ok(GtidSet::empty()) })
//!     }
//!     fn replication_channels(&self, _instance_id: &str) -> BoxFuture<'_, Vec<ReplicationChannel>> {
//!         Box::pin(async move { Ok(vec![]) })
//!     }
//!     fn request_join(&self, _instance_id: &str, _cluster_id: &str, _options: &RejoinOptions) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

use crate::capability::RejoinOptions;
use crate::error::{RejoinError, Result};
use crate::gtid::GtidSet;
use crate::instance::{InstanceInfo, MemberState, ReplicationChannel};
use crate::version::Version;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the controller needs from the group-communication layer.
pub trait GroupCommunication: Send + Sync + 'static {
    /// Identities of the instances registered as members of `cluster_id`.
    fn cluster_members(&self, cluster_id: &str) -> BoxFuture<'_, Vec<String>>;

    /// Current group membership state of an instance.
    fn member_state(&self, instance_id: &str) -> BoxFuture<'_, MemberState>;

    /// Endpoint and server version of an instance.
    fn instance_info(&self, instance_id: &str) -> BoxFuture<'_, InstanceInfo>;

    /// Executed GTID set of an instance.
    fn executed_gtids(&self, instance_id: &str) -> BoxFuture<'_, GtidSet>;

    /// Purged GTID set of an instance.
    fn purged_gtids(&self, instance_id: &str) -> BoxFuture<'_, GtidSet>;

    /// Asynchronous replication channels configured on an instance.
    ///
    /// Channels owned by the group layer itself must not be listed.
    fn replication_channels(&self, instance_id: &str) -> BoxFuture<'_, Vec<ReplicationChannel>>;

    /// Ask the group layer to start membership for `instance_id`.
    ///
    /// Acknowledgement means the request was accepted, not that the member
    /// is online.
    fn request_join(
        &self,
        instance_id: &str,
        cluster_id: &str,
        options: &RejoinOptions,
    ) -> BoxFuture<'_, ()>;

    /// Communication protocol version in use by the group, seen from `instance_id`.
    ///
    /// Fails transiently while another member is joining. Default: unknown.
    fn communication_protocol_version(&self, instance_id: &str) -> BoxFuture<'_, Version> {
        let instance_id = instance_id.to_string();
        Box::pin(async move {
            Err(RejoinError::transient(
                instance_id,
                "communication protocol version not available",
            ))
        })
    }

    /// Persist group configuration on the instance. Advisory only.
    ///
    /// Default implementation does nothing.
    fn persist_configuration(&self, _instance_id: &str, _options: &RejoinOptions) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

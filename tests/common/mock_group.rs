//! Mock GroupCommunication for testing.
//!
//! Holds an in-memory cluster: one record per member plus a scripted
//! sequence of states the candidate reports once it has been asked to join.
//! Records join and persist calls for assertions. Members can be made
//! unreachable or slow to exercise the fan-out.

use rejoin_controller::capability::RejoinOptions;
use rejoin_controller::error::{RejoinError, Result};
use rejoin_controller::group::{BoxFuture, GroupCommunication};
use rejoin_controller::gtid::GtidSet;
use rejoin_controller::instance::{
    ChannelStatus, Endpoint, InstanceInfo, MemberState, ReplicationChannel,
};
use rejoin_controller::version::Version;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

pub const UUID_A: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562";
pub const UUID_B: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

/// Parse a GTID set, panicking on bad test input.
pub fn gtids(text: &str) -> GtidSet {
    text.parse().expect("valid GTID set in test")
}

/// One member's state in the mock cluster.
#[derive(Debug, Clone)]
pub struct MockMember {
    pub state: MemberState,
    pub endpoint: Endpoint,
    pub version: Version,
    pub executed: GtidSet,
    pub purged: GtidSet,
    pub channels: Vec<ReplicationChannel>,
    /// Every query fails with a communication error.
    pub unreachable: bool,
    /// Every query sleeps this long first.
    pub delay: Option<Duration>,
}

impl MockMember {
    /// An ONLINE member at `id` ("host:port" or "[v6]:port").
    pub fn online(id: &str, version: Version, executed: &str) -> Self {
        Self {
            state: MemberState::Online,
            endpoint: Endpoint::parse(id).expect("valid endpoint in test"),
            version,
            executed: gtids(executed),
            purged: GtidSet::empty(),
            channels: Vec::new(),
            unreachable: false,
            delay: None,
        }
    }

    /// An OFFLINE candidate at `id`.
    pub fn offline(id: &str, version: Version, executed: &str) -> Self {
        Self {
            state: MemberState::Offline,
            ..Self::online(id, version, executed)
        }
    }

    /// A member still catching up with the group.
    pub fn recovering(id: &str, version: Version, executed: &str) -> Self {
        Self {
            state: MemberState::Recovering,
            ..Self::online(id, version, executed)
        }
    }

    pub fn with_purged(mut self, purged: &str) -> Self {
        self.purged = gtids(purged);
        self
    }

    pub fn with_channel(mut self, name: &str, status: ChannelStatus) -> Self {
        self.channels.push(ReplicationChannel::new(name, status));
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A recorded request_join() call.
#[derive(Debug, Clone)]
pub struct JoinCall {
    pub instance_id: String,
    pub cluster_id: String,
    pub options: RejoinOptions,
}

/// Mock implementation of GroupCommunication that records calls.
///
/// # Example
/// ```rust,ignore
/// let mock = MockGroup::new("db2:3306");
/// mock.add_member(MockMember::online("db1:3306", v8_0_30, "uuid:1-10")).await;
/// mock.add_member(MockMember::offline("db2:3306", v8_0_30, "uuid:1-5")).await;
/// mock.script_after_join(vec![Ok(MemberState::Recovering), Ok(MemberState::Online)]).await;
///
/// // Use in tests...
///
/// assert_eq!(mock.join_calls().await.len(), 1);
/// ```
pub struct MockGroup {
    candidate: String,
    /// Members by id, in registration order
    members: RwLock<Vec<(String, MockMember)>>,
    /// States the candidate reports after the join; the last one repeats
    script: RwLock<VecDeque<Result<MemberState>>>,
    joined: AtomicBool,
    join_calls: RwLock<Vec<JoinCall>>,
    join_failure: RwLock<Option<RejoinError>>,
    join_delay: RwLock<Option<Duration>>,
    /// Candidate member_state() calls after the join
    polls: AtomicUsize,
    protocol: RwLock<Result<Version>>,
    persist_calls: RwLock<Vec<(String, RejoinOptions)>>,
    persist_failure: RwLock<Option<RejoinError>>,
    /// member_state() calls per member id
    state_queries: RwLock<HashMap<String, usize>>,
}

impl MockGroup {
    /// Create an empty mock cluster rejoining `candidate`.
    pub fn new(candidate: &str) -> Self {
        Self {
            candidate: candidate.to_string(),
            members: RwLock::new(Vec::new()),
            script: RwLock::new(VecDeque::from([Ok(MemberState::Online)])),
            joined: AtomicBool::new(false),
            join_calls: RwLock::new(Vec::new()),
            join_failure: RwLock::new(None),
            join_delay: RwLock::new(None),
            polls: AtomicUsize::new(0),
            protocol: RwLock::new(Ok(Version::new(8, 0, 16))),
            persist_calls: RwLock::new(Vec::new()),
            persist_failure: RwLock::new(None),
            state_queries: RwLock::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub async fn add_member(&self, member: MockMember) {
        let id = member.endpoint.to_string();
        self.members.write().await.push((id, member));
    }

    /// States reported by the candidate on successive polls after the join.
    pub async fn script_after_join(&self, script: Vec<Result<MemberState>>) {
        *self.script.write().await = script.into();
    }

    pub async fn fail_join(&self, error: RejoinError) {
        *self.join_failure.write().await = Some(error);
    }

    pub async fn delay_join(&self, delay: Duration) {
        *self.join_delay.write().await = Some(delay);
    }

    pub async fn set_protocol_version(&self, result: Result<Version>) {
        *self.protocol.write().await = result;
    }

    pub async fn fail_persist(&self, error: RejoinError) {
        *self.persist_failure.write().await = Some(error);
    }

    // =========================================================================
    // Assertions
    // =========================================================================

    pub async fn join_calls(&self) -> Vec<JoinCall> {
        self.join_calls.read().await.clone()
    }

    pub async fn persist_calls(&self) -> Vec<(String, RejoinOptions)> {
        self.persist_calls.read().await.clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    pub async fn state_queries(&self, id: &str) -> usize {
        self.state_queries.read().await.get(id).copied().unwrap_or(0)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn member(&self, id: &str, operation: &str) -> Result<MockMember> {
        let member = self
            .members
            .read()
            .await
            .iter()
            .find(|(m, _)| m == id)
            .map(|(_, m)| m.clone())
            .ok_or_else(|| RejoinError::communication(operation, id, "unknown instance"))?;
        if let Some(delay) = member.delay {
            tokio::time::sleep(delay).await;
        }
        if member.unreachable {
            return Err(RejoinError::communication(operation, id, "Can't connect to MySQL server"));
        }
        Ok(member)
    }

    async fn next_scripted_state(&self) -> Result<MemberState> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.write().await;
        if script.len() > 1 {
            script.pop_front().unwrap_or(Ok(MemberState::Online))
        } else {
            script.front().cloned().unwrap_or(Ok(MemberState::Online))
        }
    }
}

impl GroupCommunication for MockGroup {
    fn cluster_members(&self, _cluster_id: &str) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .members
                .read()
                .await
                .iter()
                .map(|(id, _)| id.clone())
                .collect())
        })
    }

    fn member_state(&self, instance_id: &str) -> BoxFuture<'_, MemberState> {
        let id = instance_id.to_string();
        Box::pin(async move {
            *self.state_queries.write().await.entry(id.clone()).or_default() += 1;
            if id == self.candidate && self.joined() {
                return self.next_scripted_state().await;
            }
            Ok(self.member(&id, "member_state").await?.state)
        })
    }

    fn instance_info(&self, instance_id: &str) -> BoxFuture<'_, InstanceInfo> {
        let id = instance_id.to_string();
        Box::pin(async move {
            let member = self.member(&id, "instance_info").await?;
            Ok(InstanceInfo {
                endpoint: member.endpoint,
                version: member.version,
            })
        })
    }

    fn executed_gtids(&self, instance_id: &str) -> BoxFuture<'_, GtidSet> {
        let id = instance_id.to_string();
        Box::pin(async move { Ok(self.member(&id, "executed_gtids").await?.executed) })
    }

    fn purged_gtids(&self, instance_id: &str) -> BoxFuture<'_, GtidSet> {
        let id = instance_id.to_string();
        Box::pin(async move { Ok(self.member(&id, "purged_gtids").await?.purged) })
    }

    fn replication_channels(&self, instance_id: &str) -> BoxFuture<'_, Vec<ReplicationChannel>> {
        let id = instance_id.to_string();
        Box::pin(async move { Ok(self.member(&id, "replication_channels").await?.channels) })
    }

    fn request_join(
        &self,
        instance_id: &str,
        cluster_id: &str,
        options: &RejoinOptions,
    ) -> BoxFuture<'_, ()> {
        let call = JoinCall {
            instance_id: instance_id.to_string(),
            cluster_id: cluster_id.to_string(),
            options: options.clone(),
        };
        Box::pin(async move {
            self.join_calls.write().await.push(call);
            if let Some(delay) = *self.join_delay.read().await {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = self.join_failure.read().await.clone() {
                return Err(error);
            }
            self.joined.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn communication_protocol_version(&self, _instance_id: &str) -> BoxFuture<'_, Version> {
        Box::pin(async move { self.protocol.read().await.clone() })
    }

    fn persist_configuration(&self, instance_id: &str, options: &RejoinOptions) -> BoxFuture<'_, ()> {
        let call = (instance_id.to_string(), options.clone());
        Box::pin(async move {
            self.persist_calls.write().await.push(call);
            match self.persist_failure.read().await.clone() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }
}

//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Mock GroupCommunication recording joins and scripting member states
//! - Cluster fixtures and an orchestrator builder

#![allow(dead_code)]

pub mod mock_group;

pub use mock_group::*;

use rejoin_controller::config::RejoinConfig;
use rejoin_controller::orchestrator::RejoinOrchestrator;
use rejoin_controller::version::Version;
use std::sync::Arc;

pub const CANDIDATE: &str = "db2:3306";
pub const V8_0_30: Version = Version::new(8, 0, 30);

/// Two ONLINE members with history `UUID_A:1-10` and an OFFLINE candidate
/// with `UUID_A:1-5`, which is a clean rejoin.
pub async fn healthy_cluster() -> MockGroup {
    let group = MockGroup::new(CANDIDATE);
    let history = format!("{UUID_A}:1-10");
    group
        .add_member(MockMember::online("db1:3306", V8_0_30, &history))
        .await;
    group
        .add_member(MockMember::offline(CANDIDATE, V8_0_30, &format!("{UUID_A}:1-5")))
        .await;
    group
        .add_member(MockMember::online("db3:3306", V8_0_30, &history))
        .await;
    group
}

/// Orchestrator over `group` with fast test timings.
pub fn orchestrator(group: MockGroup) -> (RejoinOrchestrator<MockGroup>, Arc<MockGroup>) {
    orchestrator_with(group, RejoinConfig::for_testing("test-cluster"))
}

pub fn orchestrator_with(
    group: MockGroup,
    config: RejoinConfig,
) -> (RejoinOrchestrator<MockGroup>, Arc<MockGroup>) {
    let group = Arc::new(group);
    let orchestrator =
        RejoinOrchestrator::new(config, Arc::clone(&group)).expect("valid test config");
    (orchestrator, group)
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration Tests for the Rejoin Controller
//!
//! Drives the orchestrator end to end against an in-memory cluster
//! (`common::MockGroup`). Timers run on tokio's paused clock, so polling
//! budgets are exact and the suite is fast.
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//! - `rejoin_*` - full attempts that join
//! - `reject_*` - admission checks and their diagnostics
//! - `wait_*` - wait-for-stable budget and classification
//! - `check_*` - dry runs

mod common;

use common::*;
use rejoin_controller::capability::RejoinOptions;
use rejoin_controller::config::{RejoinConfig, WaitStableConfig};
use rejoin_controller::error::RejoinError;
use rejoin_controller::instance::{ChannelStatus, MemberState};
use rejoin_controller::orchestrator::{RejoinResult, RejoinState};
use rejoin_controller::verdict::{RejectReason, Warning, WarningLevel};
use rejoin_controller::version::Version;

fn no_options() -> RejoinOptions {
    RejoinOptions::new()
}

/// Build a cluster around `candidate` with custom member versions.
async fn cluster_with(candidate: MockMember, peers: Vec<MockMember>) -> MockGroup {
    let group = MockGroup::new(&candidate.endpoint.to_string());
    for peer in peers {
        group.add_member(peer).await;
    }
    group.add_member(candidate).await;
    group
}

// =============================================================================
// Successful Rejoin
// =============================================================================

#[tokio::test(start_paused = true)]
async fn rejoin_clean_history_reaches_online() {
    let (orch, group) = orchestrator(healthy_cluster().await);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert_eq!(outcome.result, RejoinResult::Online);
    assert_eq!(
        outcome.history,
        vec![
            RejoinState::Init,
            RejoinState::Validating,
            RejoinState::JoinRequested,
            RejoinState::WaitStable,
            RejoinState::Online,
        ]
    );
    assert!(outcome.warnings.is_empty(), "unexpected warnings: {:?}", outcome.warnings);

    let joins = group.join_calls().await;
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].instance_id, CANDIDATE);
    assert_eq!(joins[0].cluster_id, "test-cluster");

    // 8.0.30 supports SET PERSIST
    assert_eq!(group.persist_calls().await.len(), 1);
    assert!(!orch.is_in_flight(CANDIDATE));
}

#[tokio::test(start_paused = true)]
async fn rejoin_passes_negotiated_options_to_join() {
    let (orch, group) = orchestrator(healthy_cluster().await);
    let options = no_options()
        .with("ipWhitelist", "10.0.0.0/8")
        .with("exitStateAction", "READ_ONLY");

    let outcome = orch.rejoin(CANDIDATE, &options).await.unwrap();

    assert!(outcome.is_online());
    assert_eq!(
        outcome.warnings,
        vec![Warning::warning(
            "The ipWhitelist option is deprecated in favor of ipAllowlist. ipAllowlist will be set instead."
        )]
    );

    let joins = group.join_calls().await;
    assert_eq!(joins[0].options.get("ipAllowlist"), Some("10.0.0.0/8"));
    assert_eq!(joins[0].options.get("ipWhitelist"), None);
    assert_eq!(joins[0].options.get("exitStateAction"), Some("READ_ONLY"));

    let persisted = group.persist_calls().await;
    assert_eq!(persisted[0].1, joins[0].options);
}

#[tokio::test(start_paused = true)]
async fn rejoin_old_candidate_warns_and_skips_persist() {
    let candidate = MockMember::offline(CANDIDATE, Version::new(8, 0, 10), &format!("{UUID_A}:1-5"));
    let peer = MockMember::online("db1:3306", Version::new(8, 0, 10), &format!("{UUID_A}:1-10"));
    let (orch, group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert!(outcome.is_online());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].level, WarningLevel::Warning);
    assert!(outcome.warnings[0]
        .message
        .contains("does not support the SET PERSIST command (MySQL version >= 8.0.11 required)"));
    assert!(group.persist_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejoin_protocol_probe_failure_is_a_note() {
    let (orch, group) = orchestrator(healthy_cluster().await);
    group
        .set_protocol_version(Err(RejoinError::transient(
            CANDIDATE,
            "Can't initialize function 'group_replication_get_communication_protocol'; A member is joining the group, wait for it to be ONLINE.",
        )))
        .await;

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert!(outcome.is_online());
    assert_eq!(
        outcome.warnings,
        vec![Warning::note(
            "Unable to determine the Group Replication protocol version, while verifying if a protocol upgrade would be possible: \
             Can't initialize function 'group_replication_get_communication_protocol'; A member is joining the group, wait for it to be ONLINE."
        )]
    );
    assert_eq!(outcome.warnings[0].to_string().split(':').next(), Some("NOTE"));
}

#[tokio::test(start_paused = true)]
async fn rejoin_persist_failure_is_a_warning() {
    let (orch, group) = orchestrator(healthy_cluster().await);
    group
        .fail_persist(RejoinError::communication("persist", CANDIDATE, "read-only file system"))
        .await;

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert!(outcome.is_online());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].message.contains("read-only file system"));
}

// =============================================================================
// Admission Checks
// =============================================================================

#[tokio::test(start_paused = true)]
async fn reject_errant_transactions_with_exact_detail() {
    let candidate = MockMember::offline(CANDIDATE, V8_0_30, &format!("{UUID_A}:1-5,{UUID_B}:1"));
    let peer = MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"));
    let (orch, group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert_eq!(outcome.reason_code(), Some("ErrantTransactions"));
    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.reason, RejectReason::ErrantTransactions(gtids(&format!("{UUID_B}:1"))));
    assert_eq!(rejection.detail, vec![format!("{UUID_B}:1")]);
    assert!(rejection.render().ends_with(&format!("\n{UUID_B}:1")));

    assert_eq!(
        outcome.history,
        vec![RejoinState::Init, RejoinState::Validating, RejoinState::Rejected]
    );
    assert!(group.join_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reject_errant_intervals_one_per_line() {
    let candidate = MockMember::offline(
        CANDIDATE,
        V8_0_30,
        &format!("{UUID_A}:1-12:20-21,{UUID_B}:1-3"),
    );
    let peer = MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"));
    let (orch, _group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    // Sources sort by UUID
    assert_eq!(
        outcome.rejection().unwrap().detail,
        vec![
            format!("{UUID_A}:11-12"),
            format!("{UUID_A}:20-21"),
            format!("{UUID_B}:1-3"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn reject_missing_purged_transactions() {
    let candidate = MockMember::offline(CANDIDATE, V8_0_30, &format!("{UUID_A}:6-10"));
    let peers = vec![
        MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"))
            .with_purged(&format!("{UUID_A}:1-5")),
        MockMember::online("db3:3306", V8_0_30, &format!("{UUID_A}:1-10"))
            .with_purged(&format!("{UUID_A}:1-7")),
    ];
    let (orch, group) = orchestrator(cluster_with(candidate, peers).await);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    // Cluster purged is the intersection over members
    let rejection = outcome.rejection().unwrap();
    assert_eq!(outcome.reason_code(), Some("MissingPurgedTransactions"));
    assert_eq!(rejection.detail, vec![format!("{UUID_A}:1-5")]);
    assert!(group.join_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reject_empty_gtid_set() {
    let candidate = MockMember::offline(CANDIDATE, V8_0_30, "");
    let peer = MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"));
    let (orch, _group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();
    assert_eq!(outcome.reason_code(), Some("EmptyGTIDSet"));
}

#[tokio::test(start_paused = true)]
async fn reject_channels_before_gtid_checks() {
    // Errant history too, but topology runs first
    let candidate = MockMember::offline(CANDIDATE, V8_0_30, &format!("{UUID_B}:1"))
        .with_channel("", ChannelStatus::Stopped);
    let peer = MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"));
    let (orch, group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.reason.code(), "AsyncChannelsPresent");
    assert_eq!(rejection.detail, vec!["<default> (stopped)"]);
    assert_eq!(
        rejection.summary,
        "The instance 'db2:3306' has asynchronous replication configured."
    );
    assert!(group.join_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejoin_exempt_channel_is_ignored() {
    let candidate = MockMember::offline(CANDIDATE, V8_0_30, &format!("{UUID_A}:1-5"))
        .with_channel("sys_managed", ChannelStatus::Running);
    let peer = MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"));
    let mut config = RejoinConfig::for_testing("test-cluster");
    config.settings.topology.exempt_channels = vec!["sys_managed".to_string()];
    let (orch, _group) = orchestrator_with(cluster_with(candidate, vec![peer]).await, config);

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();
    assert!(outcome.is_online());
}

#[tokio::test(start_paused = true)]
async fn reject_ipv6_endpoint_below_8_0_14() {
    let candidate_id = "[::1]:3306";
    let candidate = MockMember::offline(candidate_id, V8_0_30, &format!("{UUID_A}:1-5"));
    let peer = MockMember::online("db1:3306", Version::new(8, 0, 13), &format!("{UUID_A}:1-10"));
    let (orch, group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let outcome = orch.rejoin(candidate_id, &no_options()).await.unwrap();

    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.reason, RejectReason::UnsupportedAddressFamily);
    assert_eq!(
        rejection.summary,
        "Unsupported IP address '::1'. IPv6 is only supported by Group Replication on MySQL version >= 8.0.14."
    );
    assert!(group.join_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reject_ipv6_endpoint_while_old_member_recovers() {
    let candidate_id = "[::1]:3306";
    let candidate = MockMember::offline(candidate_id, V8_0_30, &format!("{UUID_A}:1-5"));
    let online = MockMember::online("db1:3306", Version::new(8, 0, 20), &format!("{UUID_A}:1-10"));
    let recovering =
        MockMember::recovering("db3:3306", Version::new(8, 0, 13), &format!("{UUID_A}:1-3"));
    let (orch, group) = orchestrator(cluster_with(candidate, vec![online, recovering]).await);

    let outcome = orch.rejoin(candidate_id, &no_options()).await.unwrap();

    assert_eq!(outcome.reason_code(), Some("UnsupportedAddressFamily"));
    assert!(group.join_calls().await.is_empty());
    assert!(!group.joined());
}

#[tokio::test(start_paused = true)]
async fn rejoin_ipv6_endpoint_at_8_0_14() {
    let candidate_id = "[::1]:3306";
    let candidate = MockMember::offline(candidate_id, V8_0_30, &format!("{UUID_A}:1-5"));
    let peer = MockMember::online("db1:3306", Version::new(8, 0, 14), &format!("{UUID_A}:1-10"));
    let (orch, _group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let outcome = orch.rejoin(candidate_id, &no_options()).await.unwrap();
    assert!(outcome.is_online());
}

#[tokio::test(start_paused = true)]
async fn reject_unknown_option() {
    let (orch, group) = orchestrator(healthy_cluster().await);
    let options = no_options().with("groupSeeds", "db1:33061");

    let outcome = orch.rejoin(CANDIDATE, &options).await.unwrap();

    assert_eq!(outcome.reason_code(), Some("UnsupportedConfigOption"));
    assert!(group.join_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reject_already_member() {
    let candidate = MockMember::online(CANDIDATE, V8_0_30, &format!("{UUID_A}:1-10"));
    let peer = MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"));
    let (orch, group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let err = orch.rejoin(CANDIDATE, &no_options()).await.unwrap_err();

    assert_eq!(
        err,
        RejoinError::AlreadyMember {
            instance_id: CANDIDATE.to_string(),
            state: "ONLINE".to_string(),
        }
    );
    assert!(group.join_calls().await.is_empty());
}

// =============================================================================
// Wait-for-stable Budget
// =============================================================================

fn budget(max_polls: usize) -> RejoinConfig {
    let mut config = RejoinConfig::for_testing("test-cluster");
    config.settings.wait_stable = WaitStableConfig {
        poll_interval: "100ms".to_string(),
        max_poll_interval: "100ms".to_string(),
        max_polls,
        timeout: "1h".to_string(),
        ..WaitStableConfig::for_testing()
    };
    config
}

#[tokio::test(start_paused = true)]
async fn wait_recovering_under_budget_reaches_online() {
    const N: usize = 4;
    let (orch, group) = orchestrator_with(healthy_cluster().await, budget(N + 1));
    let mut script = vec![Ok(MemberState::Recovering); N];
    script.push(Ok(MemberState::Online));
    group.script_after_join(script).await;

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert_eq!(outcome.result, RejoinResult::Online);
    assert_eq!(group.polls(), N + 1);
}

#[tokio::test(start_paused = true)]
async fn wait_recovering_for_full_budget_times_out() {
    const N: usize = 4;
    let (orch, group) = orchestrator_with(healthy_cluster().await, budget(N + 1));
    group
        .script_after_join(vec![Ok(MemberState::Recovering)])
        .await;

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    match outcome.result {
        RejoinResult::TimedOut { polls, .. } => assert_eq!(polls, N + 1),
        other => panic!("expected TimedOut, got {:?}", other),
    }
    assert_eq!(outcome.history.last(), Some(&RejoinState::TimedOut));
    assert_eq!(group.polls(), N + 1);
    // Probe and persistence only follow ONLINE
    assert!(group.persist_calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_wall_clock_deadline_times_out() {
    let mut config = budget(1_000);
    config.settings.wait_stable.timeout = "1s".to_string();
    let (orch, group) = orchestrator_with(healthy_cluster().await, config);
    group
        .script_after_join(vec![Ok(MemberState::Recovering)])
        .await;

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    match outcome.result {
        RejoinResult::TimedOut { polls, .. } => assert!(polls <= 10, "polls = {}", polls),
        other => panic!("expected TimedOut, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn wait_offline_and_unreachable_are_transient() {
    let (orch, group) = orchestrator_with(healthy_cluster().await, budget(10));
    group
        .script_after_join(vec![
            Ok(MemberState::Offline),
            Ok(MemberState::Unreachable),
            Err(RejoinError::transient(CANDIDATE, "A member is joining the group")),
            Ok(MemberState::Recovering),
            Ok(MemberState::Online),
        ])
        .await;

    let outcome = orch.rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert!(outcome.is_online());
    assert_eq!(group.polls(), 5);
}

// =============================================================================
// Dry Run
// =============================================================================

#[tokio::test(start_paused = true)]
async fn check_allowed_without_joining() {
    let (orch, group) = orchestrator(healthy_cluster().await);

    let outcome = orch.check_rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert_eq!(outcome.result, RejoinResult::Allowed);
    assert!(group.join_calls().await.is_empty());
    assert!(!group.joined());
}

#[tokio::test(start_paused = true)]
async fn check_is_idempotent_over_unchanged_state() {
    let candidate = MockMember::offline(CANDIDATE, V8_0_30, &format!("{UUID_A}:1-5,{UUID_B}:1-2"));
    let peer = MockMember::online("db1:3306", V8_0_30, &format!("{UUID_A}:1-10"));
    let (orch, _group) = orchestrator(cluster_with(candidate, vec![peer]).await);

    let first = orch.check_rejoin(CANDIDATE, &no_options()).await.unwrap();
    let second = orch.check_rejoin(CANDIDATE, &no_options()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.reason_code(), Some("ErrantTransactions"));
}

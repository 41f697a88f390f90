//! Configuration for the rejoin controller.
//!
//! Configuration is passed to [`RejoinOrchestrator::new()`](crate::RejoinOrchestrator::new)
//! and can be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use rejoin_controller::config::RejoinConfig;
//!
//! let config = RejoinConfig {
//!     cluster_id: "prod-cluster".into(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! RejoinConfig
//! ├── cluster_id: String              # Cluster the instance rejoins
//! └── settings: RejoinSettings
//!     ├── wait_stable: WaitStableConfig   # Poll schedule and budget
//!     ├── fan_out: FanOutConfig           # Cluster-wide queries
//!     └── topology: TopologyConfig        # Channel exemptions
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "cluster_id": "prod-cluster",
//!   "settings": {
//!     "wait_stable": { "poll_interval": "1s", "max_polls": 120, "timeout": "5m" },
//!     "fan_out": { "max_concurrent": 8, "member_timeout": "3s" },
//!     "topology": { "exempt_channels": [] }
//!   }
//! }
//! ```

use crate::error::{RejoinError, Result};
use crate::resilience::PollSchedule;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `RejoinOrchestrator::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejoinConfig {
    /// Identity of the cluster instances are rejoined to.
    pub cluster_id: String,

    /// Tunables for polling, fan-out and topology checks.
    #[serde(default)]
    pub settings: RejoinSettings,
}

impl Default for RejoinConfig {
    fn default() -> Self {
        Self {
            cluster_id: "default".to_string(),
            settings: RejoinSettings::default(),
        }
    }
}

impl RejoinConfig {
    /// Fast-polling config for tests.
    pub fn for_testing(cluster_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            settings: RejoinSettings {
                wait_stable: WaitStableConfig::for_testing(),
                fan_out: FanOutConfig {
                    max_concurrent: 4,
                    member_timeout: "500ms".to_string(),
                },
                topology: TopologyConfig::default(),
            },
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RejoinError::Config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RejoinError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.trim().is_empty() {
            return Err(RejoinError::Config("cluster_id must not be empty".to_string()));
        }
        self.settings.wait_stable.validate()?;
        self.settings.fan_out.validate()?;
        Ok(())
    }
}

/// General settings for the rejoin logic.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RejoinSettings {
    #[serde(default)]
    pub wait_stable: WaitStableConfig,
    #[serde(default)]
    pub fan_out: FanOutConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WaitStableConfig: polling after the join request
// ═══════════════════════════════════════════════════════════════════════════════

/// How long and how often to poll the candidate after requesting the join.
///
/// The budget ends at whichever comes first: `max_polls` polls or `timeout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitStableConfig {
    /// Delay before each poll, as a duration string (e.g., "1s").
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Maximum number of member-state polls.
    #[serde(default = "default_max_polls")]
    pub max_polls: usize,

    /// Wall-clock budget for the whole wait (e.g., "5m").
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Multiplier applied to the poll interval after each transient poll.
    /// 1.0 keeps a fixed interval.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Ceiling for the poll interval when backing off.
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval: String,

    /// Timeout for each individual member-state query.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: String,
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_max_polls() -> usize {
    300
}

fn default_timeout() -> String {
    "5m".to_string()
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_poll_interval() -> String {
    "10s".to_string()
}

fn default_query_timeout() -> String {
    "5s".to_string()
}

impl Default for WaitStableConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_polls: default_max_polls(),
            timeout: default_timeout(),
            backoff_factor: default_backoff_factor(),
            max_poll_interval: default_max_poll_interval(),
            query_timeout: default_query_timeout(),
        }
    }
}

impl WaitStableConfig {
    /// Fast-fail schedule for tests.
    pub fn for_testing() -> Self {
        Self {
            poll_interval: "5ms".to_string(),
            max_polls: 20,
            timeout: "2s".to_string(),
            backoff_factor: 1.0,
            max_poll_interval: "50ms".to_string(),
            query_timeout: "200ms".to_string(),
        }
    }

    pub fn poll_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(1))
    }

    pub fn timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.timeout).unwrap_or(Duration::from_secs(300))
    }

    pub fn max_poll_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.max_poll_interval).unwrap_or(Duration::from_secs(10))
    }

    pub fn query_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.query_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            max_polls: self.max_polls,
            interval: self.poll_interval_duration(),
            max_interval: self.max_poll_interval_duration(),
            backoff_factor: self.backoff_factor,
            query_timeout: self.query_timeout_duration(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_polls == 0 {
            return Err(RejoinError::Config("wait_stable.max_polls must be > 0".to_string()));
        }
        if self.backoff_factor < 1.0 {
            return Err(RejoinError::Config(
                "wait_stable.backoff_factor must be >= 1.0".to_string(),
            ));
        }
        for (field, value) in [
            ("poll_interval", &self.poll_interval),
            ("timeout", &self.timeout),
            ("max_poll_interval", &self.max_poll_interval),
            ("query_timeout", &self.query_timeout),
        ] {
            humantime::parse_duration(value).map_err(|e| {
                RejoinError::Config(format!("wait_stable.{} '{}': {}", field, value, e))
            })?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FanOutConfig: cluster-wide queries
// ═══════════════════════════════════════════════════════════════════════════════

/// Limits for querying every cluster member when building the cluster view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Maximum members queried concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-member budget; a member exceeding it counts as unreachable.
    #[serde(default = "default_member_timeout")]
    pub member_timeout: String,
}

fn default_max_concurrent() -> usize {
    16
}

fn default_member_timeout() -> String {
    "5s".to_string()
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            member_timeout: default_member_timeout(),
        }
    }
}

impl FanOutConfig {
    pub fn member_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.member_timeout).unwrap_or(Duration::from_secs(5))
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(RejoinError::Config("fan_out.max_concurrent must be > 0".to_string()));
        }
        humantime::parse_duration(&self.member_timeout).map_err(|e| {
            RejoinError::Config(format!("fan_out.member_timeout '{}': {}", self.member_timeout, e))
        })?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TopologyConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Replication channel policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopologyConfig {
    /// Channel names managed outside the operator's control that do not
    /// block a rejoin. Empty by default: every channel disqualifies.
    #[serde(default)]
    pub exempt_channels: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

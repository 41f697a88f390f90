//! Candidate instance description: endpoint, member state, channels, and
//! the point-in-time snapshot validation runs against.

use crate::gtid::GtidSet;
use crate::version::Version;
use std::fmt;
use std::net::IpAddr;

/// Resolved address family of an endpoint host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    /// A hostname; resolution is left to the group layer.
    Hostname,
}

/// `host:port` of an instance. IPv6 literals are bracketed when rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);
        Self { host, port }
    }

    /// Parse `host:port` or `[v6]:port`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest.split_once("]:")?;
            return Some(Self::new(host, port.parse().ok()?));
        }
        let (host, port) = s.rsplit_once(':')?;
        if host.is_empty() || host.contains(':') {
            return None;
        }
        Some(Self::new(host, port.parse().ok()?))
    }

    pub fn address_family(&self) -> AddressFamily {
        address_family(&self.host)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address_family() == AddressFamily::Ipv6 {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Classify a bare host string.
pub fn address_family(host: &str) -> AddressFamily {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => AddressFamily::Ipv4,
        Ok(IpAddr::V6(_)) => AddressFamily::Ipv6,
        Err(_) => AddressFamily::Hostname,
    }
}

/// Group membership state reported for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Online,
    Recovering,
    Offline,
    Unreachable,
    /// The member left the group after an unrecoverable applier or recovery error.
    Error,
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "ONLINE"),
            Self::Recovering => write!(f, "RECOVERING"),
            Self::Offline => write!(f, "OFFLINE"),
            Self::Unreachable => write!(f, "UNREACHABLE"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Running,
    Stopped,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A configured asynchronous replication channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationChannel {
    pub name: String,
    pub status: ChannelStatus,
}

impl ReplicationChannel {
    pub fn new(name: impl Into<String>, status: ChannelStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Static facts about an instance: where it is and what it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub endpoint: Endpoint,
    pub version: Version,
}

/// Immutable view of the candidate taken at the start of an attempt.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub instance_id: String,
    pub endpoint: Endpoint,
    pub address_family: AddressFamily,
    pub version: Version,
    pub executed: GtidSet,
    pub purged: GtidSet,
    pub channels: Vec<ReplicationChannel>,
}

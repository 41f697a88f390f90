//! Server version parsing and the feature gates that depend on it.

use std::fmt;
use std::str::FromStr;

/// `major.minor.patch` server version. Suffixes such as `-log` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

/// First version whose SET PERSIST can store group configuration.
pub const SET_PERSIST_MIN: Version = Version::new(8, 0, 11);
/// First version whose group layer routes IPv6.
pub const IPV6_MIN: Version = Version::new(8, 0, 14);
/// First version where `ipAllowlist` replaces `ipWhitelist`.
pub const ALLOWLIST_MIN: Version = Version::new(8, 0, 23);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid server version '{0}'")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError(s.to_string());
        let core = s.trim().split(['-', ' ']).next().unwrap_or_default();
        let mut parts = core.split('.');

        let major = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| err())?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| err())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self { major, minor, patch })
    }
}

//! Capability negotiation between the candidate and the cluster.
//!
//! Resolves three kinds of version gap:
//!
//! - **Address family**: the group layer only routes IPv6 from 8.0.14, so an
//!   IPv6 literal endpoint is refused while any member is older.
//! - **Option names**: recognised options live in a single versioned table.
//!   One resolution pass yields the effective option set (deprecated aliases
//!   translated to the name the candidate understands) plus any warnings.
//! - **Persistence**: below 8.0.11 configuration cannot be persisted with
//!   SET PERSIST; this only produces an advisory warning.
//!
//! Warnings never turn an allowed verdict into a rejection.

use crate::instance::{address_family, AddressFamily, Endpoint};
use crate::verdict::{RejectReason, Rejection, Verdict, Warning};
use crate::version::{Version, ALLOWLIST_MIN, IPV6_MIN, SET_PERSIST_MIN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options requested for the rejoin, keyed by option name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejoinOptions {
    values: BTreeMap<String, String>,
}

impl RejoinOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// How an option value is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    /// Comma separated addresses/subnets, or `AUTOMATIC`.
    AddressList,
    /// A single `host:port`.
    Address,
    /// Opaque, passed through.
    Plain,
}

/// One row of the option translation table.
#[derive(Debug, Clone, Copy)]
struct OptionSpec {
    name: &'static str,
    alias: Option<&'static str>,
    /// From this candidate version on, `name` is used and `alias` warns.
    /// Below it, `alias` is the name the server understands.
    alias_deprecated_since: Option<Version>,
    min_version: Option<Version>,
    kind: ValueKind,
}

const OPTION_TABLE: &[OptionSpec] = &[
    OptionSpec {
        name: "ipAllowlist",
        alias: Some("ipWhitelist"),
        alias_deprecated_since: Some(ALLOWLIST_MIN),
        min_version: None,
        kind: ValueKind::AddressList,
    },
    OptionSpec {
        name: "localAddress",
        alias: None,
        alias_deprecated_since: None,
        min_version: None,
        kind: ValueKind::Address,
    },
    OptionSpec {
        name: "memberWeight",
        alias: None,
        alias_deprecated_since: None,
        min_version: Some(Version::new(8, 0, 11)),
        kind: ValueKind::Plain,
    },
    OptionSpec {
        name: "exitStateAction",
        alias: None,
        alias_deprecated_since: None,
        min_version: Some(Version::new(8, 0, 12)),
        kind: ValueKind::Plain,
    },
    OptionSpec {
        name: "consistency",
        alias: None,
        alias_deprecated_since: None,
        min_version: Some(Version::new(8, 0, 14)),
        kind: ValueKind::Plain,
    },
    OptionSpec {
        name: "autoRejoinTries",
        alias: None,
        alias_deprecated_since: None,
        min_version: Some(Version::new(8, 0, 16)),
        kind: ValueKind::Plain,
    },
];

fn lookup(name: &str) -> Option<&'static OptionSpec> {
    OPTION_TABLE
        .iter()
        .find(|spec| spec.name == name || spec.alias == Some(name))
}

/// Inputs to [`negotiate`].
#[derive(Debug, Clone, Copy)]
pub struct NegotiationRequest<'a> {
    pub endpoint: &'a Endpoint,
    /// Family the endpoint host resolved to when the snapshot was taken.
    pub address_family: AddressFamily,
    pub candidate_version: Version,
    pub cluster_min_version: Version,
    pub options: &'a RejoinOptions,
}

/// Outcome of negotiation: verdict, warnings in emission order, and the
/// option set to hand to the join primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub verdict: Verdict,
    pub warnings: Vec<Warning>,
    pub effective_options: RejoinOptions,
}

impl Negotiation {
    fn rejected(rejection: Rejection, warnings: Vec<Warning>) -> Self {
        Self {
            verdict: Verdict::Rejected(rejection),
            warnings,
            effective_options: RejoinOptions::default(),
        }
    }
}

/// Resolve address family, option names and persistence support.
pub fn negotiate(req: NegotiationRequest<'_>) -> Negotiation {
    let instance = req.endpoint.to_string();
    let mut warnings = Vec::new();

    if req.address_family == AddressFamily::Ipv6 && req.cluster_min_version < IPV6_MIN {
        let host = &req.endpoint.host;
        let rejection = Rejection::new(
            RejectReason::UnsupportedAddressFamily,
            format!(
                "Unsupported IP address '{}'. IPv6 is only supported by Group Replication on MySQL version >= {}.",
                host, IPV6_MIN
            ),
        )
        .with_hint(format!(
            "Cannot use host '{}' for instance '{}' because it is an IPv6 address which is only supported by Group Replication from MySQL version >= {}. \
             Set the MySQL server 'report_host' variable to an IPv4 address or hostname that resolves an IPv4 address.",
            host, instance, IPV6_MIN
        ))
        .with_detail(vec![host.clone()]);
        return Negotiation::rejected(rejection, warnings);
    }

    // IPv6 inside option values must be routable by every side of the join.
    let ipv6_floor = req.candidate_version.min(req.cluster_min_version);
    let mut effective = BTreeMap::new();

    for (given, value) in req.options.iter() {
        let Some(spec) = lookup(given) else {
            return Negotiation::rejected(
                option_rejection(given, format!("Unknown option '{}'.", given)),
                warnings,
            );
        };

        if let Some(alias) = spec.alias {
            if given == alias && req.options.get(spec.name).is_some() {
                return Negotiation::rejected(
                    option_rejection(
                        given,
                        format!(
                            "Cannot use the {} and {} options simultaneously. The {} option is deprecated, please use the {} option instead.",
                            alias, spec.name, alias, spec.name
                        ),
                    ),
                    warnings,
                );
            }
        }

        if let Some(min) = spec.min_version {
            if req.candidate_version < min {
                return Negotiation::rejected(
                    option_rejection(
                        given,
                        format!(
                            "Option '{}' not supported on target server version: '{}' (version >= {} required).",
                            given, req.candidate_version, min
                        ),
                    ),
                    warnings,
                );
            }
        }

        if let Err(rejection) = check_value(given, value, spec.kind, ipv6_floor) {
            return Negotiation::rejected(rejection, warnings);
        }

        let effective_name = match (spec.alias, spec.alias_deprecated_since) {
            (Some(alias), Some(since)) if req.candidate_version < since => alias,
            (Some(alias), Some(_)) if given == alias => {
                warnings.push(Warning::warning(format!(
                    "The {} option is deprecated in favor of {}. {} will be set instead.",
                    alias, spec.name, spec.name
                )));
                spec.name
            }
            _ => spec.name,
        };
        effective.insert(effective_name.to_string(), value.to_string());
    }

    if req.candidate_version < SET_PERSIST_MIN {
        warnings.push(Warning::warning(format!(
            "Instance '{}' cannot persist Group Replication configuration since MySQL version {} does not support the SET PERSIST command \
             (MySQL version >= {} required). Please persist the changes in the instance's option file locally.",
            instance, req.candidate_version, SET_PERSIST_MIN
        )));
    }

    Negotiation {
        verdict: Verdict::Allowed,
        warnings,
        effective_options: RejoinOptions { values: effective },
    }
}

fn option_rejection(option: &str, summary: String) -> Rejection {
    Rejection::new(RejectReason::UnsupportedConfigOption, summary).with_detail(vec![option.to_string()])
}

fn check_value(
    option: &str,
    value: &str,
    kind: ValueKind,
    ipv6_floor: Version,
) -> std::result::Result<(), Rejection> {
    if value.trim().is_empty() {
        return Err(option_rejection(
            option,
            format!("Invalid value for {}: it cannot be empty.", option),
        ));
    }

    let hosts: Vec<String> = match kind {
        ValueKind::Plain => return Ok(()),
        ValueKind::AddressList if value.trim().eq_ignore_ascii_case("AUTOMATIC") => return Ok(()),
        ValueKind::AddressList => value
            .split(',')
            .map(|entry| {
                let entry = entry.trim();
                // Strip a CIDR suffix; only the address part decides the family.
                entry.split_once('/').map(|(a, _)| a).unwrap_or(entry).to_string()
            })
            .collect(),
        ValueKind::Address => match Endpoint::parse(value) {
            Some(endpoint) => vec![endpoint.host],
            None => vec![value.trim().to_string()],
        },
    };

    if ipv6_floor >= IPV6_MIN {
        return Ok(());
    }

    match hosts
        .iter()
        .find(|h| address_family(h) == AddressFamily::Ipv6)
    {
        Some(host) => Err(option_rejection(
            option,
            format!(
                "Invalid value for {} '{}': IPv6 not supported (version >= {} required for IPv6 support).",
                option, host, IPV6_MIN
            ),
        )),
        None => Ok(()),
    }
}

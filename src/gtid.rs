//! GTID set algebra.
//!
//! A [`GtidSet`] is an immutable snapshot of the transactions executed (or
//! purged) on a server, grouped by originating source UUID:
//!
//! ```text
//! 3e11fa47-71ca-11e1-9e33-c80aa9429562:1-5:7,00025721-1111-1111-1111-111111111111:1
//! └────────────── source UUID ───────────┘ └intervals┘
//! ```
//!
//! Sets are normalised on construction (intervals sorted, adjacent and
//! overlapping ranges merged, UUIDs lower-cased) so structural equality is
//! set equality. All operations return new sets; the backing map is shared
//! behind an `Arc` and never mutated.
//!
//! # Example
//!
//! ```rust
//! use rejoin_controller::gtid::GtidSet;
//!
//! let candidate: GtidSet = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa:1-5".parse().unwrap();
//! let cluster: GtidSet = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa:1-10".parse().unwrap();
//!
//! assert!(candidate.difference(&cluster).is_empty());
//! assert!(candidate.is_subset(&cluster));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Closed range of transaction numbers `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    /// Create an interval. `start` and `end` are swapped if given backwards.
    pub fn new(start: u64, end: u64) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Single-transaction interval.
    pub fn single(gno: u64) -> Self {
        Self { start: gno, end: gno }
    }

    /// Number of transactions covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, gno: u64) -> bool {
        self.start <= gno && gno <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// One `source:interval` pair, the unit of diagnostic reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtidEntry {
    pub source: String,
    pub interval: Interval,
}

impl fmt::Display for GtidEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.interval)
    }
}

/// Error parsing the textual GTID set representation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GtidParseError {
    #[error("invalid source UUID '{0}'")]
    InvalidUuid(String),

    #[error("missing interval for source '{0}'")]
    MissingInterval(String),

    #[error("invalid interval '{interval}' for source '{source_id}'")]
    InvalidInterval { source_id: String, interval: String },
}

/// Immutable set of global transaction identifiers.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GtidSet {
    sources: Arc<BTreeMap<String, Vec<Interval>>>,
}

impl GtidSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from `(source, start, end)` triples.
    pub fn from_intervals<'a, I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u64, u64)>,
    {
        let mut sources: BTreeMap<String, Vec<Interval>> = BTreeMap::new();
        for (source, start, end) in intervals {
            sources
                .entry(source.to_ascii_lowercase())
                .or_default()
                .push(Interval::new(start, end));
        }
        Self::from_map(sources)
    }

    fn from_map(mut sources: BTreeMap<String, Vec<Interval>>) -> Self {
        for intervals in sources.values_mut() {
            normalize(intervals);
        }
        sources.retain(|_, intervals| !intervals.is_empty());
        Self {
            sources: Arc::new(sources),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Whether `(source, gno)` is a member of this set.
    pub fn contains(&self, source: &str, gno: u64) -> bool {
        self.sources
            .get(&source.to_ascii_lowercase())
            .map(|intervals| intervals.iter().any(|i| i.contains(gno)))
            .unwrap_or(false)
    }

    /// Source UUIDs present in the set, in sorted order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Intervals recorded for a source (empty if absent).
    pub fn intervals(&self, source: &str) -> &[Interval] {
        self.sources
            .get(&source.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of transactions in the set.
    pub fn transaction_count(&self) -> u64 {
        self.sources
            .values()
            .flat_map(|intervals| intervals.iter())
            .fold(0u64, |acc, i| acc.saturating_add(i.len()))
    }

    /// Every `source:interval` pair, sorted by source then interval.
    pub fn entries(&self) -> Vec<GtidEntry> {
        self.sources
            .iter()
            .flat_map(|(source, intervals)| {
                intervals.iter().map(move |interval| GtidEntry {
                    source: source.clone(),
                    interval: *interval,
                })
            })
            .collect()
    }

    /// `self − other`: transactions in `self` that `other` does not have.
    pub fn difference(&self, other: &GtidSet) -> GtidSet {
        let mut out = BTreeMap::new();
        for (source, intervals) in self.sources.iter() {
            let remaining = match other.sources.get(source) {
                Some(theirs) => subtract(intervals, theirs),
                None => intervals.clone(),
            };
            if !remaining.is_empty() {
                out.insert(source.clone(), remaining);
            }
        }
        GtidSet {
            sources: Arc::new(out),
        }
    }

    /// `self ∪ other`.
    pub fn union(&self, other: &GtidSet) -> GtidSet {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut merged = (*self.sources).clone();
        for (source, intervals) in other.sources.iter() {
            merged
                .entry(source.clone())
                .or_default()
                .extend_from_slice(intervals);
        }
        Self::from_map(merged)
    }

    /// `self ∩ other`.
    pub fn intersection(&self, other: &GtidSet) -> GtidSet {
        let mut out = BTreeMap::new();
        for (source, intervals) in self.sources.iter() {
            if let Some(theirs) = other.sources.get(source) {
                let common = intersect(intervals, theirs);
                if !common.is_empty() {
                    out.insert(source.clone(), common);
                }
            }
        }
        GtidSet {
            sources: Arc::new(out),
        }
    }

    /// Whether every transaction in `self` is also in `other`.
    pub fn is_subset(&self, other: &GtidSet) -> bool {
        self.difference(other).is_empty()
    }
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (source, intervals) in self.sources.iter() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(source)?;
            for interval in intervals {
                write!(f, ":{}", interval)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GtidSet({})", self)
    }
}

impl FromStr for GtidSet {
    type Err = GtidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sources: BTreeMap<String, Vec<Interval>> = BTreeMap::new();

        for part in s.split(',') {
            // Servers wrap long sets with newlines after the commas.
            let part: String = part.chars().filter(|c| !c.is_whitespace()).collect();
            if part.is_empty() {
                continue;
            }

            let mut fields = part.split(':');
            let uuid = fields.next().unwrap_or_default();
            if !is_valid_uuid(uuid) {
                return Err(GtidParseError::InvalidUuid(uuid.to_string()));
            }
            let uuid = uuid.to_ascii_lowercase();

            let mut parsed = Vec::new();
            for raw in fields {
                parsed.push(parse_interval(&uuid, raw)?);
            }
            if parsed.is_empty() {
                return Err(GtidParseError::MissingInterval(uuid));
            }
            sources.entry(uuid).or_default().extend(parsed);
        }

        Ok(Self::from_map(sources))
    }
}

fn parse_interval(source: &str, raw: &str) -> Result<Interval, GtidParseError> {
    let invalid = || GtidParseError::InvalidInterval {
        source_id: source.to_string(),
        interval: raw.to_string(),
    };

    let (start, end) = match raw.split_once('-') {
        Some((a, b)) => (
            a.parse::<u64>().map_err(|_| invalid())?,
            b.parse::<u64>().map_err(|_| invalid())?,
        ),
        None => {
            let n = raw.parse::<u64>().map_err(|_| invalid())?;
            (n, n)
        }
    };

    // Transaction numbers start at 1.
    if start == 0 || end < start {
        return Err(invalid());
    }
    Ok(Interval { start, end })
}

fn is_valid_uuid(s: &str) -> bool {
    s.len() == 36
        && s.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

/// Sort and merge overlapping or adjacent intervals in place.
fn normalize(intervals: &mut Vec<Interval>) {
    if intervals.len() < 2 {
        return;
    }
    intervals.sort();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals.drain(..) {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    *intervals = merged;
}

/// `a − b` over normalised interval lists.
fn subtract(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut j = 0;

    for interval in a {
        let mut start = interval.start;
        let end = interval.end;

        while j < b.len() && b[j].end < start {
            j += 1;
        }

        let mut k = j;
        let mut covered = false;
        while k < b.len() && b[k].start <= end {
            if b[k].start > start {
                out.push(Interval { start, end: b[k].start - 1 });
            }
            if b[k].end >= end {
                covered = true;
                break;
            }
            start = b[k].end + 1;
            k += 1;
        }

        if !covered {
            out.push(Interval { start, end });
        }
    }
    out
}

/// `a ∩ b` over normalised interval lists.
fn intersect(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let start = a[i].start.max(b[j].start);
        let end = a[i].end.min(b[j].end);
        if start <= end {
            out.push(Interval { start, end });
        }
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

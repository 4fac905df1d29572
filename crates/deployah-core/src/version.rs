//! Schema version parsing and ordering
//!
//! Manifest schema versions look like `v1`, `v1-alpha.1`, `v2-rc.3`. They are
//! ordered by major version, then by pre-release stage (alpha < beta < rc <
//! final), then by the pre-release number compared numerically, so
//! `v1-beta.2` sorts before `v1-beta.11`. Numbers are compared as digit
//! strings, so ordering never depends on whether they fit in a `u64`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v(\d+)(-(alpha|beta|rc)\.(\d+))?$").expect("version pattern is valid")
});

/// Pre-release stage, ordered alpha < beta < rc
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Alpha,
    Beta,
    Rc,
}

impl Stage {
    fn from_label(label: &str) -> Self {
        match label {
            "alpha" => Stage::Alpha,
            "beta" => Stage::Beta,
            _ => Stage::Rc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Alpha => "alpha",
            Stage::Beta => "beta",
            Stage::Rc => "rc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreRelease {
    pub stage: Stage,
    pub number: u64,
}

/// A parsed schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaVersion {
    pub major: u64,
    /// `None` for a final release
    pub pre: Option<PreRelease>,
}

impl SchemaVersion {
    /// Parse `vN` or `vN-stage.M`; `None` if malformed or a number overflows
    pub fn parse(s: &str) -> Option<Self> {
        let parts = VersionParts::split(s)?;
        let major = parts.major.parse().ok()?;
        let pre = match parts.pre {
            Some((stage, number)) => Some(PreRelease {
                stage,
                number: number.parse().ok()?,
            }),
            None => None,
        };
        Some(Self { major, pre })
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major.cmp(&other.major).then_with(|| match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            // A final release outranks every pre-release of the same major
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        })
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.major)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}.{}", pre.stage.as_str(), pre.number)?;
        }
        Ok(())
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| format!("'{s}' is not a schema version (expected vN or vN-stage.M)"))
    }
}

/// Version components borrowed from the source string
struct VersionParts<'a> {
    major: &'a str,
    pre: Option<(Stage, &'a str)>,
}

impl<'a> VersionParts<'a> {
    fn split(s: &'a str) -> Option<Self> {
        let caps = VERSION_RE.captures(s)?;
        let major = caps.get(1)?.as_str();
        let pre = match (caps.get(3), caps.get(4)) {
            (Some(stage), Some(number)) => {
                Some((Stage::from_label(stage.as_str()), number.as_str()))
            }
            _ => None,
        };
        Some(Self { major, pre })
    }

    fn order(&self, other: &Self) -> Ordering {
        compare_digits(self.major, other.major).then_with(|| match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some((sa, na)), Some((sb, nb))) => sa.cmp(sb).then_with(|| compare_digits(na, nb)),
        })
    }
}

/// Numeric comparison of two ASCII digit strings of any length
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two version strings
///
/// Strings that do not parse as versions sort after every valid version and
/// compare lexicographically among themselves. Versions that are numerically
/// equal but spelled differently (`v01`, `v1`) are ordered by their text, so
/// only identical strings compare `Equal`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (VersionParts::split(a), VersionParts::split(b)) {
        (Some(pa), Some(pb)) => pa.order(&pb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sort version strings in ascending order
pub fn sort_versions<S: AsRef<str>>(versions: &mut [S]) {
    versions.sort_by(|a, b| compare_versions(a.as_ref(), b.as_ref()));
}

// src/version/mod.rs

//! Version handling and dependency checks
//!
//! Versions are kept as plain strings in the package cache and compared
//! through a [`VersionScheme`]. The RPM scheme parses `[epoch:]version[-release]`
//! into an [`RpmVersion`] and compares segments with [`rpmvercmp`]; the Debian
//! scheme follows dpkg ordering.

pub mod debian;
mod rpmvercmp;

pub use rpmvercmp::rpmvercmp;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A parsed RPM version with epoch, version, and release components
///
/// A missing epoch is kept as `None` because dependency matching treats it
/// differently from an explicit `0:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpmVersion {
    pub epoch: Option<u64>,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    /// Parse an RPM version string
    ///
    /// Format: [epoch:]version[-release], splitting the release at the last dash.
    /// Examples:
    /// - "1.2.3" → epoch=None, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=Some(2), version="1.2.3", release=None
    /// - "1:2.3.4-5.el8" → epoch=Some(1), version="2.3.4", release=Some("5.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let (evr, release) = match s.rfind('-') {
            Some(pos) => (&s[..pos], Some(s[pos + 1..].to_string())),
            None => (s, None),
        };

        let digits = evr.bytes().take_while(|c| c.is_ascii_digit()).count();
        let (epoch, version) = if evr.as_bytes().get(digits) == Some(&b':') {
            let epoch_str = &evr[..digits];
            let epoch = if epoch_str.is_empty() {
                0 // Empty epoch (e.g., ":1.0.0") defaults to 0
            } else {
                epoch_str.parse::<u64>().map_err(|e| {
                    Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e))
                })?
            };
            (Some(epoch), &evr[digits + 1..])
        } else {
            (None, evr)
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version: version.to_string(),
            release,
        })
    }

    /// Full comparison of two installed/available versions.
    ///
    /// A missing epoch counts as 0. When the versions match, a version that
    /// carries a release sorts above one that does not.
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        self.epoch
            .unwrap_or(0)
            .cmp(&other.epoch.unwrap_or(0))
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            })
    }

    /// Comparison used when matching a dependency range against this version.
    ///
    /// Releases are only compared when both sides have one. A dependency
    /// without an epoch matches any epoch of the package unless `no_promote`
    /// is set, in which case a non-zero package epoch makes it newer.
    pub fn compare_for_dep(&self, dep: &RpmVersion, no_promote: bool) -> Ordering {
        let epoch = match (self.epoch, dep.epoch) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(a), None) if a > 0 => {
                if no_promote {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            }
            (None, Some(b)) if b > 0 => Ordering::Less,
            _ => Ordering::Equal,
        };
        epoch
            .then_with(|| rpmvercmp(&self.version, &dep.version))
            .then_with(|| match (&self.release, &dep.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                _ => Ordering::Equal,
            })
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Relational operator of a versioned dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompareOp {
    /// Unversioned: any version matches
    #[default]
    #[serde(rename = "")]
    Any,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEq,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = ">=")]
    GreaterEq,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "!=")]
    NotEqual,
}

impl CompareOp {
    /// Parse a symbolic operator (`>=`) or a repomd flag (`GE`)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Ok(Self::Any),
            "<" | "<<" | "LT" => Ok(Self::Less),
            "<=" | "LE" => Ok(Self::LessEq),
            "=" | "==" | "EQ" => Ok(Self::Equal),
            ">=" | "GE" => Ok(Self::GreaterEq),
            ">" | ">>" | "GT" => Ok(Self::Greater),
            "!=" | "NE" => Ok(Self::NotEqual),
            other => Err(Error::ParseError(format!(
                "Unknown comparison operator '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Equal => "=",
            Self::GreaterEq => ">=",
            Self::Greater => ">",
            Self::NotEqual => "!=",
        }
    }

    /// Whether `ord` (package version compared to required version) satisfies the operator
    pub fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Self::Any => true,
            Self::Less => ord == Ordering::Less,
            Self::LessEq => ord != Ordering::Greater,
            Self::Equal => ord == Ordering::Equal,
            Self::GreaterEq => ord != Ordering::Less,
            Self::Greater => ord == Ordering::Greater,
            Self::NotEqual => ord != Ordering::Equal,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The comparison rules applied to every version in a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    Rpm { no_promote: bool },
    Debian,
}

impl Default for VersionScheme {
    fn default() -> Self {
        Self::Rpm { no_promote: false }
    }
}

impl VersionScheme {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rpm { .. } => "Standard .rpm",
            Self::Debian => "Standard .deb",
        }
    }

    /// Total order over version strings
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Rpm { .. } => match (RpmVersion::parse(a), RpmVersion::parse(b)) {
                (Ok(a), Ok(b)) => a.compare(&b),
                // Unparseable strings still need a stable order
                _ => rpmvercmp(a, b),
            },
            Self::Debian => debian::compare(a, b),
        }
    }

    /// Compare versions, breaking ties by architecture preference
    pub fn compare_with_arch(
        &self,
        a: &str,
        a_arch: &str,
        b: &str,
        b_arch: &str,
        arches: &ArchTable,
    ) -> Ordering {
        self.compare(a, b)
            .then_with(|| arches.compare(a_arch, b_arch))
    }

    /// Whether `pkg_ver` satisfies `op required`.
    ///
    /// An unversioned operator, an empty required version, or an empty
    /// package version always match.
    pub fn check_dep(&self, pkg_ver: &str, op: CompareOp, required: &str) -> bool {
        if op == CompareOp::Any || required.is_empty() || pkg_ver.is_empty() {
            return true;
        }
        let ord = match self {
            Self::Rpm { no_promote } => {
                match (RpmVersion::parse(pkg_ver), RpmVersion::parse(required)) {
                    (Ok(p), Ok(r)) => p.compare_for_dep(&r, *no_promote),
                    _ => rpmvercmp(pkg_ver, required),
                }
            }
            Self::Debian => debian::compare(pkg_ver, required),
        };
        op.accepts(ord)
    }

    /// Strip epoch and release, leaving the upstream version
    pub fn upstream_version<'a>(&self, v: &'a str) -> &'a str {
        let v = match v.find(':') {
            Some(pos) => &v[pos + 1..],
            None => v,
        };
        match v.rfind('-') {
            Some(pos) => &v[..pos],
            None => v,
        }
    }
}

/// Architecture preference table
///
/// Lower positions are preferred. An empty table accepts every architecture
/// with equal preference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchTable {
    arches: Vec<String>,
}

impl ArchTable {
    pub fn new(arches: Vec<String>) -> Self {
        Self { arches }
    }

    /// Machine score of an architecture, `None` when it is not installable
    pub fn score(&self, arch: &str) -> Option<usize> {
        if self.arches.is_empty() {
            return Some(0);
        }
        self.arches.iter().position(|a| a == arch)
    }

    pub fn is_compatible(&self, arch: &str) -> bool {
        self.score(arch).is_some()
    }

    /// Greater means `a` is the preferred architecture
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let sa = self.score(a).unwrap_or(usize::MAX);
        let sb = self.score(b).unwrap_or(usize::MAX);
        sb.cmp(&sa)
    }
}

//! Contract versions: `MAJOR.MINOR.PATCH[-PRE][+BUILD]` (spec §3).
//!
//! No `semver` crate appears anywhere in the retrieved example pack, and the
//! grammar we need is narrower than full semver (component ordering for
//! `@latest` resolution, not range matching), so this is a small hand-rolled
//! parser in the pack's style of narrow-purpose primitives (see
//! `contracts-types::error` for the same preference elsewhere).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// A parsed, comparable contract version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
    /// Optional pre-release tag (after `-`).
    pub pre: Option<String>,
    /// Optional build metadata (after `+`).
    pub build: Option<String>,
}

impl Version {
    /// The tuple used for ordering: pre-release versions sort before the
    /// release they precede, matching common semver precedence.
    fn precedence_key(&self) -> (u32, u32, u32, bool, Option<&str>) {
        (
            self.major,
            self.minor,
            self.patch,
            self.pre.is_none(),
            self.pre.as_deref(),
        )
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_key().cmp(&other.precedence_key())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ContractError::InvalidVersion(s.to_string());

        let (core_and_pre, build) = match s.split_once('+') {
            Some((a, b)) => (a, Some(b.to_string())),
            None => (s, None),
        };
        let (core, pre) = match core_and_pre.split_once('-') {
            Some((a, b)) => (a, Some(b.to_string())),
            None => (core_and_pre, None),
        };

        let mut parts = core.split('.');
        let major = parts.next().ok_or_else(invalid)?;
        let minor = parts.next().ok_or_else(invalid)?;
        let patch = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let parse_component = |raw: &str| -> Result<u32, ContractError> {
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            raw.parse::<u32>().map_err(|_| invalid())
        };

        if let Some(pre) = &pre {
            if pre.is_empty() {
                return Err(invalid());
            }
        }
        if let Some(build) = &build {
            if build.is_empty() {
                return Err(invalid());
            }
        }

        Ok(Version {
            major: parse_component(major)?,
            minor: parse_component(minor)?,
            patch: parse_component(patch)?,
            pre,
            build,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_version() {
        let v: Version = "1.2.3".parse().unwrap();
        assert_eq!(v, Version { major: 1, minor: 2, patch: 3, pre: None, build: None });
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn parses_pre_and_build() {
        let v: Version = "2.0.1-rc.1+build.7".parse().unwrap();
        assert_eq!(v.pre.as_deref(), Some("rc.1"));
        assert_eq!(v.build.as_deref(), Some("build.7"));
        assert_eq!(v.to_string(), "2.0.1-rc.1+build.7");
    }

    #[test]
    fn rejects_negative_and_malformed_components() {
        assert!("−1.0.0".parse::<Version>().is_err());
        assert!("1.0".parse::<Version>().is_err());
        assert!("1.0.0.0".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
        assert!("1.0.0-".parse::<Version>().is_err());
    }

    #[test]
    fn orders_by_precedence_with_prerelease_before_release() {
        let a: Version = "1.0.0-rc.1".parse().unwrap();
        let b: Version = "1.0.0".parse().unwrap();
        assert!(a < b);

        let c: Version = "1.2.1".parse().unwrap();
        let d: Version = "2.0.1".parse().unwrap();
        let e: Version = "1.0.0".parse().unwrap();
        let mut versions = vec![d.clone(), e.clone(), c.clone()];
        versions.sort();
        assert_eq!(versions, vec![e, c, d]);
    }
}

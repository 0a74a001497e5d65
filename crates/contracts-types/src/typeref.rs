//! `<slug>@<version>` and `<slug>@latest` references (spec §3, §6).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ContractError;
use crate::slug::validate_slug;
use crate::version::Version;

/// A resolved `<slug>@<version>` reference, e.g. to a type-contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    /// The referenced slug.
    pub slug: String,
    /// The referenced version.
    pub version: Version,
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.slug, self.version)
    }
}

impl FromStr for TypeRef {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slug, version) = s
            .split_once('@')
            .ok_or_else(|| ContractError::InvalidSlug(format!("missing '@' in type reference: {s}")))?;
        validate_slug(slug)?;
        Ok(TypeRef { slug: slug.to_string(), version: version.parse()? })
    }
}

/// A `"<slug>@<version>"` or `"<slug>@latest"` reference, as accepted by
/// `getContractBySlug` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlugRef {
    /// An exact version.
    Exact(TypeRef),
    /// The highest version of `slug` by [`Version`] ordering.
    Latest {
        /// The referenced slug.
        slug: String,
    },
}

impl FromStr for SlugRef {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slug, version) = s
            .split_once('@')
            .ok_or_else(|| ContractError::InvalidSlug(format!("missing '@' in slug reference: {s}")))?;
        validate_slug(slug)?;
        if version == "latest" {
            Ok(SlugRef::Latest { slug: slug.to_string() })
        } else {
            Ok(SlugRef::Exact(TypeRef { slug: slug.to_string(), version: version.parse()? }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_type_ref() {
        let r: TypeRef = "card@1.2.3".parse().unwrap();
        assert_eq!(r.slug, "card");
        assert_eq!(r.to_string(), "card@1.2.3");
    }

    #[test]
    fn parses_latest_slug_ref() {
        let r: SlugRef = "example@latest".parse().unwrap();
        assert_eq!(r, SlugRef::Latest { slug: "example".into() });
    }

    #[test]
    fn rejects_bad_slug_in_ref() {
        assert!("Example@1.0.0".parse::<TypeRef>().is_err());
        assert!("example".parse::<TypeRef>().is_err());
    }
}

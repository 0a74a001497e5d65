//! Insert-time defaulting (spec §4.3 "Insert"): fills in `version`, empty
//! arrays/maps, `active`, `created_at`, and a generated `slug` on a client's
//! partial contract.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::contract::Contract;
use crate::slug::generate_slug;
use crate::version::Version;

/// A client-supplied partial contract, as accepted by `insertContract` /
/// `replaceContract` (spec §6).
#[derive(Debug, Clone, Default)]
pub struct PartialContract {
    /// Required: `<slug>@<version>` reference to the governing type-contract.
    pub contract_type: Option<String>,
    /// Explicit slug, if the caller wants one (otherwise generated).
    pub slug: Option<String>,
    /// Explicit version, defaulting to `1.0.0`.
    pub version: Option<String>,
    /// Optional display name.
    pub name: Option<String>,
    /// Tag sequence.
    pub tags: Option<Vec<String>>,
    /// Access markers.
    pub markers: Option<Vec<String>>,
    /// Optional loop-contract reference.
    pub loop_ref: Option<String>,
    /// Opaque passthrough sequence.
    pub requires: Option<Vec<Value>>,
    /// Opaque passthrough sequence.
    pub capabilities: Option<Vec<Value>>,
    /// The payload to validate against the type schema.
    pub data: Option<Value>,
}

/// Fill in defaults for a freshly-inserted contract per spec §4.3: `version
/// = 1.0.0`, empty arrays/maps, `active = true`, `created_at = now`, and a
/// generated slug when the caller didn't supply one.
pub fn apply_defaults(partial: PartialContract, type_slug: &str) -> Result<Contract, crate::error::ContractError> {
    let version: Version = match partial.version {
        Some(v) => v.parse()?,
        None => Version { major: 1, minor: 0, patch: 0, pre: None, build: None },
    };

    let slug = match partial.slug {
        Some(s) => {
            crate::slug::validate_slug(&s)?;
            s
        }
        None => generate_slug(type_slug, partial.name.as_deref()),
    };

    let now = Utc::now();

    Ok(Contract {
        id: Uuid::new_v4(),
        slug,
        version,
        contract_type: partial.contract_type.ok_or_else(|| {
            crate::error::ContractError::UnknownType("contract type is required".into())
        })?,
        active: true,
        name: partial.name,
        tags: partial.tags.unwrap_or_default(),
        markers: partial.markers.unwrap_or_default(),
        loop_ref: partial.loop_ref,
        links: Default::default(),
        linked_at: Default::default(),
        requires: partial.requires.unwrap_or_default(),
        capabilities: partial.capabilities.unwrap_or_default(),
        data: partial.data.unwrap_or_else(|| Value::Object(Default::default())),
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_version_and_timestamps() {
        let partial = PartialContract {
            contract_type: Some("card@1.0.0".into()),
            data: Some(json!({"title": "x"})),
            ..Default::default()
        };
        let c = apply_defaults(partial, "card").unwrap();
        assert_eq!(c.version.to_string(), "1.0.0");
        assert!(c.active);
        assert!(c.slug.starts_with("card-"));
        assert!(c.links.is_empty());
        assert!(c.linked_at.is_empty());
    }

    #[test]
    fn honors_explicit_slug_and_version() {
        let partial = PartialContract {
            contract_type: Some("card@1.0.0".into()),
            slug: Some("example".into()),
            version: Some("2.0.1".into()),
            data: Some(json!({})),
            ..Default::default()
        };
        let c = apply_defaults(partial, "card").unwrap();
        assert_eq!(c.slug, "example");
        assert_eq!(c.version.to_string(), "2.0.1");
    }
}

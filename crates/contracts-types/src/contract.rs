//! The contract record itself (spec §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::version::Version;

/// A single linked contract reference as it appears under `links[verb]`.
///
/// Materialized on read by the query compiler's row codec; never set
/// directly by a client (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedContract {
    /// The linked contract's id.
    pub id: Uuid,
    /// The linked contract's slug.
    pub slug: String,
    /// The linked contract's `<slug>@<version>` type reference.
    #[serde(rename = "type")]
    pub contract_type: String,
    /// The projected fields of the linked contract, per the query's select-map.
    pub data: Value,
}

/// The uniform contract record (spec §3 field table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Opaque identifier, assigned once.
    pub id: Uuid,
    /// Human-readable identifier; `(slug, version)` is unique.
    pub slug: String,
    /// The contract's version.
    pub version: Version,
    /// `<slug>@<version>` reference to the governing type-contract.
    #[serde(rename = "type")]
    pub contract_type: String,
    /// Soft-delete flag.
    pub active: bool,
    /// Optional free-form display name.
    pub name: Option<String>,
    /// Ordered tag sequence.
    pub tags: Vec<String>,
    /// Access markers gating read visibility (spec §4.2).
    pub markers: Vec<String>,
    /// Optional `<slug>@<version>` reference to a loop-contract.
    #[serde(rename = "loop")]
    pub loop_ref: Option<String>,
    /// Materialized link verb -> linked contracts; engine-managed.
    #[serde(default)]
    pub links: HashMap<String, Vec<LinkedContract>>,
    /// Link verb -> timestamp of the first link created with that verb.
    #[serde(default)]
    pub linked_at: HashMap<String, DateTime<Utc>>,
    /// Opaque passthrough sequence.
    #[serde(default)]
    pub requires: Vec<Value>,
    /// Opaque passthrough sequence.
    #[serde(default)]
    pub capabilities: Vec<Value>,
    /// The type-schema-validated payload.
    pub data: Value,
    /// Engine-managed creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Engine-managed last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Paths the mutation pipeline never lets a client write to directly
/// (spec §3 "Immutable projections", §4.3 step 5 — which additionally
/// silently discards patches to `/updated_at`, engine-managed on every write).
pub const IMMUTABLE_PATHS: &[&str] = &["/id", "/links", "/linked_at", "/created_at", "/updated_at"];

impl Contract {
    /// `true` if `path` (a JSON-Pointer string, e.g. `"/data/email"`) targets
    /// one of the contract's immutable projections.
    pub fn is_immutable_path(path: &str) -> bool {
        IMMUTABLE_PATHS
            .iter()
            .any(|p| path == *p || path.starts_with(&format!("{p}/")))
    }

    /// The `<slug>@<version>` reference to this contract.
    pub fn type_ref(&self) -> String {
        format!("{}@{}", self.slug, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_path_detection_covers_subpaths() {
        assert!(Contract::is_immutable_path("/id"));
        assert!(Contract::is_immutable_path("/links/is-member-of"));
        assert!(Contract::is_immutable_path("/linked_at/is-member-of"));
        assert!(Contract::is_immutable_path("/created_at"));
        assert!(Contract::is_immutable_path("/updated_at"));
        assert!(!Contract::is_immutable_path("/data/email"));
    }
}

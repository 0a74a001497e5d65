//! Links and relationships (spec §3 "Link", "Relationship").

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One endpoint of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    /// The endpoint contract's id.
    pub id: Uuid,
    /// The endpoint contract's `<slug>@<version>` type reference.
    #[serde(rename = "type")]
    pub contract_type: String,
}

/// The `data` payload of a `link@1.0.0` contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkData {
    /// The forward verb name.
    pub name: String,
    /// The inverse verb name.
    #[serde(rename = "inverseName")]
    pub inverse_name: String,
    /// The source endpoint.
    pub from: LinkEndpoint,
    /// The target endpoint.
    pub to: LinkEndpoint,
}

/// A permitted link verb between two endpoint types (spec §3 "Relationship").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// The source endpoint's type slug (without version).
    #[serde(rename = "fromType")]
    pub from_type: String,
    /// The forward verb name.
    pub name: String,
    /// The inverse verb name.
    #[serde(rename = "inverseName")]
    pub inverse_name: String,
    /// The target endpoint's type slug (without version).
    #[serde(rename = "toType")]
    pub to_type: String,
}

impl Relationship {
    /// `true` if this relationship permits `(from_type, verb, to_type)`,
    /// either in the forward or inverse direction (spec §4.3 "Insert").
    pub fn permits(&self, from_type: &str, verb: &str, to_type: &str) -> bool {
        (self.from_type == from_type && self.name == verb && self.to_type == to_type)
            || (self.to_type == from_type && self.inverse_name == verb && self.from_type == to_type)
    }
}

/// The shared, lock-free-read relationships table (spec §9 "Global
/// relationships table"): every permitted `(from_type, verb, to_type)`
/// triple, maintained by a single privileged writer and read by every
/// mutation/stream operation via a cheap handle.
pub type RelationshipTable = Vec<Relationship>;

/// `true` if any relationship in `table` permits `(from_type, verb, to_type)`.
pub fn relationship_permits(table: &RelationshipTable, from_type: &str, verb: &str, to_type: &str) -> bool {
    table.iter().any(|rel| rel.permits(from_type, verb, to_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel() -> Relationship {
        Relationship {
            from_type: "message".into(),
            name: "is attached to".into(),
            inverse_name: "has attached element".into(),
            to_type: "thread".into(),
        }
    }

    #[test]
    fn permits_forward_direction() {
        assert!(rel().permits("message", "is attached to", "thread"));
    }

    #[test]
    fn permits_inverse_direction() {
        assert!(rel().permits("thread", "has attached element", "message"));
    }

    #[test]
    fn rejects_unrelated_triple() {
        assert!(!rel().permits("message", "is attached to", "user"));
    }

    #[test]
    fn table_permits_checks_every_entry() {
        let table = vec![rel()];
        assert!(relationship_permits(&table, "message", "is attached to", "thread"));
        assert!(!relationship_permits(&table, "message", "is attached to", "user"));
    }
}

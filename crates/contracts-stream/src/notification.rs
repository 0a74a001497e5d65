//! The change-notification payload (spec §4.4 "Change firehose", §6
//! "Change-notification payload"): `{id, slug, contractType, type, table}`
//! as published by the relational backend's row trigger.

use serde::Deserialize;
use uuid::Uuid;

/// The mutation kind a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl<'de> Deserialize<'de> for ChangeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            other => Err(serde::de::Error::custom(format!("unknown change kind `{other}`"))),
        }
    }
}

/// One parsed `NOTIFY` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeNotification {
    /// The changed row's id.
    pub id: Uuid,
    /// The changed row's slug.
    pub slug: String,
    /// The changed row's `<slug>@<version>` type reference.
    #[serde(rename = "contractType")]
    pub contract_type: String,
    /// What happened to the row.
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// The table the trigger fired on.
    pub table: String,
}

impl ChangeNotification {
    /// Parse a `NOTIFY` payload's raw JSON text.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The `<slug>@<version>`'s slug component, with the version stripped
    /// (spec §4.4 "pre-compute any constant filters ... with version
    /// stripped").
    pub fn type_slug(&self) -> &str {
        self.contract_type.split('@').next().unwrap_or(&self.contract_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_payload() {
        let payload = r#"{"id":"3fbb6b0a-1f9e-4e1a-9d34-111111111111","slug":"example","contractType":"card@1.0.0","type":"insert","table":"contracts"}"#;
        let n = ChangeNotification::parse(payload).unwrap();
        assert_eq!(n.kind, ChangeKind::Insert);
        assert_eq!(n.type_slug(), "card");
    }

    #[test]
    fn rejects_unknown_kind() {
        let payload = r#"{"id":"3fbb6b0a-1f9e-4e1a-9d34-111111111111","slug":"x","contractType":"card@1.0.0","type":"truncate","table":"contracts"}"#;
        assert!(ChangeNotification::parse(payload).is_err());
    }
}

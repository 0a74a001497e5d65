//! Link-contract validation and `linked_at` side-effects (spec §4.3 "Insert"
//! step on `type == link@1.0.0`, "Link side-effects").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use contracts_auth::validate_permission_gate;
use contracts_store::PgBackend;
use contracts_types::{relationship_permits, ContractError, LinkData, RelationshipTable};

fn type_slug(type_ref: &str) -> &str {
    type_ref.split('@').next().unwrap_or(type_ref)
}

/// Parse `data` as a link payload, confirm both endpoints are readable
/// under `auth_schema` (the session's already-resolved effective read
/// schema), and confirm the relationships table permits the triple.
/// Returns the parsed [`LinkData`] for the caller to use in the
/// `linked_at` side-effect.
pub async fn validate_link_contract(
    backend: &PgBackend,
    relationships: &RelationshipTable,
    auth_schema: &Value,
    data: &Value,
) -> Result<LinkData, ContractError> {
    let link: LinkData = serde_json::from_value(data.clone())
        .map_err(|e| ContractError::SchemaMismatch(format!("invalid link payload: {e}")))?;

    for (label, endpoint) in [("from", &link.from), ("to", &link.to)] {
        let contract = backend
            .by_id(endpoint.id)
            .await?
            .ok_or_else(|| ContractError::NoLinkTarget(format!("{label} endpoint {} not found", endpoint.id)))?;
        let value = serde_json::to_value(&contract).map_err(|e| ContractError::Backend(e.to_string()))?;
        validate_permission_gate(&value, auth_schema)
            .map_err(|_| ContractError::NoLinkTarget(format!("{label} endpoint {} is not readable", endpoint.id)))?;
    }

    let from_type = type_slug(&link.from.contract_type);
    let to_type = type_slug(&link.to.contract_type);
    if !relationship_permits(relationships, from_type, &link.name, to_type) {
        return Err(ContractError::UnknownRelationship(format!(
            "no relationship permits ({from_type}, {}, {to_type})",
            link.name
        )));
    }

    Ok(link)
}

/// The `linked_at` entries to augment on each endpoint after a link-contract
/// is persisted: the forward verb on the `from` endpoint, the inverse verb
/// on the `to` endpoint, both timestamped to the link's `created_at`.
pub fn linked_at_side_effects(link: &LinkData, created_at: DateTime<Utc>) -> [(uuid::Uuid, HashMap<String, DateTime<Utc>>); 2] {
    let mut from_entry = HashMap::new();
    from_entry.insert(link.name.clone(), created_at);
    let mut to_entry = HashMap::new();
    to_entry.insert(link.inverse_name.clone(), created_at);
    [(link.from.id, from_entry), (link.to.id, to_entry)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn link() -> LinkData {
        LinkData {
            name: "is member of".into(),
            inverse_name: "has member".into(),
            from: contracts_types::LinkEndpoint { id: Uuid::new_v4(), contract_type: "user@1.0.0".into() },
            to: contracts_types::LinkEndpoint { id: Uuid::new_v4(), contract_type: "org@1.0.0".into() },
        }
    }

    #[test]
    fn strips_version_for_relationship_lookup() {
        assert_eq!(type_slug("user@1.0.0"), "user");
    }

    #[test]
    fn side_effects_tag_forward_and_inverse_verbs() {
        let l = link();
        let now = Utc::now();
        let [(from_id, from_entry), (to_id, to_entry)] = linked_at_side_effects(&l, now);
        assert_eq!(from_id, l.from.id);
        assert_eq!(from_entry.get("is member of"), Some(&now));
        assert_eq!(to_id, l.to.id);
        assert_eq!(to_entry.get("has member"), Some(&now));
    }

    #[test]
    fn rejects_malformed_link_payload() {
        let data = json!({"not": "a link"});
        let parsed: Result<LinkData, _> = serde_json::from_value(data);
        assert!(parsed.is_err());
    }
}

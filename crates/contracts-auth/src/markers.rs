//! Marker-based schema (spec §4.2 step 2, GLOSSARY "Marker").

use serde_json::{json, Value};

use contracts_types::ContractError;

use crate::lookup::ContractLookup;

fn escape_for_alternation(marker: &str) -> String {
    marker
        .chars()
        .map(|c| if "\\.^$|?*+()[]{}".contains(c) { format!("\\{c}") } else { c.to_string() })
        .collect()
}

/// Build the marker-gating schema for `actor_slug` (spec §4.2 step 2): the
/// built-in admin sees everything; everyone else is restricted to contracts
/// whose `markers` array is empty, or whose every element is either an exact
/// marker the actor owns, or a `+`-joined compound naming at least one such
/// marker.
pub async fn marker_based_schema(
    lookup: &dyn ContractLookup,
    actor_slug: &str,
) -> Result<Value, ContractError> {
    if lookup.is_builtin_admin(actor_slug).await? {
        return Ok(json!({}));
    }

    let mut owned = vec![actor_slug.to_string()];
    owned.extend(lookup.org_slugs_for_actor(actor_slug).await?);

    let enum_values: Vec<Value> = owned.iter().map(|m| json!(m)).collect();
    let alternation = owned.iter().map(|m| escape_for_alternation(m)).collect::<Vec<_>>().join("|");
    let compound_pattern = format!("(^|\\+)({alternation})($|\\+)");

    Ok(json!({
        "properties": {
            "markers": {
                "anyOf": [
                    {"maxItems": 0},
                    {"items": {"anyOf": [
                        {"enum": enum_values},
                        {"pattern": compound_pattern}
                    ]}}
                ]
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixture {
        admin: bool,
        orgs: Vec<String>,
    }

    #[async_trait]
    impl ContractLookup for Fixture {
        async fn role_read_schema(&self, _: &str) -> Result<Option<Value>, ContractError> {
            Ok(None)
        }
        async fn is_builtin_admin(&self, _: &str) -> Result<bool, ContractError> {
            Ok(self.admin)
        }
        async fn org_slugs_for_actor(&self, _: &str) -> Result<Vec<String>, ContractError> {
            Ok(self.orgs.clone())
        }
    }

    #[tokio::test]
    async fn admin_sees_trivially_true_schema() {
        let fixture = Fixture { admin: true, orgs: vec![] };
        let schema = marker_based_schema(&fixture, "user-root").await.unwrap();
        assert_eq!(schema, json!({}));
    }

    #[tokio::test]
    async fn non_admin_gates_on_owned_markers() {
        let fixture = Fixture { admin: false, orgs: vec!["org-acme".into()] };
        let schema = marker_based_schema(&fixture, "user-u").await.unwrap();
        let enum_vals = &schema["properties"]["markers"]["anyOf"][1]["items"]["anyOf"][0]["enum"];
        assert_eq!(enum_vals.as_array().unwrap().len(), 2);
    }
}

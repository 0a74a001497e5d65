//! Role-based schema (spec §4.2 step 1).

use serde_json::{json, Value};

use contracts_types::ContractError;

use crate::eval::eval_schema;
use crate::lookup::ContractLookup;

/// Combine every role in `role_slugs` (actor-slug-first per
/// [`contracts_types::Session::role_slugs`]) into a single `anyOf` schema.
/// A role slug with no matching `role-<slug>@1.0.0` contract is silently
/// skipped; if none match, the result matches nothing.
pub async fn role_based_schema(
    lookup: &dyn ContractLookup,
    role_slugs: &[String],
    eval_context: &Value,
) -> Result<Value, ContractError> {
    let mut branches = Vec::with_capacity(role_slugs.len());
    for role_slug in role_slugs {
        if let Some(read_schema) = lookup.role_read_schema(role_slug).await? {
            branches.push(eval_schema(&read_schema, eval_context)?);
        }
    }
    if branches.is_empty() {
        return Ok(json!({"not": {}}));
    }
    Ok(json!({"anyOf": branches}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixture;

    #[async_trait]
    impl ContractLookup for Fixture {
        async fn role_read_schema(&self, role_slug: &str) -> Result<Option<Value>, ContractError> {
            Ok(match role_slug {
                "viewer" => Some(json!({"properties": {"type": {"const": "card@1.0.0"}}})),
                _ => None,
            })
        }
        async fn is_builtin_admin(&self, _: &str) -> Result<bool, ContractError> {
            Ok(false)
        }
        async fn org_slugs_for_actor(&self, _: &str) -> Result<Vec<String>, ContractError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn combines_matched_roles_with_any_of() {
        let schema = role_based_schema(&Fixture, &["user-u".into(), "viewer".into()], &Value::Null)
            .await
            .unwrap();
        assert_eq!(schema["anyOf"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_matching_role_yields_schema_matching_nothing() {
        let schema = role_based_schema(&Fixture, &["nobody".into()], &Value::Null).await.unwrap();
        assert_eq!(schema, json!({"not": {}}));
    }
}

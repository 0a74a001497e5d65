//! The authorization resolver entry point (spec §4.2 "Pipeline").

use serde_json::{json, Value};

use contracts_types::{ContractError, Session};

use crate::lookup::ContractLookup;
use crate::mask;
use crate::markers::marker_based_schema;
use crate::roles::role_based_schema;

/// Computes a session's effective read schema and gates query schemas by it.
pub struct AuthorizationResolver<'a> {
    lookup: &'a dyn ContractLookup,
}

impl<'a> AuthorizationResolver<'a> {
    /// Resolve against facts served by `lookup`.
    pub fn new(lookup: &'a dyn ContractLookup) -> Self {
        Self { lookup }
    }

    /// Compute `session`'s effective read schema (spec §4.2 steps 1-3):
    /// role-based schema `anyOf` markers-based schema `anyOf`'d roles,
    /// conjoined with the session scope if present.
    pub async fn effective_read_schema(&self, session: &Session) -> Result<Value, ContractError> {
        let eval_context = json!({"user": session.actor});
        let role_schema = role_based_schema(self.lookup, &session.role_slugs(), &eval_context).await?;
        let marker_schema = marker_based_schema(self.lookup, &session.actor.slug).await?;

        let mut clauses = vec![role_schema, marker_schema];
        if let Some(scope) = &session.scope {
            clauses.push(scope.clone());
        }
        Ok(json!({"allOf": clauses}))
    }

    /// Gate `query_schema` by `session`'s effective read schema, including
    /// link masking (spec §4.2 "Link masking").
    pub async fn gate(&self, session: &Session, query_schema: &Value) -> Result<Value, ContractError> {
        let auth_schema = self.effective_read_schema(session).await?;
        Ok(mask::gate_query(query_schema, &auth_schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use contracts_types::Contract;
    use uuid::Uuid;

    struct Fixture;

    #[async_trait]
    impl ContractLookup for Fixture {
        async fn role_read_schema(&self, role_slug: &str) -> Result<Option<Value>, ContractError> {
            Ok(match role_slug {
                "user-u" => Some(json!({"properties": {"type": {"const": "user@1.0.0"}}})),
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

    fn actor() -> Contract {
        Contract {
            id: Uuid::new_v4(),
            slug: "user-u".into(),
            version: "1.0.0".parse().unwrap(),
            contract_type: "user@1.0.0".into(),
            active: true,
            name: None,
            tags: vec![],
            markers: vec![],
            loop_ref: None,
            links: Default::default(),
            linked_at: Default::default(),
            requires: vec![],
            capabilities: vec![],
            data: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn effective_schema_combines_role_and_marker_clauses() {
        let resolver = AuthorizationResolver::new(&Fixture);
        let session = Session::new(actor());
        let schema = resolver.effective_read_schema(&session).await.unwrap();
        assert_eq!(schema["allOf"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn gate_wraps_query_in_auth_allof() {
        let resolver = AuthorizationResolver::new(&Fixture);
        let session = Session::new(actor());
        let query = json!({"properties": {"active": {"const": true}}});
        let gated = resolver.gate(&session, &query).await.unwrap();
        assert!(gated["allOf"][1]["allOf"].is_array());
    }
}

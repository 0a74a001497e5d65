//! Session (actor + scope), spec §3 "Session (actor + scope)".

use serde_json::Value;

use crate::contract::Contract;

/// An identified actor plus an optional scope schema narrowing what that
/// actor may see for a single call.
#[derive(Debug, Clone)]
pub struct Session {
    /// The actor's user-contract.
    pub actor: Contract,
    /// A JSON schema further narrowing the actor's read schema, if any.
    pub scope: Option<Value>,
}

impl Session {
    /// Build a session with no additional scope.
    pub fn new(actor: Contract) -> Self {
        Self { actor, scope: None }
    }

    /// Build a session narrowed by `scope`.
    pub fn scoped(actor: Contract, scope: Value) -> Self {
        Self { actor, scope: Some(scope) }
    }

    /// Role slugs declared on the actor (`data.roles`), per spec §4.2 step 1.
    pub fn declared_role_slugs(&self) -> Vec<String> {
        self.actor
            .data
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The full set of role slugs consulted by the resolver: the actor's own
    /// slug plus every declared role (spec §4.2 step 1: `[actor.slug,
    /// ...actor.data.roles]`).
    pub fn role_slugs(&self) -> Vec<String> {
        let mut slugs = vec![self.actor.slug.clone()];
        slugs.extend(self.declared_role_slugs());
        slugs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Contract;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn actor(roles: Vec<&str>) -> Contract {
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
            data: json!({ "roles": roles }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn role_slugs_include_actor_slug_first() {
        let session = Session::new(actor(vec!["admin", "editor"]));
        assert_eq!(session.role_slugs(), vec!["user-u", "admin", "editor"]);
    }
}

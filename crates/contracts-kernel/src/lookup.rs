//! The default [`ContractLookup`] implementation, backed directly by
//! [`PgBackend`] (spec §4.2 "Pipeline" depends only on the trait; this is
//! the concrete wiring the kernel facade supplies).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;

use contracts_auth::ContractLookup;
use contracts_store::PgBackend;
use contracts_types::ContractError;

/// Resolves role/marker/org facts against the live contracts table.
pub struct PgContractLookup {
    store: Arc<PgBackend>,
    builtin_admin_slug: String,
}

impl PgContractLookup {
    /// Resolve facts against `store`, treating `builtin_admin_slug` as the
    /// always-trusted actor (spec §9 Open Question (a)).
    pub fn new(store: Arc<PgBackend>, builtin_admin_slug: impl Into<String>) -> Self {
        Self { store, builtin_admin_slug: builtin_admin_slug.into() }
    }
}

#[async_trait]
impl ContractLookup for PgContractLookup {
    async fn role_read_schema(&self, role_slug: &str) -> Result<Option<Value>, ContractError> {
        let slug = format!("role-{role_slug}");
        let contract = self.store.latest_by_slug(&slug).await?;
        Ok(contract.and_then(|c| c.data.get("read").cloned()))
    }

    async fn is_builtin_admin(&self, actor_slug: &str) -> Result<bool, ContractError> {
        Ok(actor_slug == self.builtin_admin_slug)
    }

    async fn org_slugs_for_actor(&self, actor_slug: &str) -> Result<Vec<String>, ContractError> {
        let actor = match self.store.latest_by_slug(actor_slug).await? {
            Some(actor) => actor,
            None => return Ok(Vec::new()),
        };

        let sql = format!(
            "SELECT DISTINCT o.slug FROM {table} AS l \
             JOIN {table} AS o ON o.id = ( \
                CASE WHEN (l.data->'from'->>'id')::uuid = $1 THEN (l.data->'to'->>'id')::uuid \
                     ELSE (l.data->'from'->>'id')::uuid END) \
             WHERE l.type LIKE 'link@%' AND ( \
                ((l.data->'from'->>'id')::uuid = $1 AND l.data->>'name' = 'is member of') \
             OR ((l.data->'to'->>'id')::uuid = $1 AND l.data->>'inverseName' = 'is member of')) \
             AND o.type LIKE 'org@%'",
            table = self.store.table()
        );

        let rows = sqlx::query(&sql)
            .bind(actor.id)
            .fetch_all(self.store.pool())
            .await
            .map_err(|e| ContractError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("slug").map_err(|e| ContractError::Backend(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_slug_prefix_matches_role_contract_convention() {
        assert_eq!(format!("role-{}", "editor"), "role-editor");
    }
}

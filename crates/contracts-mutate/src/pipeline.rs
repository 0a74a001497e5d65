//! The insert/replace/patch pipeline (spec §4.3), structured the way
//! `toka-kernel::Kernel::submit` is a linear `validate -> auth -> dispatch ->
//! emit` pipeline rather than a state machine: each operation is a short
//! sequence of small composable steps.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

use contracts_auth::{validate_permission_gate, validate_type_gate, AuthorizationResolver, ContractLookup};
use contracts_cache::{CacheKey, ContractCache};
use contracts_schema::{derive_select_map, project_select_map};
use contracts_store::PgBackend;
use contracts_types::{
    apply_defaults, ContractError, PartialContract, RelationshipTable, Session, TypeRef,
};

use crate::link_checks::{linked_at_side_effects, validate_link_contract};
use crate::patch::{apply as apply_patch_ops, discard_immutable_ops};
use crate::type_schema::load_type_schema;

const LINK_TYPE_PREFIX: &str = "link@";
const LOOP_TYPE_PREFIX: &str = "loop@";

/// Resolve `loop_ref` (a `<slug>@<version>` string) against `executor` and
/// confirm it names a loop-contract (spec field table: "must resolve to a
/// loop-contract if set"; §4.3 patch step 9).
async fn validate_loop_ref<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    table: &str,
    loop_ref: &str,
) -> Result<(), ContractError> {
    let loop_type: TypeRef = loop_ref.parse()?;
    let referenced = contracts_store::fetch_by_slug_version(executor, table, &loop_type.slug, &loop_type.version)
        .await?
        .ok_or_else(|| ContractError::UnknownType(loop_ref.to_string()))?;
    if !referenced.contract_type.starts_with(LOOP_TYPE_PREFIX) {
        return Err(ContractError::UnknownType(loop_ref.to_string()));
    }
    Ok(())
}

/// Owns the dependencies every mutation needs: the relational backend, an
/// optional read-through cache, the authorization lookup, and a live handle
/// onto the shared relationships table.
pub struct MutationPipeline {
    store: Arc<PgBackend>,
    cache: Option<Arc<dyn ContractCache>>,
    lookup: Arc<dyn ContractLookup>,
    relationships: watch::Receiver<Arc<RelationshipTable>>,
}

impl MutationPipeline {
    /// Assemble a pipeline over `store`, gated by `lookup`, with an optional
    /// `cache` and a live `relationships` handle (normally the stream
    /// manager's writer side, see `contracts-stream`).
    pub fn new(
        store: Arc<PgBackend>,
        cache: Option<Arc<dyn ContractCache>>,
        lookup: Arc<dyn ContractLookup>,
        relationships: watch::Receiver<Arc<RelationshipTable>>,
    ) -> Self {
        Self { store, cache, lookup, relationships }
    }

    fn resolver(&self) -> AuthorizationResolver<'_> {
        AuthorizationResolver::new(self.lookup.as_ref())
    }

    async fn invalidate(&self, key: CacheKey) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&key).await;
        }
    }

    fn filtered_view(contract_value: &Value, auth_schema: &Value) -> Value {
        let select = derive_select_map(auth_schema);
        project_select_map(contract_value, &select)
    }

    /// Insert a brand-new contract (spec §4.3 "Insert").
    pub async fn insert(&self, session: &Session, partial: PartialContract) -> Result<Value, ContractError> {
        let contract_type = partial
            .contract_type
            .clone()
            .ok_or_else(|| ContractError::UnknownType("contract type is required".into()))?;
        let type_ref: TypeRef = contract_type.parse()?;

        let candidate = apply_defaults(partial, &type_ref.slug)?;

        let type_schema = load_type_schema(&self.store, self.cache.as_deref(), &contract_type).await?;
        validate_type_gate(&candidate.data, &type_schema).map_err(ContractError::generify)?;

        let auth_schema = self.resolver().effective_read_schema(session).await?;
        let candidate_value = serde_json::to_value(&candidate).map_err(|e| ContractError::Backend(e.to_string()))?;
        validate_permission_gate(&candidate_value, &auth_schema)?;

        let link = if contract_type.starts_with(LINK_TYPE_PREFIX) {
            let relationships = self.relationships.borrow().clone();
            Some(validate_link_contract(&self.store, &relationships, &auth_schema, &candidate.data).await?)
        } else {
            None
        };

        if let Some(loop_ref) = &candidate.loop_ref {
            validate_loop_ref(self.store.pool(), self.store.table(), loop_ref).await?;
        }

        let persisted = self.store.insert(&candidate).await?;

        if let Some(link) = link {
            for (endpoint_id, entries) in linked_at_side_effects(&link, persisted.created_at) {
                self.store.augment_linked_at(endpoint_id, &entries).await?;
                self.invalidate(CacheKey::ById(endpoint_id)).await;
            }
        }

        let persisted_value = serde_json::to_value(&persisted).map_err(|e| ContractError::Backend(e.to_string()))?;
        Ok(Self::filtered_view(&persisted_value, &auth_schema))
    }

    /// Upsert on `(slug, version)` (spec §4.3 "Replace").
    pub async fn replace(&self, session: &Session, partial: PartialContract) -> Result<Value, ContractError> {
        let contract_type = partial
            .contract_type
            .clone()
            .ok_or_else(|| ContractError::UnknownType("contract type is required".into()))?;
        let type_ref: TypeRef = contract_type.parse()?;

        let candidate = apply_defaults(partial, &type_ref.slug)?;

        let type_schema = load_type_schema(&self.store, self.cache.as_deref(), &contract_type).await?;
        validate_type_gate(&candidate.data, &type_schema).map_err(ContractError::generify)?;

        let auth_schema = self.resolver().effective_read_schema(session).await?;
        let candidate_value = serde_json::to_value(&candidate).map_err(|e| ContractError::Backend(e.to_string()))?;
        validate_permission_gate(&candidate_value, &auth_schema)?;

        if let Some(loop_ref) = &candidate.loop_ref {
            validate_loop_ref(self.store.pool(), self.store.table(), loop_ref).await?;
        }

        let persisted = self.store.replace(&candidate).await?;
        self.invalidate(CacheKey::BySlug(persisted.slug.clone(), persisted.version.clone())).await;
        self.invalidate(CacheKey::ById(persisted.id)).await;

        let persisted_value = serde_json::to_value(&persisted).map_err(|e| ContractError::Backend(e.to_string()))?;
        Ok(Self::filtered_view(&persisted_value, &auth_schema))
    }

    /// Apply a JSON-Patch to the contract identified by `id`, inside a
    /// serialized transaction (spec §4.3 "Patch").
    pub async fn patch(&self, session: &Session, id: uuid::Uuid, raw_patch: &Value) -> Result<Value, ContractError> {
        let mut tx = self.store.pool().begin().await.map_err(|e| ContractError::Backend(e.to_string()))?;

        let existing = contracts_store::fetch_by_id(&mut *tx, self.store.table(), id, true)
            .await?
            .ok_or_else(|| ContractError::NoElement(id.to_string()))?;

        let auth_schema = self.resolver().effective_read_schema(session).await?;
        let existing_value =
            serde_json::to_value(&existing).map_err(|e| ContractError::Backend(e.to_string()))?;
        let select = derive_select_map(&auth_schema);
        let existing_filtered = project_select_map(&existing_value, &select);

        let type_schema = load_type_schema(&self.store, self.cache.as_deref(), &existing.contract_type).await?;

        let ops = discard_immutable_ops(raw_patch);

        let mut full_candidate = existing_value.clone();
        apply_patch_ops(&mut full_candidate, &ops)?;

        let mut filtered_candidate = existing_filtered.clone();
        apply_patch_ops(&mut filtered_candidate, &ops)?;

        let candidate_data = full_candidate.get("data").cloned().unwrap_or(Value::Null);
        validate_type_gate(&candidate_data, &type_schema).map_err(ContractError::generify)?;
        validate_permission_gate(&filtered_candidate, &auth_schema)?;

        if full_candidate == existing_value {
            tx.rollback().await.map_err(|e| ContractError::Backend(e.to_string()))?;
            return Ok(existing_filtered);
        }

        let new_loop = full_candidate.get("loop").and_then(Value::as_str).map(str::to_string);
        if new_loop != existing.loop_ref {
            if let Some(loop_ref) = &new_loop {
                validate_loop_ref(&mut *tx, self.store.table(), loop_ref).await?;
            }
        }

        let mut candidate: contracts_types::Contract =
            serde_json::from_value(full_candidate).map_err(|e| ContractError::InvalidPatch(e.to_string()))?;
        candidate.id = existing.id;
        candidate.created_at = existing.created_at;
        candidate.links = existing.links.clone();
        candidate.linked_at = existing.linked_at.clone();
        candidate.updated_at = Utc::now();

        let persisted = contracts_store::update_contract_by_id(&mut *tx, self.store.table(), &candidate).await?;
        tx.commit().await.map_err(|e| ContractError::Backend(e.to_string()))?;

        self.invalidate(CacheKey::ById(persisted.id)).await;
        self.invalidate(CacheKey::BySlug(persisted.slug.clone(), persisted.version.clone())).await;

        let persisted_value = serde_json::to_value(&persisted).map_err(|e| ContractError::Backend(e.to_string()))?;
        Ok(Self::filtered_view(&persisted_value, &auth_schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_prefix_matches_spec_type_name() {
        assert!("link@1.0.0".starts_with(LINK_TYPE_PREFIX));
        assert!(!"card@1.0.0".starts_with(LINK_TYPE_PREFIX));
    }

    #[test]
    fn loop_prefix_matches_spec_type_name() {
        assert!("loop@1.0.0".starts_with(LOOP_TYPE_PREFIX));
        assert!(!"card@1.0.0".starts_with(LOOP_TYPE_PREFIX));
    }
}

//! Resolving a `<slug>@<version>` type reference to its governing JSON
//! schema (spec §4.3 "The pipeline loads the type's schema").

use std::time::Duration;

use serde_json::Value;

use contracts_cache::{CacheKey, ContractCache};
use contracts_store::PgBackend;
use contracts_types::{Contract, ContractError, TypeRef};

const CACHE_TTL: Duration = Duration::from_secs(30);

async fn load_type_contract(
    store: &PgBackend,
    cache: Option<&dyn ContractCache>,
    type_ref: &TypeRef,
) -> Result<Contract, ContractError> {
    let key = CacheKey::BySlug(type_ref.slug.clone(), type_ref.version.clone());
    if let Some(cache) = cache {
        if let Some(hit) = cache.get(&key).await {
            return Ok(hit);
        }
    }

    let contract = store
        .by_slug_version(&type_ref.slug, &type_ref.version)
        .await?
        .ok_or_else(|| ContractError::UnknownType(type_ref.to_string()))?;

    if let Some(cache) = cache {
        cache.put(key, contract.clone(), CACHE_TTL).await;
    }

    Ok(contract)
}

/// Load `type_ref`'s `data.schema` (the JSON schema every contract of that
/// type must validate against).
pub async fn load_type_schema(
    store: &PgBackend,
    cache: Option<&dyn ContractCache>,
    type_ref: &str,
) -> Result<Value, ContractError> {
    let parsed: TypeRef = type_ref.parse()?;
    let contract = load_type_contract(store, cache, &parsed).await?;
    contract
        .data
        .get("schema")
        .cloned()
        .ok_or_else(|| ContractError::UnknownType(format!("{type_ref} has no declared schema")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_type_ref() {
        // Exercised end-to-end against a live backend in integration tests;
        // this unit test only pins that malformed refs never reach the store.
        assert!("not-a-ref".parse::<TypeRef>().is_err());
    }
}

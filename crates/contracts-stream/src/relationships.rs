//! The global relationships table (spec §9 "Global relationships table"): a
//! lock-free shared slot, written only by a dedicated internal subscription
//! over `relationship@*` contracts.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;

use contracts_schema::{compile_query, QueryOptions};
use contracts_store::PgBackend;
use contracts_types::{ContractError, Relationship, RelationshipTable};

const RELATIONSHIP_TYPE_PATTERN: &str = "relationship@";

/// Fetch every `relationship@*` contract and parse it into the shared table.
pub async fn load_relationships(store: &PgBackend) -> Result<RelationshipTable, ContractError> {
    let schema = json!({"properties": {"type": {"pattern": format!("^{RELATIONSHIP_TYPE_PATTERN}")}}});
    let compiled = compile_query(store.table(), &schema, &json!({}), &QueryOptions::default())?;
    let contracts = store.query(&compiled).await?;

    let mut table = RelationshipTable::new();
    for contract in contracts {
        match serde_json::from_value::<Relationship>(contract.data.clone()) {
            Ok(rel) => table.push(rel),
            Err(e) => {
                tracing::warn!(id = %contract.id, error = %e, "skipping malformed relationship contract");
            }
        }
    }
    Ok(table)
}

/// Own the writer half of the shared relationships slot: reload from the
/// backend and publish a fresh snapshot (spec §5 "insertion replaces the
/// slot; readers observe either the old or new value, never a torn one").
pub struct RelationshipsWriter {
    tx: watch::Sender<Arc<RelationshipTable>>,
}

impl RelationshipsWriter {
    /// Build a writer seeded with `initial`, returning it alongside a
    /// receiver handle every operation context can clone cheaply.
    pub fn new(initial: RelationshipTable) -> (Self, watch::Receiver<Arc<RelationshipTable>>) {
        let (tx, rx) = watch::channel(Arc::new(initial));
        (Self { tx }, rx)
    }

    /// Re-fetch from `store` and publish the new snapshot.
    pub async fn refresh(&self, store: &PgBackend) -> Result<(), ContractError> {
        let table = load_relationships(store).await?;
        self.tx.send_replace(Arc::new(table));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_type_pattern_matches_versioned_slug() {
        assert!("relationship@1.0.0".starts_with(RELATIONSHIP_TYPE_PATTERN));
        assert!(!"relation@1.0.0".starts_with(RELATIONSHIP_TYPE_PATTERN));
    }
}

//! Concrete `$$links` traversal (spec §4.1 "$$links": "join the links table
//! and the endpoint table (aliased), emit the endpoint's compiled
//! predicate"; §9 "Cyclic references": arbitrary cycles translated by
//! assigning each join a fresh table alias).
//!
//! Links themselves are ordinary `link@1.0.0` contracts in the same table
//! (`data: {name, inverseName, from: {id, type}, to: {id, type}}`) — the
//! `linked_at` column is bookkeeping (spec §3: "timestamp of the first link
//! created with that verb"), not the traversal index. A `$$links[verb]`
//! join therefore re-enters `contracts_table` once for the link row and once
//! more for the resolved endpoint, matching either the forward verb from
//! `from` or the inverse verb from `to`.

use serde_json::Value;

use contracts_types::ContractError;

use crate::predicate::{compile, LinkResolver, Scope, MAX_LINK_DEPTH};
use crate::value::{Binder, SqlValue};

const LINK_TYPE_PATTERN: &str = "link@%";

/// Resolves every `$$links[verb]` member encountered during predicate
/// compilation into a correlated `EXISTS` subquery against `contracts_table`.
pub struct JoinLinkResolver<'a> {
    contracts_table: &'a str,
    next_alias: usize,
}

impl<'a> JoinLinkResolver<'a> {
    /// Traverse links by re-joining `contracts_table` against itself.
    pub fn new(contracts_table: &'a str) -> Self {
        Self { contracts_table, next_alias: 0 }
    }

    fn fresh_alias(&mut self, prefix: &str) -> String {
        self.next_alias += 1;
        format!("{prefix}{}", self.next_alias)
    }
}

impl<'a> LinkResolver for JoinLinkResolver<'a> {
    fn resolve(
        &mut self,
        verb: &str,
        target_schema: &Value,
        parent_alias: &str,
        depth: usize,
        binder: &mut Binder,
    ) -> Result<String, ContractError> {
        if depth > MAX_LINK_DEPTH {
            return Err(ContractError::InvalidSchema(format!(
                "$$links traversal exceeds maximum depth {MAX_LINK_DEPTH}"
            )));
        }

        let link_alias = self.fresh_alias("lnkc");
        let target_alias = self.fresh_alias("lnkt");
        let type_pattern = binder.push(SqlValue::Text(LINK_TYPE_PATTERN.to_string()));
        let verb_placeholder = binder.push(SqlValue::Text(verb.to_string()));
        let target_predicate = compile(target_schema, &Scope::Root, &target_alias, depth + 1, binder, self)?;

        let table = self.contracts_table;
        Ok(format!(
            "EXISTS (SELECT 1 FROM {table} AS {link_alias} \
             JOIN {table} AS {target_alias} ON {target_alias}.id = (CASE \
               WHEN {link_alias}.data->'from'->>'id' = {parent_alias}.id::text \
               THEN ({link_alias}.data->'to'->>'id')::uuid \
               ELSE ({link_alias}.data->'from'->>'id')::uuid END) \
             WHERE {link_alias}.type LIKE {type_pattern} AND ( \
               ({link_alias}.data->'from'->>'id' = {parent_alias}.id::text AND {link_alias}.data->>'name' = {verb_placeholder}) \
               OR ({link_alias}.data->'to'->>'id' = {parent_alias}.id::text AND {link_alias}.data->>'inverseName' = {verb_placeholder}) \
             ) AND {target_predicate})"
        ))
    }
}

/// A plan for materializing one `$$links[verb]` subtree of a result
/// contract's `links` field (spec §9: "carry the linked field projections
/// into the row codec"). The schema compiler hands these to the store layer,
/// which executes a single batched fetch across every matched parent row and
/// assembles each parent's `links[verb]` from the result.
#[derive(Debug, Clone)]
pub struct LinkProjection {
    /// The verb this projection populates.
    pub verb: String,
    /// The target type's schema, used to compile the batch-fetch predicate
    /// (link masking has already been applied to this schema upstream, in
    /// the authorization resolver).
    pub target_schema: Value,
}

/// Derive the set of `$$links` projections a top-level schema requires,
/// recursing through the same combinators the predicate compiler does.
pub fn derive_link_projections(schema: &Value) -> Vec<LinkProjection> {
    let mut out = Vec::new();
    collect(schema, &mut out);
    out
}

fn collect(schema: &Value, out: &mut Vec<LinkProjection>) {
    let Value::Object(obj) = schema else { return };

    if let Some(link_map) = obj.get("$$links").and_then(Value::as_object) {
        for (verb, target_schema) in link_map {
            out.push(LinkProjection { verb: verb.clone(), target_schema: target_schema.clone() });
            collect(target_schema, out);
        }
    }

    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for sub in props.values() {
            collect(sub, out);
        }
    }
    for combinator in ["allOf", "anyOf", "oneOf"] {
        if let Some(subs) = obj.get(combinator).and_then(Value::as_array) {
            for sub in subs {
                collect(sub, out);
            }
        }
    }
    if let Some(not_schema) = obj.get("not") {
        collect(not_schema, out);
    }
}

/// The extra column [`compile_projection_query`]'s result set carries,
/// naming which parent row each returned target contract belongs to.
pub const PARENT_ID_COLUMN: &str = "__parent_id";

/// Compile the batch-fetch query for one [`LinkProjection`]: starting from a
/// bound set of parent ids, find every `verb`-linked target (forward via
/// `from`, inverse via `inverseName`/`to`) and return it alongside the
/// parent id it's attached to, further restricted by the projection's
/// (already link-masked) target schema.
///
/// The first two bind positions are always, in order: the parent-id array
/// (a JSON array of id strings — the caller substitutes real ids before
/// executing) and the verb text. Callers that need to overwrite the parent
/// ids after compilation (the common case — this function is called once
/// per projection, independent of the actual result set) can rely on that
/// ordering.
pub fn compile_projection_query(
    projection: &LinkProjection,
    contracts_table: &str,
    alias: &str,
) -> Result<(String, Vec<SqlValue>), ContractError> {
    let mut binder = Binder::new();
    let parent_ids_placeholder = binder.push(SqlValue::Json(Value::Array(vec![])));
    let verb_placeholder = binder.push(SqlValue::Text(projection.verb.clone()));
    let type_pattern = binder.push(SqlValue::Text(LINK_TYPE_PATTERN.to_string()));

    let link_alias = "lnkc0";
    let mut resolver = JoinLinkResolver::new(contracts_table);
    let predicate = compile(&projection.target_schema, &Scope::Root, alias, 0, &mut binder, &mut resolver)?;

    let sql = format!(
        "SELECT {link_alias}.parent_id AS {PARENT_ID_COLUMN}, {alias}.* FROM ( \
            SELECT (data->'from'->>'id')::uuid AS parent_id, (data->'to'->>'id')::uuid AS target_id \
            FROM {contracts_table} \
            WHERE type LIKE {type_pattern} AND data->>'name' = {verb_placeholder} \
              AND (data->'from'->>'id')::uuid IN (SELECT (value)::uuid FROM jsonb_array_elements_text({parent_ids_placeholder})) \
            UNION ALL \
            SELECT (data->'to'->>'id')::uuid AS parent_id, (data->'from'->>'id')::uuid AS target_id \
            FROM {contracts_table} \
            WHERE type LIKE {type_pattern} AND data->>'inverseName' = {verb_placeholder} \
              AND (data->'to'->>'id')::uuid IN (SELECT (value)::uuid FROM jsonb_array_elements_text({parent_ids_placeholder})) \
         ) AS {link_alias} \
         JOIN {contracts_table} AS {alias} ON {alias}.id = {link_alias}.target_id \
         WHERE {predicate}"
    );
    Ok((sql, binder.into_values()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_links_member_into_exists_join() {
        let schema = json!({
            "$$links": {
                "is attached to": {"properties": {"slug": {"const": "thread-1"}}}
            }
        });
        let mut binder = Binder::new();
        let mut resolver = JoinLinkResolver::new("contracts");
        let sql = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut resolver).unwrap();
        assert!(sql.contains("EXISTS (SELECT 1 FROM contracts AS lnkc1"));
        assert!(sql.contains("JOIN contracts AS lnkt1"));
        assert!(sql.contains("data->>'name'"));
    }

    #[test]
    fn rejects_traversal_past_max_depth() {
        let schema = json!({"$$links": {"a": {"const": 1}}});
        let mut binder = Binder::new();
        let mut resolver = JoinLinkResolver::new("contracts");
        let err = resolver
            .resolve("a", &schema, "c", MAX_LINK_DEPTH + 1, &mut binder)
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchema(_)));
    }

    #[test]
    fn derive_link_projections_finds_nested_verbs() {
        let schema = json!({
            "properties": {
                "data": {
                    "$$links": {"is attached to": {"properties": {"name": {"type": "string"}}}}
                }
            }
        });
        let projections = derive_link_projections(&schema);
        assert_eq!(projections.len(), 1);
        assert_eq!(projections[0].verb, "is attached to");
    }

    #[test]
    fn compiles_batch_projection_query_with_parent_id_column() {
        let projection = LinkProjection { verb: "is attached to".into(), target_schema: json!({}) };
        let (sql, binds) = compile_projection_query(&projection, "contracts", "t").unwrap();
        assert!(sql.contains(PARENT_ID_COLUMN));
        assert!(sql.contains("UNION ALL"));
        assert_eq!(binds.len(), 3);
    }
}

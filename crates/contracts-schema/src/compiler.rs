//! Top-level query compilation (spec §4.1 "Core algorithm" input/output,
//! "Stream-variant").

use serde_json::Value;

use contracts_types::ContractError;

use crate::links::{derive_link_projections, JoinLinkResolver, LinkProjection};
use crate::options::QueryOptions;
use crate::predicate::{compile, Scope};
use crate::select_map::{derive, prune, SelectNode};
use crate::value::{Binder, SqlValue};

/// The default row alias used throughout a compiled query.
pub const ROOT_ALIAS: &str = "c";

/// A fully compiled, parameterized query, ready to hand to the driver.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The `SELECT ... FROM ... WHERE ...` SQL text, `$N`-parameterized.
    pub sql: String,
    /// Bind values in `$N` order.
    pub binds: Vec<SqlValue>,
    /// The pruned select-map the row codec should project the fetched rows
    /// through.
    pub select_map: SelectNode,
    /// The `$$links` projections the store layer must separately fetch and
    /// graft onto each result row's `links` field.
    pub link_projections: Vec<LinkProjection>,
}

/// Compile `schema` (already authorization-conjoined) plus `options` into a
/// `SELECT` over `contracts_table`.
///
/// `authorized_schema` is the role/marker-resolved schema the caller is
/// permitted to see; it both gates the compiled predicate (already folded
/// into `schema` by the caller, per spec §4.2) and prunes the select-map
/// (spec §9 "Select-map derivation").
pub fn compile_query(
    contracts_table: &str,
    schema: &Value,
    authorized_schema: &Value,
    options: &QueryOptions,
) -> Result<CompiledQuery, ContractError> {
    let validated = options.validate()?;
    let mut binder = Binder::new();
    let mut resolver = JoinLinkResolver::new(contracts_table);
    let predicate = compile(schema, &Scope::Root, ROOT_ALIAS, 0, &mut binder, &mut resolver)?;

    let select_map = prune(&derive(schema), authorized_schema);
    let link_projections = derive_link_projections(schema);

    let sql = format!(
        "SELECT {ROOT_ALIAS}.* FROM {contracts_table} AS {ROOT_ALIAS} WHERE {predicate}{}",
        validated.render_suffix(ROOT_ALIAS, &mut binder)
    );

    Ok(CompiledQuery { sql, binds: binder.into_values(), select_map, link_projections })
}

/// Compile the stream-variant prepared form (spec §4.1 "Stream-variant": a
/// single-`id`-parameterized form of the same predicate, re-evaluated on
/// every row change instead of scanning the table). No `LIMIT`/`ORDER BY` —
/// the stream manager re-matches one row against the boolean predicate.
pub fn compile_stream_predicate(
    contracts_table: &str,
    schema: &Value,
) -> Result<(String, Vec<SqlValue>), ContractError> {
    let mut binder = Binder::new();
    let mut resolver = JoinLinkResolver::new(contracts_table);
    let predicate = compile(schema, &Scope::Root, ROOT_ALIAS, 0, &mut binder, &mut resolver)?;
    let id_placeholder = binder.push(SqlValue::Text(String::new()));
    let sql = format!(
        "SELECT {ROOT_ALIAS}.* FROM {contracts_table} AS {ROOT_ALIAS} WHERE {ROOT_ALIAS}.id = {id_placeholder}::uuid AND {predicate}"
    );
    Ok((sql, binder.into_values()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_full_query_with_suffix() {
        let schema = json!({"properties": {"active": {"const": true}}});
        let options = QueryOptions { sort_by: vec!["created_at".into()], ..Default::default() };
        let compiled = compile_query("contracts", &schema, &schema, &options).unwrap();
        assert!(compiled.sql.starts_with("SELECT c.* FROM contracts AS c WHERE"));
        assert!(compiled.sql.contains("ORDER BY c.created_at ASC"));
        assert!(compiled.sql.contains("LIMIT"));
    }

    #[test]
    fn prunes_select_map_against_authorized_schema() {
        let schema = json!({"properties": {"data": {"properties": {
            "email": {"type": "string"}, "ssn": {"type": "string"}
        }}}});
        let authorized = json!({"properties": {"data": {"properties": {
            "email": {"type": "string"}
        }}}});
        let compiled = compile_query("contracts", &schema, &authorized, &QueryOptions::default()).unwrap();
        let data = compiled.select_map.get("data").unwrap();
        assert!(data.get("email").is_some());
        assert!(data.get("ssn").is_none());
    }

    #[test]
    fn stream_predicate_is_id_scoped_with_no_limit() {
        let schema = json!({"properties": {"active": {"const": true}}});
        let (sql, _binds) = compile_stream_predicate("contracts", &schema).unwrap();
        assert!(sql.contains("c.id = $1::uuid"));
        assert!(!sql.contains("LIMIT"));
    }
}

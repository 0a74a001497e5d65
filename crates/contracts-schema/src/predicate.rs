//! Recursive JSON-schema-keyword → SQL-predicate compilation (spec §4.1
//! "Core algorithm").

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use contracts_types::ContractError;

use crate::ident::ColumnRef;
use crate::value::{Binder, SqlValue};

/// Maximum `$$links` traversal depth (spec §9 "Cyclic references":
/// "recommended: 8").
pub const MAX_LINK_DEPTH: usize = 8;

/// Where a schema node's properties resolve against: the top-level contract
/// row, or a JSON sub-path already descended into (`data.foo`, a joined
/// link target, ...).
#[derive(Debug, Clone)]
pub enum Scope {
    /// Top-level contract columns resolve via [`ColumnRef::resolve_top_level`].
    Root,
    /// Already inside a JSON (or `linked_at`) sub-path.
    Nested(ColumnRef),
}

impl Scope {
    fn child(&self, key: &str) -> Result<ColumnRef, ContractError> {
        match self {
            Scope::Root => ColumnRef::resolve_top_level(key),
            Scope::Nested(col) => col.descend(key),
        }
    }

    fn leaf(&self) -> Result<ColumnRef, ContractError> {
        match self {
            Scope::Root => Err(ContractError::InvalidSchema(
                "leaf keyword (const/enum/pattern/type) used at the schema root; wrap it in `properties`".into(),
            )),
            Scope::Nested(col) => Ok(col.clone()),
        }
    }
}

/// A callback invoked for every `$$links[verb]` member encountered while
/// compiling a predicate. Returns the correlated-EXISTS predicate SQL for
/// that traversal (spec §4.1 "$$links").
pub trait LinkResolver {
    /// Compile the predicate for traversing `verb` from the current row
    /// (referenced as `parent_alias`) into `target_schema`, at `depth`
    /// (already includes this hop).
    fn resolve(
        &mut self,
        verb: &str,
        target_schema: &Value,
        parent_alias: &str,
        depth: usize,
        binder: &mut Binder,
    ) -> Result<String, ContractError>;
}

fn regex_cache() -> &'static std::sync::Mutex<std::collections::HashMap<String, Regex>> {
    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()))
}

/// Compile (and cache) `pattern` once; malformed regexes fail fast with
/// `invalid-regex` (spec §4.1) rather than surfacing later as a driver
/// error.
pub fn compile_regex(pattern: &str) -> Result<(), ContractError> {
    let mut cache = regex_cache().lock().expect("regex cache poisoned");
    if cache.contains_key(pattern) {
        return Ok(());
    }
    let re = Regex::new(pattern).map_err(|e| ContractError::InvalidRegex(format!("{pattern}: {e}")))?;
    cache.insert(pattern.to_string(), re);
    Ok(())
}

/// Compile `schema` into a single boolean SQL predicate, recursing through
/// `properties`/`allOf`/`anyOf`/`oneOf`/`not`/`$$links` per spec §4.1.
pub fn compile(
    schema: &Value,
    scope: &Scope,
    alias: &str,
    depth: usize,
    binder: &mut Binder,
    links: &mut dyn LinkResolver,
) -> Result<String, ContractError> {
    let Value::Object(obj) = schema else {
        return Ok("true".to_string());
    };

    let mut clauses: Vec<String> = Vec::new();

    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for (key, sub) in props {
            let child = scope.child(key)?;
            let child_scope = Scope::Nested(child);
            clauses.push(compile(sub, &child_scope, alias, depth, binder, links)?);
        }
    }

    if let Some(required) = obj.get("required").and_then(Value::as_array) {
        for name in required {
            let name = name.as_str().ok_or_else(|| {
                ContractError::InvalidSchema("`required` entries must be strings".into())
            })?;
            let child = scope.child(name)?;
            clauses.push(render_required(&child, alias, binder));
        }
    }

    if let Some(const_val) = obj.get("const") {
        clauses.push(render_const(&scope.leaf()?, alias, const_val, binder));
    }

    if let Some(enum_vals) = obj.get("enum").and_then(Value::as_array) {
        clauses.push(render_enum(&scope.leaf()?, alias, enum_vals, binder));
    }

    if let Some(type_val) = obj.get("type").and_then(Value::as_str) {
        clauses.push(render_type(&scope.leaf()?, alias, type_val, binder)?);
    }

    if let Some(pattern) = obj
        .get("pattern")
        .or_else(|| obj.get("regexp"))
        .and_then(Value::as_str)
    {
        compile_regex(pattern)?;
        let placeholder = binder.push(SqlValue::Text(pattern.to_string()));
        clauses.push(format!("{} ~ {placeholder}", scope.leaf()?.render_text(alias, binder)));
    }

    if let Some(min_items) = obj.get("minItems").and_then(Value::as_u64) {
        clauses.push(render_array_len(&scope.leaf()?, alias, ">=", min_items, binder));
    }
    if let Some(max_items) = obj.get("maxItems").and_then(Value::as_u64) {
        clauses.push(render_array_len(&scope.leaf()?, alias, "<=", max_items, binder));
    }

    if let Some(contains) = obj.get("contains") {
        clauses.push(render_quantified(&scope.leaf()?, alias, contains, Quantifier::Some, depth, binder, links)?);
    }
    if let Some(items) = obj.get("items") {
        clauses.push(render_quantified(&scope.leaf()?, alias, items, Quantifier::Every, depth, binder, links)?);
    }

    if let Some(ft) = obj.get("fullTextSearch").and_then(Value::as_object) {
        let term = ft
            .get("term")
            .and_then(Value::as_str)
            .ok_or_else(|| ContractError::InvalidSchema("fullTextSearch requires a `term`".into()))?;
        let placeholder = binder.push(SqlValue::Text(term.to_string()));
        clauses.push(format!(
            "to_tsvector('english', {}) @@ plainto_tsquery('english', {placeholder})",
            scope.leaf()?.render_text(alias, binder)
        ));
    }

    if let Some(all_of) = obj.get("allOf").and_then(Value::as_array) {
        let mut parts = Vec::new();
        for sub in all_of {
            parts.push(compile(sub, scope, alias, depth, binder, links)?);
        }
        if !parts.is_empty() {
            clauses.push(format!("({})", parts.join(" AND ")));
        }
    }

    if let Some(any_of) = obj.get("anyOf").and_then(Value::as_array) {
        clauses.push(render_any_of(any_of, scope, alias, depth, binder, links)?);
    }

    if let Some(one_of) = obj.get("oneOf").and_then(Value::as_array) {
        clauses.push(render_one_of(one_of, scope, alias, depth, binder, links)?);
    }

    if let Some(not_schema) = obj.get("not") {
        let inner = compile(not_schema, scope, alias, depth, binder, links)?;
        clauses.push(format!("NOT ({inner})"));
    }

    if let Some(link_map) = obj.get("$$links").and_then(Value::as_object) {
        if depth >= MAX_LINK_DEPTH {
            return Err(ContractError::InvalidSchema(format!(
                "$$links traversal exceeds maximum depth {MAX_LINK_DEPTH}"
            )));
        }
        for (verb, target_schema) in link_map {
            clauses.push(links.resolve(verb, target_schema, alias, depth + 1, binder)?);
        }
    }

    // `additionalProperties: false` has no SQL effect (spec §4.1): enforced
    // by the select-map projection pass instead.

    if clauses.is_empty() {
        Ok("true".to_string())
    } else {
        Ok(format!("({})", clauses.join(" AND ")))
    }
}

enum Quantifier {
    Some,
    Every,
}

#[allow(clippy::too_many_arguments)]
fn render_quantified(
    col: &ColumnRef,
    alias: &str,
    element_schema: &Value,
    quant: Quantifier,
    depth: usize,
    binder: &mut Binder,
    links: &mut dyn LinkResolver,
) -> Result<String, ContractError> {
    let elem_alias = format!("{alias}_elem");
    let elem_scope = Scope::Nested(ColumnRef::JsonElement);
    let elem_predicate = compile(element_schema, &elem_scope, &elem_alias, depth, binder, links)?;
    let source = col.render(alias, binder);
    match quant {
        Quantifier::Some => Ok(format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements({source}) AS {elem_alias} WHERE {elem_predicate})"
        )),
        Quantifier::Every => Ok(format!(
            "NOT EXISTS (SELECT 1 FROM jsonb_array_elements({source}) AS {elem_alias} WHERE NOT {elem_predicate})"
        )),
    }
}

fn render_any_of(
    subs: &[Value],
    scope: &Scope,
    alias: &str,
    depth: usize,
    binder: &mut Binder,
    links: &mut dyn LinkResolver,
) -> Result<String, ContractError> {
    let mut parts = Vec::new();
    for sub in subs {
        parts.push(compile(sub, scope, alias, depth, binder, links)?);
    }
    if parts.is_empty() {
        Ok("false".to_string())
    } else {
        Ok(format!("({})", parts.join(" OR ")))
    }
}

/// `oneOf` compiles to `anyOf` plus an exclusivity clause (spec §4.1:
/// "`oneOf` is expanded into `anyOf` plus an exclusivity clause").
fn render_one_of(
    subs: &[Value],
    scope: &Scope,
    alias: &str,
    depth: usize,
    binder: &mut Binder,
    links: &mut dyn LinkResolver,
) -> Result<String, ContractError> {
    let mut parts = Vec::new();
    for sub in subs {
        parts.push(compile(sub, scope, alias, depth, binder, links)?);
    }
    let any = if parts.is_empty() {
        "false".to_string()
    } else {
        format!("({})", parts.join(" OR "))
    };
    let exclusivity = parts
        .iter()
        .map(|p| format!("(CASE WHEN {p} THEN 1 ELSE 0 END)"))
        .collect::<Vec<_>>()
        .join(" + ");
    if parts.is_empty() {
        Ok(any)
    } else {
        Ok(format!("({any} AND ({exclusivity}) = 1)"))
    }
}

fn render_required(col: &ColumnRef, alias: &str, binder: &mut Binder) -> String {
    match col {
        ColumnRef::Known(_) => {
            if col.is_nullable_known() {
                format!("{} IS NOT NULL", col.render(alias, binder))
            } else {
                "true".to_string()
            }
        }
        ColumnRef::Json { .. } | ColumnRef::JsonElement => format!("{} IS NOT NULL", col.render(alias, binder)),
    }
}

fn render_const(col: &ColumnRef, alias: &str, value: &Value, binder: &mut Binder) -> String {
    match col {
        ColumnRef::Known(_) if value.is_string() => {
            let text_placeholder = binder.push(SqlValue::Text(value.as_str().unwrap().to_string()));
            format!("{} = {text_placeholder}", col.render_text(alias, binder))
        }
        _ => {
            let json_placeholder = binder.push(SqlValue::Json(value.clone()));
            format!("{} = {json_placeholder}::jsonb", col.render(alias, binder))
        }
    }
}

fn render_enum(col: &ColumnRef, alias: &str, values: &[Value], binder: &mut Binder) -> String {
    let mut placeholders = Vec::with_capacity(values.len());
    for v in values {
        let placeholder = binder.push(SqlValue::Json(v.clone()));
        placeholders.push(format!("{placeholder}::jsonb"));
    }
    format!("{} = ANY(ARRAY[{}])", col.render(alias, binder), placeholders.join(", "))
}

fn render_type(col: &ColumnRef, alias: &str, type_name: &str, binder: &mut Binder) -> Result<String, ContractError> {
    let pg_type = match type_name {
        "string" => "string",
        "number" | "integer" => "number",
        "boolean" => "boolean",
        "object" => "object",
        "array" => "array",
        "null" => "null",
        other => return Err(ContractError::InvalidSchema(format!("unsupported `type` keyword value: {other}"))),
    };
    Ok(format!("jsonb_typeof({}) = '{pg_type}'", col.render(alias, binder)))
}

fn render_array_len(col: &ColumnRef, alias: &str, op: &str, n: u64, binder: &mut Binder) -> String {
    match col {
        ColumnRef::Known(crate::ident::KnownColumn::Tags | crate::ident::KnownColumn::Markers) => {
            format!("coalesce(array_length({}, 1), 0) {op} {n}", col.render(alias, binder))
        }
        _ => format!("jsonb_array_length({}) {op} {n}", col.render(alias, binder)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoLinks;
    impl LinkResolver for NoLinks {
        fn resolve(&mut self, verb: &str, _: &Value, _: &str, _: usize, _: &mut Binder) -> Result<String, ContractError> {
            panic!("unexpected $$links[{verb}] in a test with no links");
        }
    }

    #[test]
    fn compiles_const_on_known_column() {
        let schema = json!({"properties": {"slug": {"const": "example"}}});
        let mut binder = Binder::new();
        let sql = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut NoLinks).unwrap();
        assert!(sql.contains("c.slug"));
        assert_eq!(binder.into_values(), vec![SqlValue::Text("example".into())]);
    }

    #[test]
    fn compiles_nested_data_pattern() {
        let schema = json!({"properties": {"data": {"properties": {"email": {"pattern": "^a@"}}}}});
        let mut binder = Binder::new();
        let sql = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut NoLinks).unwrap();
        assert!(sql.contains("c.data#>>$1 ~"));
        assert!(binder.into_values().contains(&SqlValue::TextArray(vec!["email".into()])));
    }

    #[test]
    fn rejects_malformed_regex() {
        let schema = json!({"properties": {"data": {"properties": {"email": {"pattern": "("}}}}});
        let mut binder = Binder::new();
        let err = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut NoLinks).unwrap_err();
        assert!(matches!(err, ContractError::InvalidRegex(_)));
    }

    #[test]
    fn one_of_adds_exclusivity_clause() {
        let schema = json!({
            "oneOf": [
                {"properties": {"active": {"const": true}}},
                {"properties": {"slug": {"const": "x"}}}
            ]
        });
        let mut binder = Binder::new();
        let sql = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut NoLinks).unwrap();
        assert!(sql.contains(") = 1)"));
    }

    #[test]
    fn any_of_combines_with_or() {
        let schema = json!({
            "anyOf": [
                {"properties": {"slug": {"const": "a"}}},
                {"properties": {"slug": {"const": "b"}}}
            ]
        });
        let mut binder = Binder::new();
        let sql = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut NoLinks).unwrap();
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn unknown_top_level_property_is_compile_error_not_sql() {
        let schema = json!({"properties": {"Robert'); DROP TABLE contracts; --": {"const": 1}}});
        let mut binder = Binder::new();
        let err = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut NoLinks).unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchema(_)));
    }

    #[test]
    fn contains_emits_existence_subquery() {
        let schema = json!({
            "properties": {"data": {"properties": {"mirrors": {
                "contains": {"const": "origin"}
            }}}}
        });
        let mut binder = Binder::new();
        let sql = compile(&schema, &Scope::Root, "c", 0, &mut binder, &mut NoLinks).unwrap();
        assert!(sql.contains("EXISTS (SELECT 1 FROM jsonb_array_elements"));
    }
}

//! Per-type index creation from `indexedFields`/`fullTextSearch` (spec §6
//! "Indexes": "Per-type indexes generated from `indexed_fields` (BTREE on
//! scalars, GIN on arrays) and per-field full-text GIN indexes for every
//! field marked `fullTextSearch: true`. Each index is scoped with a `WHERE
//! type = '<type>@<version>'` predicate.").

use serde_json::Value;

/// One index to create for a given type.
#[derive(Debug, Clone)]
pub struct IndexPlan {
    /// The index's SQL identifier.
    pub name: String,
    /// The full `CREATE INDEX IF NOT EXISTS ...` statement.
    pub ddl: String,
}

fn sanitize_identifier_part(raw: &str) -> String {
    raw.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' }).collect()
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\'', "''")
}

/// Quote one path segment as a Postgres array element (`"` and `\` are
/// array-syntax metacharacters, escaped here so a segment containing a
/// comma or brace can never split into extra array elements).
fn quote_array_element(segment: &str) -> String {
    format!("\"{}\"", segment.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Build a `'{...}'` path-array literal for `#>`/`#>>`. Every segment is
/// quoted as its own array element, then the whole literal is escaped with
/// [`escape_literal`] so a `'` in a segment can never break out of the SQL
/// string (the same way `type_ref` is escaped below).
fn jsonb_path_array(field_path: &str) -> String {
    let segments: Vec<String> = field_path.split('.').map(quote_array_element).collect();
    let body = format!("{{{}}}", segments.join(","));
    format!("'{}'", escape_literal(&body))
}

fn field_is_array(schema: &Value, field_path: &str) -> bool {
    let mut node = schema;
    for segment in field_path.split('.') {
        let Some(props) = node.get("properties") else { return false };
        let Some(next) = props.get(segment) else { return false };
        node = next;
    }
    node.get("type").and_then(Value::as_str) == Some("array")
}

/// Recursively collect every field path beneath `schema` marked
/// `fullTextSearch: true`.
pub fn discover_full_text_fields(schema: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_full_text(schema, "", &mut out);
    out
}

fn collect_full_text(node: &Value, path: &str, out: &mut Vec<String>) {
    let Value::Object(obj) = node else { return };
    if obj.get("fullTextSearch").and_then(Value::as_bool) == Some(true) && !path.is_empty() {
        out.push(path.to_string());
    }
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for (key, sub) in props {
            let child_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
            collect_full_text(sub, &child_path, out);
        }
    }
}

fn indexed_field_plan(table: &str, type_ref: &str, field_path: &str, is_array: bool) -> IndexPlan {
    let name = format!("{table}_{}_{}_idx", sanitize_identifier_part(type_ref), sanitize_identifier_part(field_path));
    let path = jsonb_path_array(field_path);
    let ddl = if is_array {
        format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {table} USING GIN ((data #> {path})) WHERE type = '{}'",
            escape_literal(type_ref)
        )
    } else {
        format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {table} ((data #>> {path})) WHERE type = '{}'",
            escape_literal(type_ref)
        )
    };
    IndexPlan { name, ddl }
}

fn full_text_field_plan(table: &str, type_ref: &str, field_path: &str) -> IndexPlan {
    let name = format!("{table}_{}_{}_fts_idx", sanitize_identifier_part(type_ref), sanitize_identifier_part(field_path));
    let path = jsonb_path_array(field_path);
    let ddl = format!(
        "CREATE INDEX IF NOT EXISTS {name} ON {table} USING GIN (to_tsvector('english', data #>> {path})) WHERE type = '{}'",
        escape_literal(type_ref)
    );
    IndexPlan { name, ddl }
}

/// Derive every index a type-contract's `data` (holding `schema` and
/// optionally `indexedFields`) requires.
pub fn plan_type_indexes(table: &str, type_ref: &str, type_contract_data: &Value) -> Vec<IndexPlan> {
    let schema = type_contract_data.get("schema").cloned().unwrap_or(Value::Null);
    let mut plans = Vec::new();

    if let Some(fields) = type_contract_data.get("indexedFields").and_then(Value::as_array) {
        for field in fields.iter().filter_map(Value::as_str) {
            let is_array = field_is_array(&schema, field);
            plans.push(indexed_field_plan(table, type_ref, field, is_array));
        }
    }

    for field in discover_full_text_fields(&schema) {
        plans.push(full_text_field_plan(table, type_ref, &field));
    }

    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discovers_nested_full_text_field() {
        let schema = json!({"properties": {"bio": {"type": "string", "fullTextSearch": true}}});
        let fields = discover_full_text_fields(&schema);
        assert_eq!(fields, vec!["bio".to_string()]);
    }

    #[test]
    fn classifies_array_field_for_gin() {
        let data = json!({
            "schema": {"properties": {"mirrors": {"type": "array"}}},
            "indexedFields": ["mirrors"]
        });
        let plans = plan_type_indexes("contracts", "card@1.0.0", &data);
        assert_eq!(plans.len(), 1);
        assert!(plans[0].ddl.contains("USING GIN"));
    }

    #[test]
    fn classifies_scalar_field_for_btree() {
        let data = json!({
            "schema": {"properties": {"email": {"type": "string"}}},
            "indexedFields": ["email"]
        });
        let plans = plan_type_indexes("contracts", "user@1.0.0", &data);
        assert_eq!(plans.len(), 1);
        assert!(!plans[0].ddl.contains("USING GIN"));
    }

    #[test]
    fn scopes_index_by_type() {
        let data = json!({"schema": {}, "indexedFields": ["name"]});
        let plans = plan_type_indexes("contracts", "card@1.0.0", &data);
        assert!(plans[0].ddl.contains("WHERE type = 'card@1.0.0'"));
    }

    #[test]
    fn indexed_field_with_quote_cannot_break_out_of_ddl_literal() {
        let data = json!({
            "schema": {"properties": {"x": {"type": "string"}}},
            "indexedFields": ["x'; DROP TABLE contracts; --"]
        });
        let plans = plan_type_indexes("contracts", "card@1.0.0", &data);
        assert_eq!(plans.len(), 1);
        assert!(!plans[0].ddl.contains("DROP TABLE"));
        assert!(plans[0].ddl.contains("''"));
    }

    #[test]
    fn indexed_field_with_comma_does_not_split_into_extra_segments() {
        let path = jsonb_path_array("a,b");
        assert_eq!(path, "'{\"a,b\"}'");
    }
}

//! `{$eval: ...}` expression resolution (spec §4.2 step 1: "Evaluate any
//! embedded `{$eval: ...}` expressions against the context
//! `{user: actor}`").
//!
//! Role schemas are static JSON documents; the only dynamic piece they carry
//! is a reference back into the evaluation context. The interpreter is
//! deliberately narrow (SPEC_FULL.md §4.2): a dot-path lookup, or one of the
//! comparison operators `eq`/`ne`/`in`/`contains` against a path. Any other
//! `$eval` shape is an `invalid-schema` error, never a silent pass-through.

use serde_json::Value;

use contracts_types::ContractError;

/// Walk `schema`, replacing every `{"$eval": ...}` object with its resolved
/// value against `context`. Returns `ContractError::InvalidSchema` for any
/// `$eval` form that isn't a bare dot-path string or a recognized operator
/// object.
pub fn eval_schema(schema: &Value, context: &Value) -> Result<Value, ContractError> {
    match schema {
        Value::Object(map) => {
            if let Some(expr) = map.get("$eval") {
                if map.len() != 1 {
                    return Err(ContractError::InvalidSchema(
                        "`$eval` must be the sole key of its enclosing object".into(),
                    ));
                }
                return eval_expr(expr, context);
            }
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), eval_schema(v, context)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for v in items {
                out.push(eval_schema(v, context)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

fn eval_expr(expr: &Value, context: &Value) -> Result<Value, ContractError> {
    match expr {
        Value::String(path) => Ok(resolve_path(context, path).cloned().unwrap_or(Value::Null)),
        Value::Object(op) => eval_operator(op, context),
        other => Err(ContractError::InvalidSchema(format!(
            "`$eval` must be a dot-path string or an operator object, got {other}"
        ))),
    }
}

fn eval_operator(op: &serde_json::Map<String, Value>, context: &Value) -> Result<Value, ContractError> {
    let op_name = op
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| ContractError::InvalidSchema("`$eval` operator object requires an `op` string".into()))?;
    let path = op
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| ContractError::InvalidSchema("`$eval` operator object requires a `path` string".into()))?;
    let actual = resolve_path(context, path).cloned().unwrap_or(Value::Null);

    match op_name {
        "eq" => {
            let expected = op
                .get("value")
                .ok_or_else(|| ContractError::InvalidSchema("`$eval` `eq` requires a `value`".into()))?;
            Ok(Value::Bool(&actual == expected))
        }
        "ne" => {
            let expected = op
                .get("value")
                .ok_or_else(|| ContractError::InvalidSchema("`$eval` `ne` requires a `value`".into()))?;
            Ok(Value::Bool(&actual != expected))
        }
        "in" => {
            let values = op
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| ContractError::InvalidSchema("`$eval` `in` requires a `values` array".into()))?;
            Ok(Value::Bool(values.contains(&actual)))
        }
        "contains" => {
            let expected = op
                .get("value")
                .ok_or_else(|| ContractError::InvalidSchema("`$eval` `contains` requires a `value`".into()))?;
            let found = match &actual {
                Value::Array(items) => items.contains(expected),
                Value::String(s) => expected.as_str().is_some_and(|needle| s.contains(needle)),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        other => Err(ContractError::InvalidSchema(format!("unknown `$eval` operator '{other}'"))),
    }
}

fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |node, segment| node.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_path() {
        let context = json!({"user": {"slug": "user-alice", "data": {"department": "eng"}}});
        let schema = json!({"properties": {"markers": {"const": {"$eval": "user.data.department"}}}});
        let resolved = eval_schema(&schema, &context).unwrap();
        assert_eq!(resolved["properties"]["markers"]["const"], json!("eng"));
    }

    #[test]
    fn unresolved_path_becomes_null() {
        let context = json!({"user": {"slug": "user-alice"}});
        let schema = json!({"const": {"$eval": "user.data.missing"}});
        let resolved = eval_schema(&schema, &context).unwrap();
        assert_eq!(resolved["const"], Value::Null);
    }

    #[test]
    fn leaves_non_eval_schema_untouched() {
        let schema = json!({"properties": {"active": {"const": true}}});
        assert_eq!(eval_schema(&schema, &Value::Null).unwrap(), schema);
    }

    #[test]
    fn eq_operator_compares_path_against_value() {
        let context = json!({"user": {"slug": "user-alice"}});
        let schema = json!({"const": {"$eval": {"op": "eq", "path": "user.slug", "value": "user-alice"}}});
        let resolved = eval_schema(&schema, &context).unwrap();
        assert_eq!(resolved["const"], Value::Bool(true));
    }

    #[test]
    fn ne_operator_compares_path_against_value() {
        let context = json!({"user": {"slug": "user-bob"}});
        let schema = json!({"const": {"$eval": {"op": "ne", "path": "user.slug", "value": "user-alice"}}});
        let resolved = eval_schema(&schema, &context).unwrap();
        assert_eq!(resolved["const"], Value::Bool(true));
    }

    #[test]
    fn in_operator_checks_membership() {
        let context = json!({"user": {"org": "eng"}});
        let schema = json!({"const": {"$eval": {"op": "in", "path": "user.org", "values": ["eng", "sales"]}}});
        let resolved = eval_schema(&schema, &context).unwrap();
        assert_eq!(resolved["const"], Value::Bool(true));
    }

    #[test]
    fn contains_operator_checks_substring() {
        let context = json!({"user": {"slug": "user-alice"}});
        let schema = json!({"const": {"$eval": {"op": "contains", "path": "user.slug", "value": "alice"}}});
        let resolved = eval_schema(&schema, &context).unwrap();
        assert_eq!(resolved["const"], Value::Bool(true));
    }

    #[test]
    fn unknown_operator_is_invalid_schema_error() {
        let schema = json!({"const": {"$eval": {"op": "gt", "path": "user.slug", "value": "x"}}});
        let err = eval_schema(&schema, &Value::Null).unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchema(_)));
    }

    #[test]
    fn malformed_eval_form_is_invalid_schema_error_not_silent_true() {
        let schema = json!({"const": {"$eval": 42}});
        let err = eval_schema(&schema, &Value::Null).unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchema(_)));
    }
}

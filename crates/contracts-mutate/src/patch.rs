//! JSON-Patch application with immutable-path discarding (spec §4.3 "Patch"
//! steps 4-5).

use serde_json::Value;

use contracts_types::{Contract, ContractError};

/// Drop every patch operation targeting an immutable projection, silently
/// (spec §4.3 step 5).
pub fn discard_immutable_ops(raw_patch: &Value) -> Vec<Value> {
    let Value::Array(ops) = raw_patch else { return Vec::new() };
    ops.iter()
        .filter(|op| {
            let path = op.get("path").and_then(Value::as_str).unwrap_or("");
            !Contract::is_immutable_path(path)
        })
        .cloned()
        .collect()
}

/// Apply `ops` (already filtered of immutable targets) to `target`,
/// aborting on the first failing operation with *invalid-patch* (spec §4.3
/// step 4).
pub fn apply(target: &mut Value, ops: &[Value]) -> Result<(), ContractError> {
    let patch: json_patch::Patch = serde_json::from_value(Value::Array(ops.to_vec()))
        .map_err(|e| ContractError::InvalidPatch(e.to_string()))?;
    json_patch::patch(target, &patch).map_err(|e| ContractError::InvalidPatch(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discards_ops_targeting_immutable_paths() {
        let raw = json!([
            {"op": "replace", "path": "/updated_at", "value": "2024-01-01T00:00:00Z"},
            {"op": "replace", "path": "/data/email", "value": "a@example.com"}
        ]);
        let kept = discard_immutable_ops(&raw);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["path"], "/data/email");
    }

    #[test]
    fn applies_remaining_ops() {
        let mut target = json!({"data": {"email": "old@example.com"}});
        let ops = vec![json!({"op": "replace", "path": "/data/email", "value": "new@example.com"})];
        apply(&mut target, &ops).unwrap();
        assert_eq!(target["data"]["email"], "new@example.com");
    }

    #[test]
    fn aborts_on_first_failing_op() {
        let mut target = json!({"data": {}});
        let ops = vec![json!({"op": "remove", "path": "/data/missing"})];
        assert!(apply(&mut target, &ops).is_err());
    }
}

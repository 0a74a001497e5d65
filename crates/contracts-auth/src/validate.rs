//! The mutation gate (spec §4.2 "Mutation gate", §4.3 step 6-7): a candidate
//! contract must satisfy both its type's schema and the actor's effective
//! read schema before it's persisted.

use jsonschema::validator_for;
use serde_json::Value;

use contracts_types::ContractError;

/// Validate `data` against `type_schema`, raising `schema-mismatch` on the
/// first validation error (spec §4.2: "Failing the type gate raises a
/// *schema-mismatch* error").
pub fn validate_type_gate(data: &Value, type_schema: &Value) -> Result<(), ContractError> {
    validate_against(data, type_schema, "type")
}

/// Validate `data` against the actor's effective read schema, raising
/// `permission` on failure (spec §4.2: "Failing the permission gate raises a
/// *permission* error").
pub fn validate_permission_gate(data: &Value, auth_schema: &Value) -> Result<(), ContractError> {
    let compiled = validator_for(auth_schema)
        .map_err(|e| ContractError::InvalidSchema(format!("invalid authorization schema: {e}")))?;
    if let Some(error) = compiled.iter_errors(data).next() {
        return Err(ContractError::Permission(error.to_string()));
    }
    Ok(())
}

fn validate_against(data: &Value, schema: &Value, gate: &str) -> Result<(), ContractError> {
    let compiled = validator_for(schema)
        .map_err(|e| ContractError::InvalidSchema(format!("invalid {gate} schema: {e}")))?;
    if let Some(error) = compiled.iter_errors(data).next() {
        return Err(ContractError::SchemaMismatch(error.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_gate_rejects_mismatched_data() {
        let schema = json!({"type": "object", "required": ["email"]});
        let err = validate_type_gate(&json!({}), &schema).unwrap_err();
        assert!(matches!(err, ContractError::SchemaMismatch(_)));
    }

    #[test]
    fn permission_gate_rejects_unauthorized_field() {
        let auth = json!({"properties": {"data": {"additionalProperties": false, "properties": {"email": {"type": "string"}}}}});
        let candidate = json!({"data": {"email": "a@example.com", "hash": "secret"}});
        let err = validate_permission_gate(&candidate, &auth).unwrap_err();
        assert!(matches!(err, ContractError::Permission(_)));
    }

    #[test]
    fn gates_accept_conforming_data() {
        let schema = json!({"type": "object", "required": ["email"]});
        assert!(validate_type_gate(&json!({"email": "a@example.com"}), &schema).is_ok());
    }
}

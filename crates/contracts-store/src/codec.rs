//! The row codec: `PgRow` → [`Contract`] (spec §4.1 "an assembled row codec
//! converting the raw relational rows back into contract objects").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use contracts_types::{Contract, ContractError, Version};

fn decode_version(row: &PgRow) -> Result<Version, ContractError> {
    let major: i32 = row.try_get("version_major").map_err(|e| ContractError::Backend(e.to_string()))?;
    let minor: i32 = row.try_get("version_minor").map_err(|e| ContractError::Backend(e.to_string()))?;
    let patch: i32 = row.try_get("version_patch").map_err(|e| ContractError::Backend(e.to_string()))?;
    let pre: Option<String> = row.try_get("version_prerelease").map_err(|e| ContractError::Backend(e.to_string()))?;
    let build: Option<String> = row.try_get("version_build").map_err(|e| ContractError::Backend(e.to_string()))?;
    Ok(Version { major: major as u32, minor: minor as u32, patch: patch as u32, pre, build })
}

fn decode_linked_at(raw: Value) -> HashMap<String, DateTime<Utc>> {
    let Value::Object(map) = raw else { return HashMap::new() };
    map.into_iter()
        .filter_map(|(verb, ts)| {
            let ts = ts.as_str()?;
            DateTime::parse_from_rfc3339(ts).ok().map(|dt| (verb, dt.with_timezone(&Utc)))
        })
        .collect()
}

fn decode_jsonb_array(row: &PgRow, column: &str) -> Result<Vec<Value>, ContractError> {
    let raw: Vec<sqlx::types::Json<Value>> =
        row.try_get(column).map_err(|e| ContractError::Backend(e.to_string()))?;
    Ok(raw.into_iter().map(|j| j.0).collect())
}

/// Decode one `contracts` table row. The `links` field is always decoded
/// empty — it's materialized per-query from `$$links` projections, never
/// trusted from the persisted column (spec §3: "materialized on read, never
/// set by clients").
pub fn decode_row(row: &PgRow) -> Result<Contract, ContractError> {
    let id: Uuid = row.try_get("id").map_err(|e| ContractError::Backend(e.to_string()))?;
    let slug: String = row.try_get("slug").map_err(|e| ContractError::Backend(e.to_string()))?;
    let contract_type: String = row.try_get("type").map_err(|e| ContractError::Backend(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| ContractError::Backend(e.to_string()))?;
    let name: Option<String> = row.try_get("name").map_err(|e| ContractError::Backend(e.to_string()))?;
    let loop_ref: Option<String> = row.try_get("loop").map_err(|e| ContractError::Backend(e.to_string()))?;
    let tags: Vec<String> = row.try_get("tags").map_err(|e| ContractError::Backend(e.to_string()))?;
    let markers: Vec<String> = row.try_get("markers").map_err(|e| ContractError::Backend(e.to_string()))?;
    let linked_at_raw: Value = row.try_get("linked_at").map_err(|e| ContractError::Backend(e.to_string()))?;
    let data: Value = row.try_get("data").map_err(|e| ContractError::Backend(e.to_string()))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| ContractError::Backend(e.to_string()))?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(|e| ContractError::Backend(e.to_string()))?;

    Ok(Contract {
        id,
        slug,
        version: decode_version(row)?,
        contract_type,
        active,
        name,
        tags,
        markers,
        loop_ref,
        links: HashMap::new(),
        linked_at: decode_linked_at(linked_at_raw),
        requires: decode_jsonb_array(row, "requires")?,
        capabilities: decode_jsonb_array(row, "capabilities")?,
        data,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_linked_at_parses_rfc3339_timestamps() {
        let raw = json!({"is attached to": "2024-01-01T00:00:00Z"});
        let decoded = decode_linked_at(raw);
        assert!(decoded.contains_key("is attached to"));
    }

    #[test]
    fn decode_linked_at_skips_malformed_entries() {
        let raw = json!({"bad": "not-a-date"});
        let decoded = decode_linked_at(raw);
        assert!(decoded.is_empty());
    }
}

//! Query options: `limit`, `skip`, `sortBy`, `sortDir`, per-link sub-options
//! (spec §4.1 "Limits and ordering", §6 "Options").

use std::collections::HashMap;

use serde_json::Value;

use contracts_types::ContractError;

use crate::ident::ColumnRef;
use crate::value::Binder;

/// The compiler's hard ceiling on `limit` (spec §4.1: "`limit` (integer in
/// `[0, HARD_MAX]`, default `HARD_MAX`)").
pub const HARD_MAX_LIMIT: u32 = 10_000;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDir {
    fn sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Per-link-verb sub-options (spec §6 `options.links[verb]`).
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Max linked contracts to materialize for this verb.
    pub limit: Option<u32>,
    /// Number of linked contracts to skip.
    pub skip: Option<u32>,
    /// Sort path(s) within the linked contract.
    pub sort_by: Vec<String>,
    /// Sort direction for `sort_by`.
    pub sort_dir: SortDir,
}

impl Default for SortDir {
    fn default() -> Self {
        SortDir::Asc
    }
}

/// Raw, caller-supplied query options, validated by [`ValidatedOptions::validate`]
/// before any SQL is emitted (spec §4.1 "Limits and ordering": "Non-integer,
/// negative, infinite, or `NaN` values ... are rejected before any SQL is
/// emitted").
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Requested limit, as supplied (may be fractional/negative/non-finite).
    pub limit: Option<Value>,
    /// Requested skip, as supplied.
    pub skip: Option<Value>,
    /// Sort path(s), column-or-JSON-path segments joined by `.`.
    pub sort_by: Vec<String>,
    /// Sort direction.
    pub sort_dir: SortDir,
    /// Per-link-verb sub-options.
    pub links: HashMap<String, LinkOptions>,
    /// An additional mask schema further restricting the projected fields.
    pub mask: Option<Value>,
}

/// Validated, SQL-ready options.
#[derive(Debug, Clone)]
pub struct ValidatedOptions {
    /// Effective limit, defaulting to [`HARD_MAX_LIMIT`].
    pub limit: u32,
    /// Effective skip, defaulting to `0`.
    pub skip: u32,
    /// Resolved sort columns, in order.
    pub sort_by: Vec<ColumnRef>,
    /// Sort direction applied to every `sort_by` entry.
    pub sort_dir: SortDir,
}

fn validate_nonneg_u32(value: &Value, field: &str) -> Result<u32, ContractError> {
    let n = value
        .as_f64()
        .ok_or_else(|| ContractError::InvalidLimit(format!("{field} must be a number")))?;
    if !n.is_finite() {
        return Err(ContractError::InvalidLimit(format!("{field} must be finite")));
    }
    if n.fract() != 0.0 {
        return Err(ContractError::InvalidLimit(format!("{field} must be an integer")));
    }
    if n < 0.0 {
        return Err(ContractError::InvalidLimit(format!("{field} must be non-negative")));
    }
    if n > u32::MAX as f64 {
        return Err(ContractError::InvalidLimit(format!("{field} is out of range")));
    }
    Ok(n as u32)
}

impl QueryOptions {
    /// Validate and resolve into SQL-ready form.
    pub fn validate(&self) -> Result<ValidatedOptions, ContractError> {
        let limit = match &self.limit {
            None => HARD_MAX_LIMIT,
            Some(v) => {
                let n = validate_nonneg_u32(v, "limit")?;
                if n > HARD_MAX_LIMIT {
                    return Err(ContractError::InvalidLimit(format!(
                        "limit {n} exceeds HARD_MAX {HARD_MAX_LIMIT}"
                    )));
                }
                n
            }
        };
        let skip = match &self.skip {
            None => 0,
            Some(v) => validate_nonneg_u32(v, "skip")?,
        };

        let mut sort_by = Vec::with_capacity(self.sort_by.len());
        for path in &self.sort_by {
            sort_by.push(resolve_sort_path(path)?);
        }

        Ok(ValidatedOptions { limit, skip, sort_by, sort_dir: self.sort_dir })
    }
}

fn resolve_sort_path(path: &str) -> Result<ColumnRef, ContractError> {
    let mut segments = path.split('.');
    let head = segments
        .next()
        .ok_or_else(|| ContractError::InvalidLimit("empty sortBy path".into()))?;
    let mut col = ColumnRef::resolve_top_level(head)?;
    for seg in segments {
        col = col.descend(seg)?;
    }
    Ok(col)
}

impl ValidatedOptions {
    /// Render the `ORDER BY ... LIMIT ... OFFSET ...` suffix.
    ///
    /// Per spec §4.1 "Limits and ordering": sorting and limiting are applied
    /// *after* link resolution, so callers must apply this suffix to a query
    /// over distinct top-level rows (one row per matching parent), never to
    /// a parent/child join's raw row stream.
    pub fn render_suffix(&self, alias: &str, binder: &mut Binder) -> String {
        let mut sql = String::new();
        if !self.sort_by.is_empty() {
            let order = self
                .sort_by
                .iter()
                .map(|c| format!("{} {}", c.render(alias, binder), self.sort_dir.sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", self.limit, self.skip));
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_limit_to_hard_max() {
        let opts = QueryOptions::default();
        let validated = opts.validate().unwrap();
        assert_eq!(validated.limit, HARD_MAX_LIMIT);
        assert_eq!(validated.skip, 0);
    }

    #[test]
    fn rejects_negative_limit() {
        let opts = QueryOptions { limit: Some(json!(-1)), ..Default::default() };
        assert!(matches!(opts.validate(), Err(ContractError::InvalidLimit(_))));
    }

    #[test]
    fn rejects_fractional_skip() {
        let opts = QueryOptions { skip: Some(json!(1.5)), ..Default::default() };
        assert!(matches!(opts.validate(), Err(ContractError::InvalidLimit(_))));
    }

    #[test]
    fn rejects_non_finite_limit() {
        let opts = QueryOptions { limit: Some(Value::from(f64::INFINITY)), ..Default::default() };
        assert!(matches!(opts.validate(), Err(ContractError::InvalidLimit(_))));
    }

    #[test]
    fn rejects_limit_over_hard_max() {
        let opts = QueryOptions { limit: Some(json!(HARD_MAX_LIMIT + 1)), ..Default::default() };
        assert!(matches!(opts.validate(), Err(ContractError::InvalidLimit(_))));
    }

    #[test]
    fn resolves_sort_by_known_and_json_paths() {
        use crate::value::SqlValue;

        let opts = QueryOptions { sort_by: vec!["created_at".into(), "data.priority".into()], ..Default::default() };
        let validated = opts.validate().unwrap();
        assert_eq!(validated.sort_by.len(), 2);
        let mut binder = Binder::new();
        assert_eq!(
            validated.render_suffix("c", &mut binder),
            " ORDER BY c.created_at ASC, c.data#>$1 ASC LIMIT 10000 OFFSET 0"
        );
        assert_eq!(binder.into_values(), vec![SqlValue::TextArray(vec!["priority".into()])]);
    }
}

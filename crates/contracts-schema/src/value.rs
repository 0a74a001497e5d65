//! Parameter-binding values (spec §4.1 "Determinism and safety": "every
//! value goes through the driver's parameterized-binding").

use serde_json::Value;

/// A value bound into the compiled SQL via a positional placeholder
/// (`$1`, `$2`, ...). The compiler never concatenates a value into the SQL
/// text itself.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Bound as `$N::text`.
    Text(String),
    /// Bound as `$N::jsonb`.
    Json(Value),
    /// Bound as `$N::int8`.
    Int(i64),
    /// Bound as `$N::bool`.
    Bool(bool),
    /// Bound as `$N::text[]`, used for JSON path segments passed to `#>`/`#>>`
    /// so a path segment can never be concatenated into the SQL text.
    TextArray(Vec<String>),
}

/// Accumulates bind values and hands out `$N` placeholders in the order
/// they're requested, the shape every SQL-string-building pass in this
/// crate threads through.
#[derive(Debug, Default)]
pub struct Binder {
    values: Vec<SqlValue>,
}

impl Binder {
    /// Start with no bound values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value`, returning its `$N` placeholder.
    pub fn push(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    /// Consume the binder, returning the values in bind order.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

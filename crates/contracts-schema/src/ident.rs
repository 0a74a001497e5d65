//! Identifier resolution and escaping (spec §4.1 "Determinism and safety").
//!
//! Every identifier that reaches emitted SQL — column names, JSON path
//! segments, link-verb aliases — is resolved against this module's
//! allow-list *before* any string concatenation happens. A schema path that
//! doesn't resolve to a known column or a `data`/`links` sub-path is a
//! compile error (`ContractError::InvalidSchema`), never a raw pass-through.

use contracts_types::ContractError;

use crate::value::{Binder, SqlValue};

/// The fixed set of top-level contract columns a schema property name may
/// reference directly (spec §4.1, §6 row schema).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownColumn {
    /// `id UUID`
    Id,
    /// `slug VARCHAR(255)`
    Slug,
    /// `type TEXT`
    Type,
    /// `active BOOL`
    Active,
    /// Synthesized from `version_{major,minor,patch,prerelease,build}`.
    Version,
    /// `name TEXT`
    Name,
    /// `"loop" TEXT`
    Loop,
    /// `tags TEXT[]`
    Tags,
    /// `markers TEXT[]`
    Markers,
    /// `created_at TIMESTAMPTZ`
    CreatedAt,
    /// `updated_at TIMESTAMPTZ`
    UpdatedAt,
    /// `linked_at JSONB`
    LinkedAt,
}

impl KnownColumn {
    /// Resolve a top-level schema property name to a known column, if any.
    pub fn from_property_name(name: &str) -> Option<Self> {
        Some(match name {
            "id" => KnownColumn::Id,
            "slug" => KnownColumn::Slug,
            "type" => KnownColumn::Type,
            "active" => KnownColumn::Active,
            "version" => KnownColumn::Version,
            "name" => KnownColumn::Name,
            "loop" => KnownColumn::Loop,
            "tags" => KnownColumn::Tags,
            "markers" => KnownColumn::Markers,
            "created_at" => KnownColumn::CreatedAt,
            "updated_at" => KnownColumn::UpdatedAt,
            "linked_at" => KnownColumn::LinkedAt,
            _ => return None,
        })
    }

    /// The quoted SQL column reference, optionally qualified by a table alias.
    pub fn quoted(self, alias: &str) -> String {
        let col = match self {
            KnownColumn::Id => "id",
            KnownColumn::Slug => "slug",
            KnownColumn::Type => "type",
            KnownColumn::Active => "active",
            KnownColumn::Version => {
                return format!(
                    "({alias}.version_major || '.' || {alias}.version_minor || '.' || {alias}.version_patch \
                     || coalesce('-' || nullif({alias}.version_prerelease, ''), '') \
                     || coalesce('+' || nullif({alias}.version_build, ''), ''))"
                );
            }
            KnownColumn::Name => "name",
            KnownColumn::Loop => "\"loop\"",
            KnownColumn::Tags => "tags",
            KnownColumn::Markers => "markers",
            KnownColumn::CreatedAt => "created_at",
            KnownColumn::UpdatedAt => "updated_at",
            KnownColumn::LinkedAt => "linked_at",
        };
        format!("{alias}.{col}")
    }

    /// `true` if this column may be `NULL` (used by `required`).
    pub fn nullable(self) -> bool {
        matches!(self, KnownColumn::Name | KnownColumn::Loop)
    }
}

/// Which JSONB column a non-top-level path walks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonBase {
    /// The `data JSONB` column.
    Data,
    /// The `linked_at JSONB` column, addressed beneath a known link verb.
    LinkedAt,
}

impl JsonBase {
    fn column(self) -> &'static str {
        match self {
            JsonBase::Data => "data",
            JsonBase::LinkedAt => "linked_at",
        }
    }
}

/// A resolved reference into either a known column or a JSON sub-path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    /// A known, fixed-column reference.
    Known(KnownColumn),
    /// A path beneath `data` (or `linked_at`), e.g. `data->'a'->'b'`.
    Json { base: JsonBase, path: Vec<String> },
    /// The per-element binding inside a `jsonb_array_elements(...)` loop
    /// emitted for `items`/`contains` (spec §4.1). The table alias passed
    /// to `render`/`render_text` for this variant *is* the element value
    /// itself, not a row alias to project a column from.
    JsonElement,
}

impl ColumnRef {
    /// Resolve the top-level property name `name` to a column reference.
    /// Returns a compile error for any name outside the known-column /
    /// `data` allow-list (spec §4.1: "yields a compile error — SQL is never
    /// sent to the database in that case").
    pub fn resolve_top_level(name: &str) -> Result<Self, ContractError> {
        if let Some(col) = KnownColumn::from_property_name(name) {
            return Ok(ColumnRef::Known(col));
        }
        if name == "data" {
            return Ok(ColumnRef::Json { base: JsonBase::Data, path: vec![] });
        }
        Err(ContractError::InvalidSchema(format!(
            "unknown top-level property '{name}' cannot be compiled to SQL"
        )))
    }

    /// Descend one property level beneath a JSON path. Only valid on
    /// [`ColumnRef::Json`] references — descending beneath a known scalar
    /// column (e.g. `/slug/foo`) is a compile error.
    pub fn descend(&self, key: &str) -> Result<Self, ContractError> {
        match self {
            ColumnRef::Json { base, path } => {
                let mut path = path.clone();
                path.push(key.to_string());
                Ok(ColumnRef::Json { base: *base, path })
            }
            ColumnRef::Known(KnownColumn::LinkedAt) => {
                Ok(ColumnRef::Json { base: JsonBase::LinkedAt, path: vec![key.to_string()] })
            }
            ColumnRef::JsonElement => Ok(ColumnRef::Json { base: JsonBase::Data, path: vec![key.to_string()] }),
            ColumnRef::Known(other) => Err(ContractError::InvalidSchema(format!(
                "cannot descend into scalar column beneath '{other:?}'"
            ))),
        }
    }

    /// Render a SQL expression yielding this reference's value as `jsonb`
    /// (JSON paths) or its native column type (known columns). Any JSON path
    /// segments are bound through `binder` as a `text[]` parameter, never
    /// concatenated into the SQL text (spec §4.1 "Determinism and safety").
    pub fn render(&self, alias: &str, binder: &mut Binder) -> String {
        match self {
            ColumnRef::Known(col) => col.quoted(alias),
            ColumnRef::Json { base, path } => render_json_path(alias, base.column(), path, false, binder),
            ColumnRef::JsonElement => alias.to_string(),
        }
    }

    /// Render a SQL expression yielding this reference's value as `text`.
    /// Known columns are cast; JSON paths use the `#>>` text-extraction
    /// operator, with path segments bound the same way as [`Self::render`].
    pub fn render_text(&self, alias: &str, binder: &mut Binder) -> String {
        match self {
            ColumnRef::Known(col) => format!("({})::text", col.quoted(alias)),
            ColumnRef::Json { base, path } => render_json_path(alias, base.column(), path, true, binder),
            ColumnRef::JsonElement => format!("({alias}#>>'{{}}')"),
        }
    }

    /// `true` if the column this reference targets may be absent/`NULL`.
    pub fn is_nullable_known(&self) -> bool {
        matches!(self, ColumnRef::Known(c) if c.nullable())
    }
}

fn render_json_path(alias: &str, column: &str, path: &[String], as_text: bool, binder: &mut Binder) -> String {
    let op = if as_text { "#>>" } else { "#>" };
    if path.is_empty() {
        format!("{alias}.{column}")
    } else {
        let placeholder = binder.push(SqlValue::TextArray(path.to_vec()));
        format!("{alias}.{column}{op}{placeholder}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_columns() {
        assert_eq!(ColumnRef::resolve_top_level("id").unwrap(), ColumnRef::Known(KnownColumn::Id));
        assert_eq!(ColumnRef::resolve_top_level("data").unwrap(), ColumnRef::Json { base: JsonBase::Data, path: vec![] });
    }

    #[test]
    fn rejects_unknown_top_level_property() {
        let err = ColumnRef::resolve_top_level("'; DROP TABLE contracts; --").unwrap_err();
        assert!(matches!(err, ContractError::InvalidSchema(_)));
    }

    #[test]
    fn descends_into_data_path() {
        let data = ColumnRef::resolve_top_level("data").unwrap();
        let nested = data.descend("email").unwrap().descend("domain").unwrap();
        let mut binder = Binder::new();
        assert_eq!(nested.render("t", &mut binder), "t.data#>$1");
        let mut binder = Binder::new();
        assert_eq!(nested.render_text("t", &mut binder), "t.data#>>$1");
        assert_eq!(
            binder.into_values(),
            vec![SqlValue::TextArray(vec!["email".into(), "domain".into()])]
        );
    }

    #[test]
    fn path_segments_never_concatenate_into_sql_text() {
        let data = ColumnRef::resolve_top_level("data").unwrap();
        let nested = data.descend("a'; DROP TABLE contracts; --").unwrap();
        let mut binder = Binder::new();
        let sql = nested.render_text("t", &mut binder);
        assert_eq!(sql, "t.data#>>$1");
        assert!(!sql.contains("DROP TABLE"));
        assert_eq!(
            binder.into_values(),
            vec![SqlValue::TextArray(vec!["a'; DROP TABLE contracts; --".into()])]
        );
    }

    #[test]
    fn rejects_descent_into_scalar_column() {
        let slug = ColumnRef::resolve_top_level("id").unwrap();
        assert!(slug.descend("nope").is_err());
    }
}

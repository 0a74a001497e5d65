//! A single subscription: its compiled stream-variant predicate, constant
//! pre-filters, and "seen" set (spec §4.4 "Subscription", "Per-notification
//! algorithm").

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use contracts_schema::{compile_stream_predicate, derive_link_projections, LinkProjection, SqlValue};
use contracts_types::ContractError;

use crate::events::StreamEvent;

/// Identifies one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Mint a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-computed constant filters, used to quick-reject a notification before
/// running the prepared query (spec §4.4: "Quick-reject if the
/// subscription's constant `id`/`slug`/`type` filters don't match").
#[derive(Debug, Clone, Default)]
pub struct ConstFilters {
    /// Exact id the subscription is scoped to, if its schema pins one.
    pub id: Option<Uuid>,
    /// Exact slug the subscription is scoped to, if its schema pins one.
    pub slug: Option<String>,
    /// Type slugs (version stripped) the subscription is scoped to, if its
    /// schema pins a `const` or `enum`.
    pub type_slugs: Option<Vec<String>>,
}

impl ConstFilters {
    /// Derive from a top-level schema's `properties.{id,slug,type}`.
    pub fn derive(schema: &Value) -> Self {
        let props = schema.get("properties").and_then(Value::as_object);
        let id = props
            .and_then(|p| p.get("id"))
            .and_then(|s| s.get("const"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        let slug = props
            .and_then(|p| p.get("slug"))
            .and_then(|s| s.get("const"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let type_slugs = props.and_then(|p| p.get("type")).and_then(|type_schema| {
            if let Some(c) = type_schema.get("const").and_then(Value::as_str) {
                Some(vec![strip_version(c)])
            } else {
                type_schema.get("enum").and_then(Value::as_array).map(|values| {
                    values.iter().filter_map(Value::as_str).map(strip_version).collect()
                })
            }
        });
        Self { id, slug, type_slugs }
    }

    /// `true` if a notification for `(id, slug, type_slug)` cannot possibly
    /// match this subscription.
    pub fn quick_reject(&self, id: Uuid, slug: &str, type_slug: &str) -> bool {
        if let Some(want) = self.id {
            if want != id {
                return true;
            }
        }
        if let Some(want) = &self.slug {
            if want != slug {
                return true;
            }
        }
        if let Some(want) = &self.type_slugs {
            if !want.iter().any(|t| t == type_slug) {
                return true;
            }
        }
        false
    }
}

fn strip_version(type_ref: &str) -> String {
    type_ref.split('@').next().unwrap_or(type_ref).to_string()
}

/// One live subscription: its compiled predicate, filters, matched-rows
/// memory, and outbound channel.
pub struct Subscription {
    /// The subscription's user-facing schema (conjoined with the session's
    /// authorization schema by the caller before this struct is built).
    pub schema: Value,
    /// The session's effective read schema, re-applied whenever the
    /// subscription re-runs a query (`query` inbound event, `setSchema`).
    pub auth_schema: Value,
    filters: ConstFilters,
    stream_sql: String,
    stream_binds: Vec<SqlValue>,
    link_projections: Vec<LinkProjection>,
    seen: Mutex<HashSet<Uuid>>,
    sender: mpsc::UnboundedSender<StreamEvent>,
}

impl Subscription {
    /// Compile `schema` (already authorization-conjoined) into a new
    /// subscription delivering events on `sender`.
    pub fn new(
        contracts_table: &str,
        schema: Value,
        auth_schema: Value,
        sender: mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<Self, ContractError> {
        let filters = ConstFilters::derive(&schema);
        let (stream_sql, stream_binds) = compile_stream_predicate(contracts_table, &schema)?;
        let link_projections = derive_link_projections(&schema);
        Ok(Self {
            schema,
            auth_schema,
            filters,
            stream_sql,
            stream_binds,
            link_projections,
            seen: Mutex::new(HashSet::new()),
            sender,
        })
    }

    /// Re-derive this subscription's filters/predicate/projections in place
    /// (spec §4.4 `setSchema`). The "seen" set is intentionally preserved —
    /// rows previously matched still need an `unmatch` if they drop out
    /// under the new schema.
    pub fn set_schema(&mut self, contracts_table: &str, schema: Value) -> Result<(), ContractError> {
        let (stream_sql, stream_binds) = compile_stream_predicate(contracts_table, &schema)?;
        self.filters = ConstFilters::derive(&schema);
        self.link_projections = derive_link_projections(&schema);
        self.stream_sql = stream_sql;
        self.stream_binds = stream_binds;
        self.schema = schema;
        Ok(())
    }

    /// This subscription's quick-reject filters.
    pub fn filters(&self) -> &ConstFilters {
        &self.filters
    }

    /// The prepared single-row query's SQL and bind template. The first
    /// bind position is always the `id` placeholder (see
    /// [`contracts_schema::compile_stream_predicate`]); callers substitute
    /// the real id before executing.
    pub fn stream_query(&self) -> (&str, &[SqlValue]) {
        (&self.stream_sql, &self.stream_binds)
    }

    /// The `$$links` projections this subscription's schema declares, used
    /// to derive which inverse-link verbs require a secondary subscription.
    pub fn link_projections(&self) -> &[LinkProjection] {
        &self.link_projections
    }

    /// `true` if `id` was previously matched.
    pub fn has_seen(&self, id: Uuid) -> bool {
        self.seen.lock().expect("seen set poisoned").contains(&id)
    }

    /// Record `id` as matched.
    pub fn mark_seen(&self, id: Uuid) {
        self.seen.lock().expect("seen set poisoned").insert(id);
    }

    /// Forget `id` (it no longer matches).
    pub fn forget(&self, id: Uuid) {
        self.seen.lock().expect("seen set poisoned").remove(&id);
    }

    /// Deliver an event, ignoring delivery failure (spec §7: the manager
    /// never raises on delivery failure — a dropped receiver just means the
    /// caller has already stopped listening).
    pub fn emit(&self, event: StreamEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derives_id_and_slug_filters() {
        let schema = json!({"properties": {
            "id": {"const": "3fbb6b0a-1f9e-4e1a-9d34-111111111111"},
            "slug": {"const": "example"}
        }});
        let filters = ConstFilters::derive(&schema);
        assert!(filters.id.is_some());
        assert_eq!(filters.slug.as_deref(), Some("example"));
    }

    #[test]
    fn derives_type_enum_with_version_stripped() {
        let schema = json!({"properties": {
            "type": {"enum": ["card@1.0.0", "thread@2.0.0"]}
        }});
        let filters = ConstFilters::derive(&schema);
        assert_eq!(filters.type_slugs, Some(vec!["card".to_string(), "thread".to_string()]));
    }

    #[test]
    fn quick_reject_rejects_mismatched_slug() {
        let schema = json!({"properties": {"slug": {"const": "example"}}});
        let filters = ConstFilters::derive(&schema);
        assert!(filters.quick_reject(Uuid::new_v4(), "other", "card"));
        assert!(!filters.quick_reject(Uuid::new_v4(), "example", "card"));
    }
}

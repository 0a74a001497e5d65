//! The stream manager (spec §4.4): ties the firehose listener, the
//! subscription registry, and the relationships cache together into the
//! per-notification re-match algorithm.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::Row;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use contracts_auth::{gate_query, AuthorizationResolver, ContractLookup};
use contracts_schema::{compile_query, derive_select_map, project_select_map, QueryOptions, SqlValue};
use contracts_store::PgBackend;
use contracts_types::{relationship_permits, ContractError, RelationshipTable, Session};

use crate::events::StreamEvent;
use crate::notification::{ChangeKind, ChangeNotification};
use crate::registry::SubscriptionRegistry;
use crate::subscription::{Subscription, SubscriptionId};
use crate::Debouncer;

const DEBOUNCE_DELAY: Duration = Duration::from_millis(8);

/// Owns everything a running set of subscriptions needs: the backend, the
/// authorization lookup, the registry, and a live relationships handle.
pub struct StreamManager {
    store: Arc<PgBackend>,
    lookup: Arc<dyn ContractLookup>,
    registry: Arc<SubscriptionRegistry>,
    relationships: watch::Receiver<Arc<RelationshipTable>>,
    debouncer: Debouncer,
}

impl StreamManager {
    /// Assemble a manager over `store`, gated by `lookup`, sharing
    /// `relationships` with the mutation pipeline.
    pub fn new(
        store: Arc<PgBackend>,
        lookup: Arc<dyn ContractLookup>,
        relationships: watch::Receiver<Arc<RelationshipTable>>,
    ) -> Self {
        Self {
            store,
            lookup,
            registry: Arc::new(SubscriptionRegistry::new()),
            relationships,
            debouncer: Debouncer::new(DEBOUNCE_DELAY),
        }
    }

    /// A handle to the subscription registry, mostly for status reporting.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// A cloned handle to the live relationships table, for callers building
    /// another component (e.g. the mutation pipeline) that needs the same
    /// watch channel.
    pub fn relationships_handle(&self) -> watch::Receiver<Arc<RelationshipTable>> {
        self.relationships.clone()
    }

    fn resolver(&self) -> AuthorizationResolver<'_> {
        AuthorizationResolver::new(self.lookup.as_ref())
    }

    /// Open a new subscription (spec §4.4 "Subscription").
    pub async fn subscribe(
        &self,
        session: &Session,
        schema: Value,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<StreamEvent>), ContractError> {
        let auth_schema = self.resolver().effective_read_schema(session).await?;
        let gated_schema = gate_query(&schema, &auth_schema);

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = Subscription::new(self.store.table(), gated_schema, auth_schema, tx)?;
        let id = self.registry.insert(subscription);
        Ok((id, rx))
    }

    /// Close a subscription (spec §4.4 "Cancellation").
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.registry.remove(id) {
            sub.emit(StreamEvent::Closed);
        }
    }

    /// Replace a subscription's schema in place (spec §4.4 `setSchema`).
    pub fn set_schema(&self, id: SubscriptionId, new_schema: Value) -> Result<(), ContractError> {
        self.registry
            .with(id, |sub| sub.set_schema(self.store.table(), new_schema))
            .unwrap_or(Ok(()))
    }

    /// Re-run an arbitrary query through the subscription's authorization
    /// context and reply with a `Dataset` event (spec §4.4 "Additional
    /// request events").
    pub async fn query(
        &self,
        id: SubscriptionId,
        request_id: Uuid,
        schema: &Value,
        options: &QueryOptions,
    ) -> Result<(), ContractError> {
        let auth_schema = self
            .registry
            .with(id, |sub| sub.auth_schema.clone())
            .ok_or_else(|| ContractError::NoElement(format!("subscription {:?} not found", id.0)))?;

        let gated_schema = gate_query(schema, &auth_schema);
        let compiled = compile_query(self.store.table(), &gated_schema, &auth_schema, options)?;
        let contracts = self.store.query(&compiled).await?;

        let select = derive_select_map(&auth_schema);
        let mut filtered = Vec::with_capacity(contracts.len());
        for contract in &contracts {
            self.registry.with(id, |sub| sub.mark_seen(contract.id));
            let value = serde_json::to_value(contract).map_err(|e| ContractError::Backend(e.to_string()))?;
            filtered.push(project_select_map(&value, &select));
        }

        self.registry.with(id, |sub| sub.emit(StreamEvent::Dataset { request_id, contracts: filtered }));
        Ok(())
    }

    /// Run the per-notification algorithm (spec §4.4 "Per-notification
    /// algorithm") across every live subscription, plus inverse-link
    /// re-matching when the change touches a link contract.
    pub async fn handle_notification(&self, notification: &ChangeNotification) {
        let mut primary_matches: Vec<SubscriptionId> = Vec::new();
        self.registry.for_each(|id, _| primary_matches.push(id));

        for id in primary_matches {
            if let Err(e) = self.rematch_one(id, notification).await {
                self.registry.with(id, |sub| sub.emit(StreamEvent::Error { message: e.to_string() }));
            }
        }

        if notification.type_slug() == "link" {
            self.handle_link_change(notification).await;
        } else {
            self.handle_possible_link_target_change(notification).await;
        }
    }

    async fn rematch_one(
        &self,
        id: SubscriptionId,
        notification: &ChangeNotification,
    ) -> Result<(), ContractError> {
        let row_id = notification.id;
        let Some(filters) = self.registry.with(id, |sub| sub.filters().clone()) else {
            return Ok(());
        };
        if filters.quick_reject(row_id, &notification.slug, notification.type_slug()) {
            return Ok(());
        }

        if notification.kind == ChangeKind::Delete {
            let was_seen = self.registry.with(id, |sub| sub.has_seen(row_id)).unwrap_or(false);
            if was_seen {
                self.registry.with(id, |sub| {
                    sub.forget(row_id);
                    sub.emit(StreamEvent::Delete { id: row_id });
                });
            }
            return Ok(());
        }

        let (sql, binds) = self
            .registry
            .with(id, |sub| {
                let (sql, binds) = sub.stream_query();
                (sql.to_string(), binds.to_vec())
            })
            .ok_or_else(|| ContractError::NoElement("subscription removed mid-dispatch".into()))?;

        let mut query = sqlx::query(&sql);
        for (i, value) in binds.iter().enumerate() {
            query = if i == 0 { bind_id(query, row_id) } else { bind_sql_value(query, value) };
        }
        let row = query.fetch_optional(self.store.pool()).await.map_err(|e| ContractError::Backend(e.to_string()))?;

        let auth_schema = self.registry.with(id, |sub| sub.auth_schema.clone());
        let Some(auth_schema) = auth_schema else { return Ok(()) };

        match row {
            Some(raw_row) => {
                let contract = contracts_store::decode_row(&raw_row)?;
                let select = derive_select_map(&auth_schema);
                let value = serde_json::to_value(&contract).map_err(|e| ContractError::Backend(e.to_string()))?;
                let filtered = project_select_map(&value, &select);
                let was_seen = self.registry.with(id, |sub| sub.has_seen(row_id)).unwrap_or(false);
                self.registry.with(id, |sub| {
                    sub.mark_seen(row_id);
                    let event = if was_seen {
                        StreamEvent::Update { id: row_id, after: filtered }
                    } else {
                        StreamEvent::Insert { id: row_id, after: filtered }
                    };
                    sub.emit(event);
                });
            }
            None => {
                let was_seen = self.registry.with(id, |sub| sub.has_seen(row_id)).unwrap_or(false);
                if was_seen {
                    self.registry.with(id, |sub| {
                        sub.forget(row_id);
                        sub.emit(StreamEvent::Unmatch { id: row_id });
                    });
                }
            }
        }
        Ok(())
    }

    async fn handle_link_change(&self, notification: &ChangeNotification) {
        let link = match self.store.by_id(notification.id).await {
            Ok(Some(link)) => link,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load changed link contract");
                return;
            }
        };
        let link_data: contracts_types::LinkData = match serde_json::from_value(link.data.clone()) {
            Ok(data) => data,
            Err(_) => return,
        };

        let mut parents: Vec<SubscriptionId> = Vec::new();
        self.registry.for_each(|id, sub| {
            let wants = sub
                .link_projections()
                .iter()
                .any(|p| p.verb == link_data.name || p.verb == link_data.inverse_name);
            if wants {
                parents.push(id);
            }
        });

        for id in parents {
            self.schedule_rematch(id, link_data.from.id);
            self.schedule_rematch(id, link_data.to.id);
        }
    }

    async fn handle_possible_link_target_change(&self, notification: &ChangeNotification) {
        let mut targets: Vec<(SubscriptionId, String)> = Vec::new();
        self.registry.for_each(|id, sub| {
            for projection in sub.link_projections() {
                targets.push((id, projection.verb.clone()));
            }
        });

        for (id, verb) in targets {
            match linked_parents(&self.store, notification.id, &verb).await {
                Ok(parents) => {
                    for parent_id in parents {
                        self.schedule_rematch(id, parent_id);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to resolve linked parents"),
            }
        }
    }

    fn schedule_rematch(&self, id: SubscriptionId, parent_id: Uuid) {
        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        self.debouncer.trigger(parent_id, move || async move {
            let Some(auth_schema) = registry.with(id, |sub| sub.auth_schema.clone()) else { return };
            let Some((sql, binds)) = registry.with(id, |sub| {
                let (sql, binds) = sub.stream_query();
                (sql.to_string(), binds.to_vec())
            }) else {
                return;
            };

            let mut query = sqlx::query(&sql);
            for (i, value) in binds.iter().enumerate() {
                query = if i == 0 { bind_id(query, parent_id) } else { bind_sql_value(query, value) };
            }
            let row = match query.fetch_optional(store.pool()).await {
                Ok(row) => row,
                Err(e) => {
                    registry.with(id, |sub| sub.emit(StreamEvent::Error { message: e.to_string() }));
                    return;
                }
            };

            match row {
                Some(raw_row) => {
                    let Ok(contract) = contracts_store::decode_row(&raw_row) else { return };
                    let select = derive_select_map(&auth_schema);
                    let Ok(value) = serde_json::to_value(&contract) else { return };
                    let filtered = project_select_map(&value, &select);
                    let was_seen = registry.with(id, |sub| sub.has_seen(parent_id)).unwrap_or(false);
                    registry.with(id, |sub| {
                        sub.mark_seen(parent_id);
                        let event = if was_seen {
                            StreamEvent::Update { id: parent_id, after: filtered }
                        } else {
                            StreamEvent::Insert { id: parent_id, after: filtered }
                        };
                        sub.emit(event);
                    });
                }
                None => {
                    let was_seen = registry.with(id, |sub| sub.has_seen(parent_id)).unwrap_or(false);
                    if was_seen {
                        registry.with(id, |sub| {
                            sub.forget(parent_id);
                            sub.emit(StreamEvent::Unmatch { id: parent_id });
                        });
                    }
                }
            }
        });
    }
}

async fn linked_parents(store: &PgBackend, target_id: Uuid, verb: &str) -> Result<Vec<Uuid>, ContractError> {
    let sql = format!(
        "SELECT (data->'from'->>'id')::uuid AS parent FROM {t} WHERE type LIKE 'link@%' \
           AND data->>'name' = $1 AND (data->'to'->>'id')::uuid = $2 \
         UNION \
         SELECT (data->'to'->>'id')::uuid AS parent FROM {t} WHERE type LIKE 'link@%' \
           AND data->>'inverseName' = $1 AND (data->'from'->>'id')::uuid = $2",
        t = store.table()
    );
    let rows = sqlx::query(&sql)
        .bind(verb)
        .bind(target_id)
        .fetch_all(store.pool())
        .await
        .map_err(|e| ContractError::Backend(e.to_string()))?;
    rows.into_iter()
        .map(|row| row.try_get::<Uuid, _>("parent").map_err(|e| ContractError::Backend(e.to_string())))
        .collect()
}

fn bind_id<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    id: Uuid,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query.bind(id.to_string())
}

fn bind_sql_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Json(v) => query.bind(v),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::TextArray(arr) => query.bind(arr),
    }
}

/// `true` if `verb` between `(from_type, to_type)` is permitted by the
/// current relationships snapshot — exposed for callers (e.g. the mutation
/// pipeline's link-insert path shares the same watch channel) that want a
/// synchronous check without awaiting the manager.
pub fn check_relationship(
    relationships: &watch::Receiver<Arc<RelationshipTable>>,
    from_type: &str,
    verb: &str,
    to_type: &str,
) -> bool {
    relationship_permits(&relationships.borrow(), from_type, verb, to_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_relationship_reads_through_watch_handle() {
        let (_writer, rx) = crate::RelationshipsWriter::new(vec![contracts_types::Relationship {
            from_type: "message".into(),
            name: "is attached to".into(),
            inverse_name: "has attached element".into(),
            to_type: "thread".into(),
        }]);
        assert!(check_relationship(&rx, "message", "is attached to", "thread"));
        assert!(!check_relationship(&rx, "message", "is attached to", "user"));
    }
}

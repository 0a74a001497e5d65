//! The kernel facade (spec §4.7, §6 "Public operations"): the single entry
//! point composing the query compiler, authorization resolver, mutation
//! pipeline, stream manager, and backend.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use uuid::Uuid;

use contracts_auth::{gate_query, AuthorizationResolver, ContractLookup};
use contracts_cache::ContractCache;
use contracts_mutate::MutationPipeline;
use contracts_schema::{compile_query, derive_select_map, project_select_map, LinkOptions, QueryOptions, SortDir};
use contracts_store::{plan_type_indexes, PgBackend};
use contracts_stream::{spawn_listener, ChangeNotification, RelationshipsWriter, StreamEvent, StreamManager, SubscriptionId};
use contracts_types::{Contract, ContractError, PartialContract, Session, SlugRef};

use crate::config::Config;
use crate::lookup::PgContractLookup;

const TYPE_CONTRACT_PREFIX: &str = "type@";
const RELATIONSHIP_CONTRACT_PREFIX: &str = "relationship@";

/// The backend status summary returned by `getStatus()` (spec §6).
#[derive(Debug, Clone)]
pub struct Status {
    /// `true` if a trivial query against the backend succeeded.
    pub backend_reachable: bool,
    /// Number of subscriptions currently open.
    pub open_subscriptions: usize,
}

/// The composed public surface (spec §6 "Public operations"): one
/// `ContractStore` per deployment, internally owning a connection pool, the
/// dedicated `LISTEN` connection, and the subscription registry.
pub struct ContractStore {
    store: Arc<PgBackend>,
    lookup: Arc<dyn ContractLookup>,
    mutate: MutationPipeline,
    stream: Arc<StreamManager>,
    relationships: RelationshipsWriter,
    config: Config,
    dispatch: tokio::task::JoinHandle<()>,
}

impl ContractStore {
    /// Connect to `database_url`, bootstrap the schema, load the
    /// relationships table, and start the change-notification dispatch loop.
    pub async fn connect(database_url: &str, config: Config) -> Result<Self, ContractError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(database_url)
            .await
            .map_err(|e| ContractError::Backend(e.to_string()))?;

        let store = Arc::new(PgBackend::new(pool.clone(), config.table.clone()));
        store.bootstrap().await?;

        let lookup: Arc<dyn ContractLookup> =
            Arc::new(PgContractLookup::new(Arc::clone(&store), config.builtin_admin_slug.clone()));

        let initial_relationships = contracts_stream::load_relationships(&store).await?;
        let (relationships_writer, relationships_rx) = RelationshipsWriter::new(initial_relationships);

        let mutate = MutationPipeline::new(Arc::clone(&store), None, Arc::clone(&lookup), relationships_rx.clone());
        let stream = Arc::new(StreamManager::new(Arc::clone(&store), Arc::clone(&lookup), relationships_rx));

        let notifications = spawn_listener(pool, config.notify_channel.clone());
        let dispatch = spawn_dispatch_loop(Arc::clone(&stream), notifications);

        Ok(Self { store, lookup, mutate, stream, relationships: relationships_writer, config, dispatch })
    }

    /// Build a store over an already-open pool and lookup, bypassing
    /// [`Self::connect`]'s bootstrap step — used by integration tests that
    /// manage their own schema lifecycle.
    pub async fn from_parts(
        store: Arc<PgBackend>,
        lookup: Arc<dyn ContractLookup>,
        config: Config,
    ) -> Result<Self, ContractError> {
        let initial_relationships = contracts_stream::load_relationships(&store).await?;
        let (relationships_writer, relationships_rx) = RelationshipsWriter::new(initial_relationships);

        let mutate = MutationPipeline::new(Arc::clone(&store), None, Arc::clone(&lookup), relationships_rx.clone());
        let stream = Arc::new(StreamManager::new(Arc::clone(&store), Arc::clone(&lookup), relationships_rx));

        let notifications = spawn_listener(store.pool().clone(), config.notify_channel.clone());
        let dispatch = spawn_dispatch_loop(Arc::clone(&stream), notifications);

        Ok(Self { store, lookup, mutate, stream, relationships: relationships_writer, config, dispatch })
    }

    /// Attach a read-through cache to the mutation pipeline's type-schema lookups.
    pub fn with_cache(mut self, cache: Arc<dyn ContractCache>) -> Self {
        self.mutate = MutationPipeline::new(
            Arc::clone(&self.store),
            Some(cache),
            Arc::clone(&self.lookup),
            self.stream.relationships_handle(),
        );
        self
    }

    fn resolver(&self) -> AuthorizationResolver<'_> {
        AuthorizationResolver::new(self.lookup.as_ref())
    }

    /// `getContractById` (spec §6).
    pub async fn get_contract_by_id(&self, session: &Session, id: Uuid) -> Result<Option<Value>, ContractError> {
        let Some(contract) = self.store.by_id(id).await? else { return Ok(None) };
        let auth_schema = self.resolver().effective_read_schema(session).await?;
        Ok(Some(Self::filtered_view(&contract, &auth_schema)?))
    }

    /// `getContractBySlug` (spec §6): accepts `"<slug>@<version>"` or
    /// `"<slug>@latest"`.
    pub async fn get_contract_by_slug(&self, session: &Session, slug_ref: &str) -> Result<Option<Value>, ContractError> {
        let parsed: SlugRef = slug_ref.parse()?;
        let contract = match parsed {
            SlugRef::Exact(type_ref) => self.store.by_slug_version(&type_ref.slug, &type_ref.version).await?,
            SlugRef::Latest { slug } => self.store.latest_by_slug(&slug).await?,
        };
        let Some(contract) = contract else { return Ok(None) };
        let auth_schema = self.resolver().effective_read_schema(session).await?;
        Ok(Some(Self::filtered_view(&contract, &auth_schema)?))
    }

    /// `insertContract` (spec §6, §4.3 "Insert").
    pub async fn insert_contract(&self, session: &Session, partial: PartialContract) -> Result<Value, ContractError> {
        let contract_type = partial.contract_type.clone();
        let result = self.mutate.insert(session, partial).await?;
        self.maybe_index_new_type(contract_type.as_deref(), &result).await;
        self.maybe_refresh_relationships(contract_type.as_deref()).await;
        Ok(result)
    }

    /// `replaceContract` (spec §6, §4.3 "Replace").
    pub async fn replace_contract(&self, session: &Session, partial: PartialContract) -> Result<Value, ContractError> {
        let contract_type = partial.contract_type.clone();
        let result = self.mutate.replace(session, partial).await?;
        self.maybe_index_new_type(contract_type.as_deref(), &result).await;
        self.maybe_refresh_relationships(contract_type.as_deref()).await;
        Ok(result)
    }

    /// `patchContractBySlug` (spec §6, §4.3 "Patch").
    pub async fn patch_contract_by_slug(
        &self,
        session: &Session,
        slug_ref: &str,
        patch: &Value,
    ) -> Result<Value, ContractError> {
        let type_ref: contracts_types::TypeRef = slug_ref.parse()?;
        let existing = self
            .store
            .by_slug_version(&type_ref.slug, &type_ref.version)
            .await?
            .ok_or_else(|| ContractError::NoElement(slug_ref.to_string()))?;
        self.mutate.patch(session, existing.id, patch).await
    }

    /// `query` (spec §6, §4.1).
    pub async fn query(
        &self,
        session: &Session,
        schema: &Value,
        options: &QueryOptions,
    ) -> Result<Vec<Value>, ContractError> {
        let auth_schema = self.resolver().effective_read_schema(session).await?;
        let auth_schema = match &options.mask {
            Some(mask) => gate_query(mask, &auth_schema),
            None => auth_schema,
        };
        let gated_schema = gate_query(schema, &auth_schema);
        let compiled = compile_query(self.store.table(), &gated_schema, &auth_schema, options)?;
        let contracts = self.store.query(&compiled).await?;

        let mut link_tables: HashMap<String, HashMap<Uuid, Vec<contracts_types::LinkedContract>>> = HashMap::new();
        if !compiled.link_projections.is_empty() {
            let ids: Vec<Uuid> = contracts.iter().map(|c| c.id).collect();
            for projection in &compiled.link_projections {
                let grouped = self.store.link_projection(projection, &ids).await?;
                let select = derive_select_map(&projection.target_schema);
                let link_options = options.links.get(&projection.verb);
                let mut by_parent: HashMap<Uuid, Vec<contracts_types::LinkedContract>> = HashMap::new();
                for (parent_id, linked) in grouped {
                    let mut entries = linked
                        .into_iter()
                        .map(|lc| {
                            let value = serde_json::to_value(&lc.data).map_err(|e| ContractError::Backend(e.to_string()))?;
                            let projected = project_select_map(&value, &select);
                            Ok(contracts_types::LinkedContract {
                                id: lc.id,
                                slug: lc.slug,
                                contract_type: lc.contract_type,
                                data: projected,
                            })
                        })
                        .collect::<Result<Vec<_>, ContractError>>()?;
                    if let Some(link_options) = link_options {
                        apply_link_options(&mut entries, link_options);
                    }
                    by_parent.insert(parent_id, entries);
                }
                link_tables.insert(projection.verb.clone(), by_parent);
            }
        }

        let select = derive_select_map(&auth_schema);
        let mut out = Vec::with_capacity(contracts.len());
        for contract in &contracts {
            let mut value = serde_json::to_value(contract).map_err(|e| ContractError::Backend(e.to_string()))?;
            if let Value::Object(obj) = &mut value {
                if !link_tables.is_empty() {
                    let mut links = serde_json::Map::new();
                    for (verb, by_parent) in &link_tables {
                        let entries = by_parent.get(&contract.id).cloned().unwrap_or_default();
                        links.insert(verb.clone(), serde_json::to_value(entries).unwrap_or(Value::Null));
                    }
                    obj.insert("links".to_string(), Value::Object(links));
                }
            }
            out.push(project_select_map(&value, &select));
        }
        Ok(out)
    }

    /// `stream` (spec §6, §4.4): opens a subscription and returns its id plus
    /// an event receiver.
    pub async fn stream(
        &self,
        session: &Session,
        schema: Value,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<StreamEvent>), ContractError> {
        self.stream.subscribe(session, schema).await
    }

    /// Close a subscription opened via [`Self::stream`].
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.stream.unsubscribe(id);
    }

    /// `getStatus` (spec §6).
    pub async fn status(&self) -> Status {
        let backend_reachable = sqlx::query("SELECT 1").fetch_one(self.store.pool()).await.is_ok();
        Status { backend_reachable, open_subscriptions: self.stream.registry().len() }
    }

    /// `disconnect` (spec §6): stops the dispatch loop and closes the pool.
    pub async fn disconnect(&self) {
        self.dispatch.abort();
        self.store.pool().close().await;
    }

    /// `reset` (spec §6): test-only, truncates the contracts table.
    pub async fn reset(&self) -> Result<(), ContractError> {
        let sql = format!("TRUNCATE TABLE {}", self.store.table());
        sqlx::query(&sql).execute(self.store.pool()).await.map_err(|e| ContractError::Backend(e.to_string()))?;
        self.relationships.refresh(&self.store).await
    }

    fn filtered_view(contract: &Contract, auth_schema: &Value) -> Result<Value, ContractError> {
        let value = serde_json::to_value(contract).map_err(|e| ContractError::Backend(e.to_string()))?;
        let select = derive_select_map(auth_schema);
        Ok(project_select_map(&value, &select))
    }

    async fn maybe_index_new_type(&self, contract_type: Option<&str>, persisted: &Value) {
        if contract_type.map(|t| t.starts_with(TYPE_CONTRACT_PREFIX)) != Some(true) {
            return;
        }
        let (Some(slug), Some(version)) = (
            persisted.get("slug").and_then(Value::as_str),
            persisted.get("version").cloned(),
        ) else {
            return;
        };
        let version: contracts_types::Version = match serde_json::from_value(version) {
            Ok(v) => v,
            Err(_) => return,
        };
        let type_ref = format!("{slug}@{version}");
        let data = persisted.get("data").cloned().unwrap_or(Value::Null);
        let plans = plan_type_indexes(self.store.table(), &type_ref, &data);
        if let Err(e) = self.store.apply_index_plans(&plans).await {
            tracing::warn!(error = %e, %type_ref, "failed to apply per-type index plan");
        }
    }

    async fn maybe_refresh_relationships(&self, contract_type: Option<&str>) {
        if contract_type.map(|t| t.starts_with(RELATIONSHIP_CONTRACT_PREFIX)) == Some(true) {
            if let Err(e) = self.relationships.refresh(&self.store).await {
                tracing::warn!(error = %e, "failed to refresh relationships table");
            }
        }
    }
}

impl Drop for ContractStore {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

/// Apply a link verb's sort/skip/limit sub-options to its materialized
/// entries (spec §6 `options.links[verb]`), after the parent query's own
/// `ORDER BY`/`LIMIT` has already been applied in SQL — these run in-memory
/// since each verb's batch fetch has no per-parent SQL window of its own.
fn apply_link_options(entries: &mut Vec<contracts_types::LinkedContract>, options: &LinkOptions) {
    if !options.sort_by.is_empty() {
        entries.sort_by(|a, b| {
            for path in &options.sort_by {
                let ordering = compare_json(value_at_path(&a.data, path), value_at_path(&b.data, path));
                if ordering != std::cmp::Ordering::Equal {
                    return match options.sort_dir {
                        SortDir::Asc => ordering,
                        SortDir::Desc => ordering.reverse(),
                    };
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    let skip = options.skip.unwrap_or(0) as usize;
    if skip > 0 {
        entries.drain(..skip.min(entries.len()));
    }
    if let Some(limit) = options.limit {
        entries.truncate(limit as usize);
    }
}

fn value_at_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

fn spawn_dispatch_loop(
    stream: Arc<StreamManager>,
    mut notifications: mpsc::UnboundedReceiver<ChangeNotification>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            stream.handle_notification(&notification).await;
        }
    })
}

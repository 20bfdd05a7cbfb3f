//! Batched document operations with a write-through cache.
//!
//! A [`Pipeline`] queues `get`, `put`, `remove` and `query` operations and
//! sends them as one batch on [`Pipeline::flush`]. Response items are
//! matched to operations by position and routed back to each caller in
//! submission order.
//!
//! Reads of cached entities never reach the network; they are delivered
//! after the network results of the batch they were queued in.

use crate::cache::EntityCache;
use crate::entity::EntityHandle;
use crate::error::ModelResult;
use crate::model::KIND_INDEX;
use crate::registry::ModelRegistry;
use crate::schema::{IndexValue, Indexes};
use parking_lot::Mutex;
use remdoc_client::{
    Client, ClientError, ClientResult, Connection, Deferred, Passkey, Resolver, Scheduler,
};
use remdoc_protocol::{
    Action, BatchOperation, BatchRequest, BatchResponseItem, Key, Scalar, Statement,
};
use serde_json::{Map, Value};
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{debug, error, warn};

enum Completion {
    Get(Resolver<Option<EntityHandle>>),
    Put(Key, Resolver<Option<EntityHandle>>),
    Delete(Resolver<bool>),
    Query(Resolver<Vec<EntityHandle>>),
}

impl Completion {
    fn action(&self) -> Action {
        match self {
            Completion::Get(_) => Action::Get,
            Completion::Put(..) => Action::Put,
            Completion::Delete(_) => Action::Delete,
            Completion::Query(_) => Action::Query,
        }
    }

    fn fail(self, error: ClientError) {
        match self {
            Completion::Get(resolver) | Completion::Put(_, resolver) => resolver.reject(error),
            Completion::Delete(resolver) => resolver.reject(error),
            Completion::Query(resolver) => resolver.reject(error),
        }
    }
}

type CacheHit = (EntityHandle, Resolver<Option<EntityHandle>>);

#[derive(Default)]
struct Batch {
    request: BatchRequest,
    completions: Vec<Completion>,
    cache_hits: Vec<CacheHit>,
}

/// The database handle: a connection, the models and the entity cache.
///
/// Clones share the queued batch.
#[derive(Clone)]
pub struct Pipeline {
    connection: Connection,
    models: ModelRegistry,
    cache: EntityCache,
    batch: Arc<Mutex<Batch>>,
}

impl Pipeline {
    /// Creates a pipeline over an established connection.
    pub fn new(connection: Connection, models: ModelRegistry, cache: EntityCache) -> Self {
        Self {
            connection,
            models,
            cache,
            batch: Arc::new(Mutex::new(Batch::default())),
        }
    }

    /// Connects `name` to `collection` and wraps the connection.
    pub fn connect(
        client: &Client,
        collection: &str,
        name: &str,
        passkey: Passkey,
        models: ModelRegistry,
        cache: EntityCache,
    ) -> ClientResult<Deferred<Pipeline>> {
        Ok(client
            .connect(collection, name, passkey)?
            .map(move |connection| Pipeline::new(connection, models, cache)))
    }

    /// Returns the connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the model registry.
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Returns the entity cache.
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    fn scheduler(&self) -> &Scheduler {
        self.connection.session().scheduler()
    }

    /// Number of queued network operations.
    pub fn pending(&self) -> usize {
        self.batch.lock().completions.len()
    }

    /// Creates and caches a new entity of `kind` with a fresh key.
    ///
    /// Nothing is sent; `put` the entity to store it.
    pub fn create(&self, kind: &str) -> ModelResult<EntityHandle> {
        let model = self.models.get(kind)?;
        let entity = model.instantiate(model.next_key(), None, Indexes::new());
        self.cache.insert(entity.clone());
        Ok(entity)
    }

    /// Reads `key`, from the cache if present.
    pub fn get(&self, key: impl Into<Key>) -> Deferred<Option<EntityHandle>> {
        let key = key.into();
        let (result, resolver) = Deferred::channel(self.scheduler());
        let mut batch = self.batch.lock();
        match self.cache.get(&key) {
            Some(entity) => batch.cache_hits.push((entity, resolver)),
            None => {
                batch.request.get(key);
                batch.completions.push(Completion::Get(resolver));
            }
        }
        result
    }

    /// Stores `entity` and caches it.
    ///
    /// A deleted entity is not sent and resolves with `None`.
    pub fn put(&self, entity: &EntityHandle) -> Deferred<Option<EntityHandle>> {
        let snapshot = match entity.snapshot() {
            Ok(snapshot) => snapshot,
            Err(_) => {
                debug!(key = %entity.key(), "skipping put of deleted entity");
                return Deferred::resolved(self.scheduler(), None);
            }
        };
        self.cache.insert(entity.clone());

        let pairs = snapshot
            .indexes
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()));
        let (result, resolver) = Deferred::channel(self.scheduler());
        let mut batch = self.batch.lock();
        batch.request.put(snapshot.key.clone(), &snapshot.data, pairs);
        batch.completions.push(Completion::Put(snapshot.key, resolver));
        result
    }

    /// Deletes `key`. The cached entity is evicted and tombstoned at once.
    pub fn remove(&self, key: impl Into<Key>) -> Deferred<bool> {
        let key = key.into();
        if let Some(entity) = self.cache.remove(&key) {
            entity.delete();
        }
        let (result, resolver) = Deferred::channel(self.scheduler());
        let mut batch = self.batch.lock();
        batch.request.remove(key);
        batch.completions.push(Completion::Delete(resolver));
        result
    }

    /// Starts a query.
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder {
            pipeline: self,
            statements: Vec::new(),
        }
    }

    /// Sends every queued operation as one batch.
    ///
    /// Settles after every caller of the batch has been settled. A failure
    /// of the whole batch rejects every queued operation with the same
    /// error.
    pub fn flush(&self) -> Deferred<()> {
        let (request, completions, hits) = {
            let mut batch = self.batch.lock();
            (
                mem::take(&mut batch.request),
                mem::take(&mut batch.completions),
                mem::take(&mut batch.cache_hits),
            )
        };

        if completions.is_empty() {
            return Deferred::new(self.scheduler(), move |done| {
                deliver(hits);
                done.resolve(());
            });
        }

        debug!(
            collection = %self.connection.collection(),
            operations = request.len(),
            cached = hits.len(),
            "flushing batch"
        );
        let pipeline = self.clone();
        self.connection.send_with(&request, move |result| {
            // Runs under the principal's slot, so cache changes land before
            // the next operation of the same principal.
            let outcome = match result {
                Ok(items) => pipeline.route(items, completions),
                Err(error) => {
                    for completion in completions {
                        completion.fail(error.clone());
                    }
                    Err(error)
                }
            };
            deliver(hits);
            outcome
        })
    }

    fn route(&self, items: Vec<BatchResponseItem>, completions: Vec<Completion>) -> ClientResult<()> {
        if items.len() != completions.len() {
            let error = ClientError::protocol(format!(
                "expected {} batch items, got {}",
                completions.len(),
                items.len()
            ));
            warn!(error = %error, "batch response out of step");
            for completion in completions {
                completion.fail(error.clone());
            }
            return Err(error);
        }

        let mut pending = completions.into_iter();
        for item in items {
            let Some(completion) = pending.next() else {
                break;
            };
            if item.action() != Some(completion.action()) {
                warn!(
                    expected = %completion.action(),
                    received = %item.action,
                    "batch response out of step"
                );
                let error = ClientError::protocol(format!(
                    "expected {} item, got {}",
                    completion.action(),
                    item.action
                ));
                completion.fail(error.clone());
                for rest in pending {
                    rest.fail(error.clone());
                }
                return Err(error);
            }

            match completion {
                Completion::Get(resolver) => {
                    let entity = match item.status {
                        200 => self.absorb(item.key.as_ref(), item.entity.as_deref(), &item.indexes),
                        _ => None,
                    };
                    resolver.resolve(entity);
                }
                Completion::Put(key, resolver) => {
                    let entity = match item.status {
                        200 | 201 => self.cache.get(&key),
                        _ => None,
                    };
                    resolver.resolve(entity);
                }
                Completion::Delete(resolver) => resolver.resolve(item.status == 204),
                Completion::Query(resolver) => {
                    let mut found = Vec::new();
                    if item.status == 200 {
                        for row in &item.results {
                            if let Some(entity) = self.absorb_row(row) {
                                found.push(entity);
                            }
                        }
                    }
                    resolver.resolve(found);
                }
            }
        }
        Ok(())
    }

    fn absorb_row(&self, row: &Map<String, Value>) -> Option<EntityHandle> {
        let key = row.get("key").and_then(Key::from_json);
        let entity = row.get("entity").and_then(Value::as_str);
        let indexes: Map<String, Value> = row
            .iter()
            .filter(|(name, _)| name.as_str() != "key" && name.as_str() != "entity")
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        self.absorb(key.as_ref(), entity, &indexes)
    }

    /// Merges a document from the store into the cache.
    fn absorb(
        &self,
        key: Option<&Key>,
        entity: Option<&str>,
        indexes: &Map<String, Value>,
    ) -> Option<EntityHandle> {
        let Some(key) = key else {
            warn!("stored entity without key");
            return None;
        };
        let raw: Value = match entity.map(serde_json::from_str) {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                error!(key = %key, error = %e, "undecodable entity payload");
                return None;
            }
            None => {
                warn!(key = %key, "stored entity without payload");
                return None;
            }
        };

        if let Some(cached) = self.cache.get(key) {
            return match cached.update(&raw) {
                Ok(_) => Some(cached),
                Err(e) => {
                    warn!(key = %key, error = %e, "cached entity went away");
                    None
                }
            };
        }

        let kind = indexes.get(KIND_INDEX).and_then(Value::as_str);
        let model = match kind.map(|kind| self.models.get(kind)) {
            Some(Ok(model)) => model,
            _ => {
                warn!(key = %key, kind = ?kind, "entity of unknown kind");
                return None;
            }
        };
        let entity = model.instantiate(key.clone(), Some(&raw), decode_indexes(indexes));
        self.cache.insert(entity.clone());
        Some(entity)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("collection", &self.connection.collection())
            .field("pending", &self.pending())
            .field("cached", &self.cache.len())
            .finish()
    }
}

fn deliver(hits: Vec<CacheHit>) {
    for (entity, resolver) in hits {
        if entity.is_deleted() {
            resolver.resolve(None);
        } else {
            resolver.resolve(Some(entity));
        }
    }
}

fn decode_indexes(raw: &Map<String, Value>) -> Indexes {
    raw.iter()
        .filter_map(|(name, value)| IndexValue::from_json(value).map(|index| (name.clone(), index)))
        .collect()
}

/// Builds one `query` operation of a pipeline batch.
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    pipeline: &'a Pipeline,
    statements: Vec<Statement>,
}

impl QueryBuilder<'_> {
    /// Restricts to entities of `kind`.
    pub fn kind(self, kind: &str) -> Self {
        self.eq(KIND_INDEX, kind)
    }

    /// Adds `field = value`.
    pub fn eq(mut self, field: &str, value: impl Into<Scalar>) -> Self {
        self.statements.push(Statement::eq(field, value));
        self
    }

    /// Adds `field > value`.
    pub fn gt(mut self, field: &str, value: impl Into<Scalar>) -> Self {
        self.statements.push(Statement::gt(field, value));
        self
    }

    /// Adds `field < value`.
    pub fn lt(mut self, field: &str, value: impl Into<Scalar>) -> Self {
        self.statements.push(Statement::lt(field, value));
        self
    }

    /// Queues the query and returns its matches.
    pub fn append(self) -> Deferred<Vec<EntityHandle>> {
        let (result, resolver) = Deferred::channel(self.pipeline.scheduler());
        let mut batch = self.pipeline.batch.lock();
        batch.request.push(BatchOperation::query(self.statements));
        batch.completions.push(Completion::Query(resolver));
        result
    }
}

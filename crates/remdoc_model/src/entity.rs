//! Entities: keyed, schema-mapped documents.

use crate::error::{ModelError, ModelResult};
use crate::model::Model;
use crate::schema::Indexes;
use parking_lot::Mutex;
use remdoc_protocol::Key;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A point-in-time copy of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Document key.
    pub key: Key,
    /// Model kind.
    pub kind: String,
    /// Canonical document.
    pub data: Value,
    /// Index values.
    pub indexes: Indexes,
}

struct Body {
    data: Value,
    indexes: Indexes,
}

struct EntityInner {
    key: Key,
    model: Arc<Model>,
    body: Mutex<Option<Body>>,
}

/// A shared handle to a live entity.
///
/// Clones refer to the same entity. Once deleted, reads and updates fail
/// with [`ModelError::Deleted`].
#[derive(Clone)]
pub struct EntityHandle {
    inner: Arc<EntityInner>,
}

impl EntityHandle {
    pub(crate) fn new(key: Key, model: Arc<Model>, data: Value, indexes: Indexes) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                key,
                model,
                body: Mutex::new(Some(Body { data, indexes })),
            }),
        }
    }

    /// Returns the key.
    pub fn key(&self) -> &Key {
        &self.inner.key
    }

    /// Returns the model kind.
    pub fn kind(&self) -> &str {
        self.inner.model.kind()
    }

    /// Returns the model.
    pub fn model(&self) -> &Arc<Model> {
        &self.inner.model
    }

    /// Returns a copy of the document.
    pub fn data(&self) -> ModelResult<Value> {
        self.with_body(|body| body.data.clone())
    }

    /// Returns a copy of the indexes.
    pub fn indexes(&self) -> ModelResult<Indexes> {
        self.with_body(|body| body.indexes.clone())
    }

    /// Returns the indexes as `(name, json)` pairs for a `put`.
    pub fn index_pairs(&self) -> ModelResult<Vec<(String, Value)>> {
        self.with_body(|body| {
            body.indexes
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect()
        })
    }

    /// Returns a snapshot of key, kind, data and indexes.
    pub fn snapshot(&self) -> ModelResult<Entity> {
        self.with_body(|body| Entity {
            key: self.inner.key.clone(),
            kind: self.kind().to_string(),
            data: body.data.clone(),
            indexes: body.indexes.clone(),
        })
    }

    /// Deep-merges `partial` into the document and re-maps it.
    ///
    /// Local only; send the entity with a pipeline `put` to store it.
    pub fn update(&self, partial: &Value) -> ModelResult<Value> {
        let mut guard = self.inner.body.lock();
        let body = guard
            .as_mut()
            .ok_or_else(|| ModelError::Deleted(self.inner.key.clone()))?;
        body.data = self.inner.model.update(&body.data, partial, &mut body.indexes);
        Ok(body.data.clone())
    }

    /// Tombstones the entity. Returns whether it was live.
    pub fn delete(&self) -> bool {
        self.inner.body.lock().take().is_some()
    }

    /// Whether the entity was deleted.
    pub fn is_deleted(&self) -> bool {
        self.inner.body.lock().is_none()
    }

    /// Whether both handles refer to the same entity.
    pub fn same(&self, other: &EntityHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn with_body<R>(&self, f: impl FnOnce(&Body) -> R) -> ModelResult<R> {
        match self.inner.body.lock().as_ref() {
            Some(body) => Ok(f(body)),
            None => Err(ModelError::Deleted(self.inner.key.clone())),
        }
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.body.lock();
        let mut out = f.debug_struct("EntityHandle");
        out.field("key", &self.inner.key).field("kind", &self.kind());
        match guard.as_ref() {
            Some(body) => out.field("data", &body.data),
            None => out.field("deleted", &true),
        };
        out.finish()
    }
}

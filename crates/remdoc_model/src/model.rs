//! Models: a named top-level schema.

use crate::entity::EntityHandle;
use crate::merge::deep_merge;
use crate::schema::{IndexValue, Indexes, Node};
use crate::uid::UidGenerator;
use remdoc_protocol::Key;
use serde_json::Value;
use std::sync::Arc;

/// Name of the index every entity carries with its model kind.
pub const KIND_INDEX: &str = "kind";

/// A document kind: its field schema and key generator.
#[derive(Debug)]
pub struct Model {
    kind: String,
    root: Node,
    uid: UidGenerator,
}

impl Model {
    /// Creates a model from its top-level fields.
    ///
    /// Keys are minted by a hashed counter generator unless replaced with
    /// [`Model::with_uid`].
    pub fn new<I, S>(kind: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Node)>,
        S: Into<String>,
    {
        Self {
            kind: kind.into(),
            root: Node::dict(fields),
            uid: UidGenerator::default(),
        }
    }

    /// Replaces the key generator.
    pub fn with_uid(mut self, uid: UidGenerator) -> Self {
        self.uid = uid;
        self
    }

    /// Returns the kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the top-level schema node.
    pub fn schema(&self) -> &Node {
        &self.root
    }

    /// Mints a fresh key.
    pub fn next_key(&self) -> Key {
        Key::Text(self.uid.next_key())
    }

    /// Canonicalizes `raw`, recording indexes including the kind.
    pub fn map(&self, raw: Option<&Value>, indexes: &mut Indexes) -> Value {
        let data = self.root.canonicalize(raw, indexes);
        indexes.insert(KIND_INDEX.to_string(), IndexValue::from(self.kind.as_str()));
        data
    }

    /// Deep-merges `partial` into `data` and re-canonicalizes the result.
    pub fn update(&self, data: &Value, partial: &Value, indexes: &mut Indexes) -> Value {
        let mut merged = data.clone();
        deep_merge(&mut merged, partial);
        self.map(Some(&merged), indexes)
    }

    /// Builds an entity of this model.
    ///
    /// `indexes` seeds the entity's indexes; computed entries overwrite it.
    pub fn instantiate(self: &Arc<Self>, key: Key, raw: Option<&Value>, indexes: Indexes) -> EntityHandle {
        let mut indexes = indexes;
        let data = self.map(raw, &mut indexes);
        EntityHandle::new(key, Arc::clone(self), data, indexes)
    }
}

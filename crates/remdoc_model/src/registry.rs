//! Model registry keyed by kind.

use crate::error::{ModelError, ModelResult};
use crate::model::Model;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Models by kind. Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Arc<RwLock<HashMap<String, Arc<Model>>>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `model`, replacing any model of the same kind.
    pub fn register(&self, model: Model) -> Arc<Model> {
        let model = Arc::new(model);
        self.models
            .write()
            .insert(model.kind().to_string(), Arc::clone(&model));
        model
    }

    /// Returns the model of `kind`.
    pub fn get(&self, kind: &str) -> ModelResult<Arc<Model>> {
        self.models
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| ModelError::UnknownKind(kind.to_string()))
    }

    /// Whether `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.models.read().contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.models.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Node;

    #[test]
    fn register_and_lookup() {
        let registry = ModelRegistry::new();
        registry.register(Model::new("note", [("title", Node::string())]));
        registry.register(Model::new("author", [("name", Node::string())]));

        assert!(registry.contains("note"));
        assert_eq!(registry.get("note").unwrap().kind(), "note");
        assert_eq!(registry.kinds(), vec!["author", "note"]);
        assert_eq!(
            registry.get("ghost").unwrap_err(),
            ModelError::UnknownKind("ghost".into())
        );
    }

    #[test]
    fn reregistering_replaces() {
        let registry = ModelRegistry::new();
        let first = registry.register(Model::new("note", [("a", Node::string())]));
        let second = registry.register(Model::new("note", [("b", Node::string())]));
        let current = registry.get("note").unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
    }
}

//! Batch request builder and batch response items.

use crate::operation::{Action, BatchOperation, Key, Scalar, Statement};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An ordered list of operations sent as one `query` exchange.
///
/// # Example
///
/// ```rust
/// use remdoc_protocol::BatchRequest;
///
/// let mut batch = BatchRequest::new();
/// batch.get("a").remove("b");
/// batch.query().kind("note").gt("stars", 3).append();
/// assert_eq!(batch.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRequest {
    operations: Vec<BatchOperation>,
}

impl BatchRequest {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `get` for `key`.
    pub fn get(&mut self, key: impl Into<Key>) -> &mut Self {
        self.operations.push(BatchOperation::get(&key.into()));
        self
    }

    /// Appends a `put` of `entity` under `key` with its indexes.
    pub fn put<I>(&mut self, key: impl Into<Key>, entity: &Value, indexes: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.operations
            .push(BatchOperation::put(&key.into(), entity, indexes));
        self
    }

    /// Appends a `delete` for `key`.
    pub fn remove(&mut self, key: impl Into<Key>) -> &mut Self {
        self.operations.push(BatchOperation::delete(&key.into()));
        self
    }

    /// Starts a query; statements are collected until `append`.
    pub fn query(&mut self) -> QueryStatements<'_> {
        QueryStatements {
            request: self,
            statements: Vec::new(),
        }
    }

    /// Appends an already built operation.
    pub fn push(&mut self, operation: BatchOperation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    /// Returns the queued operations.
    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    /// Consumes the batch.
    pub fn into_operations(self) -> Vec<BatchOperation> {
        self.operations
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Statements of a query under construction.
#[derive(Debug)]
pub struct QueryStatements<'a> {
    request: &'a mut BatchRequest,
    statements: Vec<Statement>,
}

impl<'a> QueryStatements<'a> {
    /// Restricts to documents of one kind.
    pub fn kind(self, kind: &str) -> Self {
        self.eq("kind", kind)
    }

    /// `field = value`
    pub fn eq(mut self, field: &str, value: impl Into<Scalar>) -> Self {
        self.statements.push(Statement::eq(field, value));
        self
    }

    /// `field > value`
    pub fn gt(mut self, field: &str, value: impl Into<Scalar>) -> Self {
        self.statements.push(Statement::gt(field, value));
        self
    }

    /// `field < value`
    pub fn lt(mut self, field: &str, value: impl Into<Scalar>) -> Self {
        self.statements.push(Statement::lt(field, value));
        self
    }

    /// Appends the query to its batch.
    pub fn append(self) -> &'a mut BatchRequest {
        self.request.push(BatchOperation::query(self.statements))
    }
}

/// One entry of a batch response, positionally matching a request operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseItem {
    /// Action tag as sent by the server; unknown tags are kept verbatim.
    pub action: String,
    /// Per-operation status.
    pub status: u16,
    /// Document key for `get`/`put`/`delete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
    /// Document encoded as a JSON string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Index values of the document.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub indexes: Map<String, Value>,
    /// Rows of a `query`: `key`, `entity` and one field per index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Map<String, Value>>,
}

impl BatchResponseItem {
    /// Creates an item with an action and status.
    pub fn new(action: Action, status: u16) -> Self {
        Self {
            action: action.as_str().to_string(),
            status,
            key: None,
            entity: None,
            indexes: Map::new(),
            results: Vec::new(),
        }
    }

    /// Returns the parsed action tag.
    pub fn action(&self) -> Option<Action> {
        Action::parse(&self.action)
    }

    /// Decodes a response body into items.
    pub fn decode_all(body: &Value) -> Result<Vec<Self>, serde_json::Error> {
        Vec::<Self>::deserialize(body)
    }
}

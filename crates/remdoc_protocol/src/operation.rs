//! Batch operations and their statements.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A document key: either text or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
}

impl Key {
    /// Returns the key as a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Key::Int(n) => Value::from(*n),
            Key::Text(s) => Value::String(s.clone()),
        }
    }

    /// Reads a key from a JSON value.
    ///
    /// Only strings and integral numbers are keys.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Key::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(Key::Int),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(i64::from(value))
    }
}

/// A scalar statement or index value: text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl Scalar {
    /// Returns the scalar as a JSON value.
    ///
    /// Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Int(n) => Value::from(*n),
            Scalar::Float(x) => serde_json::Number::from_f64(*x)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }

    /// Reads a scalar from a JSON string or number.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<Key> for Scalar {
    fn from(value: Key) -> Self {
        match value {
            Key::Int(n) => Scalar::Int(n),
            Key::Text(s) => Scalar::Text(s),
        }
    }
}

/// Comparison operator of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Equality.
    #[serde(rename = "=")]
    Eq,
    /// Strictly greater than.
    #[serde(rename = ">")]
    Gt,
    /// Strictly less than.
    #[serde(rename = "<")]
    Lt,
}

impl Operator {
    /// Returns the wire symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Lt => "<",
        }
    }
}

/// A `(field, operator, value)` triple, encoded as a three element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement(pub String, pub Operator, pub Value);

impl Statement {
    /// Creates a statement.
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self(field.into(), operator, value)
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(field, Operator::Eq, value.into().to_json())
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(field, Operator::Gt, value.into().to_json())
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(field, Operator::Lt, value.into().to_json())
    }

    /// Returns the field name.
    pub fn field(&self) -> &str {
        &self.0
    }

    /// Returns the operator.
    pub fn operator(&self) -> Operator {
        self.1
    }

    /// Returns the value.
    pub fn value(&self) -> &Value {
        &self.2
    }
}

/// Action tag of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Read one document by key.
    Get,
    /// Store one document.
    Put,
    /// Run a statement query.
    Query,
    /// Delete one document by key.
    Delete,
}

impl Action {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Put => "put",
            Action::Query => "query",
            Action::Delete => "delete",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "get" => Some(Action::Get),
            "put" => Some(Action::Put),
            "query" => Some(Action::Query),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    /// What to do.
    pub action: Action,
    /// Ordered statements qualifying the action.
    pub statements: Vec<Statement>,
}

impl BatchOperation {
    /// Creates a `get` operation.
    pub fn get(key: &Key) -> Self {
        Self {
            action: Action::Get,
            statements: vec![Statement::new("key", Operator::Eq, key.to_json())],
        }
    }

    /// Creates a `delete` operation.
    pub fn delete(key: &Key) -> Self {
        Self {
            action: Action::Delete,
            statements: vec![Statement::new("key", Operator::Eq, key.to_json())],
        }
    }

    /// Creates a `put` operation.
    ///
    /// The document travels as a JSON string in the `entity` statement;
    /// each index becomes its own equality statement.
    pub fn put<I>(key: &Key, entity: &Value, indexes: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut statements = vec![
            Statement::new("key", Operator::Eq, key.to_json()),
            Statement::new("entity", Operator::Eq, Value::String(entity.to_string())),
        ];
        statements.extend(
            indexes
                .into_iter()
                .map(|(name, value)| Statement::new(name, Operator::Eq, value)),
        );
        Self {
            action: Action::Put,
            statements,
        }
    }

    /// Creates a `query` operation from its statements.
    pub fn query(statements: Vec<Statement>) -> Self {
        Self {
            action: Action::Query,
            statements,
        }
    }

    /// Returns the value of the `key` statement, if any.
    pub fn key(&self) -> Option<Key> {
        self.statements
            .iter()
            .find(|s| s.field() == "key")
            .and_then(|s| Key::from_json(s.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statement_encodes_as_triple() {
        let stmt = Statement::gt("age", 21);
        assert_eq!(serde_json::to_value(&stmt).unwrap(), json!(["age", ">", 21]));

        let back: Statement = serde_json::from_value(json!(["kind", "=", "note"])).unwrap();
        assert_eq!(back, Statement::eq("kind", "note"));
    }

    #[test]
    fn put_operation_layout() {
        let op = BatchOperation::put(
            &Key::from("k1"),
            &json!({"title": "hello"}),
            vec![("kind".to_string(), json!("note"))],
        );
        let encoded = serde_json::to_value(&op).unwrap();
        assert_eq!(
            encoded,
            json!({
                "action": "put",
                "statements": [
                    ["key", "=", "k1"],
                    ["entity", "=", "{\"title\":\"hello\"}"],
                    ["kind", "=", "note"]
                ]
            })
        );
        assert_eq!(op.key(), Some(Key::from("k1")));
    }

    #[test]
    fn keys_round_trip_json() {
        assert_eq!(Key::from_json(&json!(7)), Some(Key::Int(7)));
        assert_eq!(Key::from_json(&json!("a")), Some(Key::from("a")));
        assert_eq!(Key::from_json(&json!(1.5)), None);
        assert_eq!(Key::from_json(&json!(null)), None);
        assert_eq!(Key::Int(3).to_string(), "3");
    }

    #[test]
    fn action_parse() {
        assert_eq!(Action::parse("delete"), Some(Action::Delete));
        assert_eq!(Action::parse("upsert"), None);
        assert_eq!(serde_json::to_value(Action::Query).unwrap(), json!("query"));
    }

    #[test]
    fn scalar_from_json() {
        assert_eq!(Scalar::from_json(&json!(2)), Some(Scalar::Int(2)));
        assert_eq!(Scalar::from_json(&json!(2.5)), Some(Scalar::Float(2.5)));
        assert_eq!(Scalar::from_json(&json!("x")), Some(Scalar::from("x")));
        assert_eq!(Scalar::from_json(&json!(true)), None);
        assert_eq!(Scalar::Float(f64::NAN).to_json(), Value::Null);
    }
}

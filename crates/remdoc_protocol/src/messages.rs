//! Request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Top-level resource directory of a request URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dir {
    /// Principal records.
    Users,
    /// Collections (databases).
    Databases,
}

impl Dir {
    /// Returns the path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dir::Users => "users",
            Dir::Databases => "databases",
        }
    }
}

/// Request method carried in the payload head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Read.
    Get,
    /// Create or replace.
    Put,
    /// Remove.
    Delete,
    /// Batched document operations.
    Query,
}

/// An outbound request, before it is encoded by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Resource directory.
    pub dir: Dir,
    /// Resource name inside the directory (may be empty).
    pub name: String,
    /// Method.
    pub method: Method,
    /// Principal named in the authorization header.
    pub username: Option<String>,
    /// `(client_nonce, proof)` attached after the principal name.
    pub proof: Option<(String, String)>,
    /// Request body.
    pub body: Option<Value>,
    /// Deadline the transport must honor.
    pub timeout: Option<Duration>,
}

impl Request {
    /// Creates a request without authorization or body.
    pub fn new(dir: Dir, name: impl Into<String>, method: Method) -> Self {
        Self {
            dir,
            name: name.into(),
            method,
            username: None,
            proof: None,
            body: None,
            timeout: None,
        }
    }

    /// Names the principal in the authorization header.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Attaches the client nonce and passkey proof.
    pub fn with_proof(mut self, client_nonce: impl Into<String>, proof: impl Into<String>) -> Self {
        self.proof = Some((client_nonce.into(), proof.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns `dir/name`, or just `dir` when the name is empty.
    pub fn path(&self) -> String {
        if self.name.is_empty() {
            self.dir.as_str().to_string()
        } else {
            format!("{}/{}", self.dir.as_str(), self.name)
        }
    }

    /// Returns true if a passkey proof is attached.
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some() && self.proof.is_some()
    }

    /// Builds the JSON payload.
    ///
    /// The authorization list is `[username]` or
    /// `[username, client_nonce, proof]`; a proof without a username is
    /// never sent.
    pub fn payload(&self) -> RequestPayload {
        let authorization = self.username.as_ref().map(|username| {
            let mut parts = vec![username.clone()];
            if let Some((client_nonce, proof)) = &self.proof {
                parts.push(client_nonce.clone());
                parts.push(proof.clone());
            }
            parts
        });
        RequestPayload {
            head: RequestHead {
                method: self.method,
                authorization,
            },
            body: self.body.clone(),
        }
    }
}

/// Encoded request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Envelope head.
    pub head: RequestHead,
    /// Envelope body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Head of an encoded request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHead {
    /// Method.
    pub method: Method,
    /// Authorization list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Vec<String>>,
}

/// Head of a normalized response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHead {
    /// Zero to three authorization strings: `[principal, nonce, next_nonce]`.
    pub authorization: Vec<String>,
    /// HTTP-style status; zero means the server did not supply one.
    pub status: u16,
}

impl ResponseHead {
    /// Returns `(nonce, next_nonce)` when both are present and non-empty.
    pub fn nonce_pair(&self) -> Option<(&str, &str)> {
        match (self.authorization.get(1), self.authorization.get(2)) {
            (Some(nonce), Some(next)) if !nonce.is_empty() && !next.is_empty() => {
                Some((nonce.as_str(), next.as_str()))
            }
            _ => None,
        }
    }

    /// Returns true when the server sent a full credential triple.
    pub fn has_credentials(&self) -> bool {
        self.authorization.len() == 3
    }
}

/// A response after normalization: missing parts are filled with
/// well-defined empties so callers never inspect raw shapes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedResponse {
    /// Response head.
    pub head: ResponseHead,
    /// Structured body; `None` for anything that is not an object or array.
    pub body: Option<Value>,
}

impl NormalizedResponse {
    /// Creates a response with a status and nothing else.
    pub fn new(status: u16) -> Self {
        Self {
            head: ResponseHead {
                authorization: Vec::new(),
                status,
            },
            body: None,
        }
    }

    /// Sets the authorization list.
    pub fn with_authorization<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.head.authorization = parts.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the body, dropping non-structured values.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = structured(body);
        self
    }

    /// Returns the status.
    pub fn status(&self) -> u16 {
        self.head.status
    }

    /// Normalizes a raw decoded envelope.
    ///
    /// Non-string authorization entries are dropped, a missing or
    /// non-integral status becomes zero and a scalar body becomes `None`.
    pub fn from_raw(raw: &Value) -> Self {
        let head = raw.get("head").filter(|h| h.is_object());
        let authorization = head
            .and_then(|h| h.get("authorization"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.as_str().map(str::to_string))
                    .take(3)
                    .collect()
            })
            .unwrap_or_default();
        let status = head
            .and_then(|h| h.get("status"))
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(0);
        let body = raw.get("body").cloned().and_then(structured);
        Self {
            head: ResponseHead {
                authorization,
                status,
            },
            body,
        }
    }

    /// Encodes back into the raw envelope shape.
    pub fn to_raw(&self) -> Value {
        let mut head = serde_json::Map::new();
        head.insert(
            "authorization".into(),
            Value::Array(
                self.head
                    .authorization
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        head.insert("status".into(), Value::from(self.head.status));
        let mut envelope = serde_json::Map::new();
        envelope.insert("head".into(), Value::Object(head));
        if let Some(body) = &self.body {
            envelope.insert("body".into(), body.clone());
        }
        Value::Object(envelope)
    }
}

fn structured(value: Value) -> Option<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Some(value),
        _ => None,
    }
}

//! In-memory document store speaking the nonce protocol.
//!
//! The server never stores passkeys. Each proved request leaves behind the
//! client nonce `hash(hash(passkey + next_nonce))`; the next request must
//! carry a proof whose hash equals it. A principal created over the wire
//! accepts its first proof unchecked. Principals seeded with
//! [`FakeServer::add_user`] start with the expectation computed from the
//! passkey.

use parking_lot::Mutex;
use remdoc_client::{
    client_nonce, Digest, HttpResponse, LoopbackServer, Sha256Digest, Transport, TransportError,
    TransportResult,
};
use remdoc_protocol::{
    Action, BatchOperation, Dir, Key, Method, NormalizedResponse, Operator, Request,
    RequestPayload, Statement,
};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::debug;

struct Principal {
    nonce: String,
    next_nonce: String,
    expected: Option<String>,
    document: Value,
}

struct Stored {
    entity: String,
    indexes: Map<String, Value>,
}

struct Collection {
    owner: String,
    descriptor: Value,
    documents: BTreeMap<Key, Stored>,
}

#[derive(Default)]
struct State {
    principals: HashMap<String, Principal>,
    collections: HashMap<String, Collection>,
    counter: u64,
    probes: u64,
    requests: u64,
    offline: bool,
}

impl State {
    fn fresh_nonce(&mut self) -> String {
        self.counter += 1;
        format!("nonce-{:06}", self.counter)
    }

    fn anonymous(&mut self, request: &Request) -> NormalizedResponse {
        match (request.dir, request.method) {
            (Dir::Users, Method::Get) if self.principals.contains_key(&request.name) => {
                NormalizedResponse::new(401)
            }
            (Dir::Users, Method::Get) => NormalizedResponse::new(404),
            (Dir::Users, Method::Put) => {
                if self.principals.contains_key(&request.name) {
                    return NormalizedResponse::new(401);
                }
                let nonce = self.fresh_nonce();
                let next_nonce = self.fresh_nonce();
                let name = request.name.clone();
                self.principals.insert(
                    name.clone(),
                    Principal {
                        nonce: nonce.clone(),
                        next_nonce: next_nonce.clone(),
                        expected: None,
                        document: json!({ "name": name }),
                    },
                );
                NormalizedResponse::new(201).with_authorization([name, nonce, next_nonce])
            }
            _ => NormalizedResponse::new(401),
        }
    }

    fn probe(&mut self, user: &str) -> NormalizedResponse {
        self.probes += 1;
        match self.principals.get(user) {
            Some(p) => NormalizedResponse::new(401).with_authorization([
                user,
                p.nonce.as_str(),
                p.next_nonce.as_str(),
            ]),
            None => NormalizedResponse::new(404),
        }
    }

    fn serve(&mut self, user: &str, request: &Request) -> (u16, Option<Value>) {
        let name = request.name.as_str();
        match request.dir {
            Dir::Users => self.serve_user(user, name, request),
            Dir::Databases => self.serve_collection(user, name, request),
        }
    }

    fn serve_user(&mut self, user: &str, name: &str, request: &Request) -> (u16, Option<Value>) {
        match request.method {
            Method::Get => match self.principals.get(name) {
                Some(p) => (200, Some(p.document.clone())),
                None => (404, None),
            },
            Method::Put if name != user => (403, None),
            Method::Put => match self.principals.get_mut(name) {
                Some(p) => {
                    if let Some(body) = &request.body {
                        p.document = body.clone();
                    }
                    (200, Some(p.document.clone()))
                }
                None => (404, None),
            },
            Method::Delete if name != user => (403, None),
            Method::Delete => {
                self.principals.remove(name);
                (200, None)
            }
            Method::Query => (400, None),
        }
    }

    fn serve_collection(&mut self, user: &str, name: &str, request: &Request) -> (u16, Option<Value>) {
        match request.method {
            Method::Get => match self.collections.get(name) {
                Some(c) => (200, Some(c.descriptor.clone())),
                None => (404, None),
            },
            Method::Put if !self.collections.contains_key(name) => {
                let descriptor = request
                    .body
                    .clone()
                    .unwrap_or_else(|| json!({ "name": name, "owner": user }));
                self.collections.insert(
                    name.to_string(),
                    Collection {
                        owner: user.to_string(),
                        descriptor: descriptor.clone(),
                        documents: BTreeMap::new(),
                    },
                );
                (201, Some(descriptor))
            }
            Method::Put => match (self.collections.get_mut(name), &request.body) {
                (Some(c), Some(_)) if c.owner != user => (403, None),
                (Some(c), Some(body)) => {
                    c.descriptor = body.clone();
                    (200, Some(c.descriptor.clone()))
                }
                _ => (400, None),
            },
            Method::Delete => {
                let owner = self.collections.get(name).map(|c| c.owner.clone());
                match owner {
                    Some(owner) if owner != user => (403, None),
                    Some(_) => {
                        self.collections.remove(name);
                        (200, None)
                    }
                    None => (404, None),
                }
            }
            Method::Query => {
                let Some(collection) = self.collections.get_mut(name) else {
                    return (404, None);
                };
                let body = request.body.clone().unwrap_or(Value::Array(Vec::new()));
                match serde_json::from_value::<Vec<BatchOperation>>(body) {
                    Ok(operations) => {
                        let items = operations.iter().map(|op| collection.apply(op)).collect();
                        (200, Some(Value::Array(items)))
                    }
                    Err(_) => (400, None),
                }
            }
        }
    }
}

impl Collection {
    fn apply(&mut self, op: &BatchOperation) -> Value {
        let action = op.action.as_str();
        let rejected = json!({ "action": action, "status": 400 });
        match op.action {
            Action::Get => {
                let Some(key) = op.key() else { return rejected };
                match self.documents.get(&key) {
                    Some(doc) => json!({
                        "action": action,
                        "status": 200,
                        "key": key.to_json(),
                        "entity": doc.entity,
                        "indexes": doc.indexes,
                    }),
                    None => json!({ "action": action, "status": 404, "key": key.to_json() }),
                }
            }
            Action::Put => {
                let Some(key) = op.key() else { return rejected };
                let Some(entity) = statement(op, "entity").and_then(Value::as_str) else {
                    return rejected;
                };
                let indexes: Map<String, Value> = op
                    .statements
                    .iter()
                    .filter(|s| s.field() != "key" && s.field() != "entity")
                    .filter(|s| s.operator() == Operator::Eq)
                    .map(|s| (s.field().to_string(), s.value().clone()))
                    .collect();
                let stored = Stored {
                    entity: entity.to_string(),
                    indexes,
                };
                let status = match self.documents.insert(key.clone(), stored) {
                    Some(_) => 200,
                    None => 201,
                };
                json!({ "action": action, "status": status, "key": key.to_json() })
            }
            Action::Delete => {
                let Some(key) = op.key() else { return rejected };
                let status = match self.documents.remove(&key) {
                    Some(_) => 204,
                    None => 404,
                };
                json!({ "action": action, "status": status, "key": key.to_json() })
            }
            Action::Query => {
                let results: Vec<Value> = self
                    .documents
                    .iter()
                    .filter(|(key, doc)| op.statements.iter().all(|s| matches(key, doc, s)))
                    .map(|(key, doc)| {
                        let mut row = doc.indexes.clone();
                        row.insert("key".into(), key.to_json());
                        row.insert("entity".into(), Value::String(doc.entity.clone()));
                        Value::Object(row)
                    })
                    .collect();
                json!({ "action": action, "status": 200, "results": results })
            }
        }
    }
}

fn statement<'a>(op: &'a BatchOperation, field: &str) -> Option<&'a Value> {
    op.statements
        .iter()
        .find(|s| s.field() == field)
        .map(Statement::value)
}

fn matches(key: &Key, doc: &Stored, statement: &Statement) -> bool {
    let key_value;
    let actual = if statement.field() == "key" {
        key_value = key.to_json();
        &key_value
    } else {
        match doc.indexes.get(statement.field()) {
            Some(value) => value,
            None => return false,
        }
    };
    satisfies(actual, statement.operator(), statement.value())
}

fn satisfies(actual: &Value, operator: Operator, expected: &Value) -> bool {
    if let Value::Array(items) = actual {
        return items.iter().any(|item| satisfies(item, operator, expected));
    }
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match (ordering, operator) {
        (Some(Ordering::Equal), Operator::Eq) => true,
        (Some(Ordering::Greater), Operator::Gt) => true,
        (Some(Ordering::Less), Operator::Lt) => true,
        _ => false,
    }
}

/// An in-memory nonce-protocol store. Clones share state.
#[derive(Clone)]
pub struct FakeServer {
    state: Arc<Mutex<State>>,
    digest: Arc<dyn Digest>,
}

impl FakeServer {
    /// Creates an empty server using SHA-256.
    pub fn new() -> Self {
        Self::with_digest(Arc::new(Sha256Digest))
    }

    /// Creates an empty server using `digest`, which must match the
    /// client's.
    pub fn with_digest(digest: Arc<dyn Digest>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            digest,
        }
    }

    /// Seeds a principal that will accept `passkey`.
    pub fn add_user(&self, name: &str, passkey: &str) -> &Self {
        let mut state = self.state.lock();
        let nonce = state.fresh_nonce();
        let next_nonce = state.fresh_nonce();
        let expected = client_nonce(&*self.digest, passkey, &nonce);
        state.principals.insert(
            name.to_string(),
            Principal {
                nonce,
                next_nonce,
                expected: Some(expected),
                document: json!({ "name": name }),
            },
        );
        self
    }

    /// Seeds a collection owned by `owner`.
    pub fn add_collection(&self, name: &str, owner: &str) -> &Self {
        self.state.lock().collections.insert(
            name.to_string(),
            Collection {
                owner: owner.to_string(),
                descriptor: json!({ "name": name, "owner": owner }),
                documents: BTreeMap::new(),
            },
        );
        self
    }

    /// Stores a document directly. Returns false if the collection is
    /// missing.
    pub fn insert_document(
        &self,
        collection: &str,
        key: impl Into<Key>,
        entity: &Value,
        indexes: Map<String, Value>,
    ) -> bool {
        let mut state = self.state.lock();
        match state.collections.get_mut(collection) {
            Some(c) => {
                c.documents.insert(
                    key.into(),
                    Stored {
                        entity: entity.to_string(),
                        indexes,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Returns a stored document.
    pub fn document(&self, collection: &str, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let state = self.state.lock();
        let stored = state.collections.get(collection)?.documents.get(&key)?;
        serde_json::from_str(&stored.entity).ok()
    }

    /// Returns the indexes stored with a document.
    pub fn document_indexes(&self, collection: &str, key: impl Into<Key>) -> Option<Map<String, Value>> {
        let key = key.into();
        let state = self.state.lock();
        let stored = state.collections.get(collection)?.documents.get(&key)?;
        Some(stored.indexes.clone())
    }

    /// Number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    /// Whether a principal exists.
    pub fn has_user(&self, name: &str) -> bool {
        self.state.lock().principals.contains_key(name)
    }

    /// Whether a collection exists.
    pub fn has_collection(&self, name: &str) -> bool {
        self.state.lock().collections.contains_key(name)
    }

    /// The current `(nonce, next_nonce)` of a principal.
    pub fn nonce_pair(&self, name: &str) -> Option<(String, String)> {
        self.state
            .lock()
            .principals
            .get(name)
            .map(|p| (p.nonce.clone(), p.next_nonce.clone()))
    }

    /// Unauthenticated probes answered so far.
    pub fn probes(&self) -> u64 {
        self.state.lock().probes
    }

    /// Requests answered so far, including failures.
    pub fn requests(&self) -> u64 {
        self.state.lock().requests
    }

    /// Makes every exchange fail with `NoResponse` until turned back on.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Answers one request.
    pub fn handle(&self, request: &Request) -> NormalizedResponse {
        let mut state = self.state.lock();
        state.requests += 1;
        debug!(path = %request.path(), method = ?request.method, "fake server request");
        match (&request.username, &request.proof) {
            (None, _) => state.anonymous(request),
            (Some(user), None) => state.probe(user),
            (Some(user), Some((cnonce, proof))) => self.authenticated(&mut state, user, cnonce, proof, request),
        }
    }

    fn authenticated(
        &self,
        state: &mut State,
        user: &str,
        cnonce: &str,
        proof: &str,
        request: &Request,
    ) -> NormalizedResponse {
        let fresh = state.fresh_nonce();
        let Some(principal) = state.principals.get_mut(user) else {
            return NormalizedResponse::new(404);
        };
        if let Some(expected) = &principal.expected {
            if self.digest.hash(proof) != *expected {
                debug!(user, "proof rejected");
                return NormalizedResponse::new(401).with_authorization([
                    user,
                    principal.nonce.as_str(),
                    principal.next_nonce.as_str(),
                ]);
            }
        }
        principal.expected = Some(cnonce.to_string());
        principal.nonce = mem::replace(&mut principal.next_nonce, fresh);
        let authorization = [
            user.to_string(),
            principal.nonce.clone(),
            principal.next_nonce.clone(),
        ];

        let (status, body) = state.serve(user, request);
        let response = NormalizedResponse::new(status).with_authorization(authorization);
        match body {
            Some(body) => response.with_body(body),
            None => response,
        }
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FakeServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeServer")
            .field("principals", &state.principals.len())
            .field("collections", &state.collections.len())
            .field("requests", &state.requests)
            .finish()
    }
}

impl Transport for FakeServer {
    fn send(&self, request: &Request) -> TransportResult<NormalizedResponse> {
        if self.state.lock().offline {
            return Err(TransportError::NoResponse("server offline".into()));
        }
        Ok(self.handle(request))
    }
}

impl LoopbackServer for FakeServer {
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        let Ok(payload) = serde_json::from_slice::<RequestPayload>(body) else {
            return HttpResponse::new(400, Vec::new());
        };
        let (dir, name) = match path.split_once('/') {
            Some(("users", name)) => (Dir::Users, name),
            Some(("databases", name)) => (Dir::Databases, name),
            None if path == "users" => (Dir::Users, ""),
            None if path == "databases" => (Dir::Databases, ""),
            _ => return HttpResponse::new(404, Vec::new()),
        };

        let mut request = Request::new(dir, name, payload.head.method);
        let authorization = payload.head.authorization.unwrap_or_default();
        if let Some(user) = authorization.first() {
            request = request.with_username(user.as_str());
        }
        if let [_, cnonce, proof] = authorization.as_slice() {
            request = request.with_proof(cnonce.as_str(), proof.as_str());
        }
        if let Some(body) = payload.body {
            request = request.with_body(body);
        }

        if self.state.lock().offline {
            return HttpResponse::new(503, Vec::new());
        }
        let response = self.handle(&request);
        match serde_json::to_vec(&response.to_raw()) {
            Ok(bytes) => HttpResponse::new(200, bytes),
            Err(_) => HttpResponse::new(500, Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remdoc_client::proof;

    fn proved(server: &FakeServer, user: &str, passkey: &str, request: Request) -> NormalizedResponse {
        let (nonce, next) = server.nonce_pair(user).unwrap();
        let digest = Sha256Digest;
        server.handle(
            &request
                .with_username(user)
                .with_proof(client_nonce(&digest, passkey, &next), proof(&digest, passkey, &nonce)),
        )
    }

    #[test]
    fn probe_returns_current_pair() {
        let server = FakeServer::new();
        server.add_user("alice", "secret123");
        let response = server.handle(&Request::new(Dir::Users, "alice", Method::Get).with_username("alice"));
        assert_eq!(response.status(), 401);
        let (nonce, next) = server.nonce_pair("alice").unwrap();
        assert_eq!(response.head.nonce_pair(), Some((nonce.as_str(), next.as_str())));
        assert_eq!(server.probes(), 1);

        let missing = server.handle(&Request::new(Dir::Users, "bob", Method::Get).with_username("bob"));
        assert_eq!(missing.status(), 404);
    }

    #[test]
    fn valid_proof_rotates_pair() {
        let server = FakeServer::new();
        server.add_user("alice", "secret123");
        let (_, next) = server.nonce_pair("alice").unwrap();

        let response = proved(&server, "alice", "secret123", Request::new(Dir::Users, "alice", Method::Get));
        assert_eq!(response.status(), 200);
        assert_eq!(response.body, Some(json!({"name": "alice"})));
        let (nonce, fresh) = server.nonce_pair("alice").unwrap();
        assert_eq!(nonce, next);
        assert_eq!(response.head.nonce_pair(), Some((nonce.as_str(), fresh.as_str())));

        let again = proved(&server, "alice", "secret123", Request::new(Dir::Users, "alice", Method::Get));
        assert_eq!(again.status(), 200);
    }

    #[test]
    fn wrong_passkey_keeps_pair() {
        let server = FakeServer::new();
        server.add_user("alice", "secret123");
        let before = server.nonce_pair("alice").unwrap();
        let response = proved(&server, "alice", "wrong-key", Request::new(Dir::Users, "alice", Method::Get));
        assert_eq!(response.status(), 401);
        assert_eq!(server.nonce_pair("alice").unwrap(), before);
    }

    #[test]
    fn batch_put_get_query_delete() {
        let server = FakeServer::new();
        server.add_user("alice", "secret123").add_collection("notes", "alice");
        let batch = json!([
            {"action": "put", "statements": [
                ["key", "=", "a"], ["entity", "=", "{\"n\":1}"], ["kind", "=", "note"], ["stars", "=", 4]
            ]},
            {"action": "put", "statements": [
                ["key", "=", "b"], ["entity", "=", "{\"n\":2}"], ["kind", "=", "note"], ["stars", "=", 1]
            ]},
            {"action": "query", "statements": [["kind", "=", "note"], ["stars", ">", 2]]},
            {"action": "get", "statements": [["key", "=", "zz"]]},
            {"action": "delete", "statements": [["key", "=", "b"]]}
        ]);
        let response = proved(
            &server,
            "alice",
            "secret123",
            Request::new(Dir::Databases, "notes", Method::Query).with_body(batch),
        );
        assert_eq!(response.status(), 200);
        let items = response.body.unwrap();
        assert_eq!(items[0]["status"], 201);
        assert_eq!(items[2]["results"].as_array().unwrap().len(), 1);
        assert_eq!(items[2]["results"][0]["key"], "a");
        assert_eq!(items[3]["status"], 404);
        assert_eq!(items[4]["status"], 204);
        assert_eq!(server.document("notes", "a"), Some(json!({"n": 1})));
        assert_eq!(server.document_count("notes"), 1);
    }

    #[test]
    fn loopback_decodes_envelope() {
        let server = FakeServer::new();
        server.add_user("alice", "secret123");
        let body = serde_json::to_vec(
            &Request::new(Dir::Users, "alice", Method::Get)
                .with_username("alice")
                .payload(),
        )
        .unwrap();
        let response = server.handle_post("users/alice", &body);
        assert_eq!(response.status, 200);
        let raw: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(NormalizedResponse::from_raw(&raw).status(), 401);
        assert_eq!(server.handle_post("elsewhere", &body).status, 404);
    }

    #[test]
    fn satisfies_handles_sequences() {
        assert!(satisfies(&json!(["a", "b"]), Operator::Eq, &json!("b")));
        assert!(satisfies(&json!(3), Operator::Gt, &json!(2.5)));
        assert!(!satisfies(&json!("3"), Operator::Gt, &json!(2)));
    }
}

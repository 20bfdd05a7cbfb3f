//! Per-principal authenticated sessions.
//!
//! Every public operation is queued on the principal's slot. While the slot
//! is held the session probes for a nonce pair if it has none, proves the
//! passkey against the pair, verifies that the store rotated it and then
//! releases the slot. A prompted passkey releases the slot while waiting so
//! other principals and the prompt itself are never blocked.

use crate::context::ClientContext;
use crate::deferred::{Deferred, Resolver};
use crate::digest::{client_nonce, proof};
use crate::error::{ClientError, ClientResult};
use crate::queue::{SessionRecord, Transaction};
use crate::scheduler::Scheduler;
use crate::state::{plan, verify_rotation, Operation, SessionState, Step};
use parking_lot::Mutex;
use remdoc_protocol::{
    validate_collection_name, validate_passkey, validate_username, BatchOperation, Dir, Method,
    NormalizedResponse, Request,
};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type Tx = Transaction<SessionRecord>;
type Notify = Arc<dyn Fn(&str) + Send + Sync>;
type Settle = Box<dyn FnOnce(ClientResult<NormalizedResponse>) + Send>;

/// Completion side of one queued operation.
///
/// `settle` runs the caller's response handler synchronously, so it always
/// runs before the principal's slot is released.
struct Reply {
    notify: Notify,
    settle: Settle,
}

impl Reply {
    fn new<U, F>(resolver: Resolver<U>, handler: F) -> Self
    where
        U: Clone + Send + 'static,
        F: FnOnce(ClientResult<NormalizedResponse>) -> ClientResult<U> + Send + 'static,
    {
        let progress = resolver.clone();
        Self {
            notify: Arc::new(move |message| progress.notify(message)),
            settle: Box::new(move |result| resolver.settle(handler(result))),
        }
    }

    fn notify(&self, message: &str) {
        (self.notify)(message)
    }

    fn settle(self, result: ClientResult<NormalizedResponse>) {
        (self.settle)(result)
    }

    fn reject(self, error: ClientError) {
        self.settle(Err(error))
    }
}

/// A principal's passkey, known up front or asked for on first use.
#[derive(Clone)]
pub enum Passkey {
    /// A validated passkey.
    Literal(String),
    /// Called with a reply handle whenever a proof needs the passkey.
    Prompt(Arc<dyn Fn(PasskeyReply) + Send + Sync>),
}

impl Passkey {
    /// Validates and wraps a literal passkey.
    pub fn literal(passkey: &str) -> ClientResult<Self> {
        Ok(Passkey::Literal(validate_passkey(passkey)?))
    }

    /// Wraps a prompt callback.
    pub fn prompt<F>(prompt: F) -> Self
    where
        F: Fn(PasskeyReply) + Send + Sync + 'static,
    {
        Passkey::Prompt(Arc::new(prompt))
    }

    /// Returns true if the passkey is known.
    pub fn is_known(&self) -> bool {
        matches!(self, Passkey::Literal(_))
    }
}

impl fmt::Debug for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Passkey::Literal(_) => f.write_str("Passkey::Literal(..)"),
            Passkey::Prompt(_) => f.write_str("Passkey::Prompt(..)"),
        }
    }
}

/// One-shot answer to a passkey prompt.
pub struct PasskeyReply {
    callback: Box<dyn FnOnce(String) + Send>,
}

impl PasskeyReply {
    fn new<F>(callback: F) -> Self
    where
        F: FnOnce(String) + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Supplies the passkey and resumes the waiting operation.
    pub fn supply(self, passkey: impl Into<String>) {
        (self.callback)(passkey.into())
    }
}

impl fmt::Debug for PasskeyReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasskeyReply")
    }
}

/// Counters of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Unauthenticated probes sent.
    pub probes: u64,
    /// Proved requests sent.
    pub requests: u64,
    /// Nonce pairs rotated.
    pub rotations: u64,
    /// Operations that ended in an error.
    pub failures: u64,
}

struct SessionInner {
    principal: String,
    ctx: ClientContext,
    passkey: Mutex<Passkey>,
    state: Mutex<SessionState>,
    initialized: AtomicBool,
    stats: Mutex<SessionStats>,
}

/// The authenticated session of one principal. Clones share state.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    /// Creates an uninitialized session. The principal name must already be
    /// validated.
    pub fn new(ctx: ClientContext, principal: impl Into<String>, passkey: Passkey) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                principal: principal.into(),
                ctx,
                passkey: Mutex::new(passkey),
                state: Mutex::new(SessionState::Uninitialized),
                initialized: AtomicBool::new(false),
                stats: Mutex::new(SessionStats::default()),
            }),
        }
    }

    /// Returns the principal name.
    pub fn principal(&self) -> &str {
        &self.inner.principal
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> SessionStats {
        self.inner.stats.lock().clone()
    }

    /// Returns the scheduler results are delivered on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.ctx.scheduler
    }

    /// Returns the stored nonce pair, if any.
    pub fn record(&self) -> Option<SessionRecord> {
        self.inner.ctx.queue.snapshot(&self.inner.principal)
    }

    /// Replaces the passkey. Literal passkeys are validated.
    pub fn set_passkey(&self, passkey: Passkey) -> ClientResult<()> {
        let passkey = match passkey {
            Passkey::Literal(text) => Passkey::Literal(validate_passkey(&text)?),
            prompt => prompt,
        };
        *self.inner.passkey.lock() = passkey;
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.inner.state.lock();
        if *current != state {
            debug!(principal = %self.inner.principal, from = ?*current, to = ?state, "session transition");
            *current = state;
        }
    }

    /// Seeds the nonce pair directly, e.g. right after the principal was
    /// created. Fails if called twice.
    pub fn init(
        &self,
        nonce: impl Into<String>,
        next_nonce: impl Into<String>,
    ) -> ClientResult<Deferred<AuthSession>> {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return Err(ClientError::fault("session initialized"));
        }
        let record = SessionRecord::new(nonce, next_nonce);
        let session = self.clone();
        Ok(self
            .inner
            .ctx
            .queue
            .with_transaction(&self.inner.principal)
            .try_map(move |tx| {
                let stored = tx.set(Some(record));
                release(&tx);
                stored?;
                session.set_state(SessionState::Challenged);
                Ok(session)
            }))
    }

    /// Reads a principal document.
    pub fn read(&self, target: &str) -> ClientResult<Deferred<Value>> {
        let target = validate_username(target)?;
        Ok(self.execute(Operation::Read { target }).map(body))
    }

    /// Replaces a principal document.
    pub fn write(&self, target: &str, document: Value) -> ClientResult<Deferred<Value>> {
        let target = validate_username(target)?;
        Ok(self.execute(Operation::Write { target, document }).map(body))
    }

    /// Removes this principal. The session starts over on next use.
    pub fn remove(&self) -> Deferred<bool> {
        self.execute(Operation::Remove).map(|_| true)
    }

    /// Checks that the principal may query `collection`.
    pub fn connect_to_collection(&self, collection: &str) -> ClientResult<Deferred<()>> {
        let collection = validate_collection_name(collection)?;
        Ok(self.execute(Operation::Connect { collection }).map(|_| ()))
    }

    /// Creates a collection.
    pub fn create_collection(&self, collection: &str) -> ClientResult<Deferred<Value>> {
        let collection = validate_collection_name(collection)?;
        Ok(self
            .execute(Operation::CreateCollection { collection })
            .map(body))
    }

    /// Removes a collection.
    pub fn remove_collection(&self, collection: &str) -> ClientResult<Deferred<bool>> {
        let collection = validate_collection_name(collection)?;
        Ok(self
            .execute(Operation::RemoveCollection { collection })
            .map(|_| true))
    }

    /// Reads a collection descriptor.
    pub fn read_collection(&self, collection: &str) -> ClientResult<Deferred<Value>> {
        let collection = validate_collection_name(collection)?;
        Ok(self
            .execute(Operation::ReadCollection { collection })
            .map(body))
    }

    /// Replaces a collection descriptor.
    pub fn write_collection(
        &self,
        collection: &str,
        document: Value,
    ) -> ClientResult<Deferred<Value>> {
        let collection = validate_collection_name(collection)?;
        Ok(self
            .execute(Operation::WriteCollection {
                collection,
                document,
            })
            .map(body))
    }

    /// Sends a batch of document operations to `collection`.
    pub fn query(
        &self,
        collection: &str,
        operations: &[BatchOperation],
    ) -> ClientResult<Deferred<NormalizedResponse>> {
        let collection = validate_collection_name(collection)?;
        Ok(self.query_with(collection, operations, |result| result))
    }

    pub(crate) fn query_with<U, F>(
        &self,
        collection: String,
        operations: &[BatchOperation],
        handler: F,
    ) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(ClientResult<NormalizedResponse>) -> ClientResult<U> + Send + 'static,
    {
        match serde_json::to_value(operations) {
            Ok(batch) => self.execute_with(Operation::Query { collection, batch }, handler),
            Err(e) => Deferred::from_result(
                self.scheduler(),
                handler(Err(ClientError::protocol(e.to_string()))),
            ),
        }
    }

    /// Queues `operation` and returns its raw response.
    pub fn execute(&self, operation: Operation) -> Deferred<NormalizedResponse> {
        self.execute_with(operation, |result| result)
    }

    /// Queues `operation` and passes its outcome to `handler` before the
    /// principal's slot is released.
    ///
    /// The returned result settles with whatever `handler` returns.
    pub fn execute_with<U, F>(&self, operation: Operation, handler: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(ClientResult<NormalizedResponse>) -> ClientResult<U> + Send + 'static,
    {
        let (deferred, resolver) = Deferred::channel(self.scheduler());
        let reply = Reply::new(resolver, handler);
        let session = self.clone();
        self.scheduler()
            .schedule(move || session.enter(operation, reply));
        deferred
    }

    fn enter(&self, operation: Operation, reply: Reply) {
        reply.notify("checking session");
        let session = self.clone();
        self.inner
            .ctx
            .queue
            .with_transaction(&self.inner.principal)
            .on_fulfilled(move |tx| session.dispatch(tx, operation, reply));
    }

    fn dispatch(&self, tx: Tx, operation: Operation, reply: Reply) {
        if self.state() == SessionState::Removed {
            self.set_state(SessionState::Uninitialized);
        }
        let passkey_known = self.inner.passkey.lock().is_known();
        match plan(self.state(), passkey_known) {
            Step::Probe => self.probe(tx, operation, reply),
            Step::Prove => self.prove(tx, operation, reply),
            Step::Pending => self.await_passkey(tx, operation, reply),
        }
    }

    fn probe(&self, tx: Tx, operation: Operation, reply: Reply) {
        reply.notify("probing");
        self.inner.stats.lock().probes += 1;
        let principal = self.inner.principal.clone();
        let request = Request::new(Dir::Users, principal.as_str(), Method::Get)
            .with_username(principal.as_str())
            .with_timeout(self.inner.ctx.config.probe_timeout);

        let session = self.clone();
        self.inner.ctx.send(request).on_settled(move |result| {
            let response = match result {
                Ok(response) => response,
                Err(error) => return session.finish(&tx, reply, Err(error)),
            };
            if let Some((nonce, next_nonce)) = response.head.nonce_pair() {
                if let Err(error) = tx.set(Some(SessionRecord::new(nonce, next_nonce))) {
                    return session.finish(&tx, reply, Err(error));
                }
                session.set_state(SessionState::Challenged);
                session.dispatch(tx, operation, reply);
            } else if response.status() == 404 {
                session.finish(&tx, reply, Err(ClientError::PrincipalNotFound));
            } else {
                warn!(principal = %principal, status = response.status(), "unexpected probe response");
                session.finish(&tx, reply, Err(ClientError::Offline));
            }
        });
    }

    fn prove(&self, tx: Tx, operation: Operation, reply: Reply) {
        let record = match tx.get() {
            Ok(Some(record)) if record.pair().is_some() => record,
            Ok(_) => {
                // The pair was dropped underneath us; start over.
                self.set_state(SessionState::Uninitialized);
                return self.probe(tx, operation, reply);
            }
            Err(error) => return self.finish(&tx, reply, Err(error)),
        };
        let current = self.inner.passkey.lock().clone();
        let passkey = match current {
            Passkey::Literal(passkey) => passkey,
            Passkey::Prompt(_) => return self.await_passkey(tx, operation, reply),
        };

        let digest = &*self.inner.ctx.digest;
        let (nonce, next_nonce) = match record.pair() {
            Some(pair) => pair,
            None => return self.finish(&tx, reply, Err(ClientError::InvalidCredentials)),
        };
        let principal = self.inner.principal.as_str();
        let request = operation
            .request(principal)
            .with_username(principal)
            .with_proof(
                client_nonce(digest, &passkey, next_nonce),
                proof(digest, &passkey, nonce),
            )
            .with_timeout(self.inner.ctx.config.request_timeout);

        reply.notify(operation.verb());
        self.inner.stats.lock().requests += 1;
        let session = self.clone();
        self.inner.ctx.send(request).on_settled(move |result| {
            session.complete(tx, operation, record, reply, result)
        });
    }

    fn complete(
        &self,
        tx: Tx,
        operation: Operation,
        record: SessionRecord,
        reply: Reply,
        result: ClientResult<NormalizedResponse>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(error) => return self.finish(&tx, reply, Err(error)),
        };

        if response.head.has_credentials() {
            let rotated = response
                .head
                .nonce_pair()
                .ok_or(ClientError::InvalidCredentials)
                .and_then(|pair| verify_rotation(&record, pair));
            match rotated {
                Ok(rotated) => {
                    if let Err(error) = tx.merge(rotated) {
                        return self.finish(&tx, reply, Err(error));
                    }
                    self.inner.stats.lock().rotations += 1;
                    self.set_state(SessionState::Authenticated);
                }
                Err(error) => {
                    warn!(principal = %self.inner.principal, "nonce pair was not rotated");
                    return self.finish(&tx, reply, Err(error));
                }
            }
        }

        let outcome = operation.classify(response.status());
        match &outcome {
            Ok(()) if operation == Operation::Remove => {
                if let Err(error) = tx.set(None) {
                    return self.finish(&tx, reply, Err(error));
                }
                self.set_state(SessionState::Removed);
            }
            Ok(()) => {}
            Err(ClientError::Offline) => {
                warn!(
                    principal = %self.inner.principal,
                    status = response.status(),
                    operation = operation.verb(),
                    "unexpected status"
                );
            }
            Err(error) => {
                debug!(principal = %self.inner.principal, error = %error, "operation rejected");
            }
        }
        self.finish(&tx, reply, outcome.map(|()| response));
    }

    fn await_passkey(&self, tx: Tx, operation: Operation, reply: Reply) {
        release(&tx);
        let current = self.inner.passkey.lock().clone();
        let prompt = match current {
            Passkey::Prompt(prompt) => prompt,
            Passkey::Literal(_) => return self.enter(operation, reply),
        };
        reply.notify("awaiting passkey");

        let session = self.clone();
        prompt(PasskeyReply::new(move |supplied: String| {
            match validate_passkey(&supplied) {
                Ok(passkey) => {
                    *session.inner.passkey.lock() = Passkey::Literal(passkey);
                    session.enter(operation, reply);
                }
                Err(error) => {
                    session.inner.stats.lock().failures += 1;
                    reply.reject(error.into());
                }
            }
        }));
    }

    fn finish(&self, tx: &Tx, reply: Reply, result: ClientResult<NormalizedResponse>) {
        if result.is_err() {
            self.inner.stats.lock().failures += 1;
        }
        reply.settle(result);
        release(tx);
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("principal", &self.inner.principal)
            .field("state", &self.state())
            .finish()
    }
}

fn release(tx: &Tx) {
    if let Err(error) = tx.commit() {
        debug!(key = tx.key(), error = %error, "slot already released");
    }
}

fn body(response: NormalizedResponse) -> Value {
    response.body.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::transport::{MockTransport, TransportError};
    use serde_json::json;

    fn reverse(text: &str) -> String {
        text.chars().rev().collect()
    }

    fn setup(passkey: Passkey) -> (Arc<MockTransport>, AuthSession) {
        let mock = Arc::new(MockTransport::new());
        let ctx = ClientContext::new(ClientConfig::default(), mock.clone())
            .with_digest(Arc::new(reverse));
        let session = AuthSession::new(ctx, "alice", passkey);
        (mock, session)
    }

    fn challenge(nonce: &str, next: &str) -> NormalizedResponse {
        NormalizedResponse::new(401).with_authorization(["alice", nonce, next])
    }

    fn rotated(status: u16, nonce: &str, next: &str) -> NormalizedResponse {
        NormalizedResponse::new(status).with_authorization(["alice", nonce, next])
    }

    #[test]
    fn probe_then_prove_then_rotate() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        mock.push_response(challenge("n1", "n2"));
        mock.push_response(rotated(200, "n2", "n3").with_body(json!({"name": "Alice"})));

        let progress = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&progress);
        let read = session.read("alice").unwrap();
        read.on_progress(move |m| log.lock().push(m.to_string()));

        assert_eq!(read.wait(), Some(Ok(json!({"name": "Alice"}))));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(session.record(), Some(SessionRecord::new("n2", "n3")));
        assert_eq!(
            *progress.lock(),
            vec!["checking session", "probing", "reading"]
        );

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].username.as_deref(), Some("alice"));
        assert!(requests[0].proof.is_none());
        // proof = hash(passkey + nonce), client nonce = hash(hash(passkey + next))
        assert_eq!(
            requests[1].proof,
            Some(("secretn2".to_string(), reverse("secretn1")))
        );
        assert!(!session.inner.ctx.queue.is_locked("alice"));
    }

    #[test]
    fn authenticated_session_skips_probe() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        mock.push_response(challenge("n1", "n2"))
            .push_response(rotated(200, "n2", "n3"))
            .push_response(rotated(200, "n3", "n4"));

        session.read("alice").unwrap().wait();
        let second = session.read("bob").unwrap();
        assert_eq!(second.wait(), Some(Ok(Value::Null)));
        assert_eq!(session.stats().probes, 1);
        assert_eq!(session.stats().rotations, 2);
        assert_eq!(session.record(), Some(SessionRecord::new("n3", "n4")));
    }

    #[test]
    fn unrotated_pair_is_invalid_credentials() {
        let (mock, session) = setup(Passkey::literal("wrong").unwrap());
        mock.push_response(challenge("n1", "n2"))
            .push_response(challenge("n1", "n2"));

        let read = session.read("alice").unwrap();
        assert_eq!(read.wait(), Some(Err(ClientError::InvalidCredentials)));
        assert_eq!(session.state(), SessionState::Challenged);
        assert_eq!(session.record(), Some(SessionRecord::new("n1", "n2")));
        assert!(!session.inner.ctx.queue.is_locked("alice"));
    }

    #[test]
    fn unknown_principal() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        mock.push_response(NormalizedResponse::new(404));
        let result = session.read("alice").unwrap().wait();
        assert_eq!(result, Some(Err(ClientError::PrincipalNotFound)));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn transport_failure_during_probe_is_offline() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        mock.push_error(TransportError::NoResponse("refused".into()));
        let result = session.connect_to_collection("db1").unwrap().wait();
        assert_eq!(result, Some(Err(ClientError::Offline)));
        assert_eq!(session.stats().failures, 1);
    }

    #[test]
    fn status_mapping_after_rotation() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        mock.push_response(challenge("n1", "n2"))
            .push_response(rotated(400, "n2", "n3"))
            .push_response(rotated(403, "n3", "n4"))
            .push_response(rotated(500, "n4", "n5"));

        assert_eq!(
            session.create_collection("db1").unwrap().wait(),
            Some(Err(ClientError::AlreadyExists))
        );
        assert_eq!(
            session.remove_collection("db1").unwrap().wait(),
            Some(Err(ClientError::Forbidden))
        );
        assert_eq!(
            session.read_collection("db1").unwrap().wait(),
            Some(Err(ClientError::Offline))
        );
        assert_eq!(session.record(), Some(SessionRecord::new("n4", "n5")));
    }

    #[test]
    fn remove_tombstones_and_next_access_probes() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        mock.push_response(challenge("n1", "n2"))
            .push_response(rotated(204, "n2", "n3"))
            .push_response(NormalizedResponse::new(404));

        assert_eq!(session.remove().wait(), Some(Ok(true)));
        assert_eq!(session.state(), SessionState::Removed);
        assert_eq!(session.record(), None);

        let result = session.read("alice").unwrap().wait();
        assert_eq!(result, Some(Err(ClientError::PrincipalNotFound)));
        assert_eq!(session.stats().probes, 2);
    }

    #[test]
    fn validation_fails_synchronously() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        assert!(session.read("not a name").unwrap_err().is_validation());
        assert!(session.create_collection("").unwrap_err().is_validation());
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn prompt_releases_slot_and_resumes() {
        let held: Arc<Mutex<Option<PasskeyReply>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&held);
        let (mock, session) = setup(Passkey::prompt(move |reply| {
            *slot.lock() = Some(reply);
        }));
        mock.push_response(challenge("n1", "n2"))
            .push_response(rotated(200, "n2", "n3"));

        let read = session.read("alice").unwrap();
        assert_eq!(read.wait(), None);
        assert!(!session.inner.ctx.queue.is_locked("alice"));

        let reply = held.lock().take().unwrap();
        reply.supply("secret");
        assert_eq!(read.wait(), Some(Ok(Value::Null)));
        assert_eq!(session.state(), SessionState::Authenticated);
        assert_eq!(
            mock.requests()[1].proof,
            Some(("secretn2".to_string(), reverse("secretn1")))
        );
    }

    #[test]
    fn prompt_with_invalid_passkey_rejects() {
        let (mock, session) = setup(Passkey::prompt(|reply| reply.supply("abc")));
        mock.push_response(challenge("n1", "n2"));
        let result = session.read("alice").unwrap().wait();
        assert!(matches!(result, Some(Err(ClientError::Validation(_)))));
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn init_seeds_pair_once() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        let ready = session.init("n1", "n2").unwrap();
        assert_eq!(ready.wait().map(|r| r.is_ok()), Some(true));
        assert_eq!(session.state(), SessionState::Challenged);
        assert_eq!(
            session.init("x", "y").unwrap_err(),
            ClientError::fault("session initialized")
        );

        mock.push_response(rotated(200, "n2", "n3"));
        session.read("alice").unwrap().wait();
        assert_eq!(session.stats().probes, 0);
    }

    #[test]
    fn concurrent_operations_probe_once() {
        let (mock, session) = setup(Passkey::literal("secret").unwrap());
        mock.push_response(challenge("n1", "n2"))
            .push_response(rotated(200, "n2", "n3"))
            .push_response(rotated(200, "n3", "n4"));

        let a = session.connect_to_collection("db1").unwrap();
        let b = session.connect_to_collection("db1").unwrap();
        session.scheduler().run_until_idle();
        assert_eq!(a.outcome(), Some(Ok(())));
        assert_eq!(b.outcome(), Some(Ok(())));
        assert_eq!(session.stats().probes, 1);
        assert_eq!(mock.requests().len(), 3);
    }
}

//! Client entry point: principal and connection registries.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::context::ClientContext;
use crate::deferred::{Deferred, Resolver};
use crate::error::{ClientError, ClientResult};
use crate::scheduler::Scheduler;
use crate::session::{AuthSession, Passkey};
use crate::transport::Transport;
use parking_lot::Mutex;
use remdoc_protocol::{
    validate_collection_name, validate_passkey, validate_username, Dir, Method,
    NormalizedResponse, Request,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

struct ClientInner {
    ctx: ClientContext,
    users: Mutex<HashMap<String, AuthSession>>,
    connections: Mutex<HashMap<String, Deferred<Connection>>>,
}

/// Entry point owning the scheduler, transport and registries.
///
/// Clones share everything.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client for `domain` over `transport`.
    pub fn new<T>(domain: &str, transport: T) -> ClientResult<Self>
    where
        T: Transport + 'static,
    {
        let config = ClientConfig::new(domain)?;
        Ok(Self::with_context(ClientContext::new(
            config,
            Arc::new(transport),
        )))
    }

    /// Creates a client from an existing context.
    pub fn with_context(ctx: ClientContext) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                ctx,
                users: Mutex::new(HashMap::new()),
                connections: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &ClientContext {
        &self.inner.ctx
    }

    /// Returns the scheduler everything is delivered on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.ctx.scheduler
    }

    /// Returns the session of `name`, creating it if absent or if `force`.
    pub fn user(&self, name: &str, passkey: Passkey, force: bool) -> ClientResult<AuthSession> {
        let name = validate_username(name)?;
        let mut users = self.inner.users.lock();
        if !force {
            if let Some(session) = users.get(&name) {
                return Ok(session.clone());
            }
        }
        let passkey = match passkey {
            Passkey::Literal(text) => Passkey::Literal(validate_passkey(&text)?),
            prompt => prompt,
        };
        let session = AuthSession::new(self.inner.ctx.clone(), name.as_str(), passkey);
        users.insert(name, session.clone());
        Ok(session)
    }

    /// Checks whether a principal exists without authenticating.
    pub fn user_exists(&self, name: &str) -> ClientResult<Deferred<bool>> {
        let name = validate_username(name)?;
        let request = Request::new(Dir::Users, name.as_str(), Method::Get)
            .with_timeout(self.inner.ctx.config.probe_timeout);
        Ok(self.inner.ctx.send(request).try_map(move |response| {
            match response.status() {
                200 | 401 => Ok(true),
                404 => Ok(false),
                status => {
                    warn!(principal = %name, status, "unexpected status checking principal");
                    Err(ClientError::Offline)
                }
            }
        }))
    }

    /// Creates a principal and resolves with its own document.
    pub fn create_user(&self, name: &str, passkey: &str) -> ClientResult<Deferred<Value>> {
        let name = validate_username(name)?;
        let passkey = validate_passkey(passkey)?;
        let request = Request::new(Dir::Users, name.as_str(), Method::Put)
            .with_timeout(self.inner.ctx.config.probe_timeout);

        let (created, resolver) = Deferred::channel(self.scheduler());
        let progress = resolver.clone();
        self.scheduler().schedule(move || progress.notify("creating"));
        let client = self.clone();
        self.inner
            .ctx
            .send(request)
            .on_settled(move |result| client.finish_create(name, passkey, result, resolver));
        Ok(created)
    }

    fn finish_create(
        &self,
        name: String,
        passkey: String,
        result: ClientResult<NormalizedResponse>,
        resolver: Resolver<Value>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(error) => return resolver.reject(error),
        };
        match response.status() {
            201 => {
                let Some((nonce, next_nonce)) = response.head.nonce_pair() else {
                    warn!(principal = %name, "created principal without nonce pair");
                    return resolver.reject(ClientError::protocol("missing nonce pair"));
                };
                let seeded = self
                    .user(&name, Passkey::Literal(passkey), true)
                    .and_then(|session| session.init(nonce, next_nonce));
                match seeded {
                    Ok(ready) => {
                        let target = name.clone();
                        ready
                            .and_then(move |session| match session.read(&target) {
                                Ok(read) => read,
                                Err(error) => Deferred::rejected(session.scheduler(), error),
                            })
                            .forward(resolver);
                    }
                    Err(error) => resolver.reject(error),
                }
            }
            401 => resolver.reject(ClientError::AlreadyExists),
            status => {
                warn!(principal = %name, status, "unexpected status creating principal");
                resolver.reject(ClientError::Offline);
            }
        }
    }

    /// Returns a connection to `collection` as `name`, shared by every
    /// caller asking for the same pair.
    pub fn connect(
        &self,
        collection: &str,
        name: &str,
        passkey: Passkey,
    ) -> ClientResult<Deferred<Connection>> {
        let collection = validate_collection_name(collection)?;
        let name = validate_username(name)?;
        let key = format!("{}:{}", collection, name);
        if let Some(existing) = self.inner.connections.lock().get(&key) {
            return Ok(existing.clone());
        }

        let session = self.user(&name, passkey, true)?;
        let pending = session
            .connect_to_collection(&collection)?
            .map(move |()| Connection::new(collection, session));
        self.inner
            .connections
            .lock()
            .insert(key.clone(), pending.clone());

        let client = self.clone();
        pending.on_rejected(move |_| {
            client.inner.connections.lock().remove(&key);
        });
        Ok(pending)
    }

    /// Returns the cached principal names.
    pub fn users(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.users.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("context", &self.inner.ctx)
            .field("users", &self.inner.users.lock().len())
            .field("connections", &self.inner.connections.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::json;

    fn client() -> (Arc<MockTransport>, Client) {
        let mock = Arc::new(MockTransport::new());
        let ctx = ClientContext::new(ClientConfig::default(), mock.clone());
        (mock, Client::with_context(ctx))
    }

    #[test]
    fn user_registry_caches_unless_forced() {
        let (_mock, client) = client();
        let a = client.user("alice", Passkey::literal("secret").unwrap(), false).unwrap();
        a.init("n1", "n2").unwrap();
        let b = client.user("alice", Passkey::literal("other1").unwrap(), false).unwrap();
        assert!(b.init("x", "y").is_err());

        let c = client.user("alice", Passkey::literal("secret").unwrap(), true).unwrap();
        assert!(c.init("x", "y").is_ok());
        assert_eq!(client.users(), vec!["alice".to_string()]);
    }

    #[test]
    fn user_validates_names_and_passkeys() {
        let (_mock, client) = client();
        assert!(client
            .user("bad name", Passkey::literal("secret").unwrap(), false)
            .is_err());
        assert!(client
            .user("alice", Passkey::Literal("abc".into()), false)
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn user_exists_statuses() {
        let (mock, client) = client();
        mock.push_response(NormalizedResponse::new(401))
            .push_response(NormalizedResponse::new(404))
            .push_response(NormalizedResponse::new(500));
        assert_eq!(client.user_exists("alice").unwrap().wait(), Some(Ok(true)));
        assert_eq!(client.user_exists("bob").unwrap().wait(), Some(Ok(false)));
        assert_eq!(
            client.user_exists("carol").unwrap().wait(),
            Some(Err(ClientError::Offline))
        );
        assert!(mock.requests()[0].username.is_none());
    }

    #[test]
    fn create_user_seeds_session_and_reads_self() {
        let (mock, client) = client();
        mock.push_response(NormalizedResponse::new(201).with_authorization(["alice", "n1", "n2"]))
            .push_response(
                NormalizedResponse::new(200)
                    .with_authorization(["alice", "n2", "n3"])
                    .with_body(json!({"name": "alice"})),
            );

        let created = client.create_user("alice", "secret").unwrap();
        assert_eq!(created.wait(), Some(Ok(json!({"name": "alice"}))));

        let session = client.user("alice", Passkey::literal("ignored").unwrap(), false).unwrap();
        assert_eq!(session.stats().probes, 0);
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn create_existing_user() {
        let (mock, client) = client();
        mock.push_response(NormalizedResponse::new(401));
        assert_eq!(
            client.create_user("alice", "secret").unwrap().wait(),
            Some(Err(ClientError::AlreadyExists))
        );
        assert!(client.create_user("alice", "abc").is_err());
    }

    #[test]
    fn connect_is_shared_and_cached() {
        let (mock, client) = client();
        mock.push_response(NormalizedResponse::new(401).with_authorization(["alice", "n1", "n2"]))
            .push_response(NormalizedResponse::new(200).with_authorization(["alice", "n2", "n3"]));

        let first = client.connect("db1", "alice", Passkey::literal("secret").unwrap()).unwrap();
        let second = client.connect("db1", "alice", Passkey::literal("secret").unwrap()).unwrap();
        client.scheduler().run_until_idle();

        let cxn = first.outcome().unwrap().unwrap();
        assert_eq!(cxn.collection(), "db1");
        assert_eq!(second.outcome().unwrap().unwrap().collection(), "db1");
        assert_eq!(mock.requests().len(), 2);
    }

    #[test]
    fn failed_connect_is_not_cached() {
        let (mock, client) = client();
        mock.push_response(NormalizedResponse::new(404));
        let failed = client.connect("db1", "alice", Passkey::literal("secret").unwrap()).unwrap();
        assert_eq!(failed.wait().unwrap().unwrap_err(), ClientError::PrincipalNotFound);
        assert!(client.inner.connections.lock().is_empty());
    }
}

//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so any library
//! (or an in-process loopback) can carry the bytes. The transport owns the
//! envelope: it JSON-encodes the request payload, posts it to
//! `<base_url>/<dir>/<name>` and normalizes what comes back.

use crate::config::ClientConfig;
use crate::transport::{Transport, TransportError, TransportResult};
use parking_lot::RwLock;
use remdoc_protocol::{NormalizedResponse, Request};
use std::time::Duration;
use tracing::debug;

/// Raw result of an HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status line code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }
}

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Posts `body` to `url`, giving up after `timeout`.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> TransportResult<HttpResponse>;
}

/// JSON-over-HTTP transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    default_timeout: Duration,
    last_error: RwLock<Option<TransportError>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport posting under `base_url` (e.g. `http://localhost`).
    pub fn new(base_url: impl Into<String>, client: C, default_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            default_timeout,
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport from the base URL and fallback deadline of
    /// `config`.
    pub fn from_config(config: &ClientConfig, client: C) -> Self {
        Self::new(config.base_url.clone(), client, config.transport_timeout)
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last failure, cleared by the next success.
    pub fn last_error(&self) -> Option<TransportError> {
        self.last_error.read().clone()
    }

    fn url(&self, request: &Request) -> TransportResult<String> {
        if self.base_url.is_empty() {
            return Err(TransportError::BadUrl("empty base url".into()));
        }
        Ok(format!("{}/{}", self.base_url, request.path()))
    }

    fn exchange(&self, request: &Request) -> TransportResult<NormalizedResponse> {
        let url = self.url(request)?;
        let payload = serde_json::to_vec(&request.payload())
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        debug!(url = %url, payload = %String::from_utf8_lossy(&payload), "sending request");

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let response = self.client.post(&url, payload, timeout)?;
        if response.status != 200 {
            return Err(TransportError::NotOk(response.status));
        }

        let raw: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::BadResponse(e.to_string()))?;
        debug!(url = %url, response = %raw, "received response");

        let normalized = NormalizedResponse::from_raw(&raw);
        if normalized.status() == 0 {
            return Err(TransportError::BadResponse("missing status".into()));
        }
        Ok(normalized)
    }
}

impl<C: HttpClient> Transport for HttpTransport<C> {
    fn send(&self, request: &Request) -> TransportResult<NormalizedResponse> {
        let result = self.exchange(request);
        *self.last_error.write() = result.as_ref().err().cloned();
        result
    }
}

/// A server that answers loopback posts in-process.
pub trait LoopbackServer {
    /// Handles a post to `path` (the URL without scheme and host).
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse;
}

/// An [`HttpClient`] that routes posts straight to a [`LoopbackServer`].
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a client bound to `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>, _timeout: Duration) -> TransportResult<HttpResponse> {
        let rest = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| TransportError::BadUrl(url.to_string()))?;
        let path = rest.find('/').map(|i| &rest[i + 1..]).unwrap_or("");
        Ok(self.server.handle_post(path, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use remdoc_protocol::{Dir, Method};
    use serde_json::json;

    struct Canned {
        response: TransportResult<HttpResponse>,
        seen: Mutex<Vec<(String, serde_json::Value, Duration)>>,
    }

    impl Canned {
        fn new(response: TransportResult<HttpResponse>) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for Canned {
        fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> TransportResult<HttpResponse> {
            let body = serde_json::from_slice(&body).unwrap();
            self.seen.lock().push((url.to_string(), body, timeout));
            self.response.clone()
        }
    }

    fn ok(body: serde_json::Value) -> TransportResult<HttpResponse> {
        Ok(HttpResponse::new(200, body.to_string().into_bytes()))
    }

    fn transport(response: TransportResult<HttpResponse>) -> HttpTransport<Canned> {
        HttpTransport::new("http://store", Canned::new(response), Duration::from_secs(10))
    }

    #[test]
    fn posts_payload_to_resource_url() {
        let t = transport(ok(json!({"head": {"status": 200, "authorization": ["alice", "a", "b"]}})));
        let req = Request::new(Dir::Users, "alice", Method::Get)
            .with_username("alice")
            .with_timeout(Duration::from_secs(7));
        let response = t.send(&req).unwrap();
        assert_eq!(response.head.nonce_pair(), Some(("a", "b")));

        let seen = t.client.seen.lock();
        assert_eq!(seen[0].0, "http://store/users/alice");
        assert_eq!(
            seen[0].1,
            json!({"head": {"method": "get", "authorization": ["alice"]}})
        );
        assert_eq!(seen[0].2, Duration::from_secs(7));
    }

    #[test]
    fn built_from_config() {
        let config = ClientConfig::new("store.local")
            .unwrap()
            .with_transport_timeout(Duration::from_secs(3));
        let t = HttpTransport::from_config(&config, Canned::new(ok(json!({"head": {"status": 200}}))));
        assert_eq!(t.base_url(), "http://store.local");
        t.send(&Request::new(Dir::Users, "bob", Method::Get)).unwrap();
        let seen = t.client.seen.lock();
        assert_eq!(seen[0].0, "http://store.local/users/bob");
        assert_eq!(seen[0].2, Duration::from_secs(3));
    }

    #[test]
    fn default_timeout_applies() {
        let t = transport(ok(json!({"head": {"status": 204}})));
        t.send(&Request::new(Dir::Databases, "db1", Method::Delete)).unwrap();
        assert_eq!(t.client.seen.lock()[0].2, Duration::from_secs(10));
    }

    #[test]
    fn failures_are_classified() {
        let t = transport(Ok(HttpResponse::new(500, Vec::new())));
        let req = Request::new(Dir::Users, "alice", Method::Get);
        assert_eq!(t.send(&req), Err(TransportError::NotOk(500)));
        assert_eq!(t.last_error(), Some(TransportError::NotOk(500)));

        let t = transport(Ok(HttpResponse::new(200, b"not json".to_vec())));
        assert!(matches!(t.send(&req), Err(TransportError::BadResponse(_))));

        let t = transport(ok(json!({"head": {}})));
        assert!(matches!(t.send(&req), Err(TransportError::BadResponse(_))));

        let t = transport(Err(TransportError::NoResponse("refused".into())));
        assert!(matches!(t.send(&req), Err(TransportError::NoResponse(_))));
    }

    #[test]
    fn success_clears_last_error() {
        struct Flaky(Mutex<u32>);
        impl HttpClient for Flaky {
            fn post(&self, _: &str, _: Vec<u8>, _: Duration) -> TransportResult<HttpResponse> {
                let mut calls = self.0.lock();
                *calls += 1;
                if *calls == 1 {
                    Err(TransportError::Timeout)
                } else {
                    Ok(HttpResponse::new(200, br#"{"head":{"status":200}}"#.to_vec()))
                }
            }
        }
        let t = HttpTransport::new("http://store", Flaky(Mutex::new(0)), Duration::from_secs(1));
        let req = Request::new(Dir::Users, "", Method::Get);
        assert!(t.send(&req).is_err());
        assert_eq!(t.last_error(), Some(TransportError::Timeout));
        assert!(t.send(&req).is_ok());
        assert_eq!(t.last_error(), None);
    }

    #[test]
    fn loopback_strips_scheme_and_host() {
        struct Echo;
        impl LoopbackServer for Echo {
            fn handle_post(&self, path: &str, _body: &[u8]) -> HttpResponse {
                let body = json!({"head": {"status": 200}, "body": {"path": path}});
                HttpResponse::new(200, body.to_string().into_bytes())
            }
        }
        let t = HttpTransport::new(
            "http://localhost:8080",
            LoopbackClient::new(Echo),
            Duration::from_secs(1),
        );
        let response = t
            .send(&Request::new(Dir::Databases, "db1", Method::Query))
            .unwrap();
        assert_eq!(response.body, Some(json!({"path": "databases/db1"})));
    }
}

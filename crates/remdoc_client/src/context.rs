//! Shared collaborators of every session.

use crate::config::ClientConfig;
use crate::deferred::Deferred;
use crate::digest::{Digest, Sha256Digest};
use crate::error::ClientError;
use crate::queue::SessionQueue;
use crate::scheduler::Scheduler;
use crate::transport::Transport;
use remdoc_protocol::{NormalizedResponse, Request};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a session needs besides its own state.
#[derive(Clone)]
pub struct ClientContext {
    /// Run queue all results are delivered on.
    pub scheduler: Scheduler,
    /// Per-principal lock and nonce store.
    pub queue: SessionQueue,
    /// Network exchange.
    pub transport: Arc<dyn Transport>,
    /// Proof digest.
    pub digest: Arc<dyn Digest>,
    /// Timeouts and base URL.
    pub config: ClientConfig,
}

impl ClientContext {
    /// Creates a context with a fresh scheduler and the SHA-256 digest.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let scheduler = Scheduler::new();
        Self {
            queue: SessionQueue::new(&scheduler),
            scheduler,
            transport,
            digest: Arc::new(Sha256Digest),
            config,
        }
    }

    /// Replaces the digest.
    pub fn with_digest(mut self, digest: Arc<dyn Digest>) -> Self {
        self.digest = digest;
        self
    }

    /// Sends `request` on the next tick.
    ///
    /// Transport failures are logged and surface as `Offline`.
    pub fn send(&self, request: Request) -> Deferred<NormalizedResponse> {
        let transport = Arc::clone(&self.transport);
        Deferred::new(&self.scheduler, move |resolver| {
            let path = request.path();
            match transport.send(&request) {
                Ok(response) => {
                    debug!(path = %path, status = response.status(), "response");
                    resolver.resolve(response);
                }
                Err(error) => {
                    warn!(path = %path, error = %error, "transport failure");
                    resolver.reject(ClientError::Offline);
                }
            }
        })
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

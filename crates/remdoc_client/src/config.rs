//! Configuration for the client engine.

use remdoc_protocol::{validate_domain, ValidationResult};
use std::time::Duration;

/// Default deadline for authenticated session requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(7);

/// Default deadline for unauthenticated probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(7);

/// Default deadline the HTTP adapter applies when a request carries none.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Store base URL, `http://<domain>`.
    pub base_url: String,
    /// Deadline for authenticated requests.
    pub request_timeout: Duration,
    /// Deadline for probes and principal creation.
    pub probe_timeout: Duration,
    /// Fallback deadline for the HTTP adapter.
    pub transport_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration for `domain`, which must not carry a scheme.
    pub fn new(domain: &str) -> ValidationResult<Self> {
        Ok(Self {
            base_url: validate_domain(domain)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            transport_timeout: DEFAULT_TRANSPORT_TIMEOUT,
        })
    }

    /// Sets the authenticated request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the probe deadline.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the HTTP adapter fallback deadline.
    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            transport_timeout: DEFAULT_TRANSPORT_TIMEOUT,
        }
    }
}

//! Transport layer abstraction.

use parking_lot::Mutex;
use remdoc_protocol::{NormalizedResponse, Request};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures below the protocol: the exchange did not produce a usable
/// response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request URL could not be built.
    #[error("bad url: {0}")]
    BadUrl(String),

    /// No response was received.
    #[error("no response: {0}")]
    NoResponse(String),

    /// The HTTP exchange itself failed with a non-200 status.
    #[error("http status {0}")]
    NotOk(u16),

    /// The response could not be decoded or carried no status.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// The deadline passed.
    #[error("timed out")]
    Timeout,

    /// The request could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

/// Sends one request and returns its normalized response.
///
/// Implementations block until the exchange completes or the request's
/// timeout elapses. Sessions call transports from scheduler tasks.
pub trait Transport: Send + Sync {
    /// Performs the exchange.
    fn send(&self, request: &Request) -> TransportResult<NormalizedResponse>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: &Request) -> TransportResult<NormalizedResponse> {
        (**self).send(request)
    }
}

/// A scripted transport for tests.
///
/// Responses are returned in the order they were pushed; every request is
/// recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<TransportResult<NormalizedResponse>>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    /// Creates a transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: NormalizedResponse) -> &Self {
        self.responses.lock().push_back(Ok(response));
        self
    }

    /// Queues a failure.
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    /// Returns every request sent so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Returns the most recent request.
    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().last().cloned()
    }

    /// Number of scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &Request) -> TransportResult<NormalizedResponse> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::NoResponse("no scripted response".into())))
    }
}

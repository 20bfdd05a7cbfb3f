//! Error types for the client engine.

use remdoc_protocol::ValidationError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by sessions, connections and transactions.
///
/// Errors are `Clone` so one rejection can be delivered to every observer
/// of a [`Deferred`](crate::Deferred).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A name or passkey was rejected before any request was built.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The principal may not perform this operation.
    #[error("forbidden")]
    Forbidden,

    /// The requested resource does not exist.
    #[error("not found")]
    NotFound,

    /// The principal itself does not exist.
    #[error("principal not found")]
    PrincipalNotFound,

    /// The resource already exists.
    #[error("already exists")]
    AlreadyExists,

    /// The passkey proof was rejected, or the server did not rotate nonces.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The store is unreachable or answered with an unexpected status.
    #[error("offline")]
    Offline,

    /// A response did not match the shape of its request.
    #[error("unexpected protocol response: {0}")]
    UnexpectedProtocolResponse(String),

    /// A session slot or transaction was used after being released.
    #[error("transaction fault: {0}")]
    TransactionFault(String),
}

impl ClientError {
    /// Creates an unexpected protocol response error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::UnexpectedProtocolResponse(message.into())
    }

    /// Creates a transaction fault.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::TransactionFault(message.into())
    }

    /// The fault raised when a released slot or committed transaction is used.
    pub fn committed() -> Self {
        Self::fault("transaction committed")
    }

    /// Returns true if the error is a local validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    /// Returns true if the failure is attributed to the network or the
    /// server rather than the request.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            ClientError::Offline | ClientError::UnexpectedProtocolResponse(_)
        )
    }
}

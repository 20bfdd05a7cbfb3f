//! Authentication state machine.
//!
//! The session moves through explicit states; [`plan`] decides the next
//! step from the state alone so the transition table can be tested without
//! a transport.
//!
//! ```text
//! Uninitialized --probe--> Challenged --proof--> Authenticated --proof--> Authenticated
//!       ^                       |                      |
//!       |                       +-------remove---------+--> Removed
//!       +--------------------------next access-----------------+
//! ```

use crate::error::{ClientError, ClientResult};
use crate::queue::SessionRecord;
use remdoc_protocol::{Dir, Method, Request};
use serde_json::Value;

/// Where a principal's session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No nonce pair is known.
    #[default]
    Uninitialized,
    /// A nonce pair was issued but no proof has been accepted yet.
    Challenged,
    /// At least one proof was accepted and the pair rotated.
    Authenticated,
    /// The principal was removed; the next access starts over.
    Removed,
}

impl SessionState {
    /// Returns true if a nonce pair is held.
    pub fn has_nonces(&self) -> bool {
        matches!(self, SessionState::Challenged | SessionState::Authenticated)
    }
}

/// The next thing a session must do before an operation can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Ask the store for a nonce pair.
    Probe,
    /// Send the operation with a passkey proof.
    Prove,
    /// Release the slot and wait for the passkey prompt to answer.
    Pending,
}

/// Decides the next step.
pub fn plan(state: SessionState, passkey_known: bool) -> Step {
    match state {
        SessionState::Uninitialized | SessionState::Removed => Step::Probe,
        SessionState::Challenged | SessionState::Authenticated if passkey_known => Step::Prove,
        SessionState::Challenged | SessionState::Authenticated => Step::Pending,
    }
}

/// Checks that the store rotated both nonces and returns the new record.
///
/// A response echoing either part of the current pair means the proof was
/// not accepted.
pub fn verify_rotation(current: &SessionRecord, returned: (&str, &str)) -> ClientResult<SessionRecord> {
    let (nonce, next_nonce) = returned;
    if current.nonce.as_deref() == Some(nonce) || current.next_nonce.as_deref() == Some(next_nonce) {
        return Err(ClientError::InvalidCredentials);
    }
    Ok(SessionRecord::new(nonce, next_nonce))
}

/// A passkey-proved operation a session performs on behalf of its principal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Read a principal document.
    Read {
        /// Principal to read.
        target: String,
    },
    /// Replace a principal document.
    Write {
        /// Principal to write.
        target: String,
        /// New document.
        document: Value,
    },
    /// Remove the session's own principal.
    Remove,
    /// Check access to a collection.
    Connect {
        /// Collection name.
        collection: String,
    },
    /// Create a collection.
    CreateCollection {
        /// Collection name.
        collection: String,
    },
    /// Remove a collection.
    RemoveCollection {
        /// Collection name.
        collection: String,
    },
    /// Read a collection descriptor.
    ReadCollection {
        /// Collection name.
        collection: String,
    },
    /// Replace a collection descriptor.
    WriteCollection {
        /// Collection name.
        collection: String,
        /// New descriptor.
        document: Value,
    },
    /// Run a batch of document operations.
    Query {
        /// Collection name.
        collection: String,
        /// Encoded batch operations.
        batch: Value,
    },
}

impl Operation {
    /// Progress message reported while the operation is in flight.
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Read { .. } | Operation::ReadCollection { .. } => "reading",
            Operation::Write { .. } | Operation::WriteCollection { .. } => "writing",
            Operation::Remove | Operation::RemoveCollection { .. } => "removing",
            Operation::Connect { .. } => "connecting",
            Operation::CreateCollection { .. } => "creating",
            Operation::Query { .. } => "querying",
        }
    }

    /// Builds the request, without authorization, for `principal`.
    pub fn request(&self, principal: &str) -> Request {
        match self {
            Operation::Read { target } => Request::new(Dir::Users, target.as_str(), Method::Get),
            Operation::Write { target, document } => {
                Request::new(Dir::Users, target.as_str(), Method::Put).with_body(document.clone())
            }
            Operation::Remove => Request::new(Dir::Users, principal, Method::Delete),
            Operation::Connect { collection } => {
                Request::new(Dir::Databases, collection.as_str(), Method::Query)
                    .with_body(Value::Array(Vec::new()))
            }
            Operation::CreateCollection { collection } => {
                Request::new(Dir::Databases, collection.as_str(), Method::Put)
            }
            Operation::RemoveCollection { collection } => {
                Request::new(Dir::Databases, collection.as_str(), Method::Delete)
            }
            Operation::ReadCollection { collection } => {
                Request::new(Dir::Databases, collection.as_str(), Method::Get)
            }
            Operation::WriteCollection {
                collection,
                document,
            } => Request::new(Dir::Databases, collection.as_str(), Method::Put)
                .with_body(document.clone()),
            Operation::Query { collection, batch } => {
                Request::new(Dir::Databases, collection.as_str(), Method::Query)
                    .with_body(batch.clone())
            }
        }
    }

    /// Maps a response status to the operation's outcome.
    pub fn classify(&self, status: u16) -> ClientResult<()> {
        match status {
            200..=299 => Ok(()),
            400 if matches!(self, Operation::CreateCollection { .. }) => {
                Err(ClientError::AlreadyExists)
            }
            401 => Err(ClientError::InvalidCredentials),
            403 => Err(ClientError::Forbidden),
            404 => Err(ClientError::NotFound),
            _ => Err(ClientError::Offline),
        }
    }
}

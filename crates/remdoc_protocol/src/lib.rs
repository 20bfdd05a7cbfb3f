//! # remdoc Protocol
//!
//! Wire types and helpers for the remdoc document store protocol.
//!
//! This crate provides:
//! - The request payload (`{head: {method, authorization}, body}`) and the
//!   normalized response shape every transport must produce
//! - Batch operations, statements and the `BatchRequest` builder
//! - Batch response items as returned by the `query` endpoint
//! - Name validators for principals, passkeys, collections and domains
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod messages;
mod operation;
mod validate;

pub use batch::{BatchRequest, BatchResponseItem, QueryStatements};
pub use error::{NameKind, ValidationError, ValidationReason, ValidationResult};
pub use messages::{Dir, Method, NormalizedResponse, Request, RequestHead, RequestPayload, ResponseHead};
pub use operation::{Action, BatchOperation, Key, Operator, Scalar, Statement};
pub use validate::{
    validate_collection_name, validate_domain, validate_passkey, validate_username,
};

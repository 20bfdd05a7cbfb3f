//! # remdoc client
//!
//! Session engine for a remote, nonce-authenticated JSON document store.
//!
//! This crate provides:
//! - A cooperative [`Scheduler`] and the [`Deferred`] result primitive
//! - A per-principal [`SessionQueue`] serializing access to nonce state
//! - The [`AuthSession`] state machine (probe → challenge → proof → rotation)
//! - [`Client`] registries for principals and [`Connection`]s
//! - Transport abstraction with an HTTP adapter and a scripted mock
//!
//! ## Authentication
//!
//! The store hands out a nonce pair `(nonce, next_nonce)` on an
//! unauthenticated probe. Every authenticated request carries
//! `hash(passkey + nonce)` as proof and `hash(hash(passkey + next_nonce))` as
//! client nonce; the store answers with a fresh pair. A response that does
//! not rotate both nonces is treated as a rejected passkey.
//!
//! ## Key Invariants
//!
//! - At most one operation per principal holds session state at a time
//! - Operations of one principal run in submission order
//! - The session slot is released on every success and failure path
//! - Every result settles at most once, and never inside the call that
//!   created it

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connection;
mod context;
mod deferred;
mod digest;
mod error;
mod http;
mod queue;
mod scheduler;
mod session;
mod state;
mod transport;

pub use client::Client;
pub use config::{
    ClientConfig, DEFAULT_PROBE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TRANSPORT_TIMEOUT,
};
pub use connection::Connection;
pub use context::ClientContext;
pub use deferred::{Deferred, DeferredState, Resolver};
pub use digest::{client_nonce, proof, to_hex, Digest, Sha256Digest};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use queue::{Merge, SessionQueue, SessionRecord, Slot, Transaction};
pub use scheduler::Scheduler;
pub use session::{AuthSession, Passkey, PasskeyReply, SessionStats};
pub use state::{plan, verify_rotation, Operation, SessionState, Step};
pub use transport::{MockTransport, Transport, TransportError, TransportResult};

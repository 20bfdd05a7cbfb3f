//! # remdoc Testkit
//!
//! Test utilities for remdoc.
//!
//! This crate provides:
//! - [`FakeServer`], an in-memory store speaking the nonce protocol, usable
//!   as a [`remdoc_client::Transport`] or behind the HTTP adapter
//! - Fixtures: a seeded principal, a collection and a note model
//! - Property-based test generators using proptest
//! - Test logging initialization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use remdoc_testkit::prelude::*;
//!
//! #[test]
//! fn reads_own_document() {
//!     let server = seeded_server();
//!     let client = client_for(&server);
//!     let alice = client.user(ALICE, alice_passkey(), false).unwrap();
//!     assert!(alice.read(ALICE).unwrap().wait().unwrap().is_ok());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fake_server;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fake_server::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use fake_server::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;

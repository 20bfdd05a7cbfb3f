//! # remdoc model
//!
//! Typed documents on top of a [`remdoc_client::Connection`].
//!
//! - [`Node`] schemas canonicalize raw JSON into a declared shape and
//!   extract secondary indexes
//! - [`Model`]s name a schema and mint keys with a [`UidGenerator`]
//! - [`EntityHandle`]s are live documents, updated by deep merge
//! - [`Pipeline`] batches reads, writes, deletes and queries through an
//!   [`EntityCache`]
//!
//! ## Example
//!
//! ```rust,ignore
//! let models = ModelRegistry::new();
//! models.register(Model::new("note", [("title", Node::string().index_as("title"))]));
//!
//! let db = Pipeline::connect(&client, "notes", "alice", passkey, models, EntityCache::new())?;
//! db.on_fulfilled(|db| {
//!     let note = db.create("note").unwrap();
//!     note.update(&json!({"title": "hello"})).unwrap();
//!     db.put(&note);
//!     db.query().kind("note").eq("title", "hello").append();
//!     db.flush();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod entity;
mod error;
mod merge;
mod model;
mod pipeline;
mod registry;
mod schema;
mod uid;

pub use cache::EntityCache;
pub use entity::{Entity, EntityHandle};
pub use error::{ModelError, ModelResult};
pub use merge::deep_merge;
pub use model::{Model, KIND_INDEX};
pub use pipeline::{Pipeline, QueryBuilder};
pub use registry::ModelRegistry;
pub use schema::{IndexFn, IndexValue, Indexes, Node, NodeKind};
pub use uid::UidGenerator;

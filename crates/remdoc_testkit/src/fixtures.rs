//! Test fixtures: a seeded server, a client bound to it and a note model.

use crate::fake_server::FakeServer;
use remdoc_client::{Client, ClientConfig, ClientContext, HttpTransport, LoopbackClient, Passkey};
use remdoc_model::{EntityCache, Model, ModelRegistry, Node, Pipeline};
use std::sync::Arc;

/// The seeded principal.
pub const ALICE: &str = "alice";

/// Passkey of [`ALICE`].
pub const ALICE_PASSKEY: &str = "secret123";

/// A collection owned by [`ALICE`].
pub const NOTES: &str = "notes";

/// A server with [`ALICE`] and the [`NOTES`] collection.
pub fn seeded_server() -> FakeServer {
    let server = FakeServer::new();
    server.add_user(ALICE, ALICE_PASSKEY).add_collection(NOTES, ALICE);
    server
}

/// A client talking to `server` directly.
pub fn client_for(server: &FakeServer) -> Client {
    Client::new("localhost", server.clone()).expect("valid domain")
}

/// A client talking to `server` through the HTTP adapter.
pub fn http_client_for(server: &FakeServer) -> Client {
    let config = ClientConfig::new("localhost").expect("valid domain");
    let transport = HttpTransport::from_config(&config, LoopbackClient::new(server.clone()));
    Client::with_context(ClientContext::new(config, Arc::new(transport)))
}

/// [`ALICE`]'s passkey.
pub fn alice_passkey() -> Passkey {
    Passkey::literal(ALICE_PASSKEY).expect("valid passkey")
}

/// A `note` model: title, body, stars and tags, with title, stars and
/// tags indexed.
pub fn note_model() -> Model {
    Model::new(
        "note",
        [
            ("title", Node::string().index_as("title")),
            ("body", Node::string()),
            ("stars", Node::number().index_as("stars")),
            ("tags", Node::list(Node::string()).index_as("tags")),
        ],
    )
}

/// A registry holding [`note_model`].
pub fn note_registry() -> ModelRegistry {
    let models = ModelRegistry::new();
    models.register(note_model());
    models
}

/// Connects [`ALICE`] to [`NOTES`] and drives the scheduler until the
/// pipeline is ready.
pub fn connect_notes(client: &Client) -> Pipeline {
    Pipeline::connect(
        client,
        NOTES,
        ALICE,
        alice_passkey(),
        note_registry(),
        EntityCache::new(),
    )
    .expect("valid names")
    .wait()
    .expect("connect settled")
    .expect("connected")
}

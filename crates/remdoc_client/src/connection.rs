//! A principal's access to one collection.

use crate::deferred::Deferred;
use crate::error::{ClientError, ClientResult};
use crate::session::AuthSession;
use remdoc_protocol::{BatchRequest, BatchResponseItem, NormalizedResponse};

/// Sends batches of document operations to one collection as one principal.
#[derive(Debug, Clone)]
pub struct Connection {
    collection: String,
    session: AuthSession,
}

impl Connection {
    /// Creates a connection. The collection name must already be validated.
    pub fn new(collection: impl Into<String>, session: AuthSession) -> Self {
        Self {
            collection: collection.into(),
            session,
        }
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the session the batches are proved with.
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Starts an empty batch.
    pub fn request(&self) -> BatchRequest {
        BatchRequest::new()
    }

    /// Sends `batch` and returns one response item per operation, in order.
    ///
    /// A body that is not a list of items, or a list of the wrong length,
    /// rejects with `UnexpectedProtocolResponse`.
    pub fn send(&self, batch: &BatchRequest) -> Deferred<Vec<BatchResponseItem>> {
        self.send_with(batch, |items| items)
    }

    /// Like [`send`](Self::send), but hands the decoded items to `handler`
    /// while the principal's slot is still held. Local state derived from
    /// the response is updated there, before any later operation of the
    /// same principal starts.
    pub fn send_with<U, F>(&self, batch: &BatchRequest, handler: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(ClientResult<Vec<BatchResponseItem>>) -> ClientResult<U> + Send + 'static,
    {
        let expected = batch.len();
        self.session.query_with(
            self.collection.clone(),
            batch.operations(),
            move |response| handler(response.and_then(|response| decode(response, expected))),
        )
    }
}

fn decode(response: NormalizedResponse, expected: usize) -> ClientResult<Vec<BatchResponseItem>> {
    let body = response
        .body
        .ok_or_else(|| ClientError::protocol("missing batch body"))?;
    let items =
        BatchResponseItem::decode_all(&body).map_err(|e| ClientError::protocol(e.to_string()))?;
    if items.len() != expected {
        return Err(ClientError::protocol(format!(
            "expected {} batch items, got {}",
            expected,
            items.len()
        )));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::context::ClientContext;
    use crate::queue::{SessionQueue, SessionRecord};
    use crate::session::Passkey;
    use crate::transport::MockTransport;
    use remdoc_protocol::RequestPayload;
    use serde_json::json;
    use std::sync::Arc;

    fn connected() -> (Arc<MockTransport>, Connection) {
        let (mock, _, cxn) = connected_with_queue();
        (mock, cxn)
    }

    fn connected_with_queue() -> (Arc<MockTransport>, SessionQueue, Connection) {
        let mock = Arc::new(MockTransport::new());
        let ctx = ClientContext::new(ClientConfig::default(), mock.clone());
        let queue = ctx.queue.clone();
        let session = AuthSession::new(ctx, "alice", Passkey::literal("secret").unwrap());
        session.init("n1", "n2").unwrap().wait();
        (mock, queue, Connection::new("db1", session))
    }

    fn reply(nonce: &str, next: &str, body: serde_json::Value) -> NormalizedResponse {
        NormalizedResponse::new(200)
            .with_authorization(["alice", nonce, next])
            .with_body(body)
    }

    #[test]
    fn sends_batch_and_decodes_items() {
        let (mock, cxn) = connected();
        mock.push_response(reply(
            "n2",
            "n3",
            json!([
                {"action": "get", "status": 404},
                {"action": "delete", "status": 204}
            ]),
        ));

        let mut batch = cxn.request();
        batch.get("a").remove("b");
        let items = cxn.send(&batch).wait().unwrap().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].status, 204);

        let sent = mock.last_request().unwrap();
        assert_eq!(sent.path(), "databases/db1");
        let payload: RequestPayload = sent.payload();
        assert_eq!(payload.body.unwrap().as_array().unwrap().len(), 2);
        assert_eq!(
            cxn.session().record(),
            Some(SessionRecord::new("n2", "n3"))
        );
    }

    #[test]
    fn length_mismatch_is_protocol_error() {
        let (mock, cxn) = connected();
        mock.push_response(reply("n2", "n3", json!([{"action": "get", "status": 200}])));

        let mut batch = cxn.request();
        batch.get("a").get("b");
        let result = cxn.send(&batch).wait().unwrap();
        assert!(matches!(
            result,
            Err(ClientError::UnexpectedProtocolResponse(_))
        ));
    }

    #[test]
    fn non_list_body_is_protocol_error() {
        let (mock, cxn) = connected();
        mock.push_response(reply("n2", "n3", json!({"oops": true})));
        let mut batch = cxn.request();
        batch.get("a");
        assert!(matches!(
            cxn.send(&batch).wait().unwrap(),
            Err(ClientError::UnexpectedProtocolResponse(_))
        ));
    }

    #[test]
    fn batch_handler_runs_while_slot_is_held() {
        let (mock, queue, cxn) = connected_with_queue();
        mock.push_response(reply("n2", "n3", json!([{"action": "get", "status": 404}])))
            .push_response(reply("n3", "n4", json!([{"action": "get", "status": 404}])));

        let mut batch = cxn.request();
        batch.get("a");
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let held = Arc::clone(&seen);
        let lanes = queue.clone();
        let first = cxn.send_with(&batch, move |items| {
            *held.lock() = Some(lanes.is_locked("alice"));
            items.map(|items| items.len())
        });
        let second = cxn.send(&batch);
        cxn.session().scheduler().run_until_idle();

        assert_eq!(*seen.lock(), Some(true));
        assert_eq!(first.outcome(), Some(Ok(1)));
        assert!(second.outcome().unwrap().is_ok());
        assert!(!queue.is_locked("alice"));
    }

    #[test]
    fn batch_handler_sees_failures() {
        let (mock, cxn) = connected();
        mock.push_response(reply("n2", "n3", json!({"oops": true})));
        let mut batch = cxn.request();
        batch.get("a");
        let handled = cxn.send_with(&batch, |items| match items {
            Ok(_) => Ok("ok"),
            Err(ClientError::UnexpectedProtocolResponse(_)) => Ok("recovered"),
            Err(error) => Err(error),
        });
        assert_eq!(handled.wait(), Some(Ok("recovered")));
    }
}

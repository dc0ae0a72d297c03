use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use trellis_proto::{MessageKind, QueryEnvelope, QueryPayload, ResponseEnvelope};

use crate::error::{TransportError, TransportResult};
use crate::router::{MessageHandler, MessageRouter, RouteGuard};
use crate::Transport;

/// In-memory transport double. Sent envelopes are captured for
/// inspection and inbound frames are injected by the test, so protocol
/// behavior can be exercised without a socket. Selected via dependency
/// injection exactly like the production transport.
#[derive(Default)]
pub struct InMemoryTransport {
    router: MessageRouter,
    sent: Mutex<Vec<QueryEnvelope>>,
    connected: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        InMemoryTransport {
            router: MessageRouter::new(),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<QueryEnvelope> {
        self.sent.lock().clone()
    }

    pub fn last_query_id(&self) -> Option<String> {
        self.sent.lock().last().map(|e| e.query_id().to_owned())
    }

    /// Delivers an inbound frame to the registered route, if any.
    /// Returns whether a handler consumed it.
    pub fn push_inbound(&self, envelope: ResponseEnvelope) -> bool {
        self.router.dispatch(envelope)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, query_id: &str, payload: &QueryPayload) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent
            .lock()
            .push(QueryEnvelope::new(query_id, payload.clone()));
        Ok(())
    }

    fn on_message(&self, kind: MessageKind, query_id: &str, handler: MessageHandler) -> RouteGuard {
        self.router.register(kind, query_id, handler)
    }

    fn cancel(&self, query_id: &str) {
        self.router.cancel(query_id);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn captures_sent_envelopes() {
        let transport = InMemoryTransport::new();
        transport
            .send("q-1", &QueryPayload::default())
            .await
            .expect("send ok");
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].query_id(), "q-1");
    }

    #[tokio::test]
    async fn disconnected_send_fails() {
        let transport = InMemoryTransport::new();
        transport.set_connected(false);
        let err = transport
            .send("q-1", &QueryPayload::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn cancel_ignores_further_frames() {
        let transport = InMemoryTransport::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = hits.clone();
        let _guard = transport.on_message(
            MessageKind::Data,
            "q-1",
            Box::new(move |_| {
                hits_in.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let frame = ResponseEnvelope {
            kind: MessageKind::Data,
            query_id: "q-1".into(),
            payload: json!({}),
        };
        assert!(transport.push_inbound(frame.clone()));
        transport.cancel("q-1");
        assert!(!transport.push_inbound(frame));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

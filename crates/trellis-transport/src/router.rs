use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use trellis_proto::{MessageKind, ResponseEnvelope};

/// Handler invoked with the frame payload for a registered route.
pub type MessageHandler = Box<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    kind: MessageKind,
    query_id: String,
}

struct RouteEntry {
    token: u64,
    handler: Arc<MessageHandler>,
}

type RouteMap = RwLock<HashMap<RouteKey, RouteEntry>>;

/// Correlation-id dispatch table shared by both transport
/// implementations. At most one handler is active per `(kind, queryId)`;
/// registering again replaces the previous route.
#[derive(Default)]
pub struct MessageRouter {
    routes: Arc<RouteMap>,
    next_token: AtomicU64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: MessageKind, query_id: &str, handler: MessageHandler) -> RouteGuard {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let key = RouteKey {
            kind,
            query_id: query_id.to_owned(),
        };
        self.routes.write().insert(
            key.clone(),
            RouteEntry {
                token,
                handler: Arc::new(handler),
            },
        );
        RouteGuard {
            routes: Arc::downgrade(&self.routes),
            key,
            token,
        }
    }

    /// Routes one inbound frame. Returns false when no handler is
    /// registered for it (canceled or unknown query).
    pub fn dispatch(&self, envelope: ResponseEnvelope) -> bool {
        let key = RouteKey {
            kind: envelope.kind,
            query_id: envelope.query_id,
        };
        // Clone the handler out so user code runs without the lock held.
        let handler = self.routes.read().get(&key).map(|entry| entry.handler.clone());
        match handler {
            Some(handler) => {
                handler(envelope.payload);
                true
            }
            None => {
                tracing::debug!(kind = ?key.kind, query_id = %key.query_id, "dropping unroutable frame");
                false
            }
        }
    }

    /// Removes every route for the id.
    pub fn cancel(&self, query_id: &str) {
        self.routes
            .write()
            .retain(|key, _| key.query_id != query_id);
    }
}

/// Unsubscribe handle for one registered route. Dropping it removes the
/// route unless a newer handler has already replaced it.
pub struct RouteGuard {
    routes: Weak<RouteMap>,
    key: RouteKey,
    token: u64,
}

impl RouteGuard {
    pub fn unsubscribe(self) {}
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        if let Some(routes) = self.routes.upgrade() {
            let mut routes = routes.write();
            if routes.get(&self.key).is_some_and(|entry| entry.token == self.token) {
                routes.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use serde_json::json;

    fn envelope(kind: MessageKind, query_id: &str) -> ResponseEnvelope {
        ResponseEnvelope {
            kind,
            query_id: query_id.to_owned(),
            payload: json!({ "n": 1 }),
        }
    }

    #[test]
    fn dispatches_by_kind_and_id() {
        let router = MessageRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = hits.clone();
        let _guard = router.register(
            MessageKind::Data,
            "q-1",
            Box::new(move |_| {
                hits_in.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(router.dispatch(envelope(MessageKind::Data, "q-1")));
        assert!(!router.dispatch(envelope(MessageKind::Error, "q-1")));
        assert!(!router.dispatch(envelope(MessageKind::Data, "q-2")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_unsubscribes() {
        let router = MessageRouter::new();
        let guard = router.register(MessageKind::Data, "q-1", Box::new(|_| {}));
        drop(guard);
        assert!(!router.dispatch(envelope(MessageKind::Data, "q-1")));
    }

    #[test]
    fn stale_guard_does_not_remove_replacement() {
        let router = MessageRouter::new();
        let old = router.register(MessageKind::Data, "q-1", Box::new(|_| {}));
        let _new = router.register(MessageKind::Data, "q-1", Box::new(|_| {}));
        drop(old);
        assert!(router.dispatch(envelope(MessageKind::Data, "q-1")));
    }

    #[test]
    fn cancel_removes_all_kinds() {
        let router = MessageRouter::new();
        let _a = router.register(MessageKind::Data, "q-1", Box::new(|_| {}));
        let _b = router.register(MessageKind::Progress, "q-1", Box::new(|_| {}));
        router.cancel("q-1");
        assert!(!router.dispatch(envelope(MessageKind::Data, "q-1")));
        assert!(!router.dispatch(envelope(MessageKind::Progress, "q-1")));
    }
}

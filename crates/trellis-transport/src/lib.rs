//! Persistent-connection abstraction for the trellis engine.
//!
//! A single connection is shared across concurrently-open pivot
//! instances; frames are multiplexed by query id. The production
//! implementation speaks WebSocket; an in-memory double with the same
//! surface backs tests. Which one a service talks to is decided at
//! construction time by handing it an `Arc<dyn Transport>`.

use std::sync::Arc;

use async_trait::async_trait;

use trellis_proto::{MessageKind, QueryPayload};

pub mod config;
pub mod error;
pub mod memory;
pub mod router;
pub mod websocket;

pub use config::{ConnectionParams, TransportConfig};
pub use error::{TransportError, TransportResult};
pub use memory::InMemoryTransport;
pub use router::{MessageHandler, MessageRouter, RouteGuard};
pub use websocket::WebSocketTransport;

/// Capability interface over the shared connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-forget submission of a query. A connection that is not
    /// ready surfaces as `TransportError::NotConnected`; there is no
    /// buffering of frames for later.
    async fn send(&self, query_id: &str, payload: &QueryPayload) -> TransportResult<()>;

    /// Registers the handler for `(kind, query_id)` frames, replacing
    /// any previous handler for the same route. Exactly one handler is
    /// active per in-flight query and kind; the returned guard removes
    /// the route when dropped.
    fn on_message(&self, kind: MessageKind, query_id: &str, handler: MessageHandler) -> RouteGuard;

    /// Best-effort cancellation: drops every route for the id so further
    /// frames are ignored. The server may keep computing.
    fn cancel(&self, query_id: &str);

    fn is_connected(&self) -> bool;
}

/// Shared handle the load services hold.
pub type SharedTransport = Arc<dyn Transport>;

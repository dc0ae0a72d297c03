use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, COOKIE};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use trellis_proto::{MessageKind, QueryEnvelope, QueryPayload, ResponseEnvelope};

use crate::config::{ConnectionParams, TransportConfig};
use crate::error::{TransportError, TransportResult};
use crate::router::{MessageHandler, MessageRouter, RouteGuard};
use crate::Transport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsRequest = tokio_tungstenite::tungstenite::handshake::client::Request;

/// Production transport: one WebSocket connection shared by every load
/// service, multiplexed by query id. A background task owns the socket;
/// callers only touch the outbound queue and the route table.
pub struct WebSocketTransport {
    router: Arc<MessageRouter>,
    outbound: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    ws_task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Opens the connection described by `config`. One instance owns one
    /// connection for its whole lifetime; callers share it via
    /// `Arc<dyn Transport>` rather than reconnecting.
    pub async fn connect(config: TransportConfig) -> TransportResult<Self> {
        let url = config.build_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::InvalidEndpoint(err.to_string()))?;
        apply_params(&mut request, &config.params)?;

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|err| TransportError::Handshake(err.to_string()))?;
        tracing::debug!(endpoint = %url, "pivot connection established");

        let router = Arc::new(MessageRouter::new());
        let (tx_out, rx_out) = mpsc::unbounded_channel::<Message>();
        let connected = Arc::new(AtomicBool::new(true));

        let task_router = router.clone();
        let task_connected = connected.clone();
        let ws_task = tokio::spawn(async move {
            run_socket(ws_stream, rx_out, task_router, task_connected).await;
        });

        Ok(Self {
            router,
            outbound: tx_out,
            connected,
            ws_task: parking_lot::Mutex::new(Some(ws_task)),
        })
    }

    /// Closes the connection and stops the background task.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.ws_task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, query_id: &str, payload: &QueryPayload) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let envelope = QueryEnvelope::new(query_id, payload.clone());
        let frame = serde_json::to_string(&envelope)
            .map_err(|err| TransportError::SendFailed(err.to_string()))?;
        self.outbound
            .send(Message::Text(frame))
            .map_err(|err| TransportError::SendFailed(err.to_string()))
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

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.ws_task.lock().take() {
            task.abort();
        }
    }
}

fn apply_params(request: &mut WsRequest, params: &ConnectionParams) -> TransportResult<()> {
    let headers = request.headers_mut();
    match params {
        ConnectionParams::None => {}
        ConnectionParams::Bearer(token) => {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| TransportError::Handshake(err.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        ConnectionParams::Cookie(cookie) => {
            let value = HeaderValue::from_str(cookie)
                .map_err(|err| TransportError::Handshake(err.to_string()))?;
            headers.insert(COOKIE, value);
        }
        ConnectionParams::Headers(pairs) => {
            for (name, value) in pairs {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|err| TransportError::Handshake(err.to_string()))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|err| TransportError::Handshake(err.to_string()))?;
                headers.insert(name, value);
            }
        }
    }
    Ok(())
}

async fn run_socket(
    ws_stream: WsStream,
    mut rx_out: mpsc::UnboundedReceiver<Message>,
    router: Arc<MessageRouter>,
    connected: Arc<AtomicBool>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx_out.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => dispatch_frame(&router, &text),
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => dispatch_frame(&router, text),
                Err(_) => tracing::warn!("dropping non-utf8 binary frame"),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            // Ping/Pong/Frame handled by tungstenite.
            _ => {}
        }
    }

    connected.store(false, Ordering::SeqCst);
    send_task.abort();
    let _ = send_task.await;
}

fn dispatch_frame(router: &MessageRouter, text: &str) {
    match serde_json::from_str::<ResponseEnvelope>(text) {
        Ok(envelope) => {
            router.dispatch(envelope);
        }
        Err(err) => tracing::warn!(%err, "dropping undecodable frame"),
    }
}

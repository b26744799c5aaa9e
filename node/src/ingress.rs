//! HTTP ingress: the static page, the event stream and the socket upgrade.
//!
//! Routes:
//! - `GET /`: the HTML page, or a WebSocket upgrade when requested
//! - `GET /ws`: WebSocket upgrade
//! - `GET /events`: server-sent events
//! - `GET /metrics`: Prometheus exposition (404 unless metrics are enabled)

use std::convert::Infallible;
use std::fmt::Display;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use fastblocks_types::Transport;

use crate::client_registry::{ClientId, ClientRegistry, Registration};
use crate::error::NodeError;
use crate::metrics::NodeMetrics;

/// Default limit on a single WebSocket write to a client.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct IngressState {
    registry: Arc<ClientRegistry>,
    asset_path: Arc<PathBuf>,
    client_buffer: usize,
    send_timeout: Duration,
    metrics: Option<Arc<NodeMetrics>>,
}

/// Why a socket client's writer stopped.
#[derive(Debug, Error)]
pub enum SocketWriteError {
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    #[error("write failed: {0}")]
    Failed(String),
}

/// The single listener every downstream client connects to.
pub struct IngressServer {
    state: IngressState,
}

impl IngressServer {
    pub fn new(registry: Arc<ClientRegistry>, asset_path: PathBuf, client_buffer: usize) -> Self {
        Self {
            state: IngressState {
                registry,
                asset_path: Arc::new(asset_path),
                client_buffer,
                send_timeout: DEFAULT_SEND_TIMEOUT,
                metrics: None,
            },
        }
    }

    /// Drop a socket client whose single write takes longer than `timeout`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.state.send_timeout = timeout;
        self
    }

    /// Serve `/metrics` from `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.state.metrics = Some(metrics);
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/ws", get(ws_handler))
            .route("/events", get(events_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// On shutdown the registry is cleared first, which ends every open
    /// event stream and socket so the graceful drain can complete.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), NodeError> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "ingress listening");

        let registry = Arc::clone(&self.state.registry);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("ingress shutting down, closing client streams");
                registry.clear();
            })
            .await
            .map_err(|e| NodeError::Server(e.to_string()))
    }
}

async fn index_handler(
    ws: Option<WebSocketUpgrade>,
    State(state): State<IngressState>,
) -> Response {
    if let Some(ws) = ws {
        return ws.on_upgrade(move |socket| handle_socket(socket, state));
    }

    match tokio::fs::read(state.asset_path.as_path()).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "text/html")], bytes).into_response(),
        Err(e) => {
            let name = state
                .asset_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| state.asset_path.display().to_string());
            error!(path = %state.asset_path.display(), error = %e, "failed to read asset");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Error loading {name}"),
            )
                .into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<IngressState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: IngressState) {
    let (handle, frames) = state.registry.open_channel(state.client_buffer);
    let registration = state.registry.register_guarded(Transport::Socket, handle);
    let client = registration.id();
    info!(client, "socket client connected");

    let (sink, inbound) = socket.split();
    if let Err(e) = forward_frames(sink, inbound, frames, client, state.send_timeout).await {
        warn!(client, error = %e, "socket write failed");
    }

    drop(registration);
    info!(client, "socket client disconnected");
}

/// Forward frames from the client's channel until either side closes or a
/// write fails. Inbound data frames are ignored.
async fn forward_frames<S, R, E>(
    mut sink: S,
    mut inbound: R,
    mut frames: mpsc::Receiver<String>,
    client: ClientId,
    send_timeout: Duration,
) -> Result<(), SocketWriteError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => send_frame(&mut sink, Message::Text(frame), send_timeout).await?,
                None => {
                    let _ = send_frame(&mut sink, Message::Close(None), send_timeout).await;
                    return Ok(());
                }
            },
            msg = inbound.next() => match msg {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client, error = %e, "socket read failed");
                    return Ok(());
                }
            },
        }
    }
}

async fn send_frame<S>(
    sink: &mut S,
    msg: Message,
    timeout: Duration,
) -> Result<(), SocketWriteError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(timeout, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SocketWriteError::Failed(e.to_string())),
        Err(_) => Err(SocketWriteError::Timeout(timeout)),
    }
}

async fn events_handler(State(state): State<IngressState>) -> Response {
    let (handle, frames) = state.registry.open_channel(state.client_buffer);
    let registration = state.registry.register_guarded(Transport::EventStream, handle);
    info!(client = registration.id(), "event-stream client connected");

    let body = EventStream {
        frames: ReceiverStream::new(frames),
        _registration: registration,
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// SSE body: frames from one client's channel. Dropping it (client gone)
/// drops the registration.
struct EventStream {
    frames: ReceiverStream<String>,
    _registration: Registration,
}

impl Stream for EventStream {
    type Item = Result<String, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().frames)
            .poll_next(cx)
            .map(|frame| frame.map(Ok))
    }
}

async fn metrics_handler(State(state): State<IngressState>) -> Response {
    let Some(metrics) = state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match metrics.encode() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

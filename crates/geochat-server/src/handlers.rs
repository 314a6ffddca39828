//! Connection handlers for the GeoChat server.
//!
//! This module handles the connection lifecycle and frame processing.

use crate::config::Config;
use crate::error::ClientError;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use geochat_core::{
    outbound_queue, BroadcastRouter, ConnectionId, ConnectionLifecycleManager, Coordinate,
    RouterError,
};
use geochat_protocol::{codec, error_codes, ClientFrame, Encoding, ServerFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// Connect/disconnect hooks wrapping the broadcast router.
    pub lifecycle: ConnectionLifecycleManager,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured grid precision is unsupported.
    pub fn new(config: Config) -> Result<Self> {
        let router = BroadcastRouter::with_config(config.router_config())?;

        Ok(Self {
            lifecycle: ConnectionLifecycleManager::new(Arc::new(router)),
            config,
        })
    }

    /// The broadcast router.
    #[must_use]
    pub fn router(&self) -> &BroadcastRouter {
        self.lifecycle.router()
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("GeoChat server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config)?)).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if the accept loop fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Channel and connection counts.
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(state.router().stats())
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut sender, mut receiver) = socket.split();
    let (sink, mut outbox) = outbound_queue(state.config.limits.outbound_queue);

    let connection_id = match state.lifecycle.connect(sink) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Refusing WebSocket connection");
            metrics::record_error("server_full");
            let frame = ServerFrame::error(error_codes::SERVER_FULL, e.to_string());
            let _ = send_frame(&mut sender, &frame, Encoding::Json).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    debug!(connection = %connection_id, "WebSocket connected");

    // Replies follow the encoding of the client's most recent frame.
    let mut encoding = Encoding::Json;

    let heartbeat = u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX);
    let connected = ServerFrame::connected(connection_id.as_str(), heartbeat);
    if send_frame(&mut sender, &connected, encoding).await.is_err() {
        error!(connection = %connection_id, "Failed to send connected frame");
        state.lifecycle.disconnect(&connection_id);
        return;
    }

    // Read buffer for partial MessagePack frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    let idle_timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let idle = time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            biased;

            // Chat and presence frames queued by the router
            Some(frame) = outbox.recv() => {
                if send_frame(&mut sender, &frame, encoding).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                idle.as_mut().reset(Instant::now() + idle_timeout);

                let replies: Vec<ServerFrame> = match msg {
                    Some(Ok(Message::Text(text))) => {
                        encoding = Encoding::Json;
                        metrics::record_message(text.len(), "inbound");
                        let start = Instant::now();
                        let reply = match codec::decode_json::<ClientFrame>(&text) {
                            Ok(frame) => dispatch(&state.lifecycle, &connection_id, frame),
                            Err(e) => Some(reject(&connection_id, ClientError::from(e))),
                        };
                        metrics::record_latency(start.elapsed().as_secs_f64());
                        reply.into_iter().collect()
                    }
                    Some(Ok(Message::Binary(data))) => {
                        encoding = Encoding::MessagePack;
                        metrics::record_message(data.len(), "inbound");
                        let start = Instant::now();
                        read_buffer.extend_from_slice(&data);
                        let replies = drain_frames(&mut read_buffer, &state.lifecycle, &connection_id);
                        metrics::record_latency(start.elapsed().as_secs_f64());
                        replies
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                        Vec::new()
                    }
                    Some(Ok(Message::Pong(_))) => Vec::new(),
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                };

                let mut failed = false;
                for reply in &replies {
                    if send_frame(&mut sender, reply, encoding).await.is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    break;
                }
            }

            () = &mut idle => {
                debug!(connection = %connection_id, "Idle timeout");
                metrics::record_error("idle_timeout");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    if let Some(departure) = state.lifecycle.disconnect(&connection_id) {
        metrics::record_deliveries("presence", departure.notified);
    }
    metrics::set_active_channels(state.router().stats().channel_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode and dispatch every whole frame in `buf`.
///
/// A malformed frame poisons the rest of the buffer, which is discarded.
fn drain_frames(
    buf: &mut BytesMut,
    lifecycle: &ConnectionLifecycleManager,
    connection_id: &ConnectionId,
) -> Vec<ServerFrame> {
    let mut replies = Vec::new();
    loop {
        match codec::decode_from::<ClientFrame>(buf) {
            Ok(Some(frame)) => replies.extend(dispatch(lifecycle, connection_id, frame)),
            Ok(None) => break,
            Err(e) => {
                replies.push(reject(connection_id, ClientError::from(e)));
                buf.clear();
                break;
            }
        }
    }
    replies
}

/// Apply one client frame. Returns the direct reply, if any.
///
/// Chat and presence frames for other peers go through their outbound queues;
/// only errors and pongs come back here.
pub fn dispatch(
    lifecycle: &ConnectionLifecycleManager,
    connection_id: &ConnectionId,
    frame: ClientFrame,
) -> Option<ServerFrame> {
    trace!(connection = %connection_id, event = %frame.event(), "Inbound frame");

    match handle_frame(lifecycle.router(), connection_id, frame) {
        Ok(reply) => reply,
        // Teardown already started; the socket is about to close.
        Err(ClientError::Rejected(RouterError::Disconnected(_))) => None,
        Err(e) => Some(reject(connection_id, e)),
    }
}

fn handle_frame(
    router: &BroadcastRouter,
    connection_id: &ConnectionId,
    frame: ClientFrame,
) -> Result<Option<ServerFrame>, ClientError> {
    match frame {
        ClientFrame::JoinRoom(location) => {
            let coordinate = Coordinate::new(location.latitude(), location.longitude())?;
            let update = router.on_location_update(connection_id, coordinate)?;
            if update.changed {
                metrics::record_join(update.notified);
                metrics::set_active_channels(router.table().len());
            }
            Ok(None)
        }

        ClientFrame::ChatMessage(body) => {
            let delivered = router.on_chat_message(connection_id, &body)?;
            metrics::record_deliveries("chat", delivered);
            Ok(None)
        }

        ClientFrame::Ping { timestamp } => Ok(Some(ServerFrame::pong(timestamp))),
    }
}

fn reject(connection_id: &ConnectionId, error: ClientError) -> ServerFrame {
    debug!(connection = %connection_id, code = error.code(), error = %error, "Rejected frame");
    metrics::record_error(error.kind());
    error.to_frame()
}

/// Send a frame to the WebSocket.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
    encoding: Encoding,
) -> Result<()> {
    let message = match encoding {
        Encoding::Json => Message::Text(codec::encode_json(frame)?),
        Encoding::MessagePack => Message::Binary(codec::encode(frame)?.to_vec()),
    };
    let len = match &message {
        Message::Text(text) => text.len(),
        Message::Binary(data) => data.len(),
        _ => 0,
    };
    metrics::record_message(len, "outbound");
    sender.send(message).await?;
    Ok(())
}

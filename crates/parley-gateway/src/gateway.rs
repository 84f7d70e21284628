//! Gateway main structure
//!
//! Accepts WebSocket connections, creates one session per connection and
//! runs each connection's receive loop until the client leaves or the server
//! shuts down.

use futures_util::{SinkExt, StreamExt};
use parley_core::{EventBus, EventName, EventPayload};
use parley_session::{SessionId, SessionRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{accept_async_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::connection::{ConnectionError, ConnectionHandle, ConnectionPool};
use crate::delivery::DeliveryRegistry;
use crate::handler::{InboundMessage, MessageHandler};
use crate::protocol::{ClientMessage, ServerFrame, ValidationError};

const CAPACITY_MESSAGE: &str = "Server at capacity";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (e.g., "127.0.0.1:8765")
    pub bind: String,
    /// Largest accepted frame and message, in bytes
    pub max_frame_size: usize,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Clients that have not finished the WebSocket handshake by then are dropped
    pub handshake_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8765".to_string(),
            max_frame_size: 1024 * 1024,
            max_connections: 100,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// The WebSocket server
#[derive(Clone)]
pub struct Gateway {
    config: GatewayConfig,
    sessions: SessionRegistry,
    bus: EventBus,
    deliveries: DeliveryRegistry,
    connection_pool: Arc<ConnectionPool>,
    handler: Arc<dyn MessageHandler>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .field("bus", &self.bus)
            .field("connection_pool", &self.connection_pool)
            .field("handler", &"<message handler>")
            .finish()
    }
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        sessions: SessionRegistry,
        bus: EventBus,
        deliveries: DeliveryRegistry,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let connection_pool = Arc::new(ConnectionPool::new(config.max_connections));
        Self {
            config,
            sessions,
            bus,
            deliveries,
            connection_pool,
            handler,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn deliveries(&self) -> &DeliveryRegistry {
        &self.deliveries
    }

    pub fn connection_pool(&self) -> &ConnectionPool {
        &self.connection_pool
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        let addr: SocketAddr = self.config.bind.parse()?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// Bind and serve until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` is cancelled.
    ///
    /// On shutdown, stops accepting, lets every connection task close its
    /// socket and clean up, then publishes `server_stopped`. Backend work
    /// already in flight is left running.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), GatewayError> {
        let addr = listener.local_addr()?;
        let tracker = TaskTracker::new();

        info!("Gateway listening on ws://{}", addr);
        self.bus
            .publish(EventName::ServerStarted, EventPayload::server(addr.to_string()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };
                    debug!("New connection from {}", peer_addr);

                    let gateway = self.clone();
                    let shutdown = shutdown.clone();
                    tracker.spawn(async move {
                        if let Err(e) = gateway.handle_connection(stream, peer_addr, shutdown).await {
                            warn!("Connection error for {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        }

        drop(listener);
        tracker.close();
        info!(connections = tracker.len(), "Gateway draining connections");
        tracker.wait().await;

        self.bus
            .publish(EventName::ServerStopped, EventPayload::server(addr.to_string()));
        info!("Gateway on {} stopped", addr);
        Ok(())
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_frame_size = Some(self.config.max_frame_size);
        config.max_message_size = Some(self.config.max_frame_size);
        config
    }

    /// Handle a WebSocket connection from handshake to cleanup
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(), GatewayError> {
        let handshake = tokio::time::timeout(
            self.config.handshake_timeout,
            accept_async_with_config(stream, Some(self.websocket_config())),
        );
        let ws_stream = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Dropping {} mid-handshake for shutdown", addr);
                return Ok(());
            }
            result = handshake => match result {
                Ok(ws_stream) => ws_stream?,
                Err(_) => {
                    warn!("WebSocket handshake with {} timed out", addr);
                    return Ok(());
                }
            },
        };
        let (mut sender, mut receiver) = ws_stream.split();
        let connection_id = Uuid::new_v4().to_string();

        let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
        let conn_handle = ConnectionHandle::new(connection_id.clone(), addr, tx);

        if !self.connection_pool.try_add(conn_handle.clone()).await {
            warn!("Connection pool full, rejecting {}", addr);
            let frame = ServerFrame::error(CAPACITY_MESSAGE, "");
            sender.send(Message::Text(frame.to_json()?)).await?;
            sender.close().await?;
            return Ok(());
        }

        let session_id = self.sessions.create();
        if let Err(e) = self.sessions.bind_connection(&session_id, &connection_id) {
            warn!(session_id = %session_id, "Failed to bind connection: {}", e);
        }
        info!(session_id = %session_id, peer = %addr, "New WebSocket connection");
        self.bus.publish(
            EventName::SessionCreated,
            EventPayload::session(session_id.as_str()),
        );

        let result: Result<(), GatewayError> = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(session_id = %session_id, "Closing connection for shutdown");
                    let _ = sender.send(Message::Close(None)).await;
                    break Ok(());
                }

                Some(frame) = rx.recv() => {
                    let json = match frame.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(json)).await {
                        break Err(e.into());
                    }
                }

                msg = receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(&session_id, &conn_handle, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => self.handle_text(&session_id, &conn_handle, &text).await,
                        Err(_) => {
                            warn!(session_id = %session_id, "Rejected non-UTF-8 binary frame");
                            let frame = ServerFrame::error(
                                ValidationError::InvalidFormat.to_string(),
                                session_id.as_str(),
                            );
                            let _ = conn_handle.send(frame);
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            break Err(e.into());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "Client disconnected");
                        break Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                },
            }
        };

        // Cleanup runs however the loop ended
        self.deliveries.unregister(session_id.as_str());
        if let Err(e) = self.sessions.close(&session_id) {
            debug!(session_id = %session_id, "Session already gone: {}", e);
        }
        self.connection_pool.remove(&connection_id).await;
        self.bus.publish(
            EventName::SessionClosed,
            EventPayload::session(session_id.as_str()),
        );
        info!(session_id = %session_id, "Session closed");

        result
    }

    async fn handle_text(&self, session_id: &SessionId, connection: &ConnectionHandle, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(session_id = %session_id, "Empty message ignored");
                return;
            }
            Err(e) => {
                warn!(session_id = %session_id, "Rejected message: {}", e);
                let _ = connection.send(ServerFrame::error(e.to_string(), session_id.as_str()));
                return;
            }
        };

        if let Some(audio) = &message.audio {
            self.bus.publish(
                EventName::AudioReceived,
                EventPayload::audio(session_id.as_str(), audio.clone()),
            );
            // Audio-only chunk
            if message.message.is_empty() {
                return;
            }
        }

        self.handler
            .on_message(InboundMessage {
                session_id: session_id.clone(),
                connection: connection.clone(),
                message,
            })
            .await;
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gateway({})", self.config.bind)
    }
}

/// Gateway-related errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

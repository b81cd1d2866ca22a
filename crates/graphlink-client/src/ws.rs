//! Streaming transport over graphql-transport-ws.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use graphlink_transport::{
    GraphqlSocket, ReconnectState, SocketConfig, SocketConnection, SocketMessage, WireMessage,
};

use crate::error::{ClientError, GraphqlError};
use crate::interceptor::ResultStream;
use crate::operation::{GraphqlResponse, Operation};
use crate::router::TransportBackend;

/// Streaming backend holding one WebSocket connection per operation.
///
/// Performs the graphql-transport-ws handshake, pumps `next`/`error`/
/// `complete` frames into the result stream, and re-subscribes the same
/// operation on a fresh socket after an abnormal drop when reconnect-on-drop
/// is enabled. A reconnect never re-routes the operation.
#[derive(Clone)]
pub struct WsBackend {
    url: String,
    config: SocketConfig,
    ack_timeout: Duration,
}

impl WsBackend {
    /// Create a backend for a WebSocket endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(url, SocketConfig::default())
    }

    /// Create a backend with a socket configuration.
    #[must_use]
    pub fn with_config(url: impl Into<String>, config: SocketConfig) -> Self {
        Self {
            url: url.into(),
            config,
            ack_timeout: Duration::from_secs(10),
        }
    }

    /// Set the time to wait for `connection_ack`.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Connect, complete the handshake, and start the operation.
    async fn open(&self, operation: &Operation) -> Result<SocketConnection, ClientError> {
        let socket = GraphqlSocket::with_config(self.url.clone(), self.config.clone());
        let mut connection = socket.connect().await?;

        let init = WireMessage::connection_init(init_payload(operation));
        connection.send_json(&init).await?;

        let ack = tokio::time::timeout(self.ack_timeout, connection.recv()).await;
        match ack {
            Ok(Ok(Some(message))) => {
                let frame: WireMessage = message.json().map_err(|err| ClientError::Json(err.to_string()))?;
                if !frame.is_ack() {
                    return Err(ClientError::Protocol {
                        message: format!("expected connection_ack, got {}", frame.message_type),
                    });
                }
            }
            Ok(Ok(None)) => {
                return Err(ClientError::Protocol {
                    message: "connection closed before ack".to_string(),
                });
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                return Err(ClientError::Protocol {
                    message: "connection_ack timeout".to_string(),
                });
            }
        }

        let subscribe = WireMessage::subscribe(operation.id().to_string(), operation.request_body());
        connection.send_json(&subscribe).await?;
        debug!(operation = %operation.id(), url = %self.url, "subscription started");
        Ok(connection)
    }
}

#[async_trait]
impl TransportBackend for WsBackend {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn dispatch(&self, operation: Operation) -> Result<ResultStream, ClientError> {
        let connection = self.open(&operation).await?;
        let (tx, rx) = mpsc::channel(16);
        let backend = self.clone();
        tokio::spawn(async move {
            pump(backend, operation, connection, tx).await;
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

type ResultSender = mpsc::Sender<Result<GraphqlResponse<Value>, ClientError>>;

/// Why one connection's pump loop stopped.
enum PumpOutcome {
    /// The operation finished: completed, errored, or the consumer left.
    Finished,
    /// The connection dropped without a `complete` frame.
    Dropped,
}

async fn pump(
    backend: WsBackend,
    operation: Operation,
    mut connection: SocketConnection,
    tx: ResultSender,
) {
    let mut reconnect = ReconnectState::new(backend.config.reconnect.clone());
    loop {
        match pump_connection(&mut connection, &operation, &tx).await {
            PumpOutcome::Finished => return,
            PumpOutcome::Dropped => {
                if !backend.config.auto_reconnect {
                    let _ = tx
                        .send(Err(ClientError::Stream("connection dropped".to_string())))
                        .await;
                    return;
                }
                connection = loop {
                    if let Err(err) = reconnect.wait().await {
                        let _ = tx.send(Err(err.into())).await;
                        return;
                    }
                    if tx.is_closed() {
                        return;
                    }
                    warn!(
                        operation = %operation.id(),
                        attempt = reconnect.attempts(),
                        "reconnecting subscription"
                    );
                    match backend.open(&operation).await {
                        Ok(connection) => break connection,
                        Err(err) => {
                            warn!(operation = %operation.id(), error = %err, "reconnect failed");
                        }
                    }
                };
                reconnect.reset();
            }
        }
    }
}

async fn pump_connection(
    connection: &mut SocketConnection,
    operation: &Operation,
    tx: &ResultSender,
) -> PumpOutcome {
    loop {
        tokio::select! {
            () = tx.closed() => {
                let complete = WireMessage::complete(operation.id().to_string());
                let _ = connection.send_json(&complete).await;
                let _ = connection.close().await;
                return PumpOutcome::Finished;
            }
            message = connection.recv() => match message {
                Ok(Some(SocketMessage::Ping(payload))) => {
                    let _ = connection.send(SocketMessage::Pong(payload)).await;
                }
                Ok(Some(SocketMessage::Pong(_))) => {}
                Ok(Some(SocketMessage::Close(_))) | Ok(None) => return PumpOutcome::Dropped,
                Ok(Some(message)) => {
                    if let Some(outcome) = handle_frame(&message, connection, tx).await {
                        return outcome;
                    }
                }
                Err(err) => {
                    warn!(operation = %operation.id(), error = %err, "socket error");
                    return PumpOutcome::Dropped;
                }
            }
        }
    }
}

async fn handle_frame(
    message: &SocketMessage,
    connection: &mut SocketConnection,
    tx: &ResultSender,
) -> Option<PumpOutcome> {
    let frame: WireMessage = match message.json() {
        Ok(frame) => frame,
        Err(err) => {
            let _ = tx.send(Err(ClientError::Json(err.to_string()))).await;
            return Some(PumpOutcome::Finished);
        }
    };

    match frame.message_type.as_str() {
        "next" => {
            if let Some(payload) = frame.payload {
                match serde_json::from_value::<GraphqlResponse<Value>>(payload) {
                    Ok(response) => {
                        if tx.send(Ok(response)).await.is_err() {
                            return Some(PumpOutcome::Finished);
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ClientError::Json(err.to_string()))).await;
                        return Some(PumpOutcome::Finished);
                    }
                }
            }
            None
        }
        "error" => {
            let errors = frame
                .payload
                .and_then(|value| {
                    if value.is_array() {
                        serde_json::from_value::<Vec<GraphqlError>>(value).ok()
                    } else {
                        serde_json::from_value::<GraphqlError>(value)
                            .ok()
                            .map(|err| vec![err])
                    }
                })
                .unwrap_or_default();
            let _ = tx.send(Err(ClientError::GraphqlErrors { errors })).await;
            Some(PumpOutcome::Finished)
        }
        "complete" => Some(PumpOutcome::Finished),
        "ping" => {
            let pong = WireMessage::pong(frame.id, frame.payload);
            let _ = connection.send_json(&pong).await;
            None
        }
        "connection_ack" => None,
        other => {
            let _ = tx
                .send(Err(ClientError::Protocol {
                    message: format!("unexpected websocket message: {other}"),
                }))
                .await;
            Some(PumpOutcome::Finished)
        }
    }
}

fn init_payload(operation: &Operation) -> Option<Value> {
    let headers: serde_json::Map<String, Value> = operation
        .context()
        .headers()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();
    if headers.is_empty() {
        None
    } else {
        Some(serde_json::json!({ "headers": headers }))
    }
}

//! WebSocket connection lifecycle for GraphQL streaming.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::reconnect::ReconnectConfig;
use crate::wire::SocketMessage;
use crate::{StreamError, StreamResult};

/// Socket configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Additional handshake headers.
    pub headers: HashMap<String, String>,
    /// Reconnect on abnormal drop.
    pub auto_reconnect: bool,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            headers: HashMap::new(),
            auto_reconnect: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SocketConfig {
    /// Create new configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a handshake header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Enable or disable reconnect-on-drop.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the reconnection backoff.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// A GraphQL WebSocket endpoint.
pub struct GraphqlSocket {
    url: String,
    config: SocketConfig,
}

impl GraphqlSocket {
    /// Create a socket with default configuration.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: SocketConfig::default(),
        }
    }

    /// Create a socket with custom configuration.
    #[must_use]
    pub fn with_config(url: impl Into<String>, config: SocketConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }

    /// Connect, applying the handshake headers and the connect timeout.
    pub async fn connect(&self) -> StreamResult<SocketConnection> {
        let url = Url::parse(&self.url)
            .map_err(|err: url::ParseError| StreamError::ConnectionFailed(err.to_string()))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| StreamError::ConnectionFailed(err.to_string()))?;
        for (key, value) in &self.config.headers {
            let name = key
                .parse::<tokio_tungstenite::tungstenite::http::HeaderName>()
                .map_err(|err| StreamError::ConnectionFailed(err.to_string()))?;
            let value = value
                .parse()
                .map_err(|_| StreamError::ConnectionFailed(format!("invalid header '{key}'")))?;
            request.headers_mut().insert(name, value);
        }

        let connect_result =
            tokio::time::timeout(self.config.connect_timeout, connect_async(request)).await;

        let Ok(ws_result) = connect_result else {
            return Err(StreamError::Timeout(self.config.connect_timeout));
        };

        let (stream, _response) = ws_result.map_err(
            |err: tokio_tungstenite::tungstenite::Error| StreamError::WebSocket(err.to_string()),
        )?;

        Ok(SocketConnection::new(stream))
    }

    /// The endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &SocketConfig {
        &self.config
    }
}

/// An active WebSocket connection.
pub struct SocketConnection {
    inner: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    closed: bool,
}

impl SocketConnection {
    const fn new(stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>) -> Self {
        Self {
            inner: stream,
            closed: false,
        }
    }

    /// Send a message.
    pub async fn send(&mut self, message: SocketMessage) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::InvalidState("connection is closed".into()));
        }
        self.inner
            .send(message.into())
            .await
            .map_err(|err| StreamError::WebSocket(err.to_string()))
    }

    /// Serialize a value and send it as a text message.
    pub async fn send_json<T: serde::Serialize + Sync>(&mut self, data: &T) -> StreamResult<()> {
        let json =
            serde_json::to_string(data).map_err(|err| StreamError::ParseError(err.to_string()))?;
        self.send(SocketMessage::text(json)).await
    }

    /// Receive the next message; `None` once the peer is gone.
    pub async fn recv(&mut self) -> StreamResult<Option<SocketMessage>> {
        if self.closed {
            return Ok(None);
        }
        match self.inner.next().await {
            Some(Ok(message)) => {
                let message: SocketMessage = message.into();
                if message.is_close() {
                    self.closed = true;
                }
                Ok(Some(message))
            }
            Some(Err(err)) => Err(StreamError::WebSocket(err.to_string())),
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    /// Close the connection.
    pub async fn close(&mut self) -> StreamResult<()> {
        if !self.closed {
            self.closed = true;
            self.inner
                .close(None)
                .await
                .map_err(|err| StreamError::WebSocket(err.to_string()))?;
        }
        Ok(())
    }

    /// Whether the connection has closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Stream for SocketConnection {
    type Item = StreamResult<SocketMessage>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(message))) => {
                let message: SocketMessage = message.into();
                if message.is_close() {
                    self.closed = true;
                }
                Poll::Ready(Some(Ok(message)))
            }
            Poll::Ready(Some(Err(err))) => {
                Poll::Ready(Some(Err(StreamError::WebSocket(err.to_string()))))
            }
            Poll::Ready(None) => {
                self.closed = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

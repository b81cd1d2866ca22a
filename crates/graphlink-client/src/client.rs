//! Client facade: chain → router → backends → cache.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use graphlink_cache::CacheEngine;
use graphlink_transport::SocketConfig;

use crate::auth::{AuthInterceptor, TokenStore};
use crate::error::ClientError;
use crate::http::HttpBackend;
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::operation::{GraphqlResponse, Operation};
use crate::router::{TransportBackend, TransportRouter};
use crate::subscription::{OperationPhase, Subscription, cancelled};
use crate::ws::WsBackend;

/// Client configuration: the two endpoint URIs plus default headers.
///
/// Read once at client construction; the environment provider is an
/// external collaborator.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request/response endpoint URI.
    pub http_url: String,
    /// Streaming endpoint URI.
    pub ws_url: String,
    /// Headers applied to every operation's context before the chain runs.
    pub headers: HashMap<String, String>,
}

impl ClientConfig {
    /// Create a configuration from the two endpoint URIs.
    #[must_use]
    pub fn new(http_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            http_url: http_url.into(),
            ws_url: ws_url.into(),
            headers: HashMap::new(),
        }
    }

    /// Read `GRAPHQL_URL` and `WS_GRAPHQL_URL` from the environment.
    pub fn from_env() -> Result<Self, ClientError> {
        let http_url = std::env::var("GRAPHQL_URL").map_err(|_| ClientError::Config {
            message: "GRAPHQL_URL is not set".to_string(),
        })?;
        let ws_url = std::env::var("WS_GRAPHQL_URL").map_err(|_| ClientError::Config {
            message: "WS_GRAPHQL_URL is not set".to_string(),
        })?;
        Ok(Self::new(http_url, ws_url))
    }

    /// Add a default header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    socket: SocketConfig,
    cache: Option<Arc<CacheEngine>>,
    default_backend: Option<Arc<dyn TransportBackend>>,
    streaming_backend: Option<Arc<dyn TransportBackend>>,
}

impl ClientBuilder {
    /// Start building from a configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            token_store: None,
            interceptors: Vec::new(),
            socket: SocketConfig::default(),
            cache: None,
            default_backend: None,
            streaming_backend: None,
        }
    }

    /// Install a token store; enables the auth-injection interceptor, which
    /// always runs first.
    #[must_use]
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Append an interceptor after the auth link.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Configure the streaming socket.
    #[must_use]
    pub fn with_socket_config(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    /// Share an existing cache engine instead of constructing one.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheEngine>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the request/response backend.
    #[must_use]
    pub fn with_default_backend(mut self, backend: Arc<dyn TransportBackend>) -> Self {
        self.default_backend = Some(backend);
        self
    }

    /// Replace the streaming backend.
    #[must_use]
    pub fn with_streaming_backend(mut self, backend: Arc<dyn TransportBackend>) -> Self {
        self.streaming_backend = Some(backend);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, ClientError> {
        let cache = self.cache.unwrap_or_else(|| Arc::new(CacheEngine::new()));

        let default_backend: Arc<dyn TransportBackend> = match self.default_backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(self.config.http_url.as_str())?),
        };
        let streaming_backend = self.streaming_backend.unwrap_or_else(|| {
            Arc::new(WsBackend::with_config(
                self.config.ws_url.as_str(),
                self.socket.clone(),
            ))
        });
        let router = Arc::new(TransportRouter::split_subscriptions(
            streaming_backend,
            default_backend,
        ));

        let mut links: Vec<Arc<dyn Interceptor>> = Vec::new();
        if let Some(store) = self.token_store {
            links.push(Arc::new(AuthInterceptor::new(store)));
        }
        links.extend(self.interceptors);

        Ok(Client {
            chain: InterceptorChain::new(links, router),
            cache,
            headers: self.config.headers,
        })
    }
}

/// GraphQL client: interceptor chain, transport router, and cache in one
/// entry point.
///
/// The interceptor chain runs upstream of routing for every operation,
/// whichever backend is ultimately selected. The cache is owned here; there
/// is no global store.
#[derive(Clone)]
pub struct Client {
    chain: InterceptorChain,
    cache: Arc<CacheEngine>,
    headers: HashMap<String, String>,
}

impl Client {
    /// Start building a client.
    #[must_use]
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// The cache engine.
    #[must_use]
    pub fn cache(&self) -> &Arc<CacheEngine> {
        &self.cache
    }

    /// Execute a query or mutation and return its single result.
    ///
    /// Successful data is normalized into the cache with the operation's
    /// variables.
    pub async fn execute(
        &self,
        operation: Operation,
    ) -> Result<GraphqlResponse<Value>, ClientError> {
        let operation = self.prepare(operation);
        let variables = operation.variables().clone();
        let id = operation.id();

        let mut stream = self.chain.execute(operation).await?;
        let Some(first) = stream.next().await else {
            return Err(ClientError::Protocol {
                message: "transport produced no result".to_string(),
            });
        };
        let response = first?;
        if let Some(data) = &response.data {
            let keys = self.cache.write_document(data, &variables);
            debug!(operation = %id, entities = keys.len(), "normalized response");
        }
        Ok(response)
    }

    /// Start a subscription.
    ///
    /// The returned stream delivers results and failures on the same
    /// channel; its handle cancels cooperatively at every suspension point.
    /// Cancelling before the prelude resolves means no transport is ever
    /// invoked.
    #[must_use]
    pub fn subscribe(&self, operation: Operation) -> Subscription {
        let operation = self.prepare(operation);
        let id = operation.id();
        let (tx, rx) = mpsc::channel(16);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let (phase_tx, phase_rx) = watch::channel(OperationPhase::Pending);

        let chain = self.chain.clone();
        let cache = Arc::clone(&self.cache);
        let variables = operation.variables().clone();

        tokio::spawn(async move {
            let forwarded = tokio::select! {
                () = cancelled(&mut cancel_rx) => None,
                () = tx.closed() => None,
                result = chain.execute(operation) => Some(result),
            };
            let Some(result) = forwarded else {
                debug!(operation = %id, "cancelled before forward");
                let _ = phase_tx.send(OperationPhase::Cancelled);
                return;
            };
            let mut stream = match result {
                Ok(stream) => {
                    let _ = phase_tx.send(OperationPhase::Forwarded);
                    stream
                }
                Err(err) => {
                    let _ = phase_tx.send(OperationPhase::Errored);
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            };

            loop {
                tokio::select! {
                    () = cancelled(&mut cancel_rx) => {
                        let _ = phase_tx.send(OperationPhase::Cancelled);
                        return;
                    }
                    () = tx.closed() => {
                        let _ = phase_tx.send(OperationPhase::Cancelled);
                        return;
                    }
                    item = stream.next() => match item {
                        Some(Ok(response)) => {
                            if let Some(data) = &response.data {
                                cache.write_document(data, &variables);
                            }
                            if tx.send(Ok(response)).await.is_err() {
                                let _ = phase_tx.send(OperationPhase::Cancelled);
                                return;
                            }
                        }
                        Some(Err(err)) => {
                            let _ = phase_tx.send(OperationPhase::Errored);
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        None => {
                            let _ = phase_tx.send(OperationPhase::Completed);
                            return;
                        }
                    }
                }
            }
        });

        Subscription::new(rx, cancel_tx, phase_rx)
    }

    /// Apply the client's default headers to a fresh operation.
    fn prepare(&self, mut operation: Operation) -> Operation {
        for (name, value) in &self.headers {
            if operation.context().header(name).is_none() {
                operation.context_mut().set_header(name.clone(), value.clone());
            }
        }
        operation
    }
}

//! Predicate-based transport routing.
//!
//! Bindings are evaluated in registration order; the first matching
//! predicate wins and anything unmatched falls through to the default
//! backend. The decision is made once per operation, before dispatch, and
//! is never re-evaluated mid-flight.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ClientError;
use crate::interceptor::{ResultStream, TerminalDispatch};
use crate::operation::Operation;

/// A transport collaborator: moves an operation to a server and returns its
/// result(s) as a stream. Request/response backends yield a single item.
#[async_trait]
pub trait TransportBackend: Send + Sync {
    /// Backend name, for routing logs.
    fn name(&self) -> &str;

    /// Execute the operation.
    async fn dispatch(&self, operation: Operation) -> Result<ResultStream, ClientError>;
}

/// Routing predicate over an operation's static structure.
pub type RoutePredicate = Arc<dyn Fn(&Operation) -> bool + Send + Sync>;

/// A (predicate, backend) pair.
pub struct TransportBinding {
    predicate: RoutePredicate,
    backend: Arc<dyn TransportBackend>,
}

impl TransportBinding {
    /// Bind a backend to a predicate.
    #[must_use]
    pub fn new(
        predicate: impl Fn(&Operation) -> bool + Send + Sync + 'static,
        backend: Arc<dyn TransportBackend>,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            backend,
        }
    }
}

/// Routes each operation to the first matching backend.
pub struct TransportRouter {
    bindings: Vec<TransportBinding>,
    default_backend: Arc<dyn TransportBackend>,
}

impl TransportRouter {
    /// Create a router with only a default backend.
    #[must_use]
    pub fn new(default_backend: Arc<dyn TransportBackend>) -> Self {
        Self {
            bindings: Vec::new(),
            default_backend,
        }
    }

    /// Append a binding; bindings match in registration order.
    #[must_use]
    pub fn with_binding(mut self, binding: TransportBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// The canonical split: subscriptions go to the streaming backend,
    /// queries and mutations to the default backend.
    #[must_use]
    pub fn split_subscriptions(
        streaming: Arc<dyn TransportBackend>,
        default_backend: Arc<dyn TransportBackend>,
    ) -> Self {
        Self::new(default_backend).with_binding(TransportBinding::new(
            |operation| operation.kind().is_subscription(),
            streaming,
        ))
    }

    /// Select a backend for the operation.
    #[must_use]
    pub fn route(&self, operation: &Operation) -> Arc<dyn TransportBackend> {
        for binding in &self.bindings {
            if (binding.predicate)(operation) {
                return Arc::clone(&binding.backend);
            }
        }
        Arc::clone(&self.default_backend)
    }
}

#[async_trait]
impl TerminalDispatch for TransportRouter {
    async fn dispatch(&self, operation: Operation) -> Result<ResultStream, ClientError> {
        let backend = self.route(&operation);
        debug!(
            operation = %operation.id(),
            kind = ?operation.kind(),
            backend = backend.name(),
            "routed operation"
        );
        backend.dispatch(operation).await
    }
}

//! Ordered asynchronous interceptor chain.
//!
//! Links run in caller order; each receives the in-flight operation and a
//! `Next` handle to the remainder of the chain. A link may pass through,
//! perform asynchronous work before forwarding, short-circuit with a result
//! stream, or short-circuit with an error. The chain terminates in the
//! transport router.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::Stream;
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::operation::{GraphqlResponse, Operation};

/// Stream of operation results, as produced by a transport backend.
pub type ResultStream =
    Pin<Box<dyn Stream<Item = Result<GraphqlResponse<Value>, ClientError>> + Send>>;

/// A node in the interceptor chain.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Handle the operation, forwarding through `next` to continue.
    async fn intercept(
        &self,
        operation: Operation,
        next: Next,
    ) -> Result<ResultStream, ClientError>;
}

/// Terminal dispatcher at the end of the chain.
#[async_trait]
pub trait TerminalDispatch: Send + Sync {
    /// Dispatch a fully augmented operation to a transport.
    async fn dispatch(&self, operation: Operation) -> Result<ResultStream, ClientError>;
}

/// Handle to the remainder of the chain.
pub struct Next {
    links: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    terminal: Arc<dyn TerminalDispatch>,
}

impl Next {
    /// Forward the operation to the rest of the chain.
    pub async fn forward(self, operation: Operation) -> Result<ResultStream, ClientError> {
        match self.links.get(self.index) {
            Some(link) => {
                let link = Arc::clone(link);
                let next = Self {
                    links: self.links,
                    index: self.index + 1,
                    terminal: self.terminal,
                };
                link.intercept(operation, next).await
            }
            None => self.terminal.dispatch(operation).await,
        }
    }
}

/// The ordered chain plus its terminal dispatcher.
#[derive(Clone)]
pub struct InterceptorChain {
    links: Arc<[Arc<dyn Interceptor>]>,
    terminal: Arc<dyn TerminalDispatch>,
}

impl InterceptorChain {
    /// Build a chain; link order is significant and caller-specified.
    #[must_use]
    pub fn new(links: Vec<Arc<dyn Interceptor>>, terminal: Arc<dyn TerminalDispatch>) -> Self {
        Self {
            links: links.into(),
            terminal,
        }
    }

    /// Run every link in order, then the terminal dispatcher.
    pub async fn execute(&self, operation: Operation) -> Result<ResultStream, ClientError> {
        debug!(
            operation = %operation.id(),
            kind = ?operation.kind(),
            links = self.links.len(),
            "executing interceptor chain"
        );
        let next = Next {
            links: Arc::clone(&self.links),
            index: 0,
            terminal: Arc::clone(&self.terminal),
        };
        next.forward(operation).await
    }
}

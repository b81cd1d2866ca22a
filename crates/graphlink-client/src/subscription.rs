//! Subscription streams and explicit cancellation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ClientError;
use crate::operation::GraphqlResponse;

/// Per-execution lifecycle of an operation.
///
/// `Cancelled` is reachable from `Pending` (nothing was forwarded, the
/// transport was never invoked) and from `Forwarded` (the downstream
/// subscription is torn down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    /// Awaiting the asynchronous prelude.
    Pending,
    /// Forwarded to a transport, awaiting results.
    Forwarded,
    /// The result stream ended normally.
    Completed,
    /// The operation failed.
    Errored,
    /// The consumer cancelled.
    Cancelled,
}

/// Cancellation handle for one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancel: Arc<watch::Sender<bool>>,
    phase: watch::Receiver<OperationPhase>,
}

impl SubscriptionHandle {
    /// Request cancellation; checked at every suspension point.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Snapshot of the operation's phase.
    #[must_use]
    pub fn phase(&self) -> OperationPhase {
        *self.phase.borrow()
    }

    /// Wait for the next phase transition and return the new phase.
    ///
    /// Returns the current phase once the execution task is gone.
    pub async fn phase_changed(&mut self) -> OperationPhase {
        let _ = self.phase.changed().await;
        *self.phase.borrow()
    }
}

/// A stream of subscription results plus its cancellation handle.
pub struct Subscription {
    stream: ReceiverStream<Result<GraphqlResponse<Value>, ClientError>>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub(crate) fn new(
        rx: mpsc::Receiver<Result<GraphqlResponse<Value>, ClientError>>,
        cancel: Arc<watch::Sender<bool>>,
        phase: watch::Receiver<OperationPhase>,
    ) -> Self {
        Self {
            stream: ReceiverStream::new(rx),
            handle: SubscriptionHandle { cancel, phase },
        }
    }

    /// A cloneable cancellation handle.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Cancel this subscription.
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl Stream for Subscription {
    type Item = Result<GraphqlResponse<Value>, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

/// Resolve once cancellation is requested through `rx`.
///
/// Pends forever if the handle side is gone without a cancel; consumer
/// departure is observed separately through the result channel.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

//! Graphlink Client - GraphQL request pipeline.
//!
//! This crate provides:
//! - An operation model with a mutable per-operation context.
//! - An ordered asynchronous interceptor chain run before dispatch.
//! - Predicate-based routing between request/response and streaming
//!   transports.
//! - A client facade wiring the chain, router, backends, and the
//!   normalized cache together.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

mod auth;
mod client;
mod error;
mod http;
mod interceptor;
mod operation;
mod router;
mod subscription;
mod ws;

pub use auth::{AuthInterceptor, StaticTokenStore, TOKEN_KEY, TokenStore, TokenStoreError};
pub use client::{Client, ClientBuilder, ClientConfig};
pub use error::{ClientError, GraphqlError, GraphqlErrorLocation, GraphqlPathSegment, HttpErrorInfo};
pub use http::HttpBackend;
pub use interceptor::{Interceptor, InterceptorChain, Next, ResultStream, TerminalDispatch};
pub use operation::{GraphqlDocument, GraphqlResponse, Operation, OperationContext, OperationKind};
pub use router::{RoutePredicate, TransportBackend, TransportBinding, TransportRouter};
pub use subscription::{OperationPhase, Subscription, SubscriptionHandle};
pub use ws::WsBackend;

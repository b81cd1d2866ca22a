//! Graphlink Transport - WebSocket plumbing for GraphQL streaming.
//!
//! This crate provides:
//! - A timeout-guarded WebSocket connection with JSON send/receive.
//! - The graphql-transport-ws wire frames.
//! - Reconnection backoff with optional jitter.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

mod error;
mod reconnect;
mod socket;
mod wire;

pub use error::{StreamError, StreamResult};
pub use reconnect::{ReconnectConfig, ReconnectState};
pub use socket::{GraphqlSocket, SocketConfig, SocketConnection};
pub use wire::{CloseFrame, SocketMessage, WireMessage};

use std::time::Duration;

/// Default reconnection delay.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Maximum reconnection delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

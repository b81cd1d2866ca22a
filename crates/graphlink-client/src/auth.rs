//! Token lookup and the auth-injection interceptor.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::error::ClientError;
use crate::interceptor::{Interceptor, Next, ResultStream};
use crate::operation::Operation;

/// Storage key for the auth token.
pub const TOKEN_KEY: &str = "token";

/// Token store failure (storage unreachable, corrupted, ...).
#[derive(Debug, Clone, Error)]
#[error("token store error: {message}")]
pub struct TokenStoreError {
    /// Failure details.
    pub message: String,
}

impl TokenStoreError {
    /// Create a token store error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Asynchronous token storage collaborator.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch a stored value; `None` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError>;
}

/// In-memory token store.
#[derive(Debug, Default)]
pub struct StaticTokenStore {
    token: RwLock<Option<String>>,
}

impl StaticTokenStore {
    /// Create a store holding `token`.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replace the stored token.
    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

#[async_trait]
impl TokenStore for StaticTokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, TokenStoreError> {
        Ok(self.token.read().clone())
    }
}

/// Interceptor that attaches the stored auth token to the operation.
///
/// The asynchronous lookup completes before the operation is forwarded; a
/// lookup failure becomes the operation's terminal error and the transport
/// is never invoked.
pub struct AuthInterceptor {
    store: Arc<dyn TokenStore>,
}

impl AuthInterceptor {
    /// Create the interceptor over a token store.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    async fn intercept(
        &self,
        mut operation: Operation,
        next: Next,
    ) -> Result<ResultStream, ClientError> {
        let token = self
            .store
            .get(TOKEN_KEY)
            .await
            .map_err(|err| ClientError::Prelude {
                message: err.to_string(),
            })?;
        debug!(
            operation = %operation.id(),
            has_token = token.is_some(),
            "auth prelude complete"
        );
        let value = token.map_or_else(String::new, |token| format!("Bearer {token}"));
        operation.context_mut().set_header("authorization", value);
        next.forward(operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_store_round_trip() {
        let store = StaticTokenStore::new(Some("secret".to_string()));
        assert_eq!(
            store.get(TOKEN_KEY).await.expect("get"),
            Some("secret".to_string())
        );
        store.set(None);
        assert_eq!(store.get(TOKEN_KEY).await.expect("get"), None);
    }
}

//! Request/response transport over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::interceptor::ResultStream;
use crate::operation::{GraphqlResponse, Operation};
use crate::router::TransportBackend;

/// HTTP request/response backend.
///
/// Sends one POST per operation and yields a single-item result stream.
/// There is no retry at this layer; retry policy, if any, belongs to an
/// external collaborator.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for an endpoint.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(endpoint, http))
    }

    /// Create a backend over an existing HTTP client.
    #[must_use]
    pub fn with_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    /// The endpoint URI.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TransportBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn dispatch(&self, operation: Operation) -> Result<ResultStream, ClientError> {
        let mut request = self.http.post(&self.endpoint).json(&operation.request_body());
        for (name, value) in operation.context().headers() {
            request = request.header(name, value);
        }

        debug!(operation = %operation.id(), endpoint = %self.endpoint, "sending request");
        let response = request.send().await?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status,
                body: truncate_body(&bytes),
                retry_after,
            });
        }

        let parsed: GraphqlResponse<Value> = serde_json::from_slice(&bytes)?;
        Ok(Box::pin(futures_util::stream::iter([Ok(parsed)])))
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        body.truncate(MAX_LEN);
        body.push('…');
    }
    body
}

use std::pin::Pin;

use futures::StreamExt as _;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ChatError, TransportError};
use crate::model::{CallResult, ChatRequest, ToolCallPayload};

/// Path of the streaming chat endpoint.
pub const STREAM_CHAT_PATH: &str = "/api/agent/chat/stream";
/// Path of the non-streaming chat endpoint.
pub const CHAT_PATH: &str = "/api/agent/chat";
/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Response body delivered as ordered chunks.
///
/// Dropping the stream releases the underlying connection.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Issues the streaming request and exposes its body as chunks.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request. Must fail with `TransportError::Status` when the
    /// response status is not a success, before any chunk is produced.
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError>;
}

/// `Transport` backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(self.config.url(path)))
    }

    fn authorize(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(credentials) = &self.config.credentials {
            req = req.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(timeout) = self.config.timeout {
            req = req.timeout(timeout);
        }
        req
    }

    /// Sends a non-streaming chat request and returns the complete answer.
    pub async fn chat(&self, request: &ChatRequest) -> Result<CallResult, ChatError> {
        request.validate()?;
        let response = self
            .post(CHAT_PATH)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::network(format!("chat request failed: {e}")))?;
        let response = ensure_success(response).await?;
        let body: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| TransportError::network(format!("invalid chat response body: {e}")))?;
        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(ChatError::protocol(error));
        }
        Ok(CallResult {
            message: body.message,
            tool_calls: body.tool_calls,
        })
    }

    /// Checks that the server answers `GET /health` with a success status.
    pub async fn health(&self) -> Result<(), TransportError> {
        let response = self
            .authorize(self.client.get(self.config.url(HEALTH_PATH)))
            .send()
            .await
            .map_err(|e| TransportError::network(format!("health check failed: {e}")))?;
        ensure_success(response).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        debug!(url = %self.config.url(STREAM_CHAT_PATH), history = request.history.len(), "opening chat stream");
        let response = self
            .post(STREAM_CHAT_PATH)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::network(format!("stream request failed: {e}")))?;
        let response = ensure_success(response).await?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| TransportError::network(format!("stream read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(TransportError::status(status.as_u16(), body))
}

#[derive(serde::Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_base_url() {
        let result = HttpTransport::new(ClientConfig::new(""));
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn response_body_tolerates_missing_fields() {
        let body: ChatResponseBody = serde_json::from_str("{}").expect("deserialize");
        assert!(body.message.is_empty());
        assert!(body.tool_calls.is_empty());
        assert!(body.error.is_none());
    }
}

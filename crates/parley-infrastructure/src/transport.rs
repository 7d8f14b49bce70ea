//! HTTP chat transport.

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::error::{ParleyError, Result};
use parley_core::settings::BackendSettings;
use parley_core::transport::{ChatRequest, ChatTransport, TransportResponse};

/// Posts [`ChatRequest`]s as JSON to `<base_url>/chat`.
///
/// Timeouts and retries are left to the `reqwest::Client` the caller
/// supplies.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn from_settings(settings: &BackendSettings) -> Self {
        Self::new(&settings.base_url)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for ReqwestTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse> {
        tracing::debug!(
            endpoint = %self.endpoint,
            stream = request.stream,
            model = ?request.model_id,
            "Sending chat request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ParleyError::stream(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if request.stream && status.is_success() {
            let bytes = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| ParleyError::stream(e.to_string())));
            return Ok(TransportResponse::Streamed(bytes.boxed()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ParleyError::stream(format!("failed to read response body: {e}")))?;
        Ok(TransportResponse::Complete {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(
            ReqwestTransport::new("http://localhost:8000/").endpoint(),
            "http://localhost:8000/chat"
        );
        assert_eq!(
            ReqwestTransport::new("https://api.example.com/v1").endpoint(),
            "https://api.example.com/v1/chat"
        );
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use serde_json::Value;

use crate::error::{classify_upstream_error, ProxyError};
use crate::messages::openai::{UpstreamChunk, UpstreamCompletion, UpstreamRequest};
use crate::provider::http_client::build_http_client;
use crate::provider::{ChunkStream, RawChunkStream, UpstreamClient};

/// Talks to a native-OpenAI or Azure-OpenAI-shaped Chat Completions endpoint.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    azure_api_version: Option<String>,
    custom_headers: BTreeMap<String, String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: String,
        api_key: SecretString,
        timeout: Duration,
        azure_api_version: Option<String>,
        custom_headers: BTreeMap<String, String>,
    ) -> Self {
        Self { client: build_http_client(timeout), base_url, api_key, azure_api_version, custom_headers }
    }

    /// Builds the upstream URL for `model`, switching between native and Azure URL
    /// shapes based on whether this client was configured with an Azure API version.
    fn completions_url(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.azure_api_version {
            Some(api_version) => {
                format!("{base}/openai/deployments/{model}/chat/completions?api-version={api_version}")
            }
            None => format!("{base}/chat/completions"),
        }
    }

    fn header_map(&self) -> ProxyResultHeaders {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret()))
                .map_err(|e| ProxyError::Internal(format!("invalid authorization header: {e}")))?,
        );
        for (name, value) in &self.custom_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProxyError::Internal(format!("invalid custom header name {name:?}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| ProxyError::Internal(format!("invalid custom header value for {name:?}: {e}")))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    /// Maps a non-2xx upstream response to a [`ProxyError`], picking the outward status
    /// from spec.md §4.5's kind table via [`classify_upstream_error`] rather than
    /// forwarding the upstream's own status verbatim (a `forbidden_region` error, for
    /// instance, is typically a 400 upstream but reported outward as 403).
    fn classify_status(status: reqwest::StatusCode, body: String) -> ProxyError {
        log::error!("upstream returned {status}: {body}");
        match classify_upstream_error(&body) {
            Some(classified) => ProxyError::UpstreamApiError { status: classified.status.as_u16(), message: classified.message },
            None => ProxyError::UpstreamApiError { status: status.as_u16(), message: body },
        }
    }

    /// Posts `body` verbatim (spec.md §6.1), racing the same cancellation signal as
    /// [`complete`](UpstreamClient::complete) and [`stream_complete`](UpstreamClient::stream_complete)
    /// but bypassing the typed `UpstreamRequest`/`UpstreamCompletion` model entirely.
    async fn post_raw_json(&self, model: &str, body: Value, cancel: &CancellationToken) -> crate::error::ProxyResult<reqwest::Response> {
        let url = self.completions_url(model);
        let headers = self.header_map()?;
        let body = serde_json::to_vec(&body)
            .map_err(|e| ProxyError::Internal(format!("failed to serialize passthrough request: {e}")))?;

        let send = self.client.post(&url).headers(headers).header("Content-Type", "application/json").body(body).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = send => result.map_err(|e| ProxyError::ConnectionError(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            return Err(Self::classify_status(status, body));
        }

        Ok(response)
    }
}

type ProxyResultHeaders = Result<HeaderMap, ProxyError>;

#[async_trait]
impl UpstreamClient for OpenAiClient {
    async fn complete(&self, request: &UpstreamRequest, cancel: CancellationToken) -> crate::error::ProxyResult<UpstreamCompletion> {
        let url = self.completions_url(&request.model);
        let headers = self.header_map()?;
        let body = serde_json::to_vec(request)
            .map_err(|e| ProxyError::Internal(format!("failed to serialize upstream request: {e}")))?;

        let send = self.client.post(&url).headers(headers).header("Content-Type", "application/json").body(body).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = send => result.map_err(|e| ProxyError::ConnectionError(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            return Err(Self::classify_status(status, body));
        }

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = response.text() => result.map_err(|e| ProxyError::ConnectionError(e.to_string()))?,
        };

        serde_json::from_str(&text).map_err(|e| ProxyError::MalformedUpstreamResponse(e.to_string()))
    }

    async fn stream_complete(&self, request: &UpstreamRequest, cancel: CancellationToken) -> crate::error::ProxyResult<ChunkStream> {
        let url = self.completions_url(&request.model);
        let headers = self.header_map()?;
        let mut request = request.clone();
        request.stream = true;

        let body = serde_json::to_vec(&request)
            .map_err(|e| ProxyError::Internal(format!("failed to serialize upstream request: {e}")))?;

        let send = self.client.post(&url).headers(headers).header("Content-Type", "application/json").body(body).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = send => result.map_err(|e| ProxyError::ConnectionError(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            return Err(Self::classify_status(status, body));
        }

        let event_stream = response.bytes_stream().eventsource();

        let chunk_stream = event_stream.take_while({
            let cancel = cancel.clone();
            move |_| {
                let cancelled = cancel.is_cancelled();
                async move { !cancelled }
            }
        }).filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("SSE parsing error in upstream stream: {e}");
                    return None;
                }
            };

            if event.data == "[DONE]" {
                return None;
            }

            match serde_json::from_str::<UpstreamChunk>(&event.data) {
                Ok(chunk) => Some(Ok(chunk)),
                Err(e) => {
                    log::warn!("failed to parse upstream chunk: {e}");
                    None
                }
            }
        });

        Ok(Box::pin(chunk_stream))
    }

    async fn complete_raw(&self, model: &str, body: Value, cancel: CancellationToken) -> crate::error::ProxyResult<Value> {
        let response = self.post_raw_json(model, body, &cancel).await?;

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = response.text() => result.map_err(|e| ProxyError::ConnectionError(e.to_string()))?,
        };

        serde_json::from_str(&text).map_err(|e| ProxyError::MalformedUpstreamResponse(e.to_string()))
    }

    async fn stream_raw(&self, model: &str, body: Value, cancel: CancellationToken) -> crate::error::ProxyResult<RawChunkStream> {
        let response = self.post_raw_json(model, body, &cancel).await?;

        let event_stream = response.bytes_stream().eventsource();

        let raw_stream = event_stream.take_while({
            let cancel = cancel.clone();
            move |_| {
                let cancelled = cancel.is_cancelled();
                async move { !cancelled }
            }
        }).filter_map(|event| async move {
            match event {
                Ok(event) if event.data == "[DONE]" => None,
                Ok(event) => Some(Ok(event.data)),
                Err(e) => {
                    log::warn!("SSE parsing error in upstream passthrough stream: {e}");
                    None
                }
            }
        });

        Ok(Box::pin(raw_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(
            "https://api.openai.com/v1".into(),
            SecretString::from("sk-test".to_string()),
            Duration::from_secs(90),
            None,
            BTreeMap::new(),
        )
    }

    #[test]
    fn native_url_has_no_query_string() {
        assert_eq!(client().completions_url("gpt-4o"), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn azure_url_uses_deployment_path_and_api_version() {
        let azure = OpenAiClient::new(
            "https://my-resource.openai.azure.com".into(),
            SecretString::from("sk-test".to_string()),
            Duration::from_secs(90),
            Some("2024-06-01".into()),
            BTreeMap::new(),
        );
        assert_eq!(
            azure.completions_url("gpt-4o"),
            "https://my-resource.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn custom_headers_are_injected() {
        let mut custom = BTreeMap::new();
        custom.insert("X-Request-Id".to_string(), "abc".to_string());
        let client = OpenAiClient::new(
            "https://api.openai.com/v1".into(),
            SecretString::from("sk-test".to_string()),
            Duration::from_secs(90),
            None,
            custom,
        );
        let headers = client.header_map().unwrap();
        assert_eq!(headers.get("X-Request-Id").unwrap(), "abc");
        assert!(headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn classify_status_remaps_forbidden_region_from_a_400() {
        let error = OpenAiClient::classify_status(
            reqwest::StatusCode::BAD_REQUEST,
            "unsupported_country_region_territory".to_string(),
        );
        match error {
            ProxyError::UpstreamApiError { status, .. } => assert_eq!(status, 403),
            other => panic!("expected UpstreamApiError, got {other:?}"),
        }
    }

    #[test]
    fn classify_status_keeps_upstream_status_when_unrecognized() {
        let error = OpenAiClient::classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string());
        match error {
            ProxyError::UpstreamApiError { status, .. } => assert_eq!(status, 500),
            other => panic!("expected UpstreamApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_raw_rejects_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = client().complete_raw("gpt-4o", serde_json::json!({"model": "gpt-4o"}), cancel).await.unwrap_err();
        assert!(matches!(error, ProxyError::Cancelled));
    }

    #[tokio::test]
    async fn stream_raw_rejects_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = client().stream_raw("gpt-4o", serde_json::json!({"model": "gpt-4o"}), cancel).await.unwrap_err();
        assert!(matches!(error, ProxyError::Cancelled));
    }
}

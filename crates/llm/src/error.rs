//! Error taxonomy for the proxy, with response bodies in both the upstream
//! (OpenAI-style) and client-facing (Anthropic-style) shapes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::messages::anthropic;

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// Everything that can go wrong translating or forwarding a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The inbound request body failed validation before any translation occurred.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The client-facing bearer credential was missing or did not match.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Client disconnected or the request was cancelled mid-flight.
    #[error("Request cancelled by client")]
    Cancelled,

    /// The upstream returned a non-2xx response.
    #[error("Upstream API error ({status}): {message}")]
    UpstreamApiError { status: u16, message: String },

    /// Transport-level failure reaching the upstream (DNS, TLS, connect, timeout).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The upstream returned a response this proxy could not translate.
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Anything else, not expected to be shown to a client verbatim.
    #[error("Internal server error")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::Cancelled => StatusCode::from_u16(499).expect("499 is a valid status code"),
            Self::UpstreamApiError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            Self::MalformedUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::AuthenticationFailed(_) => "authentication_error",
            Self::Cancelled => "cancelled_error",
            Self::UpstreamApiError { .. } | Self::ConnectionError(_) | Self::MalformedUpstreamResponse(_) => {
                "api_error"
            }
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to hand back to a client. For upstream-originated errors the raw
    /// text has already been classified into `status`/`message` at construction time
    /// (see [`classify_upstream_error`] and `provider::openai::classify_status`);
    /// connection-level failures are classified here since they never go through that
    /// path.
    pub fn client_message(&self) -> String {
        match self {
            Self::UpstreamApiError { message, .. } => message.clone(),
            Self::ConnectionError(message) => {
                classify_upstream_error(message).map(|c| c.message).unwrap_or_else(|| message.clone())
            }
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// OpenAI-style error body, used on the `/v1/chat/completions` passthrough surface.
#[derive(Debug, Serialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetails,
}

#[derive(Debug, Serialize)]
struct OpenAiErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = OpenAiErrorResponse {
            error: OpenAiErrorDetails {
                message: self.client_message(),
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Wrapper that renders a [`ProxyError`] in the Anthropic error-body shape instead,
/// for use on the `/v1/messages` surface.
pub struct AnthropicError {
    status: StatusCode,
    body: anthropic::ErrorResponse,
}

impl From<ProxyError> for AnthropicError {
    fn from(error: ProxyError) -> Self {
        let status = error.status_code();
        let body = anthropic::ErrorResponse::new(error.error_type(), error.client_message());
        Self { status, body }
    }
}

impl IntoResponse for AnthropicError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicError>;

/// An upstream error message rewritten into actionable guidance, paired with the
/// outward HTTP status spec.md §4.5's taxonomy table assigns to its kind — which does
/// not always match the status the upstream itself returned (`forbidden_region` is
/// reported outward as 403 even though it is typically a 400 from the upstream).
pub struct ClassifiedError {
    pub status: StatusCode,
    pub message: String,
}

/// Classifies common upstream error text against the fixed, first-match-wins phrase
/// list of the original proxy's `classify_openai_error`, matching spec.md §4.5's kind
/// table in order (`forbidden_region`, `invalid_auth`, `rate_limited`, `not_found_model`,
/// `billing`, `context_length`). Returns `None` when nothing matches, in which case the
/// caller should keep the upstream's own status and message verbatim (the `upstream_error`
/// kind).
pub fn classify_upstream_error(raw: &str) -> Option<ClassifiedError> {
    let lower = raw.to_lowercase();

    if lower.contains("unsupported_country_region_territory") || lower.contains("country, region, or territory not supported")
    {
        return Some(ClassifiedError {
            status: StatusCode::FORBIDDEN,
            message: "OpenAI API is not available in your region. Consider using a VPN or Azure OpenAI service.".to_string(),
        });
    }
    if lower.contains("invalid_api_key") || lower.contains("unauthorized") {
        return Some(ClassifiedError {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid API key. Please check your OPENAI_API_KEY configuration.".to_string(),
        });
    }
    if lower.contains("rate_limit") || lower.contains("quota") {
        return Some(ClassifiedError {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Rate limit exceeded. Please wait and try again, or upgrade your API plan.".to_string(),
        });
    }
    if lower.contains("model") && (lower.contains("not found") || lower.contains("does not exist")) {
        return Some(ClassifiedError {
            status: StatusCode::BAD_REQUEST,
            message: "Model not found. Please check your BIG_MODEL and SMALL_MODEL configuration.".to_string(),
        });
    }
    if lower.contains("billing") || lower.contains("payment") {
        return Some(ClassifiedError {
            status: StatusCode::PAYMENT_REQUIRED,
            message: "Billing issue. Please check your OpenAI account billing status.".to_string(),
        });
    }
    if lower.contains("context_length_exceeded") || lower.contains("maximum context length") {
        return Some(ClassifiedError {
            status: StatusCode::BAD_REQUEST,
            message: "Context length exceeded. Please reduce the size of your messages or max_tokens parameter.".to_string(),
        });
    }

    None
}

//! HTTP handlers for the proxy's three surfaces: the translating `/v1/messages`
//! endpoint, the token estimator, and the OpenAI passthrough, plus identity/liveness.

mod auth;

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_serde::Sonic;
use futures::stream::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use config::Config;

use crate::cancellation::{CancellationGuard, CancellationRegistry};
use crate::error::{AnthropicError, AnthropicResult, ProxyError, ProxyResult};
use crate::messages::anthropic::{MessagesRequest, TokenCountRequest, TokenCountResponse};
use crate::messages::openai::UpstreamRequest;
use crate::model_rewrite::rewrite_model;
use crate::provider::UpstreamClient;
use crate::translate::stream::StreamTranslator;
use crate::translate::{request::translate_request, response::translate_response, ToolRendering};

pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub cancellation: Arc<CancellationRegistry>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(identity))
        .route("/health", get(health))
        .route("/v1/messages", post(messages))
        .route("/v1/messages/count_tokens", post(count_tokens))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}

async fn identity() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Sonic(request): Sonic<MessagesRequest>,
) -> AnthropicResult<Response> {
    auth::authenticate(&headers, state.config.anthropic_api_key.as_ref()).map_err(AnthropicError::from)?;

    handle_messages(state, request).await.map_err(AnthropicError::from)
}

async fn handle_messages(state: Arc<AppState>, request: MessagesRequest) -> ProxyResult<Response> {
    let rewrite = rewrite_model(&request.model, &state.config.preferred_provider, &state.config.big_model, &state.config.small_model);
    log::debug!("model {} rewritten to {}", rewrite.original, rewrite.rewritten);

    let upstream_request = translate_request(&request, &rewrite.rewritten, state.config.max_tokens_limit);
    let rendering = ToolRendering::for_model(&rewrite.original);

    let request_id = Uuid::new_v4().to_string();
    let (guard, token) = CancellationGuard::new(state.cancellation.clone(), request_id);

    if upstream_request.stream {
        let frames = stream_messages(state.clone(), upstream_request, rewrite.rewritten, token, guard);
        Ok(Sse::new(frames).into_response())
    } else {
        let result = state.upstream.complete(&upstream_request, token).await;
        guard.disarm();
        let completion = result?;
        let response = translate_response(&completion, &rewrite.rewritten, rendering);
        Ok(Json(response).into_response())
    }
}

/// Drives the streaming translator over the upstream chunk stream. `guard` is moved
/// into the generator and disarmed once the stream reaches a terminal state on its own;
/// if the client disconnects mid-stream, axum drops this future without polling it to
/// completion, dropping `guard` while still armed and firing the cancellation token.
fn stream_messages(
    state: Arc<AppState>,
    upstream_request: UpstreamRequest,
    model: String,
    token: CancellationToken,
    guard: CancellationGuard,
) -> impl futures::Stream<Item = Result<Event, std::convert::Infallible>> {
    let body = async_stream::stream! {
        let guard = guard;
        let mut fsm = StreamTranslator::new(model.clone());
        for event in fsm.start() {
            yield to_sse_event(&event);
        }

        let chunks = match state.upstream.stream_complete(&upstream_request, token.clone()).await {
            Ok(chunks) => chunks,
            Err(e) => {
                log::error!("failed to open upstream stream: {e}");
                for event in fsm.finish_with_error() {
                    yield to_sse_event(&event);
                }
                yield Event::default().data("[DONE]");
                guard.disarm();
                return;
            }
        };

        let mut chunks = chunks;
        let mut saw_finish = false;

        while let Some(next) = chunks.next().await {
            match next {
                Ok(chunk) => {
                    for event in fsm.handle_chunk(&chunk) {
                        yield to_sse_event(&event);
                    }
                    if fsm.is_terminated() {
                        saw_finish = true;
                        break;
                    }
                }
                Err(e) => {
                    log::error!("upstream stream failed mid-flight: {e}");
                    for event in fsm.finish_with_error() {
                        yield to_sse_event(&event);
                    }
                    saw_finish = true;
                    break;
                }
            }
        }

        if !saw_finish {
            for event in fsm.finish_without_reason() {
                yield to_sse_event(&event);
            }
        }

        yield Event::default().data("[DONE]");
        guard.disarm();
    };

    body
}

fn to_sse_event(event: &crate::messages::anthropic::StreamEvent) -> Result<Event, std::convert::Infallible> {
    let json = serde_json::to_string(event).unwrap_or_else(|e| {
        log::error!("failed to serialize stream event: {e}");
        r#"{"type":"error","error":{"type":"internal_error","message":"serialization failed"}}"#.to_string()
    });
    Ok(Event::default().event(event.event_name()).data(json))
}

async fn count_tokens(Sonic(request): Sonic<TokenCountRequest>) -> impl IntoResponse {
    let input_tokens = crate::token_counter::estimate_tokens(&request);
    Json(TokenCountResponse { input_tokens })
}

/// Forwards the request body verbatim after adding auth (spec.md §6.1): the body is
/// accepted and re-sent as a raw `serde_json::Value` rather than round-tripped through
/// the internal `UpstreamRequest` type, so fields that type doesn't model (`n`, `user`,
/// `frequency_penalty`, `response_format`, ...) survive unmolested.
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Sonic(body): Sonic<Value>,
) -> ProxyResult<Response> {
    auth::authenticate(&headers, state.config.anthropic_api_key.as_ref())?;

    let model = body
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::InvalidRequest("missing \"model\" field".to_string()))?
        .to_string();
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let request_id = Uuid::new_v4().to_string();
    let (guard, token) = CancellationGuard::new(state.cancellation.clone(), request_id);

    if stream {
        let chunks = state.upstream.stream_raw(&model, body, token).await?;
        let event_stream = async_stream::stream! {
            let guard = guard;
            let mut chunks = chunks;
            while let Some(next) = chunks.next().await {
                let event = match next {
                    Ok(data) => Event::default().data(data),
                    Err(e) => Event::default().data(format!(r#"{{"error":"{e}"}}"#)),
                };
                yield Ok::<_, std::convert::Infallible>(event);
            }
            yield Ok(Event::default().data("[DONE]"));
            guard.disarm();
        };
        Ok(Sse::new(event_stream).into_response())
    } else {
        let completion = state.upstream.complete_raw(&model, body, token).await;
        guard.disarm();
        Ok(Json(completion?).into_response())
    }
}

//! Core of the Anthropic-to-OpenAI translating proxy: canonical data model, the
//! three translators, the upstream client adapter, and the axum router.

pub mod cancellation;
pub mod error;
pub mod messages;
pub mod model_rewrite;
pub mod provider;
mod server;
pub mod token_counter;
pub mod translate;

use std::sync::Arc;

use axum::Router;

use config::Config;
use provider::openai::OpenAiClient;
use server::AppState;

pub use error::{AnthropicError, AnthropicResult, ProxyError, ProxyResult};

/// Builds the full axum router for this proxy from a resolved [`Config`].
pub fn router(config: Arc<Config>) -> Router {
    let azure_api_version = config.is_azure().then(|| config.azure_api_version.clone());

    let upstream = OpenAiClient::new(
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
        config.request_timeout,
        azure_api_version,
        config.custom_headers.clone(),
    );

    log::info!(
        "upstream client ready: base_url={} azure={}",
        config.openai_base_url,
        config.is_azure()
    );

    let state = Arc::new(AppState { config, upstream: Arc::new(upstream), cancellation: Arc::new(cancellation::CancellationRegistry::new()) });

    server::router(state)
}

//! Environment-driven configuration for the Anthropic-to-OpenAI proxy.
//!
//! The proxy has no configuration file: every setting is an environment variable,
//! read once at startup into an immutable [`Config`] and passed explicitly to each
//! component. There are no module-level mutable singletons.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;

mod headers;

pub use headers::custom_headers_from_env;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_BIG_MODEL: &str = "gpt-4o";
const DEFAULT_SMALL_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PREFERRED_PROVIDER: &str = "openai";
const DEFAULT_MAX_TOKENS_LIMIT: u32 = 16384;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 90;
const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 8082;
const DEFAULT_LOG_LEVEL: &str = "error";
const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Fully resolved proxy configuration, built once at startup.
#[derive(Clone)]
pub struct Config {
    /// Upstream OpenAI-compatible API key. Required.
    pub openai_api_key: SecretString,
    /// Upstream base URL, e.g. `https://api.openai.com/v1` or an Azure OpenAI resource URL.
    pub openai_base_url: String,
    /// Optional shared secret clients must present to call this proxy.
    pub anthropic_api_key: Option<SecretString>,
    /// Target model substituted for inbound model names containing "sonnet".
    pub big_model: String,
    /// Target model substituted for inbound model names containing "haiku".
    pub small_model: String,
    /// Prefix used when rewriting bare model names (`<provider>/<model>`).
    pub preferred_provider: String,
    /// Upper bound clamped onto every forwarded `max_tokens`.
    pub max_tokens_limit: u32,
    /// Per-request deadline for upstream calls.
    pub request_timeout: Duration,
    /// Bind host for the HTTP server.
    pub server_host: String,
    /// Bind port for the HTTP server.
    pub server_port: u16,
    /// Log verbosity, as passed to the logger.
    pub log_level: String,
    /// Headers injected on every upstream request, derived from `CUSTOM_HEADER_*`.
    pub custom_headers: BTreeMap<String, String>,
    /// API version query parameter used for Azure OpenAI endpoints.
    pub azure_api_version: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Mirrors the validation posture of the original Python `Config`: the proxy
    /// cannot run without an upstream credential, so a missing `OPENAI_API_KEY` is
    /// fatal. The client-facing `ANTHROPIC_API_KEY` is optional — when unset, all
    /// inbound requests are admitted (spec.md §6.2).
    pub fn from_env() -> anyhow::Result<Self> {
        let openai_api_key = require_env("OPENAI_API_KEY")?;

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecretString::from);

        let max_tokens_limit = parse_env_or("MAX_TOKENS_LIMIT", DEFAULT_MAX_TOKENS_LIMIT)?;
        let request_timeout_secs = parse_env_or("REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let server_port = parse_env_or("SERVER_PORT", DEFAULT_SERVER_PORT)?;

        let config = Self {
            openai_api_key: SecretString::from(openai_api_key),
            openai_base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            anthropic_api_key,
            big_model: std::env::var("BIG_MODEL").unwrap_or_else(|_| DEFAULT_BIG_MODEL.to_string()),
            small_model: std::env::var("SMALL_MODEL").unwrap_or_else(|_| DEFAULT_SMALL_MODEL.to_string()),
            preferred_provider: std::env::var("PREFERRED_PROVIDER")
                .unwrap_or_else(|_| DEFAULT_PREFERRED_PROVIDER.to_string())
                .to_lowercase(),
            max_tokens_limit,
            request_timeout: Duration::from_secs(request_timeout_secs),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            server_port,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
            custom_headers: custom_headers_from_env(),
            azure_api_version: std::env::var("OPENAI_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string()),
        };

        log::info!(
            "configuration loaded: provider={} big_model={} small_model={} base_url={}",
            config.preferred_provider,
            config.big_model,
            config.small_model,
            config.openai_base_url
        );

        Ok(config)
    }

    /// True if `openai_base_url` points at an Azure OpenAI resource.
    pub fn is_azure(&self) -> bool {
        self.openai_base_url.contains(".openai.azure.com")
    }
}

fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("missing required environment variable {name}"))
}

fn parse_env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {name} ({raw:?}): {e}")),
        Err(_) => Ok(default),
    }
}

//! Model-name rewriting (spec.md §6.4).
//!
//! Deliberately a standalone, pure function rather than a deserialization-time side
//! effect. The original implementation this proxy is modeled on stashed the pre-rewrite
//! model name onto the request object from inside a validator, which entangled parsing
//! with business logic; this keeps the two separate.

/// Result of rewriting an inbound model string.
pub struct RewrittenModel {
    /// The model name to forward upstream.
    pub rewritten: String,
    /// The model name exactly as the client sent it, kept for logging.
    pub original: String,
}

/// Rewrites `model` against the configured provider prefix and big/small targets.
///
/// 1. Strip a leading `anthropic/` prefix if present.
/// 2. If the remainder contains `haiku` (case-insensitive), replace with
///    `<provider>/<small_model>`.
/// 3. Else if it contains `sonnet`, replace with `<provider>/<big_model>`.
/// 4. Else if not already prefixed with the provider, prepend `<provider>/`.
pub fn rewrite_model(model: &str, provider: &str, big_model: &str, small_model: &str) -> RewrittenModel {
    let original = model.to_string();

    let stripped = model.strip_prefix("anthropic/").unwrap_or(model);
    let lower = stripped.to_lowercase();

    let rewritten = if lower.contains("haiku") {
        format!("{provider}/{small_model}")
    } else if lower.contains("sonnet") {
        format!("{provider}/{big_model}")
    } else if stripped.starts_with(&format!("{provider}/")) {
        stripped.to_string()
    } else {
        format!("{provider}/{stripped}")
    };

    RewrittenModel { rewritten, original }
}

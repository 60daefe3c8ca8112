//! Message types for the two protocols this proxy bridges.
//!
//! `anthropic` is the inbound/outbound contract presented to clients. `openai` is the
//! wire format spoken to the upstream OpenAI-compatible provider. The translators in
//! [`crate::translate`] convert between them; neither module depends on the other.

pub mod anthropic;
pub mod openai;

//! Upstream client adapter (spec.md §4.4).
//!
//! The translators never talk to `reqwest` directly; they go through this trait so
//! tests can drive the streaming translator against canned chunks without a network
//! call. [`openai::OpenAiClient`] is the only implementation this proxy ships.

mod http_client;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ProxyResult;
use crate::messages::openai::{UpstreamChunk, UpstreamCompletion, UpstreamRequest};

pub type ChunkStream = Pin<Box<dyn Stream<Item = ProxyResult<UpstreamChunk>> + Send>>;

/// A stream of raw upstream SSE data lines, undecoded, for the verbatim passthrough
/// surface (spec.md §6.1) where the body isn't modeled by `UpstreamChunk` at all.
pub type RawChunkStream = Pin<Box<dyn Stream<Item = ProxyResult<String>> + Send>>;

/// The operations the translators and the passthrough surface need from an upstream,
/// all racing a cancellation signal. `complete`/`stream_complete` operate on the typed
/// `UpstreamRequest` model used by the `/v1/messages` translation path; `complete_raw`/
/// `stream_raw` forward an arbitrary JSON body verbatim for `/v1/chat/completions`,
/// without round-tripping it through a type that might not model every field.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn complete(&self, request: &UpstreamRequest, cancel: CancellationToken) -> ProxyResult<UpstreamCompletion>;

    async fn stream_complete(&self, request: &UpstreamRequest, cancel: CancellationToken) -> ProxyResult<ChunkStream>;

    async fn complete_raw(&self, model: &str, body: Value, cancel: CancellationToken) -> ProxyResult<Value>;

    async fn stream_raw(&self, model: &str, body: Value, cancel: CancellationToken) -> ProxyResult<RawChunkStream>;
}

//! OpenAI-compatible chat-completions wire types — the upstream contract.
//!
//! These are the shapes sent to and received from the configured upstream. They are
//! structurally independent of [`crate::messages::anthropic`]: the translators in
//! [`crate::translate`] are the only code that knows about both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body sent to `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<UpstreamTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<UpstreamToolChoice>,
}

/// Requests the trailing usage-only chunk some OpenAI-compatible upstreams otherwise
/// omit from a streaming response (spec.md §4.1 step 7).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// A single chat message on the upstream side.
///
/// Unlike the real OpenAI schema, tool-bearing content here is *not* lifted into a
/// separate `tool_calls` array. The original implementation this proxy was modeled on
/// transliterates Anthropic content blocks into the message body verbatim rather than
/// reshaping them into OpenAI's native tool-call format, and this type preserves that
/// behavior (see [`crate::translate::request`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: UpstreamContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Upstream message content: a plain string, or a list of transliterated blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamContent {
    Text(String),
    Blocks(Vec<UpstreamBlock>),
}

/// A content block as transliterated onto the upstream wire. The `type` values match
/// Anthropic's content-block vocabulary, not OpenAI's, by design.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: Value },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: UpstreamFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// `tool_choice` as sent upstream: either a literal string (`"auto"`, `"none"`) or a
/// structured selection of one named function.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UpstreamToolChoice {
    Mode(&'static str),
    Function { r#type: &'static str, function: UpstreamFunctionChoice },
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamFunctionChoice {
    pub name: String,
}

/// Non-streaming response from `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamCompletion {
    pub id: String,
    pub model: String,
    pub choices: Vec<UpstreamChoice>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChoice {
    pub index: u32,
    pub message: UpstreamResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<UpstreamToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamToolCall {
    pub id: String,
    #[serde(default)]
    pub index: Option<u32>,
    pub function: UpstreamFunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UpstreamUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------------
// Streaming (SSE) chunk types
// ---------------------------------------------------------------------------------

/// One `data:` payload of an upstream SSE stream, prior to the terminal `[DONE]`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChunk {
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<UpstreamChunkChoice>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamChunkChoice {
    pub index: u32,
    #[serde(default)]
    pub delta: UpstreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<UpstreamToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<UpstreamFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<UpstreamArgumentsValue>,
}

/// Argument fragments normally arrive as a partial-JSON string, but some
/// OpenAI-compatible providers emit a fully-formed object on the first delta instead.
/// Either way this proxy never attempts to parse partial JSON (spec.md §4.3): a string
/// fragment is forwarded verbatim, and an object fragment is serialized back to text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamArgumentsValue {
    Str(String),
    Obj(Value),
}

impl UpstreamArgumentsValue {
    pub fn as_fragment(&self) -> String {
        match self {
            UpstreamArgumentsValue::Str(s) => s.clone(),
            UpstreamArgumentsValue::Obj(v) => v.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_chunk_with_text_delta() {
        let chunk: UpstreamChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
    }

    #[test]
    fn deserializes_chunk_with_tool_call_delta_string_arguments() {
        let chunk: UpstreamChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "get_weather", "arguments": "{\"lo"}}]},
                "finish_reason": null
            }]
        }))
        .unwrap();
        let call = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.as_ref().unwrap().arguments.as_ref().unwrap().as_fragment(), "{\"lo");
    }

    #[test]
    fn upstream_content_serializes_transliterated_image_block() {
        let message = UpstreamMessage {
            role: "user".into(),
            content: UpstreamContent::Blocks(vec![UpstreamBlock::Image { source: json!({"type": "base64", "media_type": "image/png", "data": "abc"}) }]),
            tool_call_id: None,
            name: None,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["content"][0]["type"], "image");
        assert_eq!(value["content"][0]["source"]["media_type"], "image/png");
    }

    #[test]
    fn upstream_content_serializes_transliterated_tool_use_block() {
        let message = UpstreamMessage {
            role: "assistant".into(),
            content: UpstreamContent::Blocks(vec![UpstreamBlock::ToolUse {
                id: "tu_1".into(),
                name: "get_weather".into(),
                input: json!({"location": "Boston"}),
            }]),
            tool_call_id: None,
            name: None,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["content"][0]["type"], "tool_use");
        assert_eq!(value["content"][0]["name"], "get_weather");
    }
}

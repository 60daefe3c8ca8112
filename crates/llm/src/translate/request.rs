//! Request translator: `MessagesRequest` → `UpstreamRequest` (spec.md §4.1).
//!
//! Pure function, no I/O. `max_tokens` clamping and tool-choice defaulting happen here
//! rather than at the call site so every caller gets the same behavior.

use serde_json::Value;

use crate::messages::anthropic::{ContentBlock, Message, MessageContent, MessagesRequest, SystemPrompt, ToolChoice};
use crate::messages::openai::{
    StreamOptions, UpstreamBlock, UpstreamContent, UpstreamFunction, UpstreamFunctionChoice, UpstreamMessage,
    UpstreamRequest, UpstreamTool, UpstreamToolChoice,
};

/// Translates an inbound request into the shape sent upstream.
///
/// `model` is the already-rewritten upstream-bound model name (see
/// [`crate::model_rewrite::rewrite_model`]); `max_tokens_limit` is the configured clamp
/// (spec.md §3 invariant 6).
pub fn translate_request(req: &MessagesRequest, model: &str, max_tokens_limit: u32) -> UpstreamRequest {
    let mut messages = Vec::new();

    if let Some(system_message) = translate_system(req.system.as_ref()) {
        messages.push(system_message);
    }

    for message in &req.messages {
        messages.push(translate_message(message));
    }

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| UpstreamTool {
                tool_type: "function",
                function: UpstreamFunction {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone().unwrap_or_default()),
                    parameters: tool.input_schema.clone(),
                },
            })
            .collect::<Vec<_>>()
    });

    let tool_choice = translate_tool_choice(req.tool_choice.as_ref(), tools.is_some());
    let stream = req.stream.unwrap_or(false);
    let stream_options = stream.then_some(StreamOptions { include_usage: true });

    UpstreamRequest {
        model: model.to_string(),
        messages,
        max_tokens: req.max_tokens.min(max_tokens_limit),
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        stop: req.stop_sequences.clone(),
        stream,
        stream_options,
        tools,
        tool_choice,
    }
}

fn translate_system(system: Option<&SystemPrompt>) -> Option<UpstreamMessage> {
    let content = match system? {
        SystemPrompt::Text(text) => text.clone(),
        SystemPrompt::Blocks(blocks) => {
            let joined = blocks.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n\n");
            joined.trim_end().to_string()
        }
    };

    if content.is_empty() {
        return None;
    }

    Some(UpstreamMessage {
        role: "system".to_string(),
        content: UpstreamContent::Text(content),
        tool_call_id: None,
        name: None,
    })
}

fn translate_message(message: &Message) -> UpstreamMessage {
    let role = match message.role {
        crate::messages::anthropic::Role::User => "user",
        crate::messages::anthropic::Role::Assistant => "assistant",
    };

    match &message.content {
        MessageContent::Text(text) => UpstreamMessage {
            role: role.to_string(),
            content: UpstreamContent::Text(text.clone()),
            tool_call_id: None,
            name: None,
        },
        MessageContent::Blocks(blocks) => {
            let has_tool_result = blocks.iter().any(|b| matches!(b, ContentBlock::ToolResult { .. }));

            if message.role == crate::messages::anthropic::Role::User && has_tool_result {
                UpstreamMessage {
                    role: role.to_string(),
                    content: UpstreamContent::Text(flatten_tool_result_message(blocks)),
                    tool_call_id: None,
                    name: None,
                }
            } else {
                UpstreamMessage {
                    role: role.to_string(),
                    content: UpstreamContent::Blocks(blocks.iter().map(transliterate_block).collect()),
                    tool_call_id: None,
                    name: None,
                }
            }
        }
    }
}

fn flatten_tool_result_message(blocks: &[ContentBlock]) -> String {
    let mut flattened = String::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                flattened.push_str(text);
                flattened.push('\n');
            }
            ContentBlock::ToolResult { tool_use_id, content } => {
                flattened.push_str(&format!("Tool result for {tool_use_id}:\n"));
                flattened.push_str(&stringify_tool_result(content.as_ref()));
                flattened.push('\n');
            }
            _ => {}
        }
    }

    flattened.trim_end().to_string()
}

/// Implements spec.md §4.1 step 3 exactly: no element is ever dropped, unencodable
/// items degrade to `"Unparseable content"` rather than failing the request.
fn stringify_tool_result(content: Option<&Value>) -> String {
    match content {
        None => "No content provided".to_string(),
        Some(Value::Null) => "No content provided".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(stringify_tool_result_element)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        Some(Value::Object(map)) => {
            if let Some(Value::String(text)) = map.get("text") {
                text.clone()
            } else if map.get("type").and_then(Value::as_str) == Some("text") {
                map.get("text").and_then(Value::as_str).unwrap_or_default().to_string()
            } else {
                serde_json::to_string(content.expect("Some branch")).unwrap_or_else(|_| "Unparseable content".to_string())
            }
        }
        Some(other) => other.to_string(),
    }
}

fn stringify_tool_result_element(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                text.clone()
            } else {
                serde_json::to_string(value).unwrap_or_else(|_| "Unparseable content".to_string())
            }
        }
        Value::Null => "Unparseable content".to_string(),
        other => other.to_string(),
    }
}

fn transliterate_block(block: &ContentBlock) -> UpstreamBlock {
    match block {
        ContentBlock::Text { text } => UpstreamBlock::Text { text: text.clone() },
        ContentBlock::Image { source } => UpstreamBlock::Image { source: source.clone() },
        ContentBlock::ToolUse { id, name, input } => {
            UpstreamBlock::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() }
        }
        ContentBlock::ToolResult { tool_use_id, content } => {
            UpstreamBlock::ToolResult { tool_use_id: tool_use_id.clone(), content: content.clone() }
        }
    }
}

fn translate_tool_choice(tool_choice: Option<&ToolChoice>, tools_present: bool) -> Option<UpstreamToolChoice> {
    match tool_choice {
        Some(ToolChoice::Auto) => Some(UpstreamToolChoice::Mode("auto")),
        Some(ToolChoice::Any) => Some(UpstreamToolChoice::Mode("any")),
        Some(ToolChoice::Tool { name }) => Some(UpstreamToolChoice::Function {
            r#type: "function",
            function: UpstreamFunctionChoice { name: name.clone() },
        }),
        None if tools_present => Some(UpstreamToolChoice::Mode("auto")),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::anthropic::Role;
    use serde_json::json;

    fn request_with(messages: Vec<Message>) -> MessagesRequest {
        MessagesRequest {
            model: "claude-3-sonnet-20240229".into(),
            max_tokens: 300,
            messages,
            system: None,
            stop_sequences: None,
            stream: None,
            temperature: None,
            top_p: None,
            top_k: None,
            tools: None,
            tool_choice: None,
            metadata: None,
        }
    }

    #[test]
    fn s6_clamps_max_tokens_to_limit() {
        let mut req = request_with(vec![]);
        req.max_tokens = 100_000;
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        assert_eq!(upstream.max_tokens, 16384);
    }

    #[test]
    fn s5_flattens_tool_result_into_single_user_message() {
        let message: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "4"}]
        }))
        .unwrap();
        let req = request_with(vec![message]);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        match &upstream.messages[0].content {
            UpstreamContent::Text(text) => {
                assert!(text.contains("Tool result for t1:"));
                assert!(text.contains('4'));
            }
            _ => panic!("expected flattened text content"),
        }
    }

    #[test]
    fn p6_preserves_tool_definitions_verbatim() {
        let mut req = request_with(vec![]);
        req.tools = Some(vec![crate::messages::anthropic::Tool {
            name: "calculator".into(),
            description: Some("adds numbers".into()),
            input_schema: json!({"type": "object"}),
        }]);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        let tools = upstream.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "calculator");
        assert_eq!(tools[0].function.parameters, json!({"type": "object"}));
    }

    #[test]
    fn tool_choice_defaults_to_auto_when_tools_present_and_absent() {
        let mut req = request_with(vec![]);
        req.tools = Some(vec![crate::messages::anthropic::Tool {
            name: "calculator".into(),
            description: None,
            input_schema: json!({}),
        }]);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        assert!(matches!(upstream.tool_choice, Some(UpstreamToolChoice::Mode("auto"))));
    }

    #[test]
    fn tool_choice_omitted_when_no_tools_and_no_choice() {
        let req = request_with(vec![]);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        assert!(upstream.tool_choice.is_none());
    }

    #[test]
    fn system_block_list_joined_with_blank_lines() {
        let mut req = request_with(vec![]);
        req.system = Some(SystemPrompt::Blocks(vec![
            crate::messages::anthropic::TextBlock { text: "first".into() },
            crate::messages::anthropic::TextBlock { text: "second".into() },
        ]));
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        match &upstream.messages[0].content {
            UpstreamContent::Text(text) => assert_eq!(text, "first\n\nsecond"),
            _ => panic!("expected system text"),
        }
    }

    #[test]
    fn plain_string_message_passes_through() {
        let req = request_with(vec![Message { role: Role::User, content: MessageContent::Text("Hello".into()) }]);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        assert!(matches!(&upstream.messages[0].content, UpstreamContent::Text(t) if t == "Hello"));
    }

    #[test]
    fn image_block_is_transliterated_not_dropped() {
        let message: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [{"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "abc"}}]
        }))
        .unwrap();
        let req = request_with(vec![message]);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        match &upstream.messages[0].content {
            UpstreamContent::Blocks(blocks) => match &blocks[0] {
                UpstreamBlock::Image { source } => assert_eq!(source["media_type"], "image/png"),
                other => panic!("expected image block, got {other:?}"),
            },
            other => panic!("expected block content, got {other:?}"),
        }
    }

    #[test]
    fn top_k_is_forwarded() {
        let mut req = request_with(vec![]);
        req.top_k = Some(40);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        assert_eq!(upstream.top_k, Some(40));
    }

    #[test]
    fn streaming_request_sets_stream_options_include_usage() {
        let mut req = request_with(vec![]);
        req.stream = Some(true);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        assert!(upstream.stream_options.unwrap().include_usage);
    }

    #[test]
    fn non_streaming_request_omits_stream_options() {
        let req = request_with(vec![]);
        let upstream = translate_request(&req, "openai/gpt-4o", 16384);
        assert!(upstream.stream_options.is_none());
    }
}

//! Non-streaming response translator: `UpstreamCompletion` → `MessagesResponse`
//! (spec.md §4.2). Pure; translation failures degrade to an error-carrying response
//! rather than propagating, per spec.md §4.2's closing paragraph.

use serde_json::Value;

use crate::messages::anthropic::{ContentBlock, MessagesResponse, ResponseType, Role, StopReason, Usage};
use crate::messages::openai::{UpstreamChoice, UpstreamCompletion};
use crate::translate::ToolRendering;

pub fn translate_response(upstream: &UpstreamCompletion, model: &str, rendering: ToolRendering) -> MessagesResponse {
    let Some(choice) = upstream.choices.first() else {
        return degraded_response(model, "Error converting response: upstream returned no choices");
    };

    let stop_reason = map_finish_reason(choice.finish_reason.as_deref());
    let content = build_content(choice, rendering);

    let usage = upstream
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or(Usage::new(0, 0));

    MessagesResponse {
        id: if upstream.id.is_empty() { format!("msg_{}", uuid::Uuid::new_v4().simple()) } else { upstream.id.clone() },
        model: model.to_string(),
        role: Role::Assistant,
        response_type: ResponseType,
        content,
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage,
    }
}

fn build_content(choice: &UpstreamChoice, rendering: ToolRendering) -> Vec<ContentBlock> {
    let mut content = Vec::new();

    let text = choice.message.content.as_deref().unwrap_or("");
    if !text.is_empty() {
        content.push(ContentBlock::Text { text: text.to_string() });
    }

    if let Some(tool_calls) = &choice.message.tool_calls {
        for call in tool_calls {
            let parsed: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({ "raw": call.function.arguments }));

            match rendering {
                ToolRendering::StructuredBlocks => {
                    let id = if call.id.is_empty() { format!("toolu_{}", uuid::Uuid::new_v4().simple()) } else { call.id.clone() };
                    content.push(ContentBlock::ToolUse { id, name: call.function.name.clone(), input: parsed });
                }
                ToolRendering::TextSummary => {
                    let pretty = serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| parsed.to_string());
                    let summary = format!(
                        "\n\nTool usage:\nTool: {}\nArguments: {}\n\n",
                        call.function.name, pretty
                    );
                    match content.iter_mut().find(|b| matches!(b, ContentBlock::Text { .. })) {
                        Some(ContentBlock::Text { text }) => text.push_str(&summary),
                        _ => content.push(ContentBlock::Text { text: summary }),
                    }
                }
            }
        }
    }

    if content.is_empty() {
        content.push(ContentBlock::Text { text: String::new() });
    }

    content
}

/// Maps an upstream `finish_reason` to an Anthropic `stop_reason` (spec.md §3).
pub fn map_finish_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

fn degraded_response(model: &str, message: &str) -> MessagesResponse {
    log::error!("{message}");
    MessagesResponse {
        id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
        model: model.to_string(),
        role: Role::Assistant,
        response_type: ResponseType,
        content: vec![ContentBlock::Text { text: message.to_string() }],
        stop_reason: Some(StopReason::EndTurn),
        stop_sequence: None,
        usage: Usage::new(0, 0),
    }
}

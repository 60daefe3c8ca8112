//! Streaming translator: upstream SSE delta chunks → Anthropic SSE events
//! (spec.md §4.3).
//!
//! Implemented as an explicit FSM object rather than coroutine-ambient state (spec.md
//! §9's design note) so the exact same code drives both the live server and synchronous
//! tests that feed it a `Vec<UpstreamChunk>` and collect the resulting frames.

use crate::messages::anthropic::{ContentBlock, ContentDelta, MessageDeltaPayload, Role, StreamEvent, StreamMessageStart, StreamUsage, Usage};
use crate::messages::openai::{UpstreamChunk, UpstreamChunkChoice};
use crate::translate::response::map_finish_reason;

/// Owns all per-stream state (spec.md §4.3.1). Created once per stream, mutated only
/// by the single consumer task, discarded once [`StreamTranslator::finish`] (or an
/// implicit terminal path) has run.
pub struct StreamTranslator {
    text_sent: bool,
    text_block_closed: bool,
    tool_active: bool,
    last_tool_index: u32,
    current_upstream_tool_index: Option<u32>,
    accumulated_text: String,
    input_tokens: u32,
    output_tokens: u32,
    terminated: bool,
    model: String,
}

impl StreamTranslator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            text_sent: false,
            text_block_closed: false,
            tool_active: false,
            last_tool_index: 0,
            current_upstream_tool_index: None,
            accumulated_text: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            terminated: false,
            model: model.into(),
        }
    }

    /// True once a terminal event sequence (`message_delta` → `message_stop`) has been
    /// emitted. No further chunks should be fed after this.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Emits the fixed preamble: `message_start`, the empty text block 0, `ping`
    /// (spec.md §4.3.2).
    pub fn start(&self) -> Vec<StreamEvent> {
        vec![
            StreamEvent::MessageStart {
                message: StreamMessageStart {
                    id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
                    message_type: crate::messages::anthropic::ResponseType,
                    role: Role::Assistant,
                    content: vec![],
                    model: self.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: Usage::new(0, 0),
                },
            },
            StreamEvent::ContentBlockStart { index: 0, content_block: ContentBlock::Text { text: String::new() } },
            StreamEvent::Ping,
        ]
    }

    /// Processes one upstream chunk, returning the Anthropic events it produces.
    /// Never panics: malformed chunks degrade rather than propagate (spec.md §4.3.5
    /// covers the whole-stream failure path; per-chunk oddities like an empty
    /// `choices` list simply produce no events).
    pub fn handle_chunk(&mut self, chunk: &UpstreamChunk) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }

        if let Some(usage) = &chunk.usage {
            self.input_tokens = usage.prompt_tokens;
            self.output_tokens = usage.completion_tokens;
        }

        let Some(choice) = chunk.choices.first() else {
            return Vec::new();
        };

        let mut events = Vec::new();

        events.extend(self.handle_text_delta(choice));
        events.extend(self.handle_tool_call_deltas(choice));
        events.extend(self.handle_finish_reason(choice));

        events
    }

    fn handle_text_delta(&mut self, choice: &UpstreamChunkChoice) -> Vec<StreamEvent> {
        let Some(text) = choice.delta.content.as_deref() else {
            return Vec::new();
        };
        if text.is_empty() {
            return Vec::new();
        }

        if self.tool_active || self.text_block_closed {
            log::debug!("dropping text delta after text block closed: {text:?}");
            return Vec::new();
        }

        self.accumulated_text.push_str(text);
        self.text_sent = true;

        vec![StreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::TextDelta { text: text.to_string() } }]
    }

    fn handle_tool_call_deltas(&mut self, choice: &UpstreamChunkChoice) -> Vec<StreamEvent> {
        let Some(tool_calls) = &choice.delta.tool_calls else {
            return Vec::new();
        };

        let mut events = Vec::new();

        for call in tool_calls {
            if !self.tool_active {
                events.extend(self.close_text_block_for_first_tool());
            }

            let upstream_index = call.index;

            if self.current_upstream_tool_index != Some(upstream_index) {
                self.last_tool_index += 1;
                let anthropic_index = self.last_tool_index;
                let name = call.function.as_ref().and_then(|f| f.name.clone()).unwrap_or_default();
                let id = call.id.clone().unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));

                events.push(StreamEvent::ContentBlockStart {
                    index: anthropic_index,
                    content_block: ContentBlock::ToolUse { id, name, input: serde_json::json!({}) },
                });

                self.tool_active = true;
                self.current_upstream_tool_index = Some(upstream_index);
            }

            if let Some(arguments) = call.function.as_ref().and_then(|f| f.arguments.as_ref()) {
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.last_tool_index,
                    delta: ContentDelta::InputJsonDelta { partial_json: arguments.as_fragment() },
                });
            }
        }

        events
    }

    /// First-tool-ever text-block closing logic (spec.md §4.3.3 step 1). Only ever
    /// runs once, guarded by `!self.tool_active` at the call site.
    fn close_text_block_for_first_tool(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if self.text_sent && !self.text_block_closed {
            events.push(StreamEvent::ContentBlockStop { index: 0 });
            self.text_block_closed = true;
        } else if !self.accumulated_text.is_empty() && !self.text_sent && !self.text_block_closed {
            events.push(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text: self.accumulated_text.clone() },
            });
            events.push(StreamEvent::ContentBlockStop { index: 0 });
            self.text_block_closed = true;
        } else if !self.text_block_closed {
            events.push(StreamEvent::ContentBlockStop { index: 0 });
            self.text_block_closed = true;
        }

        events
    }

    fn handle_finish_reason(&mut self, choice: &UpstreamChunkChoice) -> Vec<StreamEvent> {
        let Some(finish_reason) = choice.finish_reason.as_deref() else {
            return Vec::new();
        };
        if self.terminated {
            return Vec::new();
        }

        self.terminated = true;
        let mut events = Vec::new();

        for index in 1..=self.last_tool_index {
            events.push(StreamEvent::ContentBlockStop { index });
        }

        if !self.text_block_closed {
            if !self.accumulated_text.is_empty() && !self.text_sent {
                events.push(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: ContentDelta::TextDelta { text: self.accumulated_text.clone() },
                });
            }
            events.push(StreamEvent::ContentBlockStop { index: 0 });
            self.text_block_closed = true;
        }

        let stop_reason = map_finish_reason(Some(finish_reason));
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaPayload { stop_reason: Some(stop_reason), stop_sequence: None },
            usage: StreamUsage { output_tokens: self.output_tokens },
        });
        events.push(StreamEvent::MessageStop);

        events
    }

    /// Terminal flush when the upstream sequence ends without ever sending a
    /// `finish_reason` (spec.md §4.3.4). Unlike the explicit-finish_reason path, this
    /// never flushes `accumulated_text`.
    pub fn finish_without_reason(&mut self) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;

        let mut events = Vec::new();

        for index in 1..=self.last_tool_index {
            events.push(StreamEvent::ContentBlockStop { index });
        }

        if !self.text_block_closed {
            events.push(StreamEvent::ContentBlockStop { index: 0 });
            self.text_block_closed = true;
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaPayload { stop_reason: Some(crate::messages::anthropic::StopReason::EndTurn), stop_sequence: None },
            usage: StreamUsage { output_tokens: self.output_tokens },
        });
        events.push(StreamEvent::MessageStop);

        events
    }

    /// Terminal events for an exception during streaming (spec.md §4.3.5): reported as
    /// `stop_reason: error` with zero output tokens, never re-raised.
    pub fn finish_with_error(&mut self) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;

        vec![
            StreamEvent::MessageDelta {
                delta: MessageDeltaPayload { stop_reason: Some(crate::messages::anthropic::StopReason::Error), stop_sequence: None },
                usage: StreamUsage { output_tokens: 0 },
            },
            StreamEvent::MessageStop,
        ]
    }
}

/// Renders one event as an SSE frame: `event: <name>\ndata: <json>\n\n`.
pub fn render_frame(event: &StreamEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {}\ndata: {}\n\n", event.event_name(), data)
}

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> UpstreamChunk {
        serde_json::from_value(value).unwrap()
    }

    fn event_names(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_name).collect()
    }

    #[test]
    fn s3_streaming_text_only() {
        let mut fsm = StreamTranslator::new("claude-3-sonnet-20240229");
        let mut all = fsm.start();

        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"content": "Hel"}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }))));

        assert_eq!(
            event_names(&all),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert!(fsm.is_terminated());
    }

    #[test]
    fn s4_streaming_tool_call() {
        let mut fsm = StreamTranslator::new("claude-3-sonnet-20240229");
        let mut all = fsm.start();

        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"content": "Sure. "}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "t1", "function": {"name": "calculator"}}]}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"expr"}}]}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "ession\":\"2+2\"}"}}]}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]
        }))));

        assert_eq!(
            event_names(&all),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        match &all[5] {
            StreamEvent::ContentBlockStart { index, content_block: ContentBlock::ToolUse { id, name, .. } } => {
                assert_eq!(*index, 1);
                assert_eq!(id, "t1");
                assert_eq!(name, "calculator");
            }
            other => panic!("expected tool_use content_block_start, got {other:?}"),
        }
    }

    #[test]
    fn p1_block_balance_with_multiple_tool_calls() {
        let mut fsm = StreamTranslator::new("claude-3-sonnet-20240229");
        let mut all = fsm.start();
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "t1", "function": {"name": "a", "arguments": "{}"}}]}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 1, "id": "t2", "function": {"name": "b", "arguments": "{}"}}]}, "finish_reason": null}]
        }))));
        all.extend(fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]
        }))));

        let starts: Vec<u32> = all
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockStart { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        let stops: Vec<u32> = all
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockStop { index } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![0, 1, 2]);
        assert_eq!(stops, vec![0, 1, 2]);
    }

    #[test]
    fn p2_terminal_uniqueness_ignores_chunks_after_finish() {
        let mut fsm = StreamTranslator::new("claude-3-sonnet-20240229");
        fsm.start();
        fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        })));
        let after = fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"content": "late"}, "finish_reason": null}]
        })));
        assert!(after.is_empty());
    }

    #[test]
    fn p4_stop_reason_mapping() {
        assert_eq!(map_finish_reason(Some("stop")), crate::messages::anthropic::StopReason::EndTurn);
        assert_eq!(map_finish_reason(Some("length")), crate::messages::anthropic::StopReason::MaxTokens);
        assert_eq!(map_finish_reason(Some("tool_calls")), crate::messages::anthropic::StopReason::ToolUse);
        assert_eq!(map_finish_reason(Some("anything_else")), crate::messages::anthropic::StopReason::EndTurn);
        assert_eq!(map_finish_reason(None), crate::messages::anthropic::StopReason::EndTurn);
    }

    #[test]
    fn finish_without_reason_does_not_flush_accumulated_text() {
        let mut fsm = StreamTranslator::new("claude-3-sonnet-20240229");
        fsm.start();
        // accumulated_text is only ever non-empty-without-text_sent in the tool-close
        // path; exercise the no-finish-reason path directly after some plain text.
        fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"content": "partial"}, "finish_reason": null}]
        })));
        let events = fsm.finish_without_reason();
        assert!(events.iter().all(|e| !matches!(e, StreamEvent::ContentBlockDelta { .. })));
        assert_eq!(event_names(&events), vec!["content_block_stop", "message_delta", "message_stop"]);
    }

    #[test]
    fn finish_with_error_reports_error_stop_reason_and_zero_output_tokens() {
        let mut fsm = StreamTranslator::new("claude-3-sonnet-20240229");
        fsm.start();
        let events = fsm.finish_with_error();
        match &events[0] {
            StreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.stop_reason, Some(crate::messages::anthropic::StopReason::Error));
                assert_eq!(usage.output_tokens, 0);
            }
            other => panic!("expected message_delta, got {other:?}"),
        }
    }

    #[test]
    fn text_after_tool_block_opened_is_dropped() {
        let mut fsm = StreamTranslator::new("claude-3-sonnet-20240229");
        fsm.start();
        fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "t1", "function": {"name": "a"}}]}, "finish_reason": null}]
        })));
        let dropped = fsm.handle_chunk(&chunk(json!({
            "id": "c1", "choices": [{"index": 0, "delta": {"content": "too late"}, "finish_reason": null}]
        })));
        assert!(dropped.is_empty());
    }

    #[test]
    fn render_frame_matches_sse_shape() {
        let frame = render_frame(&StreamEvent::Ping);
        assert_eq!(frame, "event: ping\ndata: {\"type\":\"ping\"}\n\n");
    }
}

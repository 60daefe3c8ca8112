//! `/v1/messages/count_tokens` estimation (spec.md §6.1).
//!
//! Deliberately crude: a character/4 estimate, not a real tokenizer. Exact token
//! counting is a named non-goal (spec.md §1).

use crate::messages::anthropic::{ContentBlock, Message, MessageContent, SystemPrompt, TokenCountRequest};

/// Estimates input tokens for a count-tokens request.
pub fn estimate_tokens(request: &TokenCountRequest) -> u32 {
    let mut chars = 0usize;

    if let Some(system) = &request.system {
        chars += system_chars(system);
    }

    for message in &request.messages {
        chars += message_chars(&message.content);
    }

    ((chars / 4) as u32).max(1)
}

fn system_chars(system: &SystemPrompt) -> usize {
    match system {
        SystemPrompt::Text(text) => text.len(),
        SystemPrompt::Blocks(blocks) => blocks.iter().map(|b| b.text.len()).sum(),
    }
}

fn message_chars(content: &MessageContent) -> usize {
    match content {
        MessageContent::Text(text) => text.len(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.len(),
                _ => 0,
            })
            .sum(),
    }
}

//! Helper functions for message processing
//!
//! Pure functions for extracting data from a session transcript.

use crate::types::messages::{ContentBlock, Message};

/// Extract the last N text lines the agent produced
///
/// Scans messages newest first, keeps assistant text and thinking blocks and
/// falls back to a `result` message's text. Lines come back oldest first.
pub(super) fn extract_last_output_lines(messages: &[Message], n: usize) -> Vec<String> {
    let mut lines: Vec<String> = messages
        .iter()
        .rev()
        .flat_map(|msg| match msg {
            Message::Assistant { message, .. } => message
                .content
                .iter()
                .rev()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Thinking { thinking, .. } => Some(thinking.as_str()),
                    _ => None,
                })
                .flat_map(|text| text.lines().rev())
                .map(str::to_string)
                .collect::<Vec<_>>(),
            Message::Result {
                result: Some(text), ..
            } => text.lines().rev().map(str::to_string).collect(),
            _ => Vec::new(),
        })
        .filter(|line| !line.trim().is_empty())
        .take(n)
        .collect();
    lines.reverse();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::messages::AssistantMessageContent;

    fn assistant(text: &str) -> Message {
        Message::Assistant {
            message: AssistantMessageContent {
                id: None,
                model: "test".to_string(),
                content: vec![ContentBlock::text(text)],
                stop_reason: None,
                usage: None,
            },
            uuid: None,
            session_id: None,
            parent_tool_use_id: None,
        }
    }

    #[test]
    fn newest_lines_in_reading_order() {
        let messages = vec![
            assistant("one\ntwo"),
            Message::user_text("ignored"),
            assistant("three\n\nfour"),
        ];
        assert_eq!(
            extract_last_output_lines(&messages, 3),
            vec!["two", "three", "four"]
        );
    }
}

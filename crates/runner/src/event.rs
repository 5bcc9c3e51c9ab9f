//! Normalized stream events emitted by every provider parser.

use serde::{Deserialize, Serialize};

/// One normalized event from the runner's output stream.
///
/// `tool_call` / `tool_result` correlate by the provider's opaque tool id;
/// results that match no in-flight call are dropped by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEvent {
    SessionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    ToolCall {
        tool_id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_id: String,
        #[serde(default)]
        output: String,
        #[serde(default)]
        is_error: bool,
    },
    TextResponse {
        text: String,
    },
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
}

impl ToolEvent {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolEvent::SessionInit { .. } => "session_init",
            ToolEvent::ToolCall { .. } => "tool_call",
            ToolEvent::ToolResult { .. } => "tool_result",
            ToolEvent::TextResponse { .. } => "text_response",
            ToolEvent::Complete { .. } => "complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_tag() {
        let event = ToolEvent::ToolCall {
            tool_id: "toolu_1".into(),
            name: "bash".into(),
            input: serde_json::json!({"command": "ls"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"tool_call\""));

        let back: ToolEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(
            ToolEvent::Complete { result: None }.kind(),
            "complete"
        );
        assert_eq!(
            ToolEvent::TextResponse { text: "hi".into() }.kind(),
            "text_response"
        );
    }
}

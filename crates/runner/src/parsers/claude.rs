//! Parser for the Claude CLI's `stream-json` output.
//!
//! One JSON object per line. Assistant messages carry `text` and `tool_use`
//! blocks; user messages echo `tool_result` blocks; a final `result` object
//! closes the turn.

use serde_json::Value;

use ag_domain::{Error, Result};

use crate::event::ToolEvent;
use crate::traits::StreamParser;

#[derive(Debug, Default)]
pub struct ClaudeStreamParser;

impl StreamParser for ClaudeStreamParser {
    fn provider(&self) -> &str {
        "claude"
    }

    fn parse_line(&self, line: &str) -> Result<Vec<ToolEvent>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| Error::Validation(format!("malformed stream line: {e}")))?;

        let mut events = Vec::new();
        match value.get("type").and_then(Value::as_str) {
            Some("system") => {
                if value.get("subtype").and_then(Value::as_str) == Some("init") {
                    events.push(ToolEvent::SessionInit {
                        session_id: value
                            .get("session_id")
                            .and_then(Value::as_str)
                            .map(String::from),
                        model: value.get("model").and_then(Value::as_str).map(String::from),
                    });
                }
            }
            Some("assistant") => {
                for block in content_blocks(&value) {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                events.push(ToolEvent::TextResponse { text: text.into() });
                            }
                        }
                        Some("tool_use") => {
                            let tool_id = block
                                .get("id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            let name = block
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            events.push(ToolEvent::ToolCall {
                                tool_id,
                                name,
                                input: block.get("input").cloned().unwrap_or(Value::Null),
                            });
                        }
                        _ => {}
                    }
                }
            }
            Some("user") => {
                for block in content_blocks(&value) {
                    if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                        let tool_id = block
                            .get("tool_use_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        events.push(ToolEvent::ToolResult {
                            tool_id,
                            output: flatten_result_content(block.get("content")),
                            is_error: block
                                .get("is_error")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                        });
                    }
                }
            }
            Some("result") => {
                events.push(ToolEvent::Complete {
                    result: value.get("result").and_then(Value::as_str).map(String::from),
                });
            }
            _ => {}
        }
        Ok(events)
    }
}

fn content_blocks(value: &Value) -> impl Iterator<Item = &Value> {
    value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .unwrap_or_default()
}

/// Tool results carry either a plain string or a list of text blocks.
fn flatten_result_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<ToolEvent> {
        ClaudeStreamParser.parse_line(line).unwrap()
    }

    #[test]
    fn init_line_becomes_session_init() {
        let events = parse(
            r#"{"type":"system","subtype":"init","session_id":"abc","model":"claude-sonnet"}"#,
        );
        assert_eq!(
            events,
            vec![ToolEvent::SessionInit {
                session_id: Some("abc".into()),
                model: Some("claude-sonnet".into()),
            }]
        );
    }

    #[test]
    fn assistant_blocks_become_text_and_tool_call() {
        let events = parse(
            r#"{"type":"assistant","message":{"content":[
                {"type":"text","text":"running ls"},
                {"type":"tool_use","id":"toolu_1","name":"bash","input":{"command":"ls"}}
            ]}}"#,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ToolEvent::TextResponse { text: "running ls".into() }
        );
        assert!(matches!(
            &events[1],
            ToolEvent::ToolCall { tool_id, name, .. }
                if tool_id == "toolu_1" && name == "bash"
        ));
    }

    #[test]
    fn tool_result_flattens_block_list() {
        let events = parse(
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","tool_use_id":"toolu_1",
                 "content":[{"type":"text","text":"a.txt"},{"type":"text","text":"b.txt"}]}
            ]}}"#,
        );
        assert_eq!(
            events,
            vec![ToolEvent::ToolResult {
                tool_id: "toolu_1".into(),
                output: "a.txt\nb.txt".into(),
                is_error: false,
            }]
        );
    }

    #[test]
    fn result_line_completes() {
        let events = parse(r#"{"type":"result","subtype":"success","result":"done"}"#);
        assert_eq!(
            events,
            vec![ToolEvent::Complete { result: Some("done".into()) }]
        );
    }

    #[test]
    fn unknown_types_and_blanks_are_skipped() {
        assert!(parse(r#"{"type":"ping"}"#).is_empty());
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(ClaudeStreamParser.parse_line("{not json").is_err());
    }
}

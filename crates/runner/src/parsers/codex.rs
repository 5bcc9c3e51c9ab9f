//! Parser for the Codex CLI's JSONL event protocol.
//!
//! Each line is `{"id": ..., "msg": {"type": ...}}`. Exec commands map to
//! tool call/result pairs correlated by `call_id`.

use serde_json::Value;

use ag_domain::{Error, Result};

use crate::event::ToolEvent;
use crate::traits::StreamParser;

#[derive(Debug, Default)]
pub struct CodexStreamParser;

impl StreamParser for CodexStreamParser {
    fn provider(&self) -> &str {
        "codex"
    }

    fn parse_line(&self, line: &str) -> Result<Vec<ToolEvent>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| Error::Validation(format!("malformed stream line: {e}")))?;
        let Some(msg) = value.get("msg") else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        match msg.get("type").and_then(Value::as_str) {
            Some("session_configured") => {
                events.push(ToolEvent::SessionInit {
                    session_id: msg
                        .get("session_id")
                        .and_then(Value::as_str)
                        .map(String::from),
                    model: msg.get("model").and_then(Value::as_str).map(String::from),
                });
            }
            Some("agent_message") => {
                if let Some(text) = msg.get("message").and_then(Value::as_str) {
                    events.push(ToolEvent::TextResponse { text: text.into() });
                }
            }
            Some("exec_command_begin") => {
                let command = msg
                    .get("command")
                    .and_then(Value::as_array)
                    .map(|parts| {
                        parts
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                events.push(ToolEvent::ToolCall {
                    tool_id: call_id(msg),
                    name: "exec".into(),
                    input: serde_json::json!({ "command": command }),
                });
            }
            Some("exec_command_end") => {
                let exit_code = msg.get("exit_code").and_then(Value::as_i64).unwrap_or(0);
                events.push(ToolEvent::ToolResult {
                    tool_id: call_id(msg),
                    output: msg
                        .get("stdout")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    is_error: exit_code != 0,
                });
            }
            Some("task_complete") => {
                events.push(ToolEvent::Complete {
                    result: msg
                        .get("last_agent_message")
                        .and_then(Value::as_str)
                        .map(String::from),
                });
            }
            _ => {}
        }
        Ok(events)
    }
}

fn call_id(msg: &Value) -> String {
    msg.get("call_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<ToolEvent> {
        CodexStreamParser.parse_line(line).unwrap()
    }

    #[test]
    fn session_configured_maps_to_init() {
        let events = parse(
            r#"{"id":"0","msg":{"type":"session_configured","session_id":"s1","model":"o4"}}"#,
        );
        assert_eq!(
            events,
            vec![ToolEvent::SessionInit {
                session_id: Some("s1".into()),
                model: Some("o4".into()),
            }]
        );
    }

    #[test]
    fn exec_pair_correlates_by_call_id() {
        let begin = parse(
            r#"{"id":"1","msg":{"type":"exec_command_begin","call_id":"c1","command":["ls","-la"]}}"#,
        );
        let end = parse(
            r#"{"id":"2","msg":{"type":"exec_command_end","call_id":"c1","exit_code":0,"stdout":"files"}}"#,
        );
        assert!(matches!(
            &begin[0],
            ToolEvent::ToolCall { tool_id, .. } if tool_id == "c1"
        ));
        assert_eq!(
            end[0],
            ToolEvent::ToolResult {
                tool_id: "c1".into(),
                output: "files".into(),
                is_error: false,
            }
        );
    }

    #[test]
    fn failed_exec_flags_error() {
        let end = parse(
            r#"{"id":"2","msg":{"type":"exec_command_end","call_id":"c1","exit_code":2,"stdout":""}}"#,
        );
        assert!(matches!(
            &end[0],
            ToolEvent::ToolResult { is_error: true, .. }
        ));
    }

    #[test]
    fn task_complete_closes_turn() {
        let events =
            parse(r#"{"id":"3","msg":{"type":"task_complete","last_agent_message":"all done"}}"#);
        assert_eq!(
            events,
            vec![ToolEvent::Complete { result: Some("all done".into()) }]
        );
    }

    #[test]
    fn lines_without_msg_are_skipped() {
        assert!(parse(r#"{"id":"9"}"#).is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(CodexStreamParser.parse_line("nope").is_err());
    }
}

//! Read and build the agent payloads carried inside `sdk_message`.
//!
//! The orchestrator never looks inside these payloads. Only the timeline
//! reconciler does, and only for two shapes: assistant messages (text and
//! tool-use blocks) and tool results. Both the flat form
//! (`{"type":..,"role":"assistant","content":[..]}`) and the nested agent SDK
//! form (`{"type":"assistant","message":{"content":[..]}}`) are accepted.

use serde_json::{json, Map, Value};

/// What a payload means to the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkPayload {
    Assistant {
        /// Concatenated text blocks; non-text blocks contribute nothing.
        text: String,
        tool_uses: Vec<ToolUseBlock>,
    },
    ToolResults(Vec<ToolResultBlock>),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseBlock {
    pub id: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: Option<String>,
    pub content: String,
    pub is_error: bool,
}

/// Classify one `sdk_message` payload. Anything without a string `type` is
/// [`SdkPayload::Other`].
pub fn classify(payload: &Value) -> SdkPayload {
    let Some(obj) = payload.as_object() else {
        return SdkPayload::Other;
    };
    let Some(kind) = obj.get("type").and_then(Value::as_str) else {
        return SdkPayload::Other;
    };

    if let Some(blocks) = assistant_blocks(obj, kind) {
        return SdkPayload::Assistant {
            text: extract_text(blocks),
            tool_uses: extract_tool_uses(blocks),
        };
    }

    if kind == "tool_result" {
        return SdkPayload::ToolResults(vec![tool_result_block(obj)]);
    }

    if kind == "user" {
        let results = obj
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(Value::as_object)
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
                    .map(tool_result_block)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if !results.is_empty() {
            return SdkPayload::ToolResults(results);
        }
    }

    SdkPayload::Other
}

fn assistant_blocks<'a>(obj: &'a Map<String, Value>, kind: &str) -> Option<&'a Vec<Value>> {
    if obj.get("role").and_then(Value::as_str) == Some("assistant") {
        if let Some(blocks) = obj.get("content").and_then(Value::as_array) {
            return Some(blocks);
        }
    }
    if kind == "assistant" {
        let message = obj.get("message")?;
        let role = message.get("role").and_then(Value::as_str);
        if role.is_none() || role == Some("assistant") {
            return message.get("content").and_then(Value::as_array);
        }
    }
    None
}

fn extract_text(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect()
}

fn extract_tool_uses(blocks: &[Value]) -> Vec<ToolUseBlock> {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
        .map(|b| ToolUseBlock {
            id: b.get("id").and_then(Value::as_str).map(str::to_string),
            name: b.get("name").and_then(Value::as_str).map(str::to_string),
            input: b.get("input").cloned(),
        })
        .collect()
}

fn tool_result_block(obj: &Map<String, Value>) -> ToolResultBlock {
    ToolResultBlock {
        tool_use_id: obj
            .get("tool_use_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        content: content_text(obj.get("content")),
        is_error: obj.get("is_error").and_then(Value::as_bool).unwrap_or(false),
    }
}

/// Tool-result content is either a string or a list of text blocks.
fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => extract_text(blocks),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Builders (nested agent SDK shape)
// ---------------------------------------------------------------------------

pub fn assistant_text(text: &str) -> Value {
    json!({
        "type": "assistant",
        "message": {
            "role": "assistant",
            "content": [{"type": "text", "text": text}]
        }
    })
}

pub fn assistant_tool_use(id: &str, name: &str, input: Value) -> Value {
    json!({
        "type": "assistant",
        "message": {
            "role": "assistant",
            "content": [{"type": "tool_use", "id": id, "name": name, "input": input}]
        }
    })
}

pub fn tool_result(tool_use_id: &str, content: &str, is_error: bool) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error
            }]
        }
    })
}

/// Closing summary an engine emits after its last message.
pub fn result_message(num_turns: u32, result: &str) -> Value {
    json!({
        "type": "result",
        "subtype": "success",
        "num_turns": num_turns,
        "result": result
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_assistant_message_extracts_text_and_tools() {
        let payload = json!({
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Listing "},
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "files."},
                {"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"command": "ls"}}
            ]
        });
        let SdkPayload::Assistant { text, tool_uses } = classify(&payload) else {
            panic!("expected assistant payload");
        };
        assert_eq!(text, "Listing files.");
        assert_eq!(
            tool_uses,
            vec![ToolUseBlock {
                id: Some("toolu_1".into()),
                name: Some("Bash".into()),
                input: Some(json!({"command": "ls"})),
            }]
        );
    }

    #[test]
    fn nested_assistant_message_is_recognised() {
        let SdkPayload::Assistant { text, tool_uses } = classify(&assistant_text("hello")) else {
            panic!("expected assistant payload");
        };
        assert_eq!(text, "hello");
        assert!(tool_uses.is_empty());
    }

    #[test]
    fn flat_tool_result_reads_string_content() {
        let payload = json!({"type": "tool_result", "content": "total 0"});
        assert_eq!(
            classify(&payload),
            SdkPayload::ToolResults(vec![ToolResultBlock {
                tool_use_id: None,
                content: "total 0".into(),
                is_error: false,
            }])
        );
    }

    #[test]
    fn nested_tool_result_reads_block_content() {
        let payload = json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": "toolu_7",
                    "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}],
                    "is_error": true
                }]
            }
        });
        assert_eq!(
            classify(&payload),
            SdkPayload::ToolResults(vec![ToolResultBlock {
                tool_use_id: Some("toolu_7".into()),
                content: "ab".into(),
                is_error: true,
            }])
        );
    }

    #[test]
    fn payloads_without_type_or_of_other_kinds_are_ignored() {
        assert_eq!(classify(&json!({"role": "assistant"})), SdkPayload::Other);
        assert_eq!(classify(&json!("text")), SdkPayload::Other);
        assert_eq!(classify(&result_message(1, "done")), SdkPayload::Other);
        assert_eq!(
            classify(&json!({"type": "user", "message": {"content": "plain echo"}})),
            SdkPayload::Other
        );
        assert_eq!(classify(&json!({"type": "system", "subtype": "init"})), SdkPayload::Other);
    }

    #[test]
    fn builders_round_trip_through_classify() {
        let SdkPayload::Assistant { tool_uses, .. } =
            classify(&assistant_tool_use("toolu_2", "Read", json!({"path": "a.rs"})))
        else {
            panic!("expected assistant payload");
        };
        assert_eq!(tool_uses[0].name.as_deref(), Some("Read"));

        let SdkPayload::ToolResults(results) = classify(&tool_result("toolu_2", "fn main", false))
        else {
            panic!("expected tool results");
        };
        assert_eq!(results[0].tool_use_id.as_deref(), Some("toolu_2"));
        assert_eq!(results[0].content, "fn main");
    }
}

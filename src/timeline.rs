//! Host-side timeline reconciler.
//!
//! Folds the sidecar's event stream into an ordered conversation: user and
//! assistant messages, the streaming buffer for the turn in flight, tool-use
//! records with their outputs, and approvals still waiting on the user.
//! Host actions (`submit`, `interrupt`, ...) update local state and hand back
//! the [`Command`] to put on the wire; nothing here does I/O.

use crate::protocol::{decode_event, Command, Decision, Event, PermissionMode};
use crate::sdk::{self, SdkPayload, ToolResultBlock, ToolUseBlock};
use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolUseRecord {
    pub id: String,
    pub name: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub status: ToolStatus,
}

impl ToolUseRecord {
    fn from_block(block: ToolUseBlock) -> Self {
        Self {
            id: block
                .id
                .unwrap_or_else(|| format!("tool_{}", now_unix_millis())),
            name: block.name.unwrap_or_else(|| "unknown".to_string()),
            input: block
                .input
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| Value::Object(Default::default())),
            output: None,
            status: ToolStatus::Completed,
        }
    }

    /// Announced but no result seen yet.
    fn is_outstanding(&self) -> bool {
        self.status == ToolStatus::Completed && self.output.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_uses: Vec<ToolUseRecord>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPermission {
    pub request_id: String,
    pub tool_name: String,
    pub input: Value,
}

/// What one applied event did, for the presentation layer to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineChange {
    SessionStarted(String),
    /// Index of the new entry in [`Timeline::messages`].
    MessageAppended(usize),
    ToolOutput {
        message: usize,
        tool_id: String,
    },
    StreamingUpdated,
    TurnCompleted {
        /// Whether leftover streamed text became a message.
        materialized: bool,
    },
    PermissionRequested(String),
    Error(String),
    /// Event had no effect on the timeline.
    Ignored,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    session_id: Option<String>,
    messages: Vec<ChatMessage>,
    streaming_text: String,
    is_loading: bool,
    pending_permissions: Vec<PendingPermission>,
    #[serde(skip)]
    message_counter: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn streaming_text(&self) -> &str {
        &self.streaming_text
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn pending_permissions(&self) -> &[PendingPermission] {
        &self.pending_permissions
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    // -----------------------------------------------------------------------
    // Host actions
    // -----------------------------------------------------------------------

    /// Record the user's prompt and build the `send` command for it.
    pub fn submit(&mut self, text: &str, cwd: Option<String>) -> Command {
        self.push_message(Role::User, text.to_string(), Vec::new());
        self.is_loading = true;
        self.streaming_text.clear();
        Command::Send {
            text: text.to_string(),
            cwd,
        }
    }

    pub fn interrupt(&self) -> Command {
        Command::Interrupt
    }

    pub fn set_permission_mode(&self, mode: PermissionMode) -> Command {
        Command::SetPermissionMode {
            mode: mode.as_str().to_string(),
        }
    }

    /// Drop the approval locally and build the reply for the sidecar. The
    /// command is produced even if the id is not listed here; the sidecar is
    /// the authority on which ids are live.
    pub fn resolve_permission(&mut self, request_id: &str, decision: Decision) -> Command {
        self.pending_permissions
            .retain(|pending| pending.request_id != request_id);
        Command::RespondPermission {
            request_id: request_id.to_string(),
            decision: decision.as_str().to_string(),
        }
    }

    /// Forget the conversation. The session id survives.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.streaming_text.clear();
        self.is_loading = false;
        self.pending_permissions.clear();
    }

    // -----------------------------------------------------------------------
    // Event folding
    // -----------------------------------------------------------------------

    pub fn apply(&mut self, event: &Event) -> TimelineChange {
        match event {
            Event::SessionReady { session_id } => {
                self.session_id = Some(session_id.clone());
                TimelineChange::SessionStarted(session_id.clone())
            }
            Event::SdkMessage { message } => self.apply_sdk_message(message),
            Event::StreamingText { text } => {
                self.streaming_text.push_str(text);
                TimelineChange::StreamingUpdated
            }
            Event::TurnComplete { .. } => {
                let materialized = !self.streaming_text.is_empty();
                if materialized {
                    let text = std::mem::take(&mut self.streaming_text);
                    self.push_message(Role::Assistant, text, Vec::new());
                }
                self.is_loading = false;
                TimelineChange::TurnCompleted { materialized }
            }
            Event::PermissionRequest {
                request_id,
                tool_name,
                input,
            } => {
                self.pending_permissions.push(PendingPermission {
                    request_id: request_id.clone(),
                    tool_name: tool_name.clone(),
                    input: input.clone(),
                });
                TimelineChange::PermissionRequested(request_id.clone())
            }
            Event::Error { message } => TimelineChange::Error(message.clone()),
        }
    }

    fn apply_sdk_message(&mut self, payload: &Value) -> TimelineChange {
        match sdk::classify(payload) {
            SdkPayload::Assistant { text, tool_uses } => {
                if text.is_empty() && tool_uses.is_empty() {
                    return TimelineChange::Ignored;
                }
                let records = tool_uses
                    .into_iter()
                    .map(ToolUseRecord::from_block)
                    .collect();
                let index = self.push_message(Role::Assistant, text, records);
                self.streaming_text.clear();
                TimelineChange::MessageAppended(index)
            }
            SdkPayload::ToolResults(results) => {
                // A user payload may carry several results; report the last
                // one that landed.
                let mut change = TimelineChange::Ignored;
                for result in results {
                    match self.fill_tool_output(result) {
                        Some(filled) => change = filled,
                        None => tracing::debug!("tool result with no outstanding tool use; dropped"),
                    }
                }
                change
            }
            SdkPayload::Other => TimelineChange::Ignored,
        }
    }

    /// Match by `tool_use_id` when it names a known record; a result for a
    /// record that already has its output is a duplicate and lands nowhere.
    /// Only a missing or unknown id falls back to the newest message that
    /// still has an unanswered record.
    fn fill_tool_output(&mut self, result: ToolResultBlock) -> Option<TimelineChange> {
        let by_id = result.tool_use_id.as_deref().and_then(|wanted| {
            self.messages.iter().enumerate().rev().find_map(|(mi, msg)| {
                msg.tool_uses
                    .iter()
                    .position(|t| t.id == wanted)
                    .map(|ti| (mi, ti))
            })
        });
        let slot = match by_id {
            Some((mi, ti)) if self.messages[mi].tool_uses[ti].is_outstanding() => Some((mi, ti)),
            Some(_) => None,
            None => self.messages.iter().enumerate().rev().find_map(|(mi, msg)| {
                msg.tool_uses
                    .iter()
                    .position(ToolUseRecord::is_outstanding)
                    .map(|ti| (mi, ti))
            }),
        };

        let (mi, ti) = slot?;
        let record = &mut self.messages[mi].tool_uses[ti];
        record.output = Some(result.content);
        if result.is_error {
            record.status = ToolStatus::Error;
        }
        Some(TimelineChange::ToolOutput {
            message: mi,
            tool_id: record.id.clone(),
        })
    }

    fn push_message(&mut self, role: Role, content: String, tool_uses: Vec<ToolUseRecord>) -> usize {
        self.message_counter += 1;
        self.messages.push(ChatMessage {
            id: format!("msg_{}", self.message_counter),
            role,
            content,
            tool_uses,
            timestamp: now_unix_millis(),
        });
        self.messages.len() - 1
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// A captured event log folded into a timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Replay {
    pub timeline: Timeline,
    /// Messages of `error` events, in order.
    pub errors: Vec<String>,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number in the log.
    pub line: usize,
    pub error: String,
}

/// Fold one event per line. Blank lines are ignored; undecodable lines are
/// recorded and skipped.
pub fn replay(log: &str) -> Replay {
    let mut timeline = Timeline::new();
    let mut errors = Vec::new();
    let mut skipped = Vec::new();
    for (idx, raw) in log.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match decode_event(line) {
            Ok(event) => {
                if let TimelineChange::Error(message) = timeline.apply(&event) {
                    errors.push(message);
                }
            }
            Err(err) => skipped.push(SkippedLine {
                line: idx + 1,
                error: err.to_string(),
            }),
        }
    }
    Replay {
        timeline,
        errors,
        skipped,
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sdk_message(message: Value) -> Event {
        Event::SdkMessage { message }
    }

    fn flat_tool_use(id: &str, name: &str) -> Event {
        sdk_message(json!({
            "type": "message",
            "role": "assistant",
            "content": [{"type": "tool_use", "id": id, "name": name, "input": {"command": "ls"}}]
        }))
    }

    #[test]
    fn submit_records_user_message_and_builds_send() {
        let mut timeline = Timeline::new();
        let cmd = timeline.submit("hello", Some("/work".into()));
        assert_eq!(
            cmd,
            Command::Send {
                text: "hello".into(),
                cwd: Some("/work".into())
            }
        );
        assert!(timeline.is_loading());
        assert_eq!(timeline.messages()[0].id, "msg_1");
        assert_eq!(timeline.messages()[0].role, Role::User);
        assert_eq!(timeline.messages()[0].content, "hello");
    }

    #[test]
    fn assistant_message_appends_and_clears_stream() {
        let mut timeline = Timeline::new();
        timeline.apply(&Event::StreamingText {
            text: "Hel".into(),
        });
        let change = timeline.apply(&sdk_message(json!({
            "type": "assistant",
            "message": {"role": "assistant", "content": [
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"command": "ls"}}
            ]}
        })));
        assert_eq!(change, TimelineChange::MessageAppended(0));
        assert_eq!(timeline.streaming_text(), "");
        let msg = &timeline.messages()[0];
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.tool_uses[0].status, ToolStatus::Completed);
        assert_eq!(msg.tool_uses[0].output, None);
    }

    #[test]
    fn empty_assistant_payload_is_ignored() {
        let mut timeline = Timeline::new();
        let change = timeline.apply(&sdk_message(json!({
            "type": "assistant",
            "message": {"content": [{"type": "thinking", "thinking": "..."}]}
        })));
        assert_eq!(change, TimelineChange::Ignored);
        assert!(timeline.messages().is_empty());
    }

    #[test]
    fn tool_use_defaults_fill_missing_fields() {
        let mut timeline = Timeline::new();
        timeline.apply(&sdk_message(json!({
            "type": "message",
            "role": "assistant",
            "content": [{"type": "tool_use"}]
        })));
        let record = &timeline.messages()[0].tool_uses[0];
        assert!(record.id.starts_with("tool_"), "got: {}", record.id);
        assert_eq!(record.name, "unknown");
        assert_eq!(record.input, json!({}));
    }

    #[test]
    fn tool_result_backfills_latest_outstanding_and_drops_strays() {
        let mut timeline = Timeline::new();
        timeline.apply(&flat_tool_use("toolu_1", "Bash"));
        let change = timeline.apply(&sdk_message(
            json!({"type": "tool_result", "content": "Cargo.toml"}),
        ));
        assert_eq!(
            change,
            TimelineChange::ToolOutput {
                message: 0,
                tool_id: "toolu_1".into()
            }
        );
        assert_eq!(
            timeline.messages()[0].tool_uses[0].output.as_deref(),
            Some("Cargo.toml")
        );

        let before = timeline.messages().to_vec();
        let stray = timeline.apply(&sdk_message(
            json!({"type": "tool_result", "content": "orphan"}),
        ));
        assert_eq!(stray, TimelineChange::Ignored);
        assert_eq!(timeline.messages(), before.as_slice());
    }

    #[test]
    fn tool_use_id_wins_over_recency() {
        let mut timeline = Timeline::new();
        timeline.apply(&flat_tool_use("toolu_a", "Read"));
        timeline.apply(&flat_tool_use("toolu_b", "Grep"));
        timeline.apply(&sdk_message(sdk::tool_result("toolu_a", "first", false)));

        assert_eq!(
            timeline.messages()[0].tool_uses[0].output.as_deref(),
            Some("first")
        );
        assert_eq!(timeline.messages()[1].tool_uses[0].output, None);
    }

    #[test]
    fn duplicate_result_for_answered_id_fills_nothing_else() {
        let mut timeline = Timeline::new();
        timeline.apply(&flat_tool_use("toolu_a", "Read"));
        timeline.apply(&sdk_message(sdk::tool_result("toolu_a", "first", false)));
        timeline.apply(&flat_tool_use("toolu_b", "Grep"));

        let change = timeline.apply(&sdk_message(sdk::tool_result("toolu_a", "again", false)));
        assert_eq!(change, TimelineChange::Ignored);
        assert_eq!(
            timeline.messages()[0].tool_uses[0].output.as_deref(),
            Some("first")
        );
        assert_eq!(timeline.messages()[1].tool_uses[0].output, None);
    }

    #[test]
    fn unknown_tool_use_id_falls_back_to_scan() {
        let mut timeline = Timeline::new();
        timeline.apply(&flat_tool_use("toolu_a", "Read"));
        timeline.apply(&sdk_message(sdk::tool_result("toolu_zzz", "data", false)));
        assert_eq!(
            timeline.messages()[0].tool_uses[0].output.as_deref(),
            Some("data")
        );
    }

    #[test]
    fn error_result_marks_record() {
        let mut timeline = Timeline::new();
        timeline.apply(&flat_tool_use("toolu_w", "Write"));
        timeline.apply(&sdk_message(sdk::tool_result(
            "toolu_w",
            "User denied this action",
            true,
        )));
        let record = &timeline.messages()[0].tool_uses[0];
        assert_eq!(record.status, ToolStatus::Error);
        assert_eq!(record.output.as_deref(), Some("User denied this action"));
    }

    #[test]
    fn turn_complete_materializes_streamed_text() {
        let mut timeline = Timeline::new();
        timeline.submit("hi", None);
        timeline.apply(&Event::StreamingText { text: "Hi ".into() });
        timeline.apply(&Event::StreamingText {
            text: "there".into(),
        });
        let change = timeline.apply(&Event::turn_complete());
        assert_eq!(change, TimelineChange::TurnCompleted { materialized: true });
        assert!(!timeline.is_loading());
        let last = timeline.messages().last().expect("message");
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Hi there");
        assert_eq!(last.id, "msg_2");

        let change = timeline.apply(&Event::turn_complete());
        assert_eq!(change, TimelineChange::TurnCompleted { materialized: false });
        assert_eq!(timeline.messages().len(), 2);
    }

    #[test]
    fn permission_requests_queue_until_resolved() {
        let mut timeline = Timeline::new();
        for id in ["perm_1_0", "perm_2_0"] {
            timeline.apply(&Event::PermissionRequest {
                request_id: id.into(),
                tool_name: "Bash".into(),
                input: json!({}),
            });
        }
        let cmd = timeline.resolve_permission("perm_2_0", Decision::Allow);
        assert_eq!(
            cmd,
            Command::RespondPermission {
                request_id: "perm_2_0".into(),
                decision: "allow".into()
            }
        );
        assert_eq!(timeline.pending_permissions().len(), 1);
        assert_eq!(timeline.pending_permissions()[0].request_id, "perm_1_0");
    }

    #[test]
    fn error_surfaces_without_clearing_loading() {
        let mut timeline = Timeline::new();
        timeline.submit("hi", None);
        let change = timeline.apply(&Event::error("Interrupted by user"));
        assert_eq!(change, TimelineChange::Error("Interrupted by user".into()));
        assert!(timeline.is_loading());
    }

    #[test]
    fn clear_resets_conversation_but_keeps_session() {
        let mut timeline = Timeline::new();
        timeline.apply(&Event::SessionReady {
            session_id: "session_9".into(),
        });
        timeline.submit("hi", None);
        timeline.apply(&Event::StreamingText { text: "x".into() });
        timeline.clear();
        assert!(timeline.messages().is_empty());
        assert_eq!(timeline.streaming_text(), "");
        assert!(!timeline.is_loading());
        assert_eq!(timeline.session_id(), Some("session_9"));
    }

    #[test]
    fn host_commands_use_wire_names() {
        let timeline = Timeline::new();
        assert_eq!(timeline.interrupt(), Command::Interrupt);
        assert_eq!(
            timeline.set_permission_mode(PermissionMode::AcceptEdits),
            Command::SetPermissionMode {
                mode: "acceptEdits".into()
            }
        );
    }

    #[test]
    fn replay_folds_a_captured_session() {
        let log = [
            r#"{"type":"session_ready","sessionId":"session_1"}"#,
            "",
            r#"{"type":"sdk_message","message":{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls"}}]}}}"#,
            r#"{"type":"permission_request","requestId":"perm_1_0","toolName":"Bash","input":{"command":"ls"}}"#,
            "not json",
            r#"{"type":"sdk_message","message":{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"src"}]}}}"#,
            r#"{"type":"streaming_text","text":"Done."}"#,
            r#"{"type":"turn_complete","messages":[]}"#,
            r#"{"type":"error","message":"Interrupted by user"}"#,
        ]
        .join("\n");

        let replay = replay(&log);
        let timeline = &replay.timeline;
        assert_eq!(timeline.session_id(), Some("session_1"));
        assert_eq!(timeline.messages().len(), 2);
        assert_eq!(
            timeline.messages()[0].tool_uses[0].output.as_deref(),
            Some("src")
        );
        assert_eq!(timeline.messages()[1].content, "Done.");
        assert_eq!(timeline.pending_permissions().len(), 1);
        assert_eq!(replay.errors, vec!["Interrupted by user".to_string()]);
        assert_eq!(
            replay.skipped,
            vec![SkippedLine {
                line: 5,
                error: "Invalid JSON: not json".into()
            }]
        );
    }

    #[test]
    fn serializes_for_replay_output() {
        let mut timeline = Timeline::new();
        timeline.submit("hi", None);
        let value = serde_json::to_value(&timeline).expect("json");
        assert_eq!(value["isLoading"], json!(true));
        assert_eq!(value["messages"][0]["role"], json!("user"));
        assert!(value.get("messageCounter").is_none());
    }
}

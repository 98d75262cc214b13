//! Scripted engine: replays a fixed list of steps as if an agent produced
//! them. Tool steps go through the approval callback like a real tool call.

use super::{AgentEngine, ToolPermission, TurnContext};
use crate::error::EngineError;
use crate::sdk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::Path;
use std::time::Duration;

/// One scripted action. Scripts are JSON lines tagged by `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Relay a payload verbatim as `sdk_message`.
    Message { message: Value },
    /// Relay one streaming text chunk.
    Text { text: String },
    /// Announce a tool call, ask for approval, then report its result.
    Tool {
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        output: String,
    },
    /// Pause; interruptible.
    Sleep { ms: u64 },
    /// End the turn with a failure.
    Fail { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct ScriptEngine {
    steps: Vec<ScriptStep>,
}

impl ScriptEngine {
    pub fn from_steps(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }

    /// Parse a JSONL script. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> io::Result<Self> {
        let mut steps = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let step = serde_json::from_str(line).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("script line {}: {e}", idx + 1),
                )
            })?;
            steps.push(step);
        }
        Ok(Self { steps })
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }
}

#[async_trait]
impl AgentEngine for ScriptEngine {
    async fn run(&self, turn: TurnContext) -> Result<(), EngineError> {
        let max_turns = turn.spec.max_turns;
        // The opening reply counts as the first agent turn; each tool
        // round-trip adds another.
        let mut agent_turns = 1u32;
        let mut tool_seq = 0u32;
        let mut streamed = String::new();

        for step in &self.steps {
            if turn.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match step {
                ScriptStep::Message { message } => turn.emit_message(message.clone())?,
                ScriptStep::Text { text } => {
                    streamed.push_str(text);
                    turn.emit_text(text.clone())?;
                }
                ScriptStep::Tool {
                    name,
                    input,
                    id,
                    output,
                } => {
                    agent_turns += 1;
                    if agent_turns > max_turns {
                        return Err(EngineError::failed(format!(
                            "Reached maximum number of turns ({max_turns})"
                        )));
                    }
                    tool_seq += 1;
                    let tool_id = id
                        .clone()
                        .unwrap_or_else(|| format!("toolu_{:04}_{tool_seq:04}", turn.spec.turn_id));
                    let input = if input.is_null() {
                        Value::Object(Default::default())
                    } else {
                        input.clone()
                    };
                    turn.emit_message(sdk::assistant_tool_use(&tool_id, name, input.clone()))?;

                    let verdict = turn.authorize(name, input).await;
                    if turn.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    let message = match verdict {
                        ToolPermission::Allow { .. } => sdk::tool_result(&tool_id, output, false),
                        ToolPermission::Deny { message } => {
                            tracing::debug!(turn_id = turn.spec.turn_id, tool = %name, "tool denied");
                            sdk::tool_result(&tool_id, &message, true)
                        }
                    };
                    turn.emit_message(message)?;
                }
                ScriptStep::Sleep { ms } => {
                    turn.until_cancelled(tokio::time::sleep(Duration::from_millis(*ms)))
                        .await?;
                }
                ScriptStep::Fail { message } => return Err(EngineError::failed(message.clone())),
            }
        }

        turn.emit_message(sdk::result_message(agent_turns, &streamed))?;
        Ok(())
    }
}

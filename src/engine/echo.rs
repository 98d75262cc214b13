use super::{AgentEngine, TurnContext};
use crate::error::EngineError;
use crate::sdk;
use async_trait::async_trait;

/// Replies with the prompt. Useful for wiring checks against a host.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoEngine;

#[async_trait]
impl AgentEngine for EchoEngine {
    async fn run(&self, turn: TurnContext) -> Result<(), EngineError> {
        if turn.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let reply = turn.prompt().to_string();
        turn.emit_message(sdk::assistant_text(&reply))?;
        turn.emit_message(sdk::result_message(1, &reply))?;
        Ok(())
    }
}

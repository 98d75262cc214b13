//! Agent engine seam.
//!
//! The sidecar treats the agent itself as a black box: one async call per
//! turn that produces output while it runs. [`AgentEngine`] is that call.
//! Everything the engine may touch during a turn travels in its
//! [`TurnContext`]: the prompt and options, the cancellation signal, the
//! tool-approval callback, and the event sink its output goes to.

use crate::broker::PermissionBroker;
use crate::error::EngineError;
use crate::protocol::{Decision, Event, PermissionMode};
use crate::transport::EventSink;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

mod echo;
mod script;

pub use echo::EchoEngine;
pub use script::{ScriptEngine, ScriptStep};

/// Message the approval callback returns when the host says no.
pub const DENIED_BY_USER_MESSAGE: &str = "User denied this action";

/// One agent-execution call per turn.
///
/// Implementations should watch [`TurnContext::is_cancelled`] (or race work
/// against [`TurnContext::cancelled`]) and return [`EngineError::Cancelled`]
/// once it fires. The orchestrator only aborts an engine at shutdown; one
/// that ignores cancellation simply keeps its turn open.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    async fn run(&self, turn: TurnContext) -> Result<(), EngineError>;
}

/// Per-turn options fixed when the turn starts.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSpec {
    pub turn_id: u64,
    pub prompt: String,
    pub cwd: Option<PathBuf>,
    /// Mode bound at turn start; later mode changes do not reach this turn.
    pub permission_mode: PermissionMode,
    pub max_turns: u32,
}

/// Everything an engine receives for one turn.
pub struct TurnContext {
    pub spec: TurnSpec,
    cancel: CancelSignal,
    approver: Option<ToolApprover>,
    events: EventSink,
}

impl TurnContext {
    /// `approver` is `None` in bypass mode; [`TurnContext::authorize`] then
    /// allows every call without asking.
    pub fn new(
        spec: TurnSpec,
        cancel: CancelSignal,
        approver: Option<ToolApprover>,
        events: EventSink,
    ) -> Self {
        Self {
            spec,
            cancel,
            approver,
            events,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.spec.prompt
    }

    pub fn approver(&self) -> Option<&ToolApprover> {
        self.approver.as_ref()
    }

    /// Relay one agent message verbatim as `sdk_message`.
    pub fn emit_message(&self, message: Value) -> Result<(), EngineError> {
        self.emit(Event::SdkMessage { message })
    }

    /// Relay one incremental text chunk as `streaming_text`.
    pub fn emit_text(&self, text: impl Into<String>) -> Result<(), EngineError> {
        self.emit(Event::StreamingText { text: text.into() })
    }

    fn emit(&self, event: Event) -> Result<(), EngineError> {
        if self.events.emit(event) {
            Ok(())
        } else {
            Err(EngineError::failed("event stream closed"))
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the host interrupts this turn.
    pub async fn cancelled(&self) {
        self.cancel.clone().cancelled().await
    }

    /// Run `work` unless cancellation wins first.
    pub async fn until_cancelled<F>(&self, work: F) -> Result<F::Output, EngineError>
    where
        F: Future + Send,
    {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            out = work => Ok(out),
        }
    }

    /// Ask whether a tool call may proceed.
    pub async fn authorize(&self, tool_name: &str, input: Value) -> ToolPermission {
        match &self.approver {
            Some(approver) => approver.check(tool_name, input).await,
            None => ToolPermission::Allow {
                updated_input: input,
            },
        }
    }
}

/// Cooperative cancellation flag for one turn.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A signal that never fires. Handy for engines driven outside a sidecar.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Wait for cancellation (returns immediately if already set).
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if *rx.borrow() {
                return;
            }
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return;
                }
            }
        }
        // No sender left (or none ever): this signal can no longer fire.
        std::future::pending::<()>().await
    }
}

/// Engine-facing verdict for one tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPermission {
    Allow { updated_input: Value },
    Deny { message: String },
}

impl ToolPermission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Approval callback bound to one turn; forwards to the shared broker.
#[derive(Clone)]
pub struct ToolApprover {
    broker: Arc<PermissionBroker>,
    turn_id: u64,
}

impl ToolApprover {
    pub fn new(broker: Arc<PermissionBroker>, turn_id: u64) -> Self {
        Self { broker, turn_id }
    }

    /// Suspend until the host decides. Allow echoes the input back unchanged;
    /// deny (or a broken request) carries the fixed denial message.
    pub async fn check(&self, tool_name: &str, input: Value) -> ToolPermission {
        match self.broker.request(self.turn_id, tool_name, input.clone()).await {
            Ok(Decision::Allow) => ToolPermission::Allow {
                updated_input: input,
            },
            Ok(Decision::Deny) => ToolPermission::Deny {
                message: DENIED_BY_USER_MESSAGE.to_string(),
            },
            Err(err) => {
                tracing::warn!(turn_id = self.turn_id, tool = tool_name, error = %err, "approval failed; denying");
                ToolPermission::Deny {
                    message: DENIED_BY_USER_MESSAGE.to_string(),
                }
            }
        }
    }
}

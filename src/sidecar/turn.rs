//! Turn task lifecycle helpers.
//!
//! Spawning and completion reporting for the one live turn, kept apart so
//! the actor loop can stay focused on command dispatch.

use crate::engine::{AgentEngine, CancelSignal, ToolApprover, TurnContext, TurnSpec};
use crate::error::EngineError;
use crate::transport::EventSink;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinError};

/// Where the live turn is in its lifecycle. Completion is handled in one
/// step when [`TurnDone`] arrives, so it has no resting state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TurnPhase {
    Active,
    Cancelling,
}

/// Actor-owned metadata for the live turn.
pub(super) struct ActiveTurn {
    pub(super) turn_id: u64,
    pub(super) phase: TurnPhase,
    /// Cooperative cancellation flag observed by the engine.
    pub(super) cancel_tx: watch::Sender<bool>,
    /// Hard stop, only used when the sidecar itself shuts down.
    pub(super) engine_task: AbortHandle,
}

/// Completion notification sent from a turn task back to the actor.
pub(super) struct TurnDone {
    pub(super) turn_id: u64,
    pub(super) result: Result<(), EngineError>,
}

/// Start one engine call. The engine writes its output straight into
/// `events`; the terminal event is left to the actor so it can only follow
/// the engine's last emission.
pub(super) fn spawn_turn(
    engine: Arc<dyn AgentEngine>,
    spec: TurnSpec,
    approver: Option<ToolApprover>,
    events: EventSink,
    done_tx: mpsc::UnboundedSender<TurnDone>,
) -> ActiveTurn {
    let turn_id = spec.turn_id;
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let context = TurnContext::new(spec, CancelSignal::new(cancel_rx), approver, events);

    // A panic stays inside this task and comes back as a JoinError.
    let engine_task = tokio::spawn(async move { engine.run(context).await });
    let abort = engine_task.abort_handle();

    tokio::spawn(async move {
        let result = match engine_task.await {
            Ok(result) => result,
            Err(err) => Err(join_failure(err)),
        };
        let _ = done_tx.send(TurnDone { turn_id, result });
    });

    ActiveTurn {
        turn_id,
        phase: TurnPhase::Active,
        cancel_tx,
        engine_task: abort,
    }
}

fn join_failure(err: JoinError) -> EngineError {
    if err.is_cancelled() {
        return EngineError::Cancelled;
    }
    match err.try_into_panic() {
        Ok(payload) => EngineError::failed(format!(
            "agent engine panicked: {}",
            panic_message(payload.as_ref())
        )),
        Err(err) => EngineError::failed(err.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

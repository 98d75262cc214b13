//! Turn orchestrator actor.
//!
//! One actor task owns the session: the permission mode, the broker, and at
//! most one live turn. Commands arrive over [`SidecarHandle`]; events leave
//! through the stream returned by [`spawn_sidecar`]. Each turn runs on its
//! own task and reports back over an internal channel, and only then does the
//! actor emit the turn's terminal event.

use crate::broker::PermissionBroker;
use crate::config::Config;
use crate::engine::{AgentEngine, ToolApprover, TurnSpec};
use crate::error::{EngineError, ProtocolError, SidecarError, INTERRUPTED_MESSAGE};
use crate::protocol::{Command, Decision, Event, PermissionMode};
use crate::textutil::log_preview;
use crate::transport::{spawn_event_writer, CommandReader, EventSink, EventStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;

mod turn;

use turn::{spawn_turn, ActiveTurn, TurnDone, TurnPhase};

/// Error text for a `send` that arrives while a turn is live.
pub const TURN_ALREADY_ACTIVE_MESSAGE: &str = "a turn is already active";

/// Session settings the actor starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarOptions {
    pub permission_mode: PermissionMode,
    /// Used when a `send` carries no `cwd`.
    pub default_cwd: Option<PathBuf>,
    pub max_turns: u32,
}

impl SidecarOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            permission_mode: config.session.permission_mode,
            default_cwd: config.session.cwd.clone(),
            max_turns: config.agent.max_turns,
        }
    }
}

impl Default for SidecarOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

enum ActorMessage {
    Command(Command),
    Reject(ProtocolError),
    InputClosed,
    Shutdown,
}

/// Handle for sending commands to a spawned sidecar actor.
#[derive(Clone)]
pub struct SidecarHandle {
    messages: mpsc::Sender<ActorMessage>,
}

impl SidecarHandle {
    /// Queue one decoded command.
    pub async fn send(&self, command: Command) -> Result<(), SidecarError> {
        self.post(ActorMessage::Command(command)).await
    }

    /// Report an input line that failed to decode; becomes an `error` event.
    pub async fn reject(&self, error: ProtocolError) -> Result<(), SidecarError> {
        self.post(ActorMessage::Reject(error)).await
    }

    /// The host is gone: let the live turn run to its terminal event with
    /// every approval denied, then stop. Waits for the actor to exit.
    pub async fn close_input(&self) {
        let _ = self.post(ActorMessage::InputClosed).await;
        self.messages.closed().await;
    }

    /// Deny every pending approval, stop the live turn, and wait for the
    /// actor to exit. A turn cut off here still gets its terminal event.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.post(ActorMessage::Shutdown).await;
        self.messages.closed().await;
    }

    async fn post(&self, message: ActorMessage) -> Result<(), SidecarError> {
        self.messages
            .send(message)
            .await
            .map_err(|_| SidecarError::Closed)
    }
}

/// Spawn the orchestrator actor. `session_ready` is the first event on the
/// returned stream.
pub fn spawn_sidecar(
    options: SidecarOptions,
    engine: Arc<dyn AgentEngine>,
) -> (SidecarHandle, EventStream) {
    let (message_tx, mut message_rx) = mpsc::channel::<ActorMessage>(64);
    let (events, event_stream) = EventSink::channel();

    tokio::spawn(async move {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<TurnDone>();
        let mut state = SidecarState {
            broker: Arc::new(PermissionBroker::new(events.clone())),
            permission_mode: options.permission_mode,
            options,
            engine,
            events,
            active: None,
            draining: false,
            next_turn_id: 1,
            done_tx,
        };

        let session_id = format!("session_{}", now_unix_millis());
        tracing::info!(session_id = %session_id, mode = %state.permission_mode, "session ready");
        state.events.emit(Event::SessionReady { session_id });

        loop {
            tokio::select! {
                message = message_rx.recv() => match message {
                    Some(ActorMessage::Command(command)) => state.handle_command(command).await,
                    Some(ActorMessage::Reject(error)) => {
                        state.events.emit(Event::error(error.to_string()));
                    }
                    Some(ActorMessage::InputClosed) => {
                        state.begin_drain().await;
                        if state.active.is_none() {
                            break;
                        }
                    }
                    Some(ActorMessage::Shutdown) | None => break,
                },
                Some(done) = done_rx.recv() => {
                    state.finish_turn(done).await;
                    if state.draining && state.active.is_none() {
                        break;
                    }
                }
            }
        }

        state.stop(&mut done_rx).await;
    });

    (
        SidecarHandle {
            messages: message_tx,
        },
        event_stream,
    )
}

/// Run a sidecar over a command reader and an event writer until the input
/// closes. A turn still live at EOF runs to its terminal event (approvals
/// denied), and everything emitted is flushed before returning.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    options: SidecarOptions,
    engine: Arc<dyn AgentEngine>,
) -> Result<(), SidecarError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, events) = spawn_sidecar(options, engine);
    let writer_task = spawn_event_writer(writer, events);
    let mut commands = CommandReader::new(reader);

    let read_result = pump_commands(&mut commands, &handle).await;
    tracing::info!(lines = commands.lines_read(), "input closed; draining");
    handle.close_input().await;
    drop(handle);

    let write_result = match writer_task.await {
        Ok(result) => result.map_err(SidecarError::from),
        Err(err) => Err(SidecarError::Io(std::io::Error::other(err))),
    };
    read_result.and(write_result)
}

async fn pump_commands<R>(
    commands: &mut CommandReader<R>,
    handle: &SidecarHandle,
) -> Result<(), SidecarError>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(inbound) = commands.next().await? {
        match inbound {
            Ok(command) => handle.send(command).await?,
            Err(error) => handle.reject(error).await?,
        }
    }
    Ok(())
}

struct SidecarState {
    options: SidecarOptions,
    engine: Arc<dyn AgentEngine>,
    broker: Arc<PermissionBroker>,
    events: EventSink,
    /// Mode for the next turn; a live turn keeps the mode it started with.
    permission_mode: PermissionMode,
    active: Option<ActiveTurn>,
    /// Input closed; stop once the live turn reports.
    draining: bool,
    next_turn_id: u64,
    done_tx: mpsc::UnboundedSender<TurnDone>,
}

impl SidecarState {
    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { text, cwd } => self.start_turn(text, cwd),
            Command::RespondPermission {
                request_id,
                decision,
            } => {
                let decision = Decision::from_wire(&decision);
                if let Err(err) = self.broker.resolve(&request_id, decision).await {
                    tracing::warn!(request_id = %request_id, error = %err, "ignoring permission response");
                }
            }
            Command::SetPermissionMode { mode } => match mode.parse::<PermissionMode>() {
                Ok(mode) => {
                    tracing::info!(mode = %mode, "permission mode set for next turn");
                    self.permission_mode = mode;
                }
                Err(message) => {
                    tracing::warn!(mode = %mode, "rejected permission mode");
                    self.events.emit(Event::error(message));
                }
            },
            Command::Interrupt => self.interrupt().await,
        }
    }

    fn start_turn(&mut self, text: String, cwd: Option<String>) {
        if let Some(active) = &self.active {
            tracing::warn!(active_turn = active.turn_id, "send rejected while a turn is live");
            self.events.emit(Event::error(TURN_ALREADY_ACTIVE_MESSAGE));
            return;
        }

        let turn_id = self.next_turn_id;
        self.next_turn_id = self.next_turn_id.saturating_add(1);
        let spec = TurnSpec {
            turn_id,
            prompt: text,
            cwd: cwd
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from)
                .or_else(|| self.options.default_cwd.clone()),
            permission_mode: self.permission_mode,
            max_turns: self.options.max_turns,
        };
        // Bypass hands the engine no approver at all: every call is allowed.
        let approver = (spec.permission_mode != PermissionMode::Bypass)
            .then(|| ToolApprover::new(Arc::clone(&self.broker), turn_id));

        tracing::info!(
            turn_id,
            mode = %spec.permission_mode,
            cwd = ?spec.cwd,
            prompt = %log_preview(&spec.prompt, 80),
            "turn started"
        );
        self.active = Some(spawn_turn(
            Arc::clone(&self.engine),
            spec,
            approver,
            self.events.clone(),
            self.done_tx.clone(),
        ));
    }

    async fn interrupt(&mut self) {
        let Some(active) = self.active.as_mut() else {
            tracing::debug!("interrupt with no live turn ignored");
            return;
        };
        if active.phase == TurnPhase::Cancelling {
            return;
        }
        active.phase = TurnPhase::Cancelling;
        // Flag first so an engine woken by the denial already sees it.
        let _ = active.cancel_tx.send(true);
        let denied = self.broker.deny_turn(active.turn_id).await;
        tracing::info!(turn_id = active.turn_id, denied, "turn cancelling");
    }

    async fn finish_turn(&mut self, done: TurnDone) {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.turn_id == done.turn_id)
        {
            self.active = None;
        }
        // Requests the engine abandoned would otherwise linger forever.
        let stale = self.broker.deny_turn(done.turn_id).await;
        if stale > 0 {
            tracing::debug!(turn_id = done.turn_id, stale, "denied leftover permission requests");
        }

        let terminal = match done.result {
            Ok(()) => {
                tracing::info!(turn_id = done.turn_id, "turn complete");
                Event::turn_complete()
            }
            Err(EngineError::Cancelled) => {
                tracing::info!(turn_id = done.turn_id, "turn interrupted");
                Event::error(INTERRUPTED_MESSAGE)
            }
            Err(EngineError::Failed(message)) => {
                tracing::warn!(turn_id = done.turn_id, error = %message, "turn failed");
                Event::error(message)
            }
        };
        self.events.emit(terminal);
    }

    /// No host left to answer: deny what is pending and everything asked
    /// from now on.
    async fn begin_drain(&mut self) {
        self.draining = true;
        let denied = self.broker.close().await;
        tracing::info!(
            denied,
            live_turn = ?self.active.as_ref().map(|active| active.turn_id),
            "draining before stop"
        );
    }

    async fn stop(mut self, done_rx: &mut mpsc::UnboundedReceiver<TurnDone>) {
        if let Some(active) = &self.active {
            let _ = active.cancel_tx.send(true);
        }
        let denied = self.broker.close().await;
        let cut_off = self.active.as_ref().map(|active| {
            active.engine_task.abort();
            active.turn_id
        });
        if let Some(turn_id) = cut_off {
            tracing::info!(turn_id, "live turn stopped at shutdown");
            // The turn watcher always reports, aborted or not; its terminal
            // event is the last thing this turn emits.
            if let Some(done) = done_rx.recv().await {
                self.finish_turn(done).await;
            }
        }
        tracing::info!(denied, "sidecar stopped");
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

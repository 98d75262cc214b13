//! Wire schema for the host <-> sidecar line protocol.
//!
//! Two disjoint envelope families travel over the transport: [`Command`]
//! (host to sidecar, on stdin) and [`Event`] (sidecar to host, on stdout).
//! Each line carries exactly one JSON object tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

mod codec;

pub use codec::{decode_command, decode_event, encode_command, encode_event};

/// Host-originated control messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a turn with the given user input.
    Send {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    /// Resolve a pending permission request.
    RespondPermission {
        #[serde(rename = "requestId")]
        request_id: String,
        /// `allow` or anything else (treated as deny).
        decision: String,
    },
    /// Configure the permission mode for the next turn.
    SetPermissionMode { mode: String },
    /// Cancel the active turn, if any.
    Interrupt,
}

impl Command {
    /// Every `type` tag a command line may carry.
    pub const KNOWN_TYPES: [&'static str; 4] =
        ["send", "respond_permission", "set_permission_mode", "interrupt"];

    /// Wire tag for this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::RespondPermission { .. } => "respond_permission",
            Self::SetPermissionMode { .. } => "set_permission_mode",
            Self::Interrupt => "interrupt",
        }
    }
}

/// Sidecar-originated data messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Emitted once when the process is ready to accept commands.
    SessionReady {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// One unit of agent output, relayed without interpretation.
    SdkMessage { message: Value },
    /// A tool invocation is waiting on a host decision.
    PermissionRequest {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    /// Incremental assistant text.
    StreamingText { text: String },
    /// Terminal success for the active turn. `messages` is reserved and
    /// currently always empty.
    TurnComplete {
        #[serde(default)]
        messages: Vec<Value>,
    },
    /// Terminal failure for a turn, or a non-fatal protocol complaint.
    Error { message: String },
}

impl Event {
    /// Every `type` tag an event line may carry.
    pub const KNOWN_TYPES: [&'static str; 6] = [
        "session_ready",
        "sdk_message",
        "permission_request",
        "streaming_text",
        "turn_complete",
        "error",
    ];

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn turn_complete() -> Self {
        Self::TurnComplete {
            messages: Vec::new(),
        }
    }

    /// Wire tag for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionReady { .. } => "session_ready",
            Self::SdkMessage { .. } => "sdk_message",
            Self::PermissionRequest { .. } => "permission_request",
            Self::StreamingText { .. } => "streaming_text",
            Self::TurnComplete { .. } => "turn_complete",
            Self::Error { .. } => "error",
        }
    }
}

/// How tool invocations are approved during a turn.
///
/// The sidecar only interprets `Bypass` itself (no approval callback at all);
/// the other modes are handed to the engine unchanged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionMode {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    #[serde(rename = "plan")]
    Plan,
    #[serde(rename = "bypass")]
    Bypass,
}

impl PermissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::Bypass => "bypass",
        }
    }

    /// Parse a wire value. Accepts the kebab-case spelling `accept-edits` too.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "default" => Some(Self::Default),
            "acceptEdits" | "accept-edits" => Some(Self::AcceptEdits),
            "plan" => Some(Self::Plan),
            "bypass" => Some(Self::Bypass),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown permission mode: {s}"))
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// Only the exact string `allow` grants; everything else denies.
    pub fn from_wire(raw: &str) -> Self {
        if raw == "allow" {
            Self::Allow
        } else {
            Self::Deny
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

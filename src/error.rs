//! Unified error types for the sidecar.

use std::fmt;

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// A command line that could not be turned into a [`crate::protocol::Command`].
///
/// The `Display` text is exactly what goes out in the `error` event, so the
/// host sees the same wording the sidecar logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line was not JSON, or was JSON without a string `type` tag.
    InvalidJson { raw: String },
    /// The `type` tag names no known envelope.
    UnknownType { kind: String },
    /// Known tag, but the fields did not match the command's shape.
    InvalidCommand { kind: String, message: String },
    /// Host side: known tag, but the fields did not match the event's shape.
    InvalidEvent { kind: String, message: String },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson { raw } => write!(f, "Invalid JSON: {raw}"),
            Self::UnknownType { kind } => write!(f, "Unknown message type: {kind}"),
            Self::InvalidCommand { kind, message } => {
                write!(f, "Invalid {kind} command: {message}")
            }
            Self::InvalidEvent { kind, message } => {
                write!(f, "Invalid {kind} event: {message}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// BrokerError
// ---------------------------------------------------------------------------

/// Errors from the permission broker.
///
/// None of these reach the wire; callers log them and carry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// No pending request carries this id (never issued, or already resolved).
    UnknownRequest(String),
    /// The broker side went away before a decision arrived.
    BrokerClosed,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRequest(id) => write!(f, "no pending permission request with id: {id}"),
            Self::BrokerClosed => write!(f, "permission request was dropped before resolution"),
        }
    }
}

impl std::error::Error for BrokerError {}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Message reported when a turn ends because the host interrupted it.
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by user";

/// Failure raised by an agent engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine observed the cancellation signal and stopped.
    Cancelled,
    /// Anything else; the message is relayed to the host verbatim.
    Failed(String),
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str(INTERRUPTED_MESSAGE),
            Self::Failed(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// SidecarError
// ---------------------------------------------------------------------------

/// Top-level error for the serve loop.
#[derive(Debug)]
pub enum SidecarError {
    /// Reading commands or writing events failed.
    Io(std::io::Error),
    /// The orchestrator actor stopped while input was still arriving.
    Closed,
}

impl fmt::Display for SidecarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Closed => write!(f, "sidecar actor stopped"),
        }
    }
}

impl std::error::Error for SidecarError {}

impl From<std::io::Error> for SidecarError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display_matches_wire_text() {
        assert_eq!(
            ProtocolError::InvalidJson {
                raw: "{oops".into()
            }
            .to_string(),
            "Invalid JSON: {oops"
        );
        assert_eq!(
            ProtocolError::UnknownType {
                kind: "reboot".into()
            }
            .to_string(),
            "Unknown message type: reboot"
        );
        assert_eq!(
            ProtocolError::InvalidCommand {
                kind: "send".into(),
                message: "missing field `text`".into()
            }
            .to_string(),
            "Invalid send command: missing field `text`"
        );
        assert_eq!(
            ProtocolError::InvalidEvent {
                kind: "error".into(),
                message: "missing field `message`".into()
            }
            .to_string(),
            "Invalid error event: missing field `message`"
        );
    }

    #[test]
    fn engine_cancelled_uses_fixed_message() {
        assert_eq!(EngineError::Cancelled.to_string(), "Interrupted by user");
        assert_eq!(EngineError::failed("rate limited").to_string(), "rate limited");
    }

    #[test]
    fn broker_error_names_request_id() {
        let e = BrokerError::UnknownRequest("perm_9_1".into());
        assert!(e.to_string().contains("perm_9_1"), "got: {e}");
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = ConfigError::from(io_err);
        let s = e.to_string();
        assert!(s.starts_with("io:"), "got: {s}");
        assert!(s.contains("file not found"));
    }

    #[test]
    fn config_error_from_toml() {
        let toml_err: toml::de::Error = toml::from_str::<toml::Value>("x = [unclosed").unwrap_err();
        let e = ConfigError::from(toml_err);
        assert!(e.to_string().starts_with("toml:"));
    }

    #[test]
    fn engine_error_from_io_keeps_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let e = EngineError::from(io_err);
        assert_eq!(e, EngineError::Failed("pipe closed".into()));
    }
}

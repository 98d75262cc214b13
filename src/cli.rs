//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vox::config::EngineKind;
use vox::protocol::PermissionMode;

/// Agent sidecar speaking newline-delimited JSON on stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "vox", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to config file (default: ./vox.toml or ~/.config/vox/vox.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Initial permission mode: default, acceptEdits, plan, bypass.
    #[arg(long = "permission-mode", value_parser = parse_permission_mode)]
    pub permission_mode: Option<PermissionMode>,

    /// Working directory for turns whose `send` carries no `cwd`.
    #[arg(long = "cwd", value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Engine that runs each turn: echo or script.
    #[arg(long = "engine", value_parser = parse_engine)]
    pub engine: Option<EngineKind>,

    /// JSONL step file for the script engine. Implies `--engine script`.
    #[arg(long = "script", value_name = "PATH")]
    pub script: Option<PathBuf>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Fold a captured event log through the timeline and print it as JSON.
    Replay {
        /// File with one sidecar event per line.
        events: PathBuf,
    },
    /// Print the default configuration file.
    Config,
}

fn parse_permission_mode(raw: &str) -> Result<PermissionMode, String> {
    raw.parse()
}

fn parse_engine(raw: &str) -> Result<EngineKind, String> {
    match raw.trim() {
        "echo" => Ok(EngineKind::Echo),
        "script" => Ok(EngineKind::Script),
        other => Err(format!("unknown engine `{other}` (expected echo or script)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_runs_the_sidecar() {
        let args = Args::parse_from(["vox"]);
        assert!(args.command.is_none());
        assert!(args.permission_mode.is_none());
        assert!(args.engine.is_none());
    }

    #[test]
    fn session_flags_parse() {
        let args = Args::parse_from([
            "vox",
            "--permission-mode",
            "acceptEdits",
            "--cwd",
            "/srv",
            "--engine",
            "script",
            "--script",
            "steps.jsonl",
        ]);
        assert_eq!(args.permission_mode, Some(PermissionMode::AcceptEdits));
        assert_eq!(args.cwd, Some(PathBuf::from("/srv")));
        assert_eq!(args.engine, Some(EngineKind::Script));
        assert_eq!(args.script, Some(PathBuf::from("steps.jsonl")));
    }

    #[test]
    fn bad_mode_is_rejected() {
        let err = Args::try_parse_from(["vox", "--permission-mode", "yolo"]).unwrap_err();
        assert!(
            err.to_string().contains("Unknown permission mode: yolo"),
            "got: {err}"
        );
        assert!(Args::try_parse_from(["vox", "--engine", "gpt"]).is_err());
    }

    #[test]
    fn replay_takes_an_event_file() {
        let args = Args::parse_from(["vox", "replay", "session.jsonl"]);
        assert_eq!(
            args.command,
            Some(Command::Replay {
                events: PathBuf::from("session.jsonl")
            })
        );
        let args = Args::parse_from(["vox", "config"]);
        assert_eq!(args.command, Some(Command::Config));
    }
}

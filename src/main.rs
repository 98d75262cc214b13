//! CLI entry point for vox.

mod cli;

use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use vox::config::{load_config, Config, EngineKind, DEFAULT_CONFIG_TEMPLATE};
use vox::engine::{AgentEngine, EchoEngine, ScriptEngine};
use vox::sidecar::{serve, SidecarOptions};
use vox::timeline;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    if matches!(args.command, Some(cli::Command::Config)) {
        print!("{DEFAULT_CONFIG_TEMPLATE}");
        return;
    }

    let loaded = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let source = loaded.source;
    let mut config = loaded.config;
    apply_cli_overrides(&mut config, &args);
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    init_tracing(&config.logging.filter);
    tracing::debug!(source = %source, "configuration loaded");

    if let Some(cli::Command::Replay { events }) = &args.command {
        if let Err(e) = run_replay(events) {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let options = SidecarOptions::from_config(&config);
    tracing::info!(
        engine = %config.agent.engine,
        mode = %options.permission_mode,
        max_turns = options.max_turns,
        "starting sidecar"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = serve(stdin, stdout, options, engine) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "sidecar stopped with error");
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("signal received; exiting");
        }
    }
}

/// Flags win over file and environment settings. `--script` alone selects
/// the script engine.
fn apply_cli_overrides(config: &mut Config, args: &cli::Args) {
    if let Some(mode) = args.permission_mode {
        config.session.permission_mode = mode;
    }
    if let Some(cwd) = &args.cwd {
        config.session.cwd = Some(cwd.clone());
    }
    if let Some(script) = &args.script {
        config.agent.script = Some(script.clone());
        if args.engine.is_none() {
            config.agent.engine = EngineKind::Script;
        }
    }
    if let Some(engine) = args.engine {
        config.agent.engine = engine;
    }
}

/// Logs go to stderr; stdout carries the protocol. `VOX_LOG` beats
/// `RUST_LOG`, which beats the configured filter.
fn init_tracing(configured: &str) {
    let filter = EnvFilter::try_from_env("VOX_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(configured));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn build_engine(config: &Config) -> Result<Arc<dyn AgentEngine>, String> {
    match config.agent.engine {
        EngineKind::Echo => Ok(Arc::new(EchoEngine)),
        EngineKind::Script => {
            let path = config
                .agent
                .script
                .as_deref()
                .ok_or_else(|| "script engine needs `agent.script`".to_string())?;
            let engine = ScriptEngine::load(path)
                .map_err(|e| format!("failed to load script {}: {e}", path.display()))?;
            tracing::debug!(steps = engine.steps().len(), path = %path.display(), "script loaded");
            Ok(Arc::new(engine))
        }
    }
}

fn run_replay(path: &Path) -> Result<(), String> {
    let log = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let replay = timeline::replay(&log);
    for skipped in &replay.skipped {
        tracing::warn!(line = skipped.line, error = %skipped.error, "skipped event line");
    }
    let rendered = serde_json::to_string_pretty(&replay)
        .map_err(|e| format!("failed to render timeline: {e}"))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

//! jk - reversible file operations CLI
//!
//! Thin binary over the januskey library: argument parsing, logging
//! setup, environment overrides, and exit-code mapping live here.

mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use januskey::{Engine, JanusError, Result, MIN_OVERWRITE_PASSES};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Managed-root override
const ENV_ROOT: &str = "JANUSKEY_ROOT";
/// Minimum secure-overwrite passes (clamped to >= 3)
const ENV_MIN_PASSES: &str = "JANUSKEY_MIN_PASSES";
/// Tracing filter level (error, warn, info, debug, trace)
const ENV_VERBOSITY: &str = "JANUSKEY_VERBOSITY";

fn main() {
    let filter = std::env::var(ENV_VERBOSITY)
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("jk: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = resolve_root(&cli);

    if let Commands::Init = cli.command {
        return commands::run_init(&root);
    }

    let mut engine = Engine::open(&root)?;
    engine.set_min_passes(min_passes_from_env()?);

    match &cli.command {
        Commands::Init => unreachable!("handled before open"),
        Commands::Status(args) => commands::run_status(&engine, args),
        Commands::History(args) => commands::run_history(&engine, args),
        Commands::Create(args) => commands::run_create(&mut engine, args),
        Commands::Delete { path } => commands::run_delete(&mut engine, path),
        Commands::Modify(args) => commands::run_modify(&mut engine, args),
        Commands::Move {
            source,
            destination,
        } => commands::run_move(&mut engine, source, destination),
        Commands::Copy {
            source,
            destination,
        } => commands::run_copy(&mut engine, source, destination),
        Commands::Undo { id } => commands::run_undo(&mut engine, *id),
        Commands::Begin => commands::run_begin(&mut engine),
        Commands::Commit => commands::run_commit(&mut engine),
        Commands::Rollback => commands::run_rollback(&mut engine),
        Commands::Preview => commands::run_preview(&engine),
        Commands::Obliterate(args) => commands::run_obliterate(&mut engine, args),
    }
}

/// Root resolution order: --root flag, $JANUSKEY_ROOT, current
/// directory.
fn resolve_root(cli: &Cli) -> PathBuf {
    cli.root
        .clone()
        .or_else(|| std::env::var_os(ENV_ROOT).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Overwrite-pass override. Values below the floor are clamped up; an
/// unparsable value is an error rather than a silent default.
fn min_passes_from_env() -> Result<u32> {
    match std::env::var(ENV_MIN_PASSES) {
        Ok(raw) => {
            let passes: u32 = raw.parse().map_err(|_| {
                JanusError::InvalidState(format!(
                    "{ENV_MIN_PASSES} must be an integer, got '{raw}'"
                ))
            })?;
            Ok(passes.max(MIN_OVERWRITE_PASSES))
        }
        Err(_) => Ok(MIN_OVERWRITE_PASSES),
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardwerk operator console.
//
// Entry point. Parses arguments, initialises logging, opens the generation
// engine and dispatches to the command handlers.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use semver::Version;
use tracing_subscriber::EnvFilter;

use commands::CliError;

/// Licence card artifact generation and storage maintenance.
#[derive(Parser, Debug)]
#[command(name = "cardwerk", version, about, long_about = None)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (JSON). Defaults apply when omitted.
    #[arg(long, global = true, env = "CARDWERK_CONFIG")]
    config: Option<PathBuf>,

    /// Storage root, used when no configuration file is given.
    #[arg(long, global = true, env = "CARDWERK_ROOT", default_value = "cardwerk-data")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default configuration to a file.
    Init {
        /// Where to write the configuration.
        path: PathBuf,
    },

    /// Generate artifact sets for entities in a source manifest.
    Generate {
        /// JSON object mapping entity ids to source data.
        #[arg(long)]
        manifest: PathBuf,
        /// Only this entity (default: every entity in the manifest).
        #[arg(long)]
        entity: Option<String>,
        /// Render even when the current set matches.
        #[arg(long)]
        force: bool,
        /// Treat sets stamped below this generator version as stale.
        #[arg(long)]
        min_version: Option<Version>,
    },

    /// Regenerate every entity whose artifact set predates a generator version.
    Regenerate {
        #[arg(long)]
        version_cutoff: Version,
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
        /// Report what would be regenerated without rendering.
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-normalize every photo and regenerate the affected sets.
    ReprocessPhotos {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove old temp files, unreferenced superseded files and orphans.
    Cleanup {
        /// Age threshold in hours (default: the configured temp max age).
        #[arg(long)]
        older_than_hours: Option<u64>,
    },

    /// Copy a stored file to a timestamped backup next to it.
    Backup {
        /// Path relative to the storage root, e.g. license-outputs/<file>.
        path: String,
    },

    /// Show file counts and sizes per storage category.
    Stats,

    /// Show the generation status of one entity.
    Status {
        entity: String,
    },

    /// Run the background sweeper until interrupted.
    Sweep {
        /// Seconds between sweeps (default: the configured interval).
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    tracing::debug!("cardwerk starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            commands::report(&err);
            match err {
                CliError::Generation { .. } => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Init { path } = &cli.command {
        return commands::init(path);
    }

    let config = commands::load_config(cli.config.as_deref(), &cli.root)?;
    let engine = commands::open_engine(config)?;

    match cli.command {
        Command::Init { .. } => Ok(()),
        Command::Generate {
            manifest,
            entity,
            force,
            min_version,
        } => commands::generate(&engine, &manifest, entity.as_deref(), force, min_version).await,
        Command::Regenerate {
            version_cutoff,
            manifest,
            batch_size,
            dry_run,
        } => commands::regenerate(&engine, &version_cutoff, &manifest, batch_size, dry_run).await,
        Command::ReprocessPhotos {
            manifest,
            batch_size,
            dry_run,
        } => commands::reprocess(&engine, &manifest, batch_size, dry_run).await,
        Command::Cleanup { older_than_hours } => commands::cleanup(&engine, older_than_hours).await,
        Command::Backup { path } => commands::backup(&engine, &path).await,
        Command::Stats => commands::stats(&engine).await,
        Command::Status { entity } => commands::status(&engine, &entity).await,
        Command::Sweep { interval_secs } => commands::sweep(engine, interval_secs).await,
    }
}

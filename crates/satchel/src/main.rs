//! Satchel - inspect and manage encrypted server-side sessions
//!
//! Main entry point for the satchel CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use commands::{destroy, show, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Satchel - inspect and manage encrypted server-side sessions
#[derive(Parser)]
#[command(name = "satchel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: <config dir>/satchel/config.toml)
    #[arg(long, global = true, env = "SATCHEL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start or resume a session, optionally setting values
    Start(start::StartArgs),

    /// Show the values stored in a session
    Show(show::ShowArgs),

    /// Delete a session
    Destroy(destroy::DestroyArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "satchel=debug,satchel_session=debug,satchel_sqlite=debug,info"
    } else {
        "satchel=info,satchel_session=warn,satchel_sqlite=warn,warn"
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let config = config::load(cli.config.as_deref())?;
    let ctx = commands::Context {
        config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx),
        Commands::Show(args) => show::run(args, &ctx),
        Commands::Destroy(args) => destroy::run(args, &ctx),
    }
}

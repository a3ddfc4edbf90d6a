//! Start command - starts or resumes a session and prints its id.

use anyhow::{Result, anyhow};
use clap::Args;
use satchel_session::{Session, Value};
use tracing::info;

use super::Context;

/// Arguments for the start command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Resume (or create) this session id instead of generating one
    #[arg(long)]
    pub id: Option<String>,

    /// Store a string value, as KEY=VALUE (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,
}

fn parse_key_value(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(anyhow!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Run the start command.
pub fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let manager = ctx.manager(&store)?;

    let session = manager.start(args.id.as_deref().unwrap_or(""))?;
    for (key, value) in args.set {
        session.set(&key, Value::from(value));
    }
    manager.close(session.session_id())?;

    info!(
        session_id = %session.session_id(),
        keys = session.keys().len(),
        "Session saved"
    );
    if ctx.verbose {
        eprintln!(
            "created {}",
            session.time_created().format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!("{}", session.session_id());
    Ok(())
}

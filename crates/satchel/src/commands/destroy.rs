//! Destroy command - deletes a session.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the destroy command.
#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Session id
    pub id: String,
}

/// Run the destroy command.
pub fn run(args: DestroyArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let existed = store.contains(&args.id)?;
    let manager = ctx.manager(&store)?;
    manager.destroy(&args.id)?;

    if existed {
        println!("destroyed {}", args.id);
    } else {
        println!("no session with id '{}'", args.id);
    }
    Ok(())
}

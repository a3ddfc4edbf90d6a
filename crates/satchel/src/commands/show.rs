//! Show command - prints the values stored in a session.

use anyhow::{Result, bail};
use clap::Args;
use satchel_session::{Session, Value};
use serde_json::json;

use super::Context;

/// Arguments for the show command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Session id
    pub id: String,

    /// Output as JSON (for scripting)
    #[arg(long)]
    pub json: bool,
}

/// Run the show command.
pub fn run(args: ShowArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    // Starting an unknown id would create it.
    if !store.contains(&args.id)? {
        bail!("no session with id '{}'", args.id);
    }
    let manager = ctx.manager(&store)?;
    let session = manager.start(&args.id)?;

    let values: Vec<(String, Value)> = session
        .keys()
        .into_iter()
        .filter_map(|key| session.get(&key).map(|value| (key, value)))
        .collect();

    if args.json {
        let map: serde_json::Map<_, _> = values
            .iter()
            .map(|(key, value)| (key.clone(), to_json(value)))
            .collect();
        let out = json!({
            "id": session.session_id(),
            "created_at": session.time_created().to_rfc3339(),
            "values": map,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", session.session_id());
    println!(
        "  created  {}",
        session.time_created().format("%Y-%m-%d %H:%M:%S UTC")
    );
    for (key, value) in &values {
        println!("  {key} = {} ({})", render(value), value.kind());
    }
    Ok(())
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Isize(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Float32(f) => json!(f),
        Value::String(s) => json!(s),
        Value::Bytes(b) => json!(b),
        Value::Time(t) => json!(t.to_rfc3339()),
        Value::List(items) => items.iter().map(to_json).collect(),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), to_json(v)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        Value::Custom(custom) => json!({ "type": custom.type_name() }),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Custom(custom) => format!("<{}>", custom.type_name()),
        other => to_json(other).to_string(),
    }
}

#![warn(clippy::uninlined_format_args)]

mod config;
mod render;

use std::{borrow::Cow, env, fs, io, process};

use serde::Deserialize;
use splitmate_domain::{ExpenseRecord, GroupLedger, MemberId};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::{config::InterpreterConfig, render::render_summary};

type CliResult<T> = Result<T, Cow<'static, str>>;

/// Group snapshot as read from disk.
#[derive(Debug, Deserialize)]
struct Snapshot {
    members: Vec<MemberId>,
    #[serde(default)]
    expenses: Vec<ExpenseRecord>,
}

fn main() {
    init_logging();

    if let Err(err) = run() {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> CliResult<()> {
    let Some(path) = env::args().nth(1) else {
        return Err("Usage: splitmate_interpreter <snapshot.json>".into());
    };

    let config = InterpreterConfig::from_env()?;

    let source =
        fs::read_to_string(&path).map_err(|err| format!("Failed to read '{path}': {err}"))?;
    let snapshot = parse_snapshot(&source)?;

    tracing::info!(
        path = %path,
        members = snapshot.members.len(),
        expenses = snapshot.expenses.len(),
        "Loaded group snapshot"
    );

    let ledger = GroupLedger::new(config.context);
    let summary = ledger.summarize(&snapshot.expenses, &snapshot.members);
    print!("{}", render_summary(&summary, config.context.scale));

    Ok(())
}

fn parse_snapshot(source: &str) -> CliResult<Snapshot> {
    if source.trim().is_empty() {
        return Err("File is empty; expected a JSON object with `members` and `expenses`".into());
    }

    let snapshot: Snapshot =
        serde_json::from_str(source).map_err(|err| format!("Malformed snapshot: {err}"))?;

    if snapshot.members.is_empty() {
        return Err("Snapshot must list at least one member".into());
    }

    Ok(snapshot)
}

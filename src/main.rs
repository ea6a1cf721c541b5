//! schemaguard CLI
//!
//! Runs one migration simulation from the command line:
//!
//! ```text
//! schemaguard <snapshot.json> <migration.sql> [dev|staging|prod]
//! ```
//!
//! Prints the full `SimulationOutcome` as pretty JSON on stdout. Exits
//! non-zero when the simulation itself could not run (bad snapshot, empty
//! script); a risky migration is still a successful simulation.

use anyhow::{bail, Context, Result};
use schemaguard::config::{Environment, Settings};
use schemaguard::pipeline::SafeMigrationEngine;
use std::fs;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,schemaguard=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

fn run() -> Result<bool> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        bail!("usage: {} <snapshot.json> <migration.sql> [dev|staging|prod]", args[0]);
    }

    let snapshot_path = &args[1];
    let script_path = &args[2];
    let environment = args
        .get(3)
        .map(|tag| Environment::parse(tag))
        .unwrap_or(Environment::Dev);

    let payload: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(snapshot_path)
            .with_context(|| format!("reading snapshot {}", snapshot_path))?,
    )
    .with_context(|| format!("parsing snapshot {}", snapshot_path))?;
    let ddl = fs::read_to_string(script_path)
        .with_context(|| format!("reading migration script {}", script_path))?;

    info!(snapshot = %snapshot_path, script = %script_path, environment = %environment, "simulating");

    let engine = SafeMigrationEngine::new(Settings::new());
    let outcome = engine.simulate_payload(payload, &ddl, environment);

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.ok)
}

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

//! `rebid-tracker [JOURNAL]`: consume events in the journal text format from a file, or
//! from stdin when no path is given, and report fee bumps per block.
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use rebid_tracker::logging::init_logging;
use rebid_tracker::prelude::*;
use rebid_tracker::{Config, JournalWriter};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    if let Err(e) = init_logging(&config.log_filter, config.log_json) {
        eprintln!("{e}");
        return ExitCode::from(2);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "rebid-tracker stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let rpc = Arc::new(BitcoindRpc::new(
        &config.rpc_url,
        config.rpc_user.clone(),
        config.rpc_password.clone(),
        config.rpc_timeout,
    )?);
    let store = SqliteStore::new(&config.store_path)?;
    let sink = CsvFileSink::new(&config.report_path);

    let mut engine = RebidTracker::bootstrap(rpc, sink, store)
        .await?
        .with_min_history(config.min_history)
        .with_block_trigger(config.block_trigger);
    if let Some(cap) = config.max_records {
        engine = engine.with_max_records(cap);
    }
    if let Some(path) = &config.journal_path {
        engine = engine.with_journal(JournalWriter::open(path).await?);
    }

    info!(
        height = engine.height(),
        report = %config.report_path.display(),
        trigger = ?config.block_trigger,
        "starting"
    );

    let summary = match std::env::args_os().nth(1) {
        Some(path) => {
            let mut source = JournalReader::open(&path)
                .await
                .with_context(|| format!("replay {}", path.to_string_lossy()))?;
            engine.run(&mut source).await?
        }
        None => {
            let mut source = JournalReader::new(tokio::io::BufReader::new(tokio::io::stdin()));
            engine.run(&mut source).await?
        }
    };

    info!(
        events = summary.events,
        dropped = summary.dropped,
        flushes = summary.flushes,
        height = engine.height(),
        "event stream ended"
    );
    Ok(())
}

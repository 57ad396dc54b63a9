//! edusync - educator registration sync job

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edusync::{
    clock::SystemClock,
    config::SyncConfig,
    dates::EXECUTION_DATE_KEY,
    job::{run_dry, run_job},
};
use edusync_common::logging::{init_logging, LogConfig, LogLevel};
use serde_json::{Map, Value};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "edusync")]
#[command(author, version, about = "Sync educator registrations from DynamoDB into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one extract-filter-load cycle
    Run {
        /// Day to sync (defaults to today); records updated the day before are loaded
        #[arg(short = 'd', long)]
        execution_date: Option<String>,

        /// Invocation payload as inline JSON or @path/to/event.json
        #[arg(short, long)]
        event: Option<String>,

        /// Render the inserts without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration with secrets masked
    Config,
}

fn load_event(event: Option<&str>) -> Result<Map<String, Value>> {
    let Some(event) = event else {
        return Ok(Map::new());
    };

    let text = match event.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path))?,
        None => event.to_string(),
    };

    match serde_json::from_str(&text).context("Event is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Event must be a JSON object, got {}", other),
    }
}

/// `.env` is loaded first so it feeds the `LOG_*` variables too.
fn load_log_config(verbose: bool) -> Result<LogConfig> {
    dotenvy::dotenv().ok();

    let mut log_config = LogConfig::from_env()?;
    if verbose {
        log_config.level = LogLevel::Debug;
    }
    Ok(log_config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = load_log_config(cli.verbose)?;
    let _log_guard = init_logging(&log_config)?;

    let config = SyncConfig::from_env()?;

    match cli.command {
        Command::Run {
            execution_date,
            event,
            dry_run,
        } => {
            let mut payload = load_event(event.as_deref())?;
            if let Some(date) = execution_date {
                payload.insert(EXECUTION_DATE_KEY.to_string(), Value::String(date));
            }
            let payload = Value::Object(payload);

            let summary = if dry_run {
                let (summary, executor) = run_dry(&config, &payload, &SystemClock).await?;
                info!(statements = executor.statements().len(), "Dry run complete");
                summary
            } else {
                run_job(&config, &payload, &SystemClock).await?
            };

            println!("{}", serde_json::to_string_pretty(&summary)?);
        },
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        },
    }

    Ok(())
}

//! TALLY: daily order fetch, revenue reconciliation and report dispatch.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! then either runs the daily pipeline once or prints the ledger summary.

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use tally::config::{AppConfig, DEFAULT_CONFIG_PATH};
use tally::engine::pipeline::{Pipeline, RunOutcome};
use tally::notify;
use tally::portal::http::PortalClient;
use tally::storage::ledger;

/// Fetch the day's orders, reconcile revenue and send the report.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "TALLY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily pipeline once (default).
    Run,
    /// Print the running ledger summary.
    Report {
        /// Read this ledger instead of the configured one.
        #[arg(short, long)]
        ledger: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cli.config).await,
        Command::Report { ledger } => report(&cli.config, ledger),
    }
}

async fn run(config_path: &str) -> Result<ExitCode> {
    let cfg = AppConfig::load(config_path)?;
    info!(
        config = config_path,
        accounts = cfg.accounts.len(),
        revenue = %cfg.revenue_mode(),
        "TALLY starting"
    );

    let portal = PortalClient::from_config(&cfg.portal);
    let (sink, destination) = notify::sink_from_config(&cfg)?;
    let pipeline = Pipeline::from_config(&cfg, Arc::new(portal), sink, destination)?;

    match pipeline.run().await {
        RunOutcome::Completed { delivered, .. } => {
            if !delivered {
                error!("Report was produced but not delivered");
            }
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Failed { error, .. } => {
            error!(error = %error, "TALLY run failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report(config_path: &str, ledger_override: Option<PathBuf>) -> Result<ExitCode> {
    let path = match ledger_override {
        Some(p) => p,
        None => AppConfig::load(config_path)?.ledger.path,
    };

    let contents = ledger::read_entries(&path)?;
    if contents.entries.is_empty() {
        println!("Ledger {} has no entries yet.", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let summary = ledger::summarize(&contents, Local::now().date_naive());
    println!("{}", ledger::render_summary(&summary));
    Ok(ExitCode::SUCCESS)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tally=info"));

    let json_logging = std::env::var("TALLY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

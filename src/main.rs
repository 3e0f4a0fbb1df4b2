use anyhow::Context;
use api_client::BinanceClient;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use configuration::settings::Config;
use configuration::{init_logging, load_config_from};
use core_types::{AccountId, EquityRecord, PositionRecord};
use database::{connect, AccountTables, DbError, DbRepository};
use engine::{AccountPoller, CycleReporter, Supervisor, TracingReporter};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The main entry point for the equity monitor.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Credentials usually live in .env; a missing file is fine when they are
    // exported directly.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::History(args) => handle_history(config, args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Periodically records the equity and net positions of exchange accounts.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every enabled account until interrupted.
    Run,
    /// Print the recorded equity curve and latest positions of one account.
    History(HistoryArgs),
}

#[derive(Parser)]
struct HistoryArgs {
    /// The account id as configured (e.g., "main").
    #[arg(long)]
    account: String,

    /// How many of the most recent equity rows to show.
    #[arg(long, default_value_t = 20)]
    limit: u32,
}

// ==============================================================================
// Run Command
// ==============================================================================

async fn handle_run(config: Config) -> anyhow::Result<()> {
    // Held until exit so buffered log lines reach the file.
    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    let pool = connect(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    let repo = DbRepository::new(pool);
    let reporter: Arc<dyn CycleReporter> = Arc::new(TracingReporter);

    // Every account is fully set up before the first poll, so a bad key or
    // schema problem stops startup instead of surfacing later.
    let mut pollers = Vec::new();
    for account in config.enabled_accounts() {
        let keys = account
            .credentials()
            .with_context(|| format!("Account '{}'", account.id))?;
        let client = BinanceClient::new(account, &keys)
            .with_context(|| format!("Account '{}': failed to build exchange client", account.id))?;

        let poller = AccountPoller::from_config(account, Arc::new(client), repo.clone(), reporter.clone());
        repo.ensure_schema(poller.tables())
            .await
            .with_context(|| format!("Account '{}': failed to create tables", account.id))?;

        tracing::info!(
            account = %account.id,
            market_type = %account.market_type,
            sandbox = account.sandbox,
            interval_secs = account.interval_secs,
            equity_table = poller.tables().equity_table(),
            positions_table = poller.tables().positions_table(),
            "Account ready."
        );
        pollers.push((poller, Duration::from_secs(account.interval_secs)));
    }

    let mut supervisor = Supervisor::new();
    for (poller, period) in pollers {
        supervisor.spawn(poller, period);
    }
    tracing::info!(accounts = supervisor.len(), "Monitor started.");

    supervisor.run_until(shutdown_signal()).await;
    tracing::info!("Monitor stopped.");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Ctrl-C received; shutting down."),
        _ = terminate => tracing::warn!("SIGTERM received; shutting down."),
    }
}

// ==============================================================================
// History Command
// ==============================================================================

async fn handle_history(config: Config, args: HistoryArgs) -> anyhow::Result<()> {
    let account = AccountId::parse(&args.account)?;
    if config.account(account.as_ref()).is_none() {
        println!("Note: '{}' is not in the current configuration.", account);
    }

    let pool = connect(&config.database.path, 1)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    let repo = DbRepository::new(pool);
    let tables = AccountTables::new(&account);

    let history = repo
        .get_equity_history(&tables, args.limit)
        .await
        .with_context(|| format!("No recorded data for account '{}'", account))?;

    if history.is_empty() {
        println!("No equity recorded yet for account '{}'.", account);
        return Ok(());
    }

    println!();
    println!("Equity history for '{}' (last {} rows)", account, history.len());
    println!("{}", equity_table(&history));

    match repo.get_latest_snapshot(&tables).await {
        Ok((equity, positions)) => {
            println!();
            println!("Net positions at {}", format_timestamp(equity.timestamp));
            if positions.is_empty() {
                println!("Flat.");
            } else {
                println!("{}", positions_table(&positions));
            }
        }
        Err(DbError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn equity_table(history: &[EquityRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Time (UTC)").add_attribute(Attribute::Bold),
            Cell::new("Equity").add_attribute(Attribute::Bold),
            Cell::new("Change").add_attribute(Attribute::Bold),
        ]);

    let mut previous: Option<Decimal> = None;
    for record in history {
        let change = previous
            .map(|p| signed((record.equity - p).round_dp(4)))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(format_timestamp(record.timestamp)),
            Cell::new(record.equity.round_dp(4)).set_alignment(CellAlignment::Right),
            Cell::new(change).set_alignment(CellAlignment::Right),
        ]);
        previous = Some(record.equity);
    }
    table
}

fn positions_table(positions: &[PositionRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Symbol").add_attribute(Attribute::Bold),
            Cell::new("Net contracts").add_attribute(Attribute::Bold),
        ]);
    for p in positions {
        table.add_row(vec![
            Cell::new(&p.symbol),
            Cell::new(p.net_contracts).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

fn signed(value: Decimal) -> String {
    if value.is_sign_negative() {
        value.to_string()
    } else {
        format!("+{}", value)
    }
}

fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

use clap::{Parser, Subcommand};
use engine::Engine;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Automated cryptocurrency trading platform. The main binary wires up
/// every component crate and exposes the three operations an operator
/// drives it with: run the live engine, force a reconciliation pass, or
/// sanity-check the environment before either.
#[derive(Parser)]
#[command(name = "aurion", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the Core Engine: brings up the database, message bus,
    /// exchange connector, Capital Manager, and Strategy Worker fleet, then
    /// runs until SIGINT/SIGTERM.
    Start,
    /// Runs a single State Reconciliation Engine pass and prints the
    /// resulting report.
    Reconcile,
    /// Loads configuration and runs production validation without
    /// connecting to anything.
    ValidateConfig,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match configuration::load_config(None) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&config.log_level);

    match cli.command {
        Commands::ValidateConfig => match config.validate() {
            Ok(()) => {
                println!("configuration is valid");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("configuration invalid: {e}");
                ExitCode::from(2)
            }
        },
        Commands::Start => run_start(config).await,
        Commands::Reconcile => run_reconcile(config).await,
    }
}

async fn run_start(config: configuration::AppConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("configuration invalid: {e}");
        return ExitCode::from(2);
    }

    let engine = match Engine::start(config).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("startup failed: {e}");
            return ExitCode::from(1);
        }
    };

    tracing::info!("engine running; waiting for shutdown");
    while engine.is_running() {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }

    tracing::info!("engine shut down cleanly");
    ExitCode::SUCCESS
}

/// Runs a single reconciliation pass without bringing up the message bus,
/// Capital Manager, or Strategy Worker fleet — `reconcile` only needs the
/// database and the exchange connector, not a running trading engine.
async fn run_reconcile(config: configuration::AppConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("configuration invalid: {e}");
        return ExitCode::from(2);
    }

    let pool = match database::connect().await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("database connection failed: {e}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = database::run_migrations(&pool).await {
        eprintln!("database migration failed: {e}");
        return ExitCode::from(1);
    }
    let db = database::DbRepository::new(pool);

    let connector: std::sync::Arc<dyn api_client::ExchangeConnector> =
        std::sync::Arc::new(api_client::BinanceConnector::new(&config.exchange, None));
    if let Err(e) = connector.connect().await {
        eprintln!("exchange connector failed: {e}");
        return ExitCode::from(1);
    }

    let (ws_tx, _ws_rx) = tokio::sync::broadcast::channel(16);
    let reconciler = engine::reconciler::StateReconciliationEngine::new(db, connector.clone(), ws_tx);
    let outcome = reconciler.run_once().await;
    connector.disconnect().await;

    match outcome {
        Ok(report) => {
            println!(
                "reconciliation session {} completed with status {:?}: {} discrepancies",
                report.session_id,
                report.status,
                report.discrepancies.len()
            );
            for discrepancy in &report.discrepancies {
                println!("  [{:?}] {:?}: {}", discrepancy.severity, discrepancy.kind, discrepancy.description);
            }
            if report.count(engine::reconciler::Severity::Critical) > 0 {
                ExitCode::from(3)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("reconciliation failed: {e}");
            ExitCode::from(1)
        }
    }
}

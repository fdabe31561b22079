//! Ledger event listener.
//!
//! Mirrors contract events into `blockchain_logs`, either continuously or as a
//! single pass.

use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::watch;
use tracing::{error, info};

use central_stores::{
    config,
    db,
    ledger::{HttpLedgerClient, LedgerClient},
    services::reconciliation::{PollOutcome, ReconciliationEngine},
};

#[derive(Parser, Debug)]
#[command(
    name = "event-listener",
    about = "Reconciles ledger contract events into the database",
    version
)]
struct Cli {
    /// Seconds between polls; defaults to listener.poll_interval_secs
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    interval: Option<u64>,

    /// Run a single reconciliation pass and exit
    #[arg(long, action = ArgAction::SetTrue)]
    once: bool,

    /// Start the single pass at this block instead of the stored watermark
    #[arg(long)]
    from_block: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("event listener failed: {:#}", e);
            eprintln!("event-listener: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cfg = config::load_config().context("failed to load application config")?;
    config::init_tracing(cfg.log_level(), cli.json || cfg.log_json);

    if cfg.ledger.contract_address.is_none() {
        bail!("ledger.contract_address is not configured");
    }
    let client = HttpLedgerClient::new(&cfg.ledger).context("failed to load contract ABI")?;
    let ledger: Arc<dyn LedgerClient> = Arc::new(client);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }

    let engine = ReconciliationEngine::new(
        Arc::new(pool),
        ledger,
        cfg.ledger.request_timeout(),
        cfg.listener.max_block_span,
    );

    if cli.once || cli.from_block.is_some() {
        let outcome = engine.process_now(cli.from_block).await;
        report(&outcome, cli.json)?;
        return Ok(if outcome.is_failure() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let interval = cli
        .interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| cfg.poll_interval());

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("stop requested; finishing current cycle");
        let _ = stop_tx.send(true);
    });

    engine
        .run_forever(interval, stop_rx)
        .await
        .context("listener loop failed")?;
    Ok(ExitCode::SUCCESS)
}

fn report(outcome: &PollOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    match outcome {
        PollOutcome::Completed(summary) => println!(
            "reconciled blocks {}..={}: {} fetched, {} new, {} already logged",
            summary.from_block, summary.to_block, summary.fetched, summary.inserted, summary.duplicates
        ),
        PollOutcome::UpToDate { latest_block } => {
            println!("up to date at block {}", latest_block)
        }
        PollOutcome::Failed {
            reason,
            reconciled_through,
        } => match reconciled_through {
            Some(block) => println!("failed after block {}: {}", block, reason),
            None => println!("failed: {}", reason),
        },
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc, sync::watch};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::{error, info, warn};

use central_stores as api;
use api::ledger::{HttpLedgerClient, LedgerClient};
use api::notifications::DbNotifier;

/// How often overdue approvals and low stock are swept
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let ledger_client: Arc<dyn LedgerClient> = match HttpLedgerClient::new(&cfg.ledger) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "ledger contract unavailable; continuing without ledger writes");
            Arc::new(
                HttpLedgerClient::unconfigured(&cfg.ledger)
                    .context("failed to build ledger client")?,
            )
        }
    };

    let app_state = api::AppState::build(
        db_arc.clone(),
        cfg.clone(),
        event_sender,
        ledger_client,
        Arc::new(DbNotifier::new(db_arc.clone())),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let housekeeping = tokio::spawn(housekeeping(app_state.clone(), stop_rx));

    let cors_layer = if cfg.is_production() {
        CorsLayer::new()
    } else {
        info!("Using permissive CORS outside production");
        CorsLayer::permissive()
    };

    let app = api::app_router(app_state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("central-stores listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = stop_tx.send(true);
    if let Err(e) = housekeeping.await {
        warn!(error = %e, "housekeeping task ended abnormally");
    }
    info!("central-stores stopped");
    Ok(())
}

/// Periodic approval reminders, low-stock alerts and notification cleanup.
async fn housekeeping(state: api::AppState, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(HOUSEKEEPING_INTERVAL) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }

        match state
            .workflow
            .send_approval_reminders(chrono::Utc::now())
            .await
        {
            Ok(count) if count > 0 => info!(count, "approval reminders sent"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "approval reminder sweep failed"),
        }
        if let Err(e) = state.stock.check_low_stock().await {
            warn!(error = %e, "low stock sweep failed");
        }
        if let Err(e) = state
            .notifications
            .cleanup_old_notifications(chrono::Utc::now())
            .await
        {
            warn!(error = %e, "notification cleanup failed");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
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
    info!("shutdown signal received");
}

//! Central stores backend.
//!
//! Inventory and procurement service built around a multi-stage approval
//! workflow for department requests and a reconciler that mirrors the
//! on-chain audit log into the database.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::ledger::{LedgerClient, LedgerEmitter};
use crate::notifications::{NotificationDispatcher, Notifier};
use crate::services::{
    reconciliation::ReconciliationEngine, stock::StockService, users::UserService,
    workflow::ApprovalWorkflow,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub users: UserService,
    pub workflow: ApprovalWorkflow,
    pub stock: StockService,
    pub reconciliation: ReconciliationEngine,
    pub notifications: NotificationDispatcher,
}

impl AppState {
    /// Wires every service around one connection, ledger client and notifier.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        ledger_client: Arc<dyn LedgerClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let emitter = LedgerEmitter::new(ledger_client.clone(), config.ledger.submit_timeout());
        let notifications = NotificationDispatcher::new(db.clone(), notifier);

        let workflow = ApprovalWorkflow::new(
            db.clone(),
            event_sender.clone(),
            emitter.clone(),
            notifications.clone(),
            config.workflow.clone(),
        );
        let stock = StockService::new(
            db.clone(),
            event_sender.clone(),
            emitter,
            notifications.clone(),
        );
        let reconciliation = ReconciliationEngine::new(
            db.clone(),
            ledger_client,
            config.ledger.request_timeout(),
            config.listener.max_block_span,
        )
        .with_event_sender(event_sender.clone());

        Self {
            users: UserService::new(db.clone()),
            db,
            config,
            event_sender,
            workflow,
            stock,
            reconciliation,
            notifications,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    pub(crate) fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    /// A successful response that carries only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .merge(handlers::requests::request_routes())
        .merge(handlers::approvals::approval_routes())
        .merge(handlers::stocks::stock_routes())
        .merge(handlers::blockchain::blockchain_routes())
        .merge(handlers::users::user_routes())
}

/// Full application router with request ids and HTTP tracing applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "central-stores up" }))
        .nest("/api/v1", api_v1_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };
    let ledger_configured = state.config.ledger.contract_address.is_some();

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
            "ledger_contract": if ledger_configured { "configured" } else { "not_configured" },
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

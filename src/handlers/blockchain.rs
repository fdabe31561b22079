use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use super::Actor;
use crate::entities::user::Role;
use crate::errors::ServiceError;
use crate::services::reconciliation::{BlockchainStatus, PollOutcome};
use crate::{ApiResponse, ApiResult, AppState};

pub fn blockchain_routes() -> Router<AppState> {
    Router::new()
        .route("/blockchain/status", get(status))
        .route("/blockchain/process-events", post(process_events))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessEventsBody {
    pub from_block: Option<u64>,
}

pub async fn status(
    State(state): State<AppState>,
    Actor(_actor): Actor,
) -> ApiResult<BlockchainStatus> {
    Ok(Json(ApiResponse::success(
        state.reconciliation.status().await?,
    )))
}

/// Runs one reconciliation pass now. Admin only.
///
/// A failed pass is reported in the body, not as an HTTP error.
pub async fn process_events(
    State(state): State<AppState>,
    Actor(actor): Actor,
    body: Option<Json<ProcessEventsBody>>,
) -> ApiResult<PollOutcome> {
    if !actor.has_role(Role::Admin) {
        return Err(ServiceError::Forbidden(
            "Only admins can trigger ledger reconciliation".to_string(),
        ));
    }
    let from_block = body.and_then(|Json(b)| b.from_block);
    let outcome = state.reconciliation.process_now(from_block).await;
    if outcome.is_failure() {
        warn!(?outcome, "manual reconciliation pass failed");
    }
    Ok(Json(ApiResponse::success(outcome)))
}

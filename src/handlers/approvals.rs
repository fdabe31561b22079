use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::Actor;
use crate::services::workflow::{PendingApproval, PendingFilter};
use crate::{ApiResponse, ApiResult, AppState};

pub fn approval_routes() -> Router<AppState> {
    Router::new().route("/approvals/pending", get(pending_approvals))
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingQuery {
    /// Overrides the configured pending filter for this call
    pub filter: Option<PendingFilter>,
}

/// Stages waiting on the caller's role
pub async fn pending_approvals(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Vec<PendingApproval>> {
    let pending = match query.filter {
        Some(filter) => state.workflow.get_pending_for(&actor, filter).await?,
        None => state.workflow.pending_for(&actor).await?,
    };
    Ok(Json(ApiResponse::success(pending)))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use super::Actor;
use crate::entities::approval_history;
use crate::services::workflow::{
    DecisionInput, NewRequest, RequestDetails, RequestFilter, RequestUpdate, RequestView,
    StageView,
};
use crate::{ApiResponse, ApiResult, AppState};

pub fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route(
            "/requests/:id",
            get(get_request).put(update_request).delete(delete_request),
        )
        .route("/requests/:id/approvals", get(get_approvals))
        .route("/requests/:id/history", get(get_history))
        .route(
            "/requests/:id/stages/:stage_id/decision",
            post(decide_stage),
        )
}

/// File a new department request
pub async fn create_request(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<NewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RequestDetails>>), crate::errors::ServiceError> {
    let details = state.workflow.create_request(&actor, payload).await?;
    info!(request = %details.request.display_id, "request filed via API");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(filter): Query<RequestFilter>,
) -> ApiResult<Vec<RequestView>> {
    let requests = state.workflow.list_requests(&actor, filter).await?;
    Ok(Json(ApiResponse::success(requests)))
}

pub async fn get_request(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestDetails> {
    let details = state.workflow.request_details(&actor, id).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn delete_request(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.workflow.delete_request(&actor, id).await?;
    Ok(Json(ApiResponse::message("Request deleted")))
}

/// Edit a request that no approver has decided on yet
pub async fn update_request(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequestUpdate>,
) -> ApiResult<RequestDetails> {
    let details = state.workflow.update_request(&actor, id, payload).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Approval stages of a request in pipeline order
pub async fn get_approvals(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<StageView>> {
    let details = state.workflow.request_details(&actor, id).await?;
    Ok(Json(ApiResponse::success(details.approvals)))
}

pub async fn get_history(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<approval_history::Model>> {
    let history = state.workflow.approval_history(&actor, id).await?;
    Ok(Json(ApiResponse::success(history)))
}

/// Approve or reject one stage
pub async fn decide_stage(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((id, stage_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<DecisionInput>,
) -> ApiResult<RequestDetails> {
    let details = state.workflow.decide(id, stage_id, &actor, payload).await?;
    Ok(Json(ApiResponse::success(details)))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::Actor;
use crate::entities::user::{self, Role};
use crate::errors::ServiceError;
use crate::services::users::{NewUser, UserUpdate};
use crate::{ApiResponse, ApiResult, AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/me", get(me))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
}

fn require_admin(actor: &user::Model, action: &str) -> Result<(), ServiceError> {
    if actor.has_role(Role::Admin) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!("Only admins can {}", action)))
    }
}

/// Admins register users
pub async fn create_user(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<ApiResponse<user::Model>>), ServiceError> {
    require_admin(&actor, "create users")?;
    let created = state.users.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn me(Actor(actor): Actor) -> ApiResult<user::Model> {
    Ok(Json(ApiResponse::success(actor)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Actor(_actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<user::Model> {
    let found = state
        .users
        .get_user(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))?;
    Ok(Json(ApiResponse::success(found)))
}

pub async fn list_users(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> ApiResult<Vec<user::Model>> {
    require_admin(&actor, "list users")?;
    Ok(Json(ApiResponse::success(state.users.list_users().await?)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdate>,
) -> ApiResult<user::Model> {
    require_admin(&actor, "update users")?;
    Ok(Json(ApiResponse::success(
        state.users.update_user(id, payload).await?,
    )))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    require_admin(&actor, "delete users")?;
    state.users.delete_user(id).await?;
    Ok(Json(ApiResponse::message("User deleted")))
}

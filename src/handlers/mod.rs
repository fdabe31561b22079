//! REST surface.
//!
//! Every route resolves its caller from the `x-user-id` header through the
//! [`Actor`] extractor; role checks live in the services.

pub mod approvals;
pub mod blockchain;
pub mod requests;
pub mod stocks;
pub mod users;

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::entities::user;
use crate::errors::ServiceError;
use crate::tracing::USER_ID_HEADER;
use crate::AppState;

/// The active user making the request.
#[derive(Debug, Clone)]
pub struct Actor(pub user::Model);

#[axum::async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthenticated("missing x-user-id header".to_string()))?;
        let user_id = Uuid::parse_str(raw.trim())
            .map_err(|_| ServiceError::Unauthenticated("malformed x-user-id header".to_string()))?;

        state.users.get_active_user(user_id).await.map(Actor)
    }
}

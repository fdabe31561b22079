use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use super::Actor;
use crate::entities::{category, stock_movement};
use crate::errors::ServiceError;
use crate::services::stock::{
    DamageReportView, DeliveryView, NewDamageReport, NewDelivery, NewRelocation, NewStock,
    QuantityUpdate, RelocationView, StockFilter, StockView,
};
use crate::{ApiResponse, ApiResult, AppState};

type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), ServiceError>;

fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/stocks", post(create_stock).get(list_stocks))
        .route("/stocks/low-stock", get(low_stock))
        .route("/stocks/categories", get(list_categories))
        .route("/stocks/:id", get(get_stock).delete(delete_stock))
        .route("/stocks/:id/quantity", put(set_quantity))
        .route("/stocks/:id/movements", get(list_movements))
        .route("/damage-reports", post(report_damage))
        .route("/relocations", post(relocate))
        .route("/deliveries", post(create_delivery))
        .route("/deliveries/:id/receive", post(receive_delivery))
}

pub async fn create_stock(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<NewStock>,
) -> Created<StockView> {
    created(state.stock.create_stock(&actor, payload).await?)
}

/// `?category=&location=`
pub async fn list_stocks(
    State(state): State<AppState>,
    Actor(_actor): Actor,
    Query(filter): Query<StockFilter>,
) -> ApiResult<Vec<StockView>> {
    Ok(Json(ApiResponse::success(state.stock.list_stocks(filter).await?)))
}

pub async fn list_categories(
    State(state): State<AppState>,
    Actor(_actor): Actor,
) -> ApiResult<Vec<category::Model>> {
    Ok(Json(ApiResponse::success(state.stock.categories().await?)))
}

pub async fn delete_stock(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.stock.delete_stock(&actor, id).await?;
    Ok(Json(ApiResponse::message("Stock item deleted")))
}

pub async fn get_stock(
    State(state): State<AppState>,
    Actor(_actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<StockView> {
    Ok(Json(ApiResponse::success(state.stock.get_stock(id).await?)))
}

pub async fn set_quantity(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuantityUpdate>,
) -> ApiResult<StockView> {
    let stock = state.stock.set_quantity(&actor, id, payload).await?;
    Ok(Json(ApiResponse::success(stock)))
}

/// Movements of one stock item, newest first
pub async fn list_movements(
    State(state): State<AppState>,
    Actor(_actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<stock_movement::Model>> {
    Ok(Json(ApiResponse::success(
        state.stock.list_movements(id).await?,
    )))
}

pub async fn low_stock(
    State(state): State<AppState>,
    Actor(_actor): Actor,
) -> ApiResult<Vec<StockView>> {
    Ok(Json(ApiResponse::success(state.stock.low_stock_items().await?)))
}

pub async fn report_damage(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<NewDamageReport>,
) -> Created<DamageReportView> {
    created(state.stock.record_damage(&actor, payload).await?)
}

pub async fn relocate(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<NewRelocation>,
) -> Created<RelocationView> {
    created(state.stock.relocate(&actor, payload).await?)
}

pub async fn create_delivery(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<NewDelivery>,
) -> Created<DeliveryView> {
    created(state.stock.create_delivery(&actor, payload).await?)
}

pub async fn receive_delivery(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<DeliveryView> {
    let delivery = state.stock.receive_delivery(&actor, id).await?;
    Ok(Json(ApiResponse::success(delivery)))
}

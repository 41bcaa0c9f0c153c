//! Order handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::{Action, Order, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::services::order::{
    ConfirmationResult, CreateOrderInput, OrderDetail, OrderFilter, StatusInput,
};
use crate::services::OrderService;
use crate::AppState;

fn order_service(state: &AppState) -> OrderService {
    OrderService::new(state.db.clone(), state.clock.clone())
}

pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<Vec<Order>>> {
    user.require(Resource::Order, Action::View)?;
    Ok(Json(order_service(&state).list_orders(&filter).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    user.require(Resource::Order, Action::View)?;
    Ok(Json(order_service(&state).get_order(order_id).await?))
}

pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<OrderDetail>)> {
    user.require(Resource::Order, Action::Create)?;
    let order = order_service(&state)
        .create_order(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Deduct stock for every line and mark the order confirmed
pub async fn confirm_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ConfirmationResult>> {
    user.require(Resource::Order, Action::Edit)?;
    let result = order_service(&state)
        .confirm(&actor(&user, ip), order_id)
        .await?;
    Ok(Json(result))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(order_id): Path<Uuid>,
    Json(input): Json<StatusInput>,
) -> AppResult<Json<Order>> {
    user.require(Resource::Order, Action::Edit)?;
    let order = order_service(&state)
        .update_status(&actor(&user, ip), order_id, input.status)
        .await?;
    Ok(Json(order))
}

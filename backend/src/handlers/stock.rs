//! Stock item, ledger, transfer and forecast handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::{Action, Resource, StockTransaction};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::models::StockItemDetail;
use crate::services::stock::{
    CreateStockItemInput, ItemForecast, ReconciliationReport, StockFilter, TransactionInput,
    TransferInput, TransferResult, UpdateStockItemInput,
};
use crate::services::StockService;
use crate::AppState;

fn stock_service(state: &AppState) -> StockService {
    StockService::new(state.db.clone(), state.clock.clone())
}

pub async fn list_stock_items(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<StockFilter>,
) -> AppResult<Json<Vec<StockItemDetail>>> {
    user.require(Resource::Stock, Action::View)?;
    Ok(Json(stock_service(&state).list_items(&filter).await?))
}

pub async fn get_stock_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<StockItemDetail>> {
    user.require(Resource::Stock, Action::View)?;
    Ok(Json(stock_service(&state).get_item(stock_item_id).await?))
}

pub async fn create_stock_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateStockItemInput>,
) -> AppResult<(StatusCode, Json<StockItemDetail>)> {
    user.require(Resource::Stock, Action::Create)?;
    let item = stock_service(&state)
        .create_item(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_stock_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(stock_item_id): Path<Uuid>,
    Json(input): Json<UpdateStockItemInput>,
) -> AppResult<Json<StockItemDetail>> {
    user.require(Resource::Stock, Action::Edit)?;
    let item = stock_service(&state)
        .update_item(&actor(&user, ip), stock_item_id, input)
        .await?;
    Ok(Json(item))
}

/// Book an in/out/adjustment against one stock item
pub async fn apply_stock_transaction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(stock_item_id): Path<Uuid>,
    Json(input): Json<TransactionInput>,
) -> AppResult<(StatusCode, Json<StockTransaction>)> {
    user.require(Resource::Stock, Action::Create)?;
    let transaction = stock_service(&state)
        .apply_transaction(&actor(&user, ip), stock_item_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn list_stock_transactions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockTransaction>>> {
    user.require(Resource::Stock, Action::View)?;
    Ok(Json(stock_service(&state).list_transactions(stock_item_id).await?))
}

pub async fn transfer_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<TransferInput>,
) -> AppResult<(StatusCode, Json<TransferResult>)> {
    user.require(Resource::Stock, Action::Create)?;
    let result = stock_service(&state)
        .transfer_stock(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn reconcile_stock_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<ReconciliationReport>> {
    user.require(Resource::Stock, Action::View)?;
    Ok(Json(stock_service(&state).reconcile(stock_item_id).await?))
}

pub async fn forecast_stock_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<ItemForecast>> {
    user.require(Resource::Stock, Action::Edit)?;
    let forecast = stock_service(&state)
        .forecast_item(stock_item_id, state.config.alerts.usage_lookback_days)
        .await?;
    Ok(Json(forecast))
}

/// Refresh the usage forecast of every stock item
pub async fn forecast_all_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ItemForecast>>> {
    user.require(Resource::Stock, Action::Edit)?;
    let forecasts = stock_service(&state)
        .forecast_all(state.config.alerts.usage_lookback_days)
        .await?;
    Ok(Json(forecasts))
}

//! Warehouse handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::models::{Action, Resource, Warehouse};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::services::warehouse::{CreateWarehouseInput, UpdateWarehouseInput, WarehouseWithSummary};
use crate::services::WarehouseService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WarehouseQuery {
    #[serde(default)]
    pub active_only: bool,
}

fn warehouse_service(state: &AppState) -> WarehouseService {
    WarehouseService::new(state.db.clone(), state.clock.clone())
}

pub async fn list_warehouses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<WarehouseQuery>,
) -> AppResult<Json<Vec<Warehouse>>> {
    user.require(Resource::Warehouse, Action::View)?;
    let warehouses = warehouse_service(&state)
        .list_warehouses(query.active_only)
        .await?;
    Ok(Json(warehouses))
}

/// Warehouse with its stock summary
pub async fn get_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(warehouse_id): Path<Uuid>,
) -> AppResult<Json<WarehouseWithSummary>> {
    user.require(Resource::Warehouse, Action::View)?;
    Ok(Json(warehouse_service(&state).summary(warehouse_id).await?))
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateWarehouseInput>,
) -> AppResult<(StatusCode, Json<Warehouse>)> {
    user.require(Resource::Warehouse, Action::Create)?;
    let warehouse = warehouse_service(&state)
        .create_warehouse(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(warehouse)))
}

pub async fn update_warehouse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(warehouse_id): Path<Uuid>,
    Json(input): Json<UpdateWarehouseInput>,
) -> AppResult<Json<Warehouse>> {
    user.require(Resource::Warehouse, Action::Edit)?;
    let warehouse = warehouse_service(&state)
        .update_warehouse(&actor(&user, ip), warehouse_id, input)
        .await?;
    Ok(Json(warehouse))
}

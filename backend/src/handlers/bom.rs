//! Bill of materials handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::models::{Action, Bom, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::services::bom::{
    BomDetail, ComponentInput, CostEstimate, CreateBomInput, EstimateLineInput, UpdateBomInput,
};
use crate::services::BomService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BomQuery {
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CostEstimateRequest {
    pub lines: Vec<EstimateLineInput>,
}

fn bom_service(state: &AppState) -> BomService {
    BomService::new(state.db.clone(), state.clock.clone())
}

pub async fn list_boms(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<BomQuery>,
) -> AppResult<Json<Vec<Bom>>> {
    user.require(Resource::Bom, Action::View)?;
    let boms = bom_service(&state)
        .list_boms(query.product_id, query.active_only)
        .await?;
    Ok(Json(boms))
}

/// BOM with its components and cost rollup
pub async fn get_bom(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(bom_id): Path<Uuid>,
) -> AppResult<Json<BomDetail>> {
    user.require(Resource::Bom, Action::View)?;
    Ok(Json(bom_service(&state).get_bom(bom_id).await?))
}

pub async fn create_bom(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateBomInput>,
) -> AppResult<(StatusCode, Json<BomDetail>)> {
    user.require(Resource::Bom, Action::Create)?;
    let bom = bom_service(&state).create_bom(&actor(&user, ip), input).await?;
    Ok((StatusCode::CREATED, Json(bom)))
}

pub async fn update_bom(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(bom_id): Path<Uuid>,
    Json(input): Json<UpdateBomInput>,
) -> AppResult<Json<BomDetail>> {
    user.require(Resource::Bom, Action::Edit)?;
    let bom = bom_service(&state)
        .update_bom(&actor(&user, ip), bom_id, input)
        .await?;
    Ok(Json(bom))
}

pub async fn add_bom_component(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(bom_id): Path<Uuid>,
    Json(input): Json<ComponentInput>,
) -> AppResult<Json<BomDetail>> {
    user.require(Resource::Bom, Action::Edit)?;
    let bom = bom_service(&state)
        .add_component(&actor(&user, ip), bom_id, input)
        .await?;
    Ok(Json(bom))
}

pub async fn remove_bom_component(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path((bom_id, component_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<BomDetail>> {
    user.require(Resource::Bom, Action::Edit)?;
    let bom = bom_service(&state)
        .remove_component(&actor(&user, ip), bom_id, component_id)
        .await?;
    Ok(Json(bom))
}

/// Make this BOM the only active one for its product
pub async fn activate_bom(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(bom_id): Path<Uuid>,
) -> AppResult<Json<BomDetail>> {
    user.require(Resource::Bom, Action::Edit)?;
    let bom = bom_service(&state).activate(&actor(&user, ip), bom_id).await?;
    Ok(Json(bom))
}

/// Material cost of a draft composition at current catalog prices
pub async fn estimate_bom_cost(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CostEstimateRequest>,
) -> AppResult<Json<CostEstimate>> {
    user.require(Resource::Bom, Action::View)?;
    Ok(Json(bom_service(&state).cost_estimate(&request.lines).await?))
}

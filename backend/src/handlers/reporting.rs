//! Reporting handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use shared::models::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::StockItemDetail;
use crate::services::reporting::{
    BomCostLine, DashboardMetrics, LedgerReportFilter, LowStockLine, ProcurementAgingLine,
    ReportingService, StockLedgerReport, WarehouseStatus,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BomCostQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub within_days: Option<i64>,
}

fn reporting_service(state: &AppState) -> ReportingService {
    ReportingService::new(state.db.clone(), state.clock.clone())
}

/// Get dashboard metrics
pub async fn get_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<DashboardMetrics>> {
    user.require(Resource::Report, Action::View)?;
    Ok(Json(reporting_service(&state).dashboard().await?))
}

pub async fn get_low_stock_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<Vec<LowStockLine>>> {
    user.require(Resource::Report, Action::View)?;
    Ok(Json(reporting_service(&state).low_stock(query.warehouse_id).await?))
}

pub async fn get_stock_ledger_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<LedgerReportFilter>,
) -> AppResult<Json<StockLedgerReport>> {
    user.require(Resource::Report, Action::View)?;
    Ok(Json(reporting_service(&state).stock_ledger(&filter).await?))
}

pub async fn get_bom_cost_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<BomCostQuery>,
) -> AppResult<Json<Vec<BomCostLine>>> {
    user.require(Resource::Report, Action::View)?;
    let lines = reporting_service(&state)
        .bom_cost_analysis(query.active_only)
        .await?;
    Ok(Json(lines))
}

pub async fn get_warehouse_status_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<WarehouseStatus>>> {
    user.require(Resource::Report, Action::View)?;
    Ok(Json(reporting_service(&state).warehouse_status().await?))
}

pub async fn get_procurement_aging_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ProcurementAgingLine>>> {
    user.require(Resource::Report, Action::View)?;
    Ok(Json(reporting_service(&state).procurement_aging().await?))
}

/// Batches expiring within the window; defaults to the configured near-expiry days
pub async fn get_expiring_stock_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<StockItemDetail>>> {
    user.require(Resource::Report, Action::View)?;
    let within_days = query
        .within_days
        .unwrap_or(state.config.alerts.near_expiry_days);
    Ok(Json(reporting_service(&state).expiring_stock(within_days).await?))
}

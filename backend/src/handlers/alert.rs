//! Reorder alert handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{Action, AlertRecipient, AlertStatus, ReorderAlert, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::services::alert::{AlertCheck, AlertRunSummary, AlertTransitionInput};
use crate::services::AlertService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub status: Option<AlertStatus>,
}

#[derive(Debug, Serialize)]
pub struct AlertSentResponse {
    pub stock_item_id: Uuid,
    pub last_alert_sent: DateTime<Utc>,
}

fn alert_service(state: &AppState) -> AlertService {
    AlertService::new(
        state.db.clone(),
        state.clock.clone(),
        &state.config.alerts,
        state.notifier.clone(),
    )
}

/// Sweep all low-stock items and notify those past their cooldown
pub async fn run_reorder_alerts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
) -> AppResult<Json<AlertRunSummary>> {
    user.require(Resource::Alert, Action::Create)?;
    let summary = alert_service(&state)
        .run_reorder_alerts(&actor(&user, ip))
        .await?;
    Ok(Json(summary))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AlertQuery>,
) -> AppResult<Json<Vec<ReorderAlert>>> {
    user.require(Resource::Alert, Action::View)?;
    Ok(Json(alert_service(&state).list_alerts(query.status).await?))
}

pub async fn get_alert(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(alert_id): Path<Uuid>,
) -> AppResult<Json<ReorderAlert>> {
    user.require(Resource::Alert, Action::View)?;
    Ok(Json(alert_service(&state).get_alert(alert_id).await?))
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(alert_id): Path<Uuid>,
    Json(input): Json<AlertTransitionInput>,
) -> AppResult<Json<ReorderAlert>> {
    user.require(Resource::Alert, Action::Edit)?;
    let alert = alert_service(&state)
        .resolve(&actor(&user, ip), alert_id, input)
        .await?;
    Ok(Json(alert))
}

pub async fn cancel_alert(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(alert_id): Path<Uuid>,
    Json(input): Json<AlertTransitionInput>,
) -> AppResult<Json<ReorderAlert>> {
    user.require(Resource::Alert, Action::Edit)?;
    let alert = alert_service(&state)
        .cancel(&actor(&user, ip), alert_id, input)
        .await?;
    Ok(Json(alert))
}

/// Whether a stock item would alert now, and when its cooldown ends
pub async fn check_stock_alert(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<AlertCheck>> {
    user.require(Resource::Alert, Action::View)?;
    Ok(Json(alert_service(&state).check_item(stock_item_id).await?))
}

pub async fn mark_stock_alert_sent(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<AlertSentResponse>> {
    user.require(Resource::Alert, Action::Edit)?;
    let last_alert_sent = alert_service(&state).mark_sent(stock_item_id).await?;
    Ok(Json(AlertSentResponse {
        stock_item_id,
        last_alert_sent,
    }))
}

pub async fn list_alert_recipients(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stock_item_id): Path<Uuid>,
) -> AppResult<Json<Vec<AlertRecipient>>> {
    user.require(Resource::Alert, Action::View)?;
    Ok(Json(alert_service(&state).recipients(stock_item_id).await?))
}

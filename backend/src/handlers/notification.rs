//! HTTP handlers for the in-app notification inbox

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::notification::{InAppNotification, NotificationService};
use crate::AppState;

/// Query parameters for listing notifications
#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// Notifications addressed to the current user
pub async fn get_notifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<Vec<InAppNotification>>> {
    let service = NotificationService::new(state.db);
    let notifications = service
        .list_for_user(current_user.0.user_id, query.unread_only)
        .await?;
    Ok(Json(notifications))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(notification_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = NotificationService::new(state.db);
    service
        .mark_read(current_user.0.user_id, notification_id, state.clock.now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

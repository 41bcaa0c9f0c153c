//! User administration, role and audit log handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::{Action, AuditLog, Resource, Role, User};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::services::audit::AuditLogFilter;
use crate::services::user::{CreateUserInput, PasswordReset, UpdateUserInput, UserProfile};
use crate::services::{AuditService, UserService};
use crate::AppState;

fn user_service(state: &AppState) -> UserService {
    UserService::new(state.db.clone(), state.clock.clone())
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    user.require(Resource::User, Action::View)?;
    Ok(Json(user_service(&state).list_users().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserProfile>> {
    user.require(Resource::User, Action::View)?;
    Ok(Json(user_service(&state).get_profile(user_id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Json(input): Json<CreateUserInput>,
) -> AppResult<(StatusCode, Json<User>)> {
    user.require(Resource::User, Action::Create)?;
    let created = user_service(&state)
        .create_user(&actor(&user, ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<Json<User>> {
    user.require(Resource::User, Action::Edit)?;
    let updated = user_service(&state)
        .update_user(&actor(&user, ip), user_id, input)
        .await?;
    Ok(Json(updated))
}

/// Flip a user's active flag
pub async fn toggle_user_active(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    user.require(Resource::User, Action::Edit)?;
    let updated = user_service(&state)
        .toggle_active(&actor(&user, ip), user_id)
        .await?;
    Ok(Json(updated))
}

/// Generate a new password; it is returned once and never stored in clear
pub async fn reset_user_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<PasswordReset>> {
    user.require(Resource::User, Action::Edit)?;
    let reset = user_service(&state)
        .reset_password(&actor(&user, ip), user_id)
        .await?;
    Ok(Json(reset))
}

pub async fn list_roles(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Role>>> {
    user.require(Resource::User, Action::View)?;
    Ok(Json(user_service(&state).list_roles().await?))
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<AuditLogFilter>,
) -> AppResult<Json<Vec<AuditLog>>> {
    user.require(Resource::AuditLog, Action::View)?;
    let service = AuditService::new(state.db.clone());
    Ok(Json(service.list(&filter).await?))
}

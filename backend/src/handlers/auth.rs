//! Authentication handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::actor;
use crate::middleware::{ClientIp, CurrentUser};
use crate::services::auth::AuthTokens;
use crate::services::user::UserProfile;
use crate::services::{AuthService, UserService};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(state.db.clone(), state.clock.clone(), &state.config)
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthTokens>> {
    let tokens = auth_service(&state)
        .login(body.username.trim(), &body.password, ip)
        .await?;
    Ok(Json(tokens))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<AuthTokens>> {
    let tokens = auth_service(&state).refresh_token(&body.refresh_token).await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ip: ClientIp,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<StatusCode> {
    let refresh_token = body.and_then(|Json(body)| body.refresh_token);
    auth_service(&state)
        .logout(&actor(&user, ip), refresh_token.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Profile of the authenticated user
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<UserProfile>> {
    let service = UserService::new(state.db.clone(), state.clock.clone());
    Ok(Json(service.get_profile(user.user_id).await?))
}

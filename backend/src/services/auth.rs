//! Authentication service for login, logout and token management

use std::sync::Arc;

use bcrypt::verify;
use chrono::Duration;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::clock::Clock;
use shared::models::{permission_codes, AuditAction, RoleName};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::audit::{Actor, AuditEntry, AuditService};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    clock: Arc<dyn Clock>,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub username: String,
    pub role: Option<String>,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Login view of a user
#[derive(Debug, FromRow)]
struct LoginRow {
    id: Uuid,
    username: String,
    password_hash: String,
    is_active: bool,
    role: Option<String>,
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            db,
            clock,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Authenticate user with username and password
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip_address: Option<String>,
    ) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, LoginRow>(
            r#"
            SELECT u.id, u.username, u.password_hash, u.is_active, r.name AS role
            FROM users u
            LEFT JOIN roles r ON r.id = u.role_id
            WHERE u.username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            tracing::warn!(username = %username, "failed login attempt");
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AppError::AccountDisabled);
        }

        let now = self.clock.now();
        let actor = Actor::new(user.id, ip_address);
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET last_login_at = $2, last_login_ip = $3 WHERE id = $1")
            .bind(user.id)
            .bind(now)
            .bind(&actor.ip_address)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut tx,
            &actor,
            AuditEntry::new(AuditAction::Login, "User").object(user.id, user.username.clone()),
            now,
        )
        .await?;

        let tokens = self.generate_tokens(user.id, &user.username, user.role.as_deref())?;
        self.store_refresh_token(&mut tx, user.id, &tokens.refresh_token)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, "user logged in");
        Ok(tokens)
    }

    /// Revoke the refresh token and record the logout
    pub async fn logout(&self, actor: &Actor, refresh_token: Option<&str>) -> AppResult<()> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        match refresh_token {
            Some(token) => {
                sqlx::query(
                    "UPDATE refresh_tokens SET revoked_at = $3 WHERE token_hash = $1 AND user_id = $2 AND revoked_at IS NULL",
                )
                .bind(Self::hash_token(token))
                .bind(actor.user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
                )
                .bind(actor.user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Logout, "User").object(actor.user_id, "logout"),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Refresh access token using refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = Self::hash_token(refresh_token);
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, LoginRow>(
            r#"
            SELECT u.id, u.username, u.password_hash, u.is_active, r.name AS role
            FROM refresh_tokens rt
            JOIN users u ON u.id = rt.user_id
            LEFT JOIN roles r ON r.id = u.role_id
            WHERE rt.token_hash = $1
              AND rt.expires_at > $2
              AND rt.revoked_at IS NULL
              AND u.is_active = true
            FOR UPDATE OF rt
            "#,
        )
        .bind(&token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired refresh token".to_string()))?;

        sqlx::query("UPDATE refresh_tokens SET revoked_at = $2 WHERE token_hash = $1")
            .bind(&token_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let tokens = self.generate_tokens(user.id, &user.username, user.role.as_deref())?;
        self.store_refresh_token(&mut tx, user.id, &tokens.refresh_token)
            .await?;

        tx.commit().await?;
        Ok(tokens)
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user_id: Uuid, username: &str, role: Option<&str>) -> AppResult<AuthTokens> {
        let now = self.clock.now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let permissions = role
            .and_then(|r| r.parse::<RoleName>().ok())
            .map(permission_codes)
            .unwrap_or_default();

        let access_claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.map(str::to_string),
            permissions,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Refresh token (opaque random token)
        let refresh_token = Uuid::new_v4().simple().to_string();

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(
        &self,
        conn: &mut sqlx::PgConnection,
        user_id: Uuid,
        token: &str,
    ) -> AppResult<()> {
        let expires_at = self.clock.now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(Self::hash_token(token))
        .bind(expires_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Hash a token for storage
    fn hash_token(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

//! User administration service

use std::sync::Arc;

use bcrypt::{hash, DEFAULT_COST};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{AuditAction, ChangeSet, Role, RoleName, User};
use shared::validation::{validate_email, validate_password, validate_username};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{collect, RoleRow, UserRow, USER_COLUMNS};
use crate::services::audit::{Actor, AuditEntry, AuditService};

/// Length of generated reset passwords
const RESET_PASSWORD_LENGTH: usize = 12;

#[derive(Clone)]
pub struct UserService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 3, max = 150))]
    pub username: String,
    pub email: Option<String>,
    #[validate(length(min = 8))]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Option<RoleName>,
    pub phone: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<RoleName>,
    pub phone: Option<String>,
    pub department: Option<String>,
}

/// User with the name of their role
#[derive(Debug, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub full_name: String,
    pub role: Option<RoleName>,
}

/// Result of a password reset; the password is shown once
#[derive(Debug, Serialize)]
pub struct PasswordReset {
    pub user_id: Uuid,
    pub new_password: String,
}

/// Random alphanumeric password for administrator resets
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl UserService {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY username",
            USER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(collect(rows))
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

        Ok(row.into())
    }

    pub async fn get_profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let user = self.get_user(user_id).await?;
        let role = match user.role_id {
            Some(role_id) => Some(self.role_name(role_id).await?),
            None => None,
        };

        Ok(UserProfile {
            full_name: user.full_name(),
            user,
            role,
        })
    }

    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT id, name, description, created_at, updated_at FROM roles ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(collect(rows))
    }

    pub async fn create_user(&self, actor: &Actor, input: CreateUserInput) -> AppResult<User> {
        input.validate()?;
        validate_username(&input.username).map_err(|m| AppError::validation("username", m))?;
        validate_password(&input.password).map_err(|m| AppError::validation("password", m))?;
        if let Some(email) = &input.email {
            validate_email(email).map_err(|m| AppError::validation("email", m))?;
        }

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let role_id = match input.role {
            Some(role) => Some(self.role_id(&mut tx, role).await?),
            None => None,
        };

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name, role_id,
                               phone, department, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&input.username)
        .bind(&input.email)
        .bind(&password_hash)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(role_id)
        .bind(&input.phone)
        .bind(&input.department)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let user: User = row.into();
        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "User").object(user.id, user.username.clone()),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn update_user(
        &self,
        actor: &Actor,
        user_id: Uuid,
        input: UpdateUserInput,
    ) -> AppResult<User> {
        if let Some(email) = &input.email {
            validate_email(email).map_err(|m| AppError::validation("email", m))?;
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let existing: User = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?
        .into();

        let role_id = match input.role {
            Some(role) => Some(self.role_id(&mut tx, role).await?),
            None => existing.role_id,
        };
        let email = input.email.or_else(|| existing.email.clone());
        let first_name = input.first_name.unwrap_or_else(|| existing.first_name.clone());
        let last_name = input.last_name.unwrap_or_else(|| existing.last_name.clone());
        let phone = input.phone.or_else(|| existing.phone.clone());
        let department = input.department.or_else(|| existing.department.clone());

        let mut changes = ChangeSet::new();
        changes
            .track("email", &existing.email, &email)
            .track("first_name", &existing.first_name, &first_name)
            .track("last_name", &existing.last_name, &last_name)
            .track("role_id", &existing.role_id, &role_id)
            .track("phone", &existing.phone, &phone)
            .track("department", &existing.department, &department);

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET email = $2, first_name = $3, last_name = $4, role_id = $5,
                phone = $6, department = $7, updated_at = $8
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(&email)
        .bind(&first_name)
        .bind(&last_name)
        .bind(role_id)
        .bind(&phone)
        .bind(&department)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if !changes.is_empty() {
            AuditService::record(
                &mut tx,
                actor,
                AuditEntry::new(AuditAction::Update, "User")
                    .object(user_id, existing.username.clone())
                    .changes(changes.into_value()),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(row.into())
    }

    /// Flip the active flag. Users cannot deactivate themselves.
    pub async fn toggle_active(&self, actor: &Actor, user_id: Uuid) -> AppResult<User> {
        if actor.user_id == user_id {
            return Err(AppError::validation(
                "user_id",
                "You cannot deactivate your own account",
            ));
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_active = NOT is_active, updated_at = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

        let mut changes = ChangeSet::new();
        changes.track("is_active", &!row.is_active, &row.is_active);

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Update, "User")
                .object(user_id, row.username.clone())
                .changes(changes.into_value()),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(user_id = %user_id, is_active = row.is_active, "user activation toggled");
        Ok(row.into())
    }

    /// Replace the password with a generated one and return it
    pub async fn reset_password(&self, actor: &Actor, user_id: Uuid) -> AppResult<PasswordReset> {
        let new_password = generate_password(RESET_PASSWORD_LENGTH);
        let password_hash = hash(&new_password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let username = sqlx::query_scalar::<_, String>(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1 RETURNING username",
        )
        .bind(user_id)
        .bind(&password_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

        sqlx::query("UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL")
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Update, "User")
                .object(user_id, username)
                .changes(Some(serde_json::json!({ "password": "reset" }))),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(PasswordReset {
            user_id,
            new_password,
        })
    }

    async fn role_id(&self, conn: &mut sqlx::PgConnection, role: RoleName) -> AppResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE name = $1")
            .bind(role.as_str())
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| AppError::not_found("Role"))
    }

    async fn role_name(&self, role_id: Uuid) -> AppResult<RoleName> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("Role"))?;

        name.parse()
            .map_err(|e: shared::models::ParseEnumError| AppError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_password_shape() {
        let password = generate_password(RESET_PASSWORD_LENGTH);
        assert_eq!(password.len(), 12);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password(RESET_PASSWORD_LENGTH));
    }
}

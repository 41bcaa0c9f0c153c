//! Audit trail service
//!
//! Audit entries are written inside the caller's unit of work so a rolled
//! back change leaves no trace in the log either.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{collect, AuditAction, AuditLog, AuditLogRow};

/// Who did something, and from where
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub ip_address: Option<String>,
}

impl Actor {
    pub fn new(user_id: Uuid, ip_address: Option<String>) -> Self {
        Self {
            user_id,
            ip_address,
        }
    }
}

/// One entry to append to the audit log
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub model_name: &'static str,
    pub object_id: Option<String>,
    pub object_repr: Option<String>,
    pub changes: Option<Value>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, model_name: &'static str) -> Self {
        Self {
            action,
            model_name,
            object_id: None,
            object_repr: None,
            changes: None,
        }
    }

    pub fn object(mut self, id: impl ToString, repr: impl Into<String>) -> Self {
        self.object_id = Some(id.to_string());
        self.object_repr = Some(repr.into());
        self
    }

    pub fn changes(mut self, changes: Option<Value>) -> Self {
        self.changes = changes;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub model_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct AuditService {
    db: PgPool,
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append an entry on the given connection
    pub async fn record(
        conn: &mut PgConnection,
        actor: &Actor,
        entry: AuditEntry,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, model_name, object_id, object_repr, changes, ip_address, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(actor.user_id)
        .bind(entry.action.as_str())
        .bind(entry.model_name)
        .bind(&entry.object_id)
        .bind(&entry.object_repr)
        .bind(&entry.changes)
        .bind(&actor.ip_address)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Newest first
    pub async fn list(&self, filter: &AuditLogFilter) -> AppResult<Vec<AuditLog>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, user_id, action, model_name, object_id, object_repr, changes, ip_address, timestamp \
             FROM audit_logs WHERE TRUE",
        );
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(action) = filter.action {
            query.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(model_name) = &filter.model_name {
            query.push(" AND model_name = ").push_bind(model_name.clone());
        }
        if let Some(from) = filter.from {
            query.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND timestamp <= ").push_bind(to);
        }
        query.push(" ORDER BY timestamp DESC");

        let rows = query
            .build_query_as::<AuditLogRow>()
            .fetch_all(&self.db)
            .await?;

        Ok(collect(rows))
    }
}

//! Delivery of reorder notifications
//!
//! Supports:
//! - Logging alerts through `tracing`
//! - In-app notifications stored per recipient
//! - Signed webhook delivery to an external system

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::config::{NotificationsConfig, SinkKind};
use crate::error::{AppError, AppResult};
use crate::models::{AlertRecipient, StockItemDetail};

/// Header carrying the base64 HMAC-SHA256 of the webhook body
pub const SIGNATURE_HEADER: &str = "X-ERP-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Receives low-stock notifications for delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, recipients: &[AlertRecipient], item: &StockItemDetail) -> AppResult<()>;
}

fn alert_title(item: &StockItemDetail) -> String {
    format!("Reorder alert: {}", item.label())
}

fn alert_message(item: &StockItemDetail) -> String {
    let batch = item.item.batch_number.as_deref().unwrap_or("-");
    format!(
        "{} ({}) batch {} in {} is at {}, reorder threshold {}.",
        item.product_name,
        item.product_sku,
        batch,
        item.warehouse_code,
        item.item.quantity,
        item.effective_reorder_threshold
    )
}

/// Writes alerts to the log only
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, recipients: &[AlertRecipient], item: &StockItemDetail) -> AppResult<()> {
        let usernames: Vec<&str> = recipients.iter().map(|r| r.username.as_str()).collect();
        tracing::info!(
            stock_item_id = %item.item.id,
            recipients = ?usernames,
            "{}",
            alert_message(item)
        );
        Ok(())
    }
}

/// Stores one in-app notification per recipient
#[derive(Clone)]
pub struct InAppSink {
    db: PgPool,
}

impl InAppSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for InAppSink {
    fn name(&self) -> &'static str {
        "in_app"
    }

    async fn notify(&self, recipients: &[AlertRecipient], item: &StockItemDetail) -> AppResult<()> {
        let title = alert_title(item);
        let message = alert_message(item);
        let mut tx = self.db.begin().await?;

        for recipient in recipients {
            sqlx::query(
                r#"
                INSERT INTO in_app_notifications (user_id, stock_item_id, title, message)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(recipient.user_id)
            .bind(item.item.id)
            .bind(&title)
            .bind(&message)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Body posted by [`WebhookSink`]
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    title: String,
    message: String,
    recipients: &'a [AlertRecipient],
    item: &'a StockItemDetail,
}

/// Posts alerts as signed JSON to an external endpoint
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    secret: String,
    http_client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String, secret: String) -> Self {
        Self {
            url,
            secret,
            http_client: reqwest::Client::new(),
        }
    }
}

/// Base64 HMAC-SHA256 of `body` under `secret`
pub fn sign_payload(secret: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, recipients: &[AlertRecipient], item: &StockItemDetail) -> AppResult<()> {
        let payload = WebhookPayload {
            event: "reorder_alert",
            title: alert_title(item),
            message: alert_message(item),
            recipients,
            item,
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| AppError::Internal(format!("Failed to encode webhook body: {}", e)))?;
        let signature = sign_payload(&self.secret, &body)?;

        let response = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::NotificationFailed(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::NotificationFailed(format!(
                "Webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Build the configured sink
pub fn build_sink(config: &NotificationsConfig, db: PgPool) -> AppResult<Arc<dyn NotificationSink>> {
    let sink: Arc<dyn NotificationSink> = match config.sink {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::InApp => Arc::new(InAppSink::new(db)),
        SinkKind::Webhook => {
            let url = config.webhook_url.clone().ok_or_else(|| {
                AppError::Internal("notifications.webhook_url is required for the webhook sink".into())
            })?;
            let secret = config.webhook_secret.clone().ok_or_else(|| {
                AppError::Internal("notifications.webhook_secret is required for the webhook sink".into())
            })?;
            Arc::new(WebhookSink::new(url, secret))
        }
    };
    Ok(sink)
}

/// In-app notification as shown to its recipient
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InAppNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stock_item_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Inbox operations on in-app notifications
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
}

impl NotificationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_for_user(&self, user_id: Uuid, unread_only: bool) -> AppResult<Vec<InAppNotification>> {
        let notifications = sqlx::query_as::<_, InAppNotification>(
            r#"
            SELECT id, user_id, stock_item_id, title, message, is_read, created_at, read_at
            FROM in_app_notifications
            WHERE user_id = $1 AND ($2 = false OR is_read = false)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.db)
        .await?;

        Ok(notifications)
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE in_app_notifications
            SET is_read = true, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Notification"));
        }
        Ok(())
    }
}

//! Reorder alert service
//!
//! Finds low-stock items, applies the notification cooldown and hands each
//! alert to the configured [`NotificationSink`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{
    merge_recipients, AlertPolicy, AlertRecipient, AlertStatus, AuditAction, ChangeSet,
    ReorderAlert, RoleName,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::config::AlertsConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    collect, ReorderAlertRow, StockItemDetail, StockItemDetailRow, REORDER_ALERT_COLUMNS,
    STOCK_ITEM_COLUMNS, STOCK_ITEM_DETAIL_FROM, STOCK_ITEM_DETAIL_LABELS,
};
use crate::services::audit::{Actor, AuditEntry, AuditService};
use crate::services::notification::NotificationSink;
use crate::services::stock::lock_stock_item;

#[derive(Clone)]
pub struct AlertService {
    db: PgPool,
    clock: Arc<dyn Clock>,
    policy: AlertPolicy,
    recipient_roles: Vec<RoleName>,
    sink: Arc<dyn NotificationSink>,
}

#[derive(Debug, FromRow)]
struct RecipientRow {
    user_id: Uuid,
    username: String,
    email: Option<String>,
}

impl From<RecipientRow> for AlertRecipient {
    fn from(r: RecipientRow) -> Self {
        AlertRecipient {
            user_id: r.user_id,
            username: r.username,
            email: r.email,
        }
    }
}

/// Whether one stock item would alert right now
#[derive(Debug, Serialize)]
pub struct AlertCheck {
    pub stock_item_id: Uuid,
    pub is_low_stock: bool,
    pub cooling_down: bool,
    pub should_send_alert: bool,
    pub last_alert_sent: Option<DateTime<Utc>>,
    pub next_allowed_at: Option<DateTime<Utc>>,
}

/// Outcome of one alert sweep
#[derive(Debug, Default, Serialize)]
pub struct AlertRunSummary {
    pub low_stock_items: usize,
    pub alerts_sent: usize,
    pub skipped_cooldown: usize,
    pub skipped_replenished: usize,
    pub delivery_failures: usize,
    pub alert_ids: Vec<Uuid>,
}

/// What happened when one item was considered for an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemAlertOutcome {
    Sent { alert_id: Uuid },
    CoolingDown,
    NotLow,
    DeliveryFailed,
}

/// An alert recorded under a freshly claimed cooldown slot
struct RaisedAlert {
    alert: ReorderAlert,
    detail: StockItemDetail,
    previous_sent: Option<DateTime<Utc>>,
}

enum Claim {
    Raised(RaisedAlert),
    CoolingDown,
    NoLongerLow,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertTransitionInput {
    pub notes: Option<String>,
}

impl AlertService {
    pub fn new(
        db: PgPool,
        clock: Arc<dyn Clock>,
        config: &AlertsConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            db,
            clock,
            policy: config.policy(),
            recipient_roles: config.recipient_roles.clone(),
            sink,
        }
    }

    /// Warehouse manager first, then active members of the recipient roles
    pub async fn recipients(&self, stock_item_id: Uuid) -> AppResult<Vec<AlertRecipient>> {
        let manager = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT u.id AS user_id, u.username, u.email
            FROM stock_items si
            JOIN warehouses w ON w.id = si.warehouse_id
            JOIN users u ON u.id = w.manager_id
            WHERE si.id = $1 AND u.is_active = true
            "#,
        )
        .bind(stock_item_id)
        .fetch_optional(&self.db)
        .await?;

        let roles: Vec<String> = self
            .recipient_roles
            .iter()
            .map(|role| role.as_str().to_string())
            .collect();
        let members = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT u.id AS user_id, u.username, u.email
            FROM users u
            JOIN roles r ON r.id = u.role_id
            WHERE u.is_active = true AND r.name = ANY($1)
            ORDER BY u.username
            "#,
        )
        .bind(&roles)
        .fetch_all(&self.db)
        .await?;

        Ok(merge_recipients(
            manager.map(AlertRecipient::from),
            members.into_iter().map(AlertRecipient::from),
        ))
    }

    pub async fn check_item(&self, stock_item_id: Uuid) -> AppResult<AlertCheck> {
        let row = sqlx::query_as::<_, StockItemDetailRow>(&format!(
            "SELECT {}, {} FROM {} WHERE si.id = $1",
            STOCK_ITEM_COLUMNS, STOCK_ITEM_DETAIL_LABELS, STOCK_ITEM_DETAIL_FROM
        ))
        .bind(stock_item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Stock item"))?;

        let now = self.clock.now();
        let default_threshold = row.product_reorder_threshold;
        let item = StockItemDetail::from_row(row, self.clock.today()).item;

        Ok(AlertCheck {
            stock_item_id,
            is_low_stock: item.is_low_stock(default_threshold),
            cooling_down: self.policy.is_cooling_down(item.last_alert_sent, now),
            should_send_alert: self.policy.should_send_alert(&item, default_threshold, now),
            last_alert_sent: item.last_alert_sent,
            next_allowed_at: self.policy.next_allowed_at(item.last_alert_sent),
        })
    }

    /// Record a notification as sent now; repeating it only moves the timestamp
    pub async fn mark_sent(&self, stock_item_id: Uuid) -> AppResult<DateTime<Utc>> {
        let now = self.clock.now();
        let result = sqlx::query("UPDATE stock_items SET last_alert_sent = $2 WHERE id = $1")
            .bind(stock_item_id)
            .bind(now)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Stock item"));
        }
        Ok(now)
    }

    /// Alert every low-stock item whose cooldown has passed
    pub async fn run_reorder_alerts(&self, actor: &Actor) -> AppResult<AlertRunSummary> {
        let now = self.clock.now();
        let today = self.clock.today();

        let rows = sqlx::query_as::<_, StockItemDetailRow>(&format!(
            r#"
            SELECT {}, {} FROM {}
            WHERE si.quantity > 0
              AND si.quantity <= CASE WHEN si.reorder_threshold <> 0
                                      THEN si.reorder_threshold
                                      ELSE p.reorder_threshold END
            ORDER BY p.sku, si.batch_number NULLS LAST, si.id
            "#,
            STOCK_ITEM_COLUMNS, STOCK_ITEM_DETAIL_LABELS, STOCK_ITEM_DETAIL_FROM
        ))
        .fetch_all(&self.db)
        .await?;

        let mut summary = AlertRunSummary {
            low_stock_items: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let default_threshold = row.product_reorder_threshold;
            let snapshot = StockItemDetail::from_row(row, today);
            if !self.policy.should_send_alert(&snapshot.item, default_threshold, now) {
                summary.skipped_cooldown += 1;
                continue;
            }

            match self.alert_item(actor, snapshot.item.id).await? {
                ItemAlertOutcome::Sent { alert_id } => {
                    summary.alerts_sent += 1;
                    summary.alert_ids.push(alert_id);
                }
                // Another sweep claimed the slot first
                ItemAlertOutcome::CoolingDown => summary.skipped_cooldown += 1,
                ItemAlertOutcome::NotLow => summary.skipped_replenished += 1,
                ItemAlertOutcome::DeliveryFailed => summary.delivery_failures += 1,
            }
        }

        Ok(summary)
    }

    /// Raise and deliver an alert for one item if it is low and out of
    /// cooldown. A failed delivery leaves no alert behind and does not
    /// start the cooldown.
    pub async fn alert_item(&self, actor: &Actor, stock_item_id: Uuid) -> AppResult<ItemAlertOutcome> {
        let now = self.clock.now();
        let raised = match self.claim_and_raise(actor, stock_item_id, now).await? {
            Claim::Raised(raised) => raised,
            Claim::CoolingDown => return Ok(ItemAlertOutcome::CoolingDown),
            Claim::NoLongerLow => return Ok(ItemAlertOutcome::NotLow),
        };

        let recipients = self.recipients(stock_item_id).await?;
        match self.sink.notify(&recipients, &raised.detail).await {
            Ok(()) => {
                tracing::info!(
                    alert_id = %raised.alert.id,
                    item = %raised.detail.label(),
                    sink = self.sink.name(),
                    recipients = recipients.len(),
                    "reorder alert sent"
                );
                Ok(ItemAlertOutcome::Sent {
                    alert_id: raised.alert.id,
                })
            }
            Err(err) => {
                tracing::warn!(
                    alert_id = %raised.alert.id,
                    item = %raised.detail.label(),
                    sink = self.sink.name(),
                    error = %err,
                    "reorder alert delivery failed"
                );
                self.release_claim(&raised, now).await?;
                Ok(ItemAlertOutcome::DeliveryFailed)
            }
        }
    }

    /// Lock the item, re-check it against its current quantity and cooldown,
    /// then take the cooldown slot and record the alert in one transaction.
    async fn claim_and_raise(
        &self,
        actor: &Actor,
        stock_item_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Claim> {
        let mut tx = self.db.begin().await?;

        let locked = lock_stock_item(&mut tx, stock_item_id).await?;
        let default_threshold = locked.product_reorder_threshold;
        let detail = StockItemDetail::from_row(locked, self.clock.today());

        if !detail.item.is_low_stock(default_threshold) {
            return Ok(Claim::NoLongerLow);
        }
        if self.policy.is_cooling_down(detail.item.last_alert_sent, now) {
            return Ok(Claim::CoolingDown);
        }

        sqlx::query("UPDATE stock_items SET last_alert_sent = $2 WHERE id = $1")
            .bind(stock_item_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let notes = format!(
            "Quantity {} at or below reorder threshold {}",
            detail.item.quantity, detail.effective_reorder_threshold
        );
        let row = sqlx::query_as::<_, ReorderAlertRow>(&format!(
            r#"
            INSERT INTO reorder_alerts (stock_item_id, status, triggered_by, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {}
            "#,
            REORDER_ALERT_COLUMNS
        ))
        .bind(stock_item_id)
        .bind(AlertStatus::Active.as_str())
        .bind(actor.user_id)
        .bind(&notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Claim::Raised(RaisedAlert {
            alert: row.into(),
            previous_sent: detail.item.last_alert_sent,
            detail,
        }))
    }

    /// Undo an undelivered alert: drop its row and hand the cooldown slot
    /// back, unless a later claim has already replaced it.
    async fn release_claim(&self, raised: &RaisedAlert, claimed_at: DateTime<Utc>) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE stock_items SET last_alert_sent = $2
            WHERE id = $1 AND last_alert_sent = $3
            "#,
        )
        .bind(raised.detail.item.id)
        .bind(raised.previous_sent)
        .bind(claimed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM reorder_alerts WHERE id = $1")
            .bind(raised.alert.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Newest first
    pub async fn list_alerts(&self, status: Option<AlertStatus>) -> AppResult<Vec<ReorderAlert>> {
        let rows = sqlx::query_as::<_, ReorderAlertRow>(&format!(
            r#"
            SELECT {} FROM reorder_alerts
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
            REORDER_ALERT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        Ok(collect(rows))
    }

    pub async fn get_alert(&self, alert_id: Uuid) -> AppResult<ReorderAlert> {
        let row = sqlx::query_as::<_, ReorderAlertRow>(&format!(
            "SELECT {} FROM reorder_alerts WHERE id = $1",
            REORDER_ALERT_COLUMNS
        ))
        .bind(alert_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Reorder alert"))?;

        Ok(row.into())
    }

    pub async fn resolve(
        &self,
        actor: &Actor,
        alert_id: Uuid,
        input: AlertTransitionInput,
    ) -> AppResult<ReorderAlert> {
        self.transition(actor, alert_id, AlertStatus::Resolved, input.notes)
            .await
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        alert_id: Uuid,
        input: AlertTransitionInput,
    ) -> AppResult<ReorderAlert> {
        self.transition(actor, alert_id, AlertStatus::Cancelled, input.notes)
            .await
    }

    async fn transition(
        &self,
        actor: &Actor,
        alert_id: Uuid,
        next: AlertStatus,
        notes: Option<String>,
    ) -> AppResult<ReorderAlert> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let current: ReorderAlert = lock_alert(&mut tx, alert_id).await?.into();
        if !current.status.can_transition_to(next) {
            tracing::warn!(alert_id = %alert_id, from = %current.status, to = %next, "alert transition rejected");
            return Err(AppError::InvalidStateTransition(format!(
                "Reorder alert cannot move from {} to {}",
                current.status, next
            )));
        }

        let row = sqlx::query_as::<_, ReorderAlertRow>(&format!(
            r#"
            UPDATE reorder_alerts
            SET status = $2, notes = COALESCE($3, notes), updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            REORDER_ALERT_COLUMNS
        ))
        .bind(alert_id)
        .bind(next.as_str())
        .bind(&notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut changes = ChangeSet::new();
        changes.track("status", &current.status, &next);

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Update, "ReorderAlert")
                .object(alert_id, format!("Reorder alert {}", alert_id))
                .changes(changes.into_value()),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(alert_id = %alert_id, status = %next, "reorder alert closed");
        Ok(row.into())
    }
}

async fn lock_alert(conn: &mut PgConnection, alert_id: Uuid) -> AppResult<ReorderAlertRow> {
    sqlx::query_as::<_, ReorderAlertRow>(&format!(
        "SELECT {} FROM reorder_alerts WHERE id = $1 FOR UPDATE",
        REORDER_ALERT_COLUMNS
    ))
    .bind(alert_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found("Reorder alert"))
}

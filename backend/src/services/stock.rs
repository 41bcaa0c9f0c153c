//! Stock ledger service
//!
//! Every quantity change locks the stock item row, applies a [`Movement`] and
//! appends the matching transaction in the same database transaction.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{
    forecast_reorder, replay, resolve_reorder_threshold, seed_reorder_threshold, AuditAction,
    ChangeSet, ExpiryStatus, LedgerError, Movement, ProcurementStatus, ProductType, Reconciliation,
    StockStatus, StockTransaction, TransactionKind, TransferLeg, UsageForecast,
};
use shared::validation::validate_amount;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    StockItemDetail, StockItemDetailRow, StockTransactionRow, STOCK_ITEM_COLUMNS,
    STOCK_ITEM_DETAIL_FROM, STOCK_ITEM_DETAIL_LABELS, STOCK_TRANSACTION_COLUMNS,
};
use crate::services::audit::{Actor, AuditEntry, AuditService};

const OPENING_BALANCE_REFERENCE: &str = "Opening balance";

#[derive(Clone)]
pub struct StockService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStockItemInput {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_number: Option<String>,
    /// Recorded as an `in` transaction, never written directly
    pub initial_quantity: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub reorder_threshold: Option<Decimal>,
    pub procurement_status: Option<ProcurementStatus>,
    pub location: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub manufactured_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Descriptive fields of a stock item; the quantity only moves through the ledger
#[derive(Debug, Default, Deserialize)]
pub struct UpdateStockItemInput {
    pub unit_cost: Option<Decimal>,
    pub reorder_threshold: Option<Decimal>,
    pub procurement_status: Option<ProcurementStatus>,
    pub location: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub manufactured_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionInput {
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferInput {
    pub source_id: Uuid,
    pub destination_id: Uuid,
    pub quantity: Decimal,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransferResult {
    pub transfer_group_id: Uuid,
    pub source: StockTransaction,
    pub destination: StockTransaction,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockFilter {
    pub warehouse_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub product_type: Option<ProductType>,
    pub procurement_status: Option<ProcurementStatus>,
    pub stock_status: Option<StockStatus>,
    pub expiry_status: Option<ExpiryStatus>,
    /// Matches SKU, product name or batch number
    pub search: Option<String>,
}

impl StockFilter {
    fn matches_derived(&self, item: &StockItemDetail) -> bool {
        self.stock_status.map_or(true, |s| item.stock_status == s)
            && self.expiry_status.map_or(true, |s| item.expiry_status == s)
    }
}

#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub stock_item_id: Uuid,
    pub transaction_count: usize,
    #[serde(flatten)]
    pub reconciliation: Reconciliation,
    pub is_consistent: bool,
}

#[derive(Debug, Serialize)]
pub struct ItemForecast {
    pub stock_item_id: Uuid,
    pub total_out: Decimal,
    #[serde(flatten)]
    pub forecast: UsageForecast,
}

/// What a ledger write records besides the movement itself
#[derive(Debug, Default)]
pub(crate) struct LedgerContext<'a> {
    pub reference: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub order_id: Option<Uuid>,
    pub transfer_group_id: Option<Uuid>,
}

fn normalize_batch(batch_number: Option<String>) -> Option<String> {
    batch_number
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
}

fn check_amount(field: &str, value: Option<Decimal>) -> AppResult<()> {
    match value {
        Some(v) => validate_amount(v).map_err(|m| AppError::validation(field, m)),
        None => Ok(()),
    }
}

/// Lock one stock item for the rest of the transaction
pub(crate) async fn lock_stock_item(
    conn: &mut PgConnection,
    stock_item_id: Uuid,
) -> AppResult<StockItemDetailRow> {
    sqlx::query_as::<_, StockItemDetailRow>(&format!(
        "SELECT {}, {} FROM {} WHERE si.id = $1 FOR UPDATE OF si",
        STOCK_ITEM_COLUMNS, STOCK_ITEM_DETAIL_LABELS, STOCK_ITEM_DETAIL_FROM
    ))
    .bind(stock_item_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found("Stock item"))
}

/// Apply `movement` to a locked item and append its transaction.
///
/// The locked row's quantity is updated in place so later writes in the
/// same unit of work see the new balance.
pub(crate) async fn record_movement(
    conn: &mut PgConnection,
    locked: &mut StockItemDetailRow,
    movement: Movement,
    context: LedgerContext<'_>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> AppResult<StockTransaction> {
    let next = movement
        .apply(locked.item.quantity)
        .map_err(|err| match err {
            LedgerError::InsufficientStock {
                available,
                requested,
            } => AppError::InsufficientStock {
                product: locked.product_sku.clone(),
                warehouse: locked.warehouse_code.clone(),
                available,
                requested,
            },
            other => other.into(),
        })?;

    sqlx::query("UPDATE stock_items SET quantity = $2, updated_at = $3 WHERE id = $1")
        .bind(locked.item.id)
        .bind(next)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query_as::<_, StockTransactionRow>(&format!(
        r#"
        INSERT INTO stock_transactions (stock_item_id, kind, quantity, transfer_leg, transfer_group_id,
                                        order_id, reference, notes, balance_after, created_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {}
        "#,
        STOCK_TRANSACTION_COLUMNS
    ))
    .bind(locked.item.id)
    .bind(movement.kind.as_str())
    .bind(movement.amount)
    .bind(movement.leg.map(|leg| leg.as_str()))
    .bind(context.transfer_group_id)
    .bind(context.order_id)
    .bind(context.reference)
    .bind(context.notes)
    .bind(next)
    .bind(actor.user_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    locked.item.quantity = next;
    locked.item.updated_at = now;

    StockTransaction::try_from(row).map_err(|e| AppError::Internal(e.to_string()))
}

fn into_transactions(rows: Vec<StockTransactionRow>) -> AppResult<Vec<StockTransaction>> {
    rows.into_iter()
        .map(|row| StockTransaction::try_from(row).map_err(|e| AppError::Internal(e.to_string())))
        .collect()
}

impl StockService {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn get_item(&self, stock_item_id: Uuid) -> AppResult<StockItemDetail> {
        let row = sqlx::query_as::<_, StockItemDetailRow>(&format!(
            "SELECT {}, {} FROM {} WHERE si.id = $1",
            STOCK_ITEM_COLUMNS, STOCK_ITEM_DETAIL_LABELS, STOCK_ITEM_DETAIL_FROM
        ))
        .bind(stock_item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Stock item"))?;

        Ok(StockItemDetail::from_row(row, self.clock.today()))
    }

    /// Items ordered by SKU, then batch
    pub async fn list_items(&self, filter: &StockFilter) -> AppResult<Vec<StockItemDetail>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {}, {} FROM {} WHERE TRUE",
            STOCK_ITEM_COLUMNS, STOCK_ITEM_DETAIL_LABELS, STOCK_ITEM_DETAIL_FROM
        ));
        if let Some(warehouse_id) = filter.warehouse_id {
            query.push(" AND si.warehouse_id = ").push_bind(warehouse_id);
        }
        if let Some(product_id) = filter.product_id {
            query.push(" AND si.product_id = ").push_bind(product_id);
        }
        if let Some(category_id) = filter.category_id {
            query.push(" AND p.category_id = ").push_bind(category_id);
        }
        if let Some(product_type) = filter.product_type {
            query.push(" AND p.product_type = ").push_bind(product_type.as_str());
        }
        if let Some(status) = filter.procurement_status {
            query.push(" AND si.procurement_status = ").push_bind(status.as_str());
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (p.sku ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR si.batch_number ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY p.sku, si.batch_number NULLS LAST, si.id");

        let rows = query
            .build_query_as::<StockItemDetailRow>()
            .fetch_all(&self.db)
            .await?;

        let today = self.clock.today();
        Ok(rows
            .into_iter()
            .map(|row| StockItemDetail::from_row(row, today))
            .filter(|item| filter.matches_derived(item))
            .collect())
    }

    /// Create a stock item at zero and book any initial quantity as an opening `in`
    pub async fn create_item(
        &self,
        actor: &Actor,
        input: CreateStockItemInput,
    ) -> AppResult<StockItemDetail> {
        check_amount("initial_quantity", input.initial_quantity)?;
        check_amount("unit_cost", input.unit_cost)?;
        check_amount("reorder_threshold", input.reorder_threshold)?;

        let now = self.clock.now();
        let batch_number = normalize_batch(input.batch_number);
        let mut tx = self.db.begin().await?;

        let product_default = sqlx::query_scalar::<_, Decimal>(
            "SELECT reorder_threshold FROM products WHERE id = $1",
        )
        .bind(input.product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

        let warehouse_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
                .bind(input.warehouse_id)
                .fetch_one(&mut *tx)
                .await?;
        if !warehouse_exists {
            return Err(AppError::not_found("Warehouse"));
        }

        let threshold = seed_reorder_threshold(input.reorder_threshold, product_default);

        let stock_item_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO stock_items (product_id, warehouse_id, batch_number, quantity, unit_cost,
                                     reorder_threshold, procurement_status, location, expiry_date,
                                     manufactured_date, notes, created_at, updated_at)
            VALUES ($1, $2, $3, 0, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING id
            "#,
        )
        .bind(input.product_id)
        .bind(input.warehouse_id)
        .bind(&batch_number)
        .bind(input.unit_cost)
        .bind(threshold)
        .bind(input.procurement_status.unwrap_or_default().as_str())
        .bind(&input.location)
        .bind(input.expiry_date)
        .bind(input.manufactured_date)
        .bind(&input.notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut locked = lock_stock_item(&mut tx, stock_item_id).await?;

        if let Some(quantity) = input.initial_quantity.filter(|q| *q > Decimal::ZERO) {
            record_movement(
                &mut tx,
                &mut locked,
                Movement::new(TransactionKind::In, quantity),
                LedgerContext {
                    reference: Some(OPENING_BALANCE_REFERENCE),
                    ..Default::default()
                },
                actor,
                now,
            )
            .await?;
        }

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "StockItem").object(stock_item_id, locked_label(&locked)),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(stock_item_id = %stock_item_id, quantity = %locked.item.quantity, "stock item created");

        Ok(StockItemDetail::from_row(locked, self.clock.today()))
    }

    pub async fn update_item(
        &self,
        actor: &Actor,
        stock_item_id: Uuid,
        input: UpdateStockItemInput,
    ) -> AppResult<StockItemDetail> {
        check_amount("unit_cost", input.unit_cost)?;
        check_amount("reorder_threshold", input.reorder_threshold)?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let mut locked = lock_stock_item(&mut tx, stock_item_id).await?;
        let before = locked.item.clone();

        let item = &mut locked.item;
        if input.unit_cost.is_some() {
            item.unit_cost = input.unit_cost;
        }
        if let Some(threshold) = input.reorder_threshold {
            item.reorder_threshold = threshold;
        }
        if let Some(status) = input.procurement_status {
            item.procurement_status = status;
        }
        if input.location.is_some() {
            item.location = input.location;
        }
        if input.expiry_date.is_some() {
            item.expiry_date = input.expiry_date;
        }
        if input.manufactured_date.is_some() {
            item.manufactured_date = input.manufactured_date;
        }
        if input.notes.is_some() {
            item.notes = input.notes;
        }
        item.updated_at = now;

        let mut changes = ChangeSet::new();
        changes
            .track("unit_cost", &before.unit_cost, &item.unit_cost)
            .track("reorder_threshold", &before.reorder_threshold, &item.reorder_threshold)
            .track("procurement_status", &before.procurement_status, &item.procurement_status)
            .track("location", &before.location, &item.location)
            .track("expiry_date", &before.expiry_date, &item.expiry_date)
            .track("manufactured_date", &before.manufactured_date, &item.manufactured_date)
            .track("notes", &before.notes, &item.notes);

        sqlx::query(
            r#"
            UPDATE stock_items
            SET unit_cost = $2, reorder_threshold = $3, procurement_status = $4, location = $5,
                expiry_date = $6, manufactured_date = $7, notes = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(stock_item_id)
        .bind(item.unit_cost)
        .bind(item.reorder_threshold)
        .bind(item.procurement_status.as_str())
        .bind(&item.location)
        .bind(item.expiry_date)
        .bind(item.manufactured_date)
        .bind(&item.notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if !changes.is_empty() {
            AuditService::record(
                &mut tx,
                actor,
                AuditEntry::new(AuditAction::Update, "StockItem")
                    .object(stock_item_id, locked_label(&locked))
                    .changes(changes.into_value()),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(StockItemDetail::from_row(locked, self.clock.today()))
    }

    /// Apply an in/out/adjustment transaction to one stock item
    pub async fn apply_transaction(
        &self,
        actor: &Actor,
        stock_item_id: Uuid,
        input: TransactionInput,
    ) -> AppResult<StockTransaction> {
        if input.kind == TransactionKind::Transfer {
            return Err(AppError::validation(
                "kind",
                "Transfers move stock between two items; use the transfer operation",
            ));
        }
        let movement = Movement::new(input.kind, input.quantity);
        movement.validate()?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let mut locked = lock_stock_item(&mut tx, stock_item_id).await?;

        let transaction = record_movement(
            &mut tx,
            &mut locked,
            movement,
            LedgerContext {
                reference: input.reference.as_deref(),
                notes: input.notes.as_deref(),
                ..Default::default()
            },
            actor,
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(
            stock_item_id = %stock_item_id,
            kind = %input.kind,
            quantity = %input.quantity,
            balance = %transaction.balance_after,
            "stock transaction applied"
        );
        Ok(transaction)
    }

    /// Move stock between two items of the same product as a linked pair of legs
    pub async fn transfer_stock(&self, actor: &Actor, input: TransferInput) -> AppResult<TransferResult> {
        if input.source_id == input.destination_id {
            return Err(AppError::validation(
                "destination_id",
                "Source and destination must be different stock items",
            ));
        }
        let outgoing = Movement::transfer(TransferLeg::Source, input.quantity);
        let incoming = Movement::transfer(TransferLeg::Destination, input.quantity);
        outgoing.validate()?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        // Lock in id order so opposite transfers cannot deadlock
        let (mut source, mut destination) = if input.source_id < input.destination_id {
            let source = lock_stock_item(&mut tx, input.source_id).await?;
            let destination = lock_stock_item(&mut tx, input.destination_id).await?;
            (source, destination)
        } else {
            let destination = lock_stock_item(&mut tx, input.destination_id).await?;
            let source = lock_stock_item(&mut tx, input.source_id).await?;
            (source, destination)
        };

        if source.item.product_id != destination.item.product_id {
            return Err(AppError::validation(
                "destination_id",
                "Stock can only be transferred between items of the same product",
            ));
        }

        let transfer_group_id = Uuid::new_v4();
        let context = || LedgerContext {
            reference: input.reference.as_deref(),
            notes: input.notes.as_deref(),
            transfer_group_id: Some(transfer_group_id),
            ..Default::default()
        };

        let source_leg = record_movement(&mut tx, &mut source, outgoing, context(), actor, now).await?;
        let destination_leg =
            record_movement(&mut tx, &mut destination, incoming, context(), actor, now).await?;

        tx.commit().await?;
        tracing::info!(
            transfer_group_id = %transfer_group_id,
            from = %locked_label(&source),
            to = %locked_label(&destination),
            quantity = %input.quantity,
            "stock transferred"
        );

        Ok(TransferResult {
            transfer_group_id,
            source: source_leg,
            destination: destination_leg,
        })
    }

    /// Newest first
    pub async fn list_transactions(&self, stock_item_id: Uuid) -> AppResult<Vec<StockTransaction>> {
        let rows = sqlx::query_as::<_, StockTransactionRow>(&format!(
            "SELECT {} FROM stock_transactions WHERE stock_item_id = $1 ORDER BY seq DESC",
            STOCK_TRANSACTION_COLUMNS
        ))
        .bind(stock_item_id)
        .fetch_all(&self.db)
        .await?;

        into_transactions(rows)
    }

    /// Compare the stored quantity with a replay of the item's history
    pub async fn reconcile(&self, stock_item_id: Uuid) -> AppResult<ReconciliationReport> {
        let mut tx = self.db.begin().await?;
        let locked = lock_stock_item(&mut tx, stock_item_id).await?;

        let rows = sqlx::query_as::<_, StockTransactionRow>(&format!(
            "SELECT {} FROM stock_transactions WHERE stock_item_id = $1 ORDER BY seq",
            STOCK_TRANSACTION_COLUMNS
        ))
        .bind(stock_item_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let movements: Vec<Movement> = into_transactions(rows)?
            .iter()
            .map(StockTransaction::movement)
            .collect();
        let reconciliation = Reconciliation::new(locked.item.quantity, replay(&movements));

        if !reconciliation.is_consistent() {
            tracing::warn!(
                stock_item_id = %stock_item_id,
                drift = %reconciliation.drift,
                "stock balance drifted from its ledger"
            );
        }

        Ok(ReconciliationReport {
            stock_item_id,
            transaction_count: movements.len(),
            is_consistent: reconciliation.is_consistent(),
            reconciliation,
        })
    }

    /// Recompute and store the usage rate and forecast reorder date of one item
    pub async fn forecast_item(&self, stock_item_id: Uuid, lookback_days: i64) -> AppResult<ItemForecast> {
        let now = self.clock.now();
        let since = now - Duration::days(lookback_days);
        let mut tx = self.db.begin().await?;
        let locked = lock_stock_item(&mut tx, stock_item_id).await?;

        let total_out = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(quantity), 0)
            FROM stock_transactions
            WHERE stock_item_id = $1 AND kind = 'out' AND created_at >= $2
            "#,
        )
        .bind(stock_item_id)
        .bind(since)
        .fetch_one(&mut *tx)
        .await?;

        let threshold = resolve_reorder_threshold(
            locked.item.reorder_threshold,
            Some(locked.product_reorder_threshold),
        );
        let forecast = forecast_reorder(
            locked.item.quantity,
            threshold,
            total_out,
            lookback_days,
            self.clock.today(),
        );

        sqlx::query(
            "UPDATE stock_items SET usage_rate = $2, forecast_reorder_date = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(stock_item_id)
        .bind(forecast.usage_rate)
        .bind(forecast.forecast_reorder_date)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ItemForecast {
            stock_item_id,
            total_out,
            forecast,
        })
    }

    /// Forecast every stock item, one short transaction each
    pub async fn forecast_all(&self, lookback_days: i64) -> AppResult<Vec<ItemForecast>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM stock_items ORDER BY id")
            .fetch_all(&self.db)
            .await?;

        let mut forecasts = Vec::with_capacity(ids.len());
        for id in ids {
            forecasts.push(self.forecast_item(id, lookback_days).await?);
        }
        tracing::info!(count = forecasts.len(), "usage forecasts refreshed");
        Ok(forecasts)
    }
}

fn locked_label(row: &StockItemDetailRow) -> String {
    match &row.item.batch_number {
        Some(batch) => format!("{} @ {} ({})", row.product_sku, row.warehouse_code, batch),
        None => format!("{} @ {}", row.product_sku, row.warehouse_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_batch() {
        assert_eq!(normalize_batch(None), None);
        assert_eq!(normalize_batch(Some("  ".into())), None);
        assert_eq!(normalize_batch(Some(" B-01 ".into())), Some("B-01".to_string()));
    }

    #[test]
    fn test_check_amount() {
        assert!(check_amount("unit_cost", None).is_ok());
        assert!(check_amount("unit_cost", Some(Decimal::ZERO)).is_ok());
        assert!(check_amount("unit_cost", Some(Decimal::NEGATIVE_ONE)).is_err());
        assert!(check_amount("reorder_threshold", Some(Decimal::new(12345, 3))).is_err());
        assert!(check_amount("initial_quantity", Some(Decimal::new(12340, 3))).is_ok());
    }
}

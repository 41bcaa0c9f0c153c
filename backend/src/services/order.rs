//! Order service
//!
//! Confirming an order deducts each line from one batch of the order's
//! warehouse. The whole confirmation is one database transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{
    plan_allocations, Allocation, AllocationError, AllocationLine, AuditAction, BatchCandidate,
    ChangeSet, Movement, Order, OrderItem, OrderStatus, StockTransaction, TransactionKind,
};
use shared::validation::{validate_positive, validate_scale, AMOUNT_SCALE};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    collect, OrderItemRow, OrderRow, StockItemDetailRow, ORDER_COLUMNS, STOCK_ITEM_COLUMNS,
    STOCK_ITEM_DETAIL_FROM, STOCK_ITEM_DETAIL_LABELS,
};
use crate::services::audit::{Actor, AuditEntry, AuditService};
use crate::services::stock::{record_movement, LedgerContext};

#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub order_number: String,
    pub warehouse_id: Uuid,
    pub notes: Option<String>,
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResult {
    #[serde(flatten)]
    pub order: Order,
    pub allocations: Vec<Allocation>,
    pub transactions: Vec<StockTransaction>,
}

fn check_items(items: &[OrderItemInput]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("items", "An order needs at least one item"));
    }
    let mut seen = HashSet::new();
    for item in items {
        validate_positive(item.quantity)
            .and_then(|()| validate_scale(item.quantity, AMOUNT_SCALE))
            .map_err(|m| AppError::validation("quantity", m))?;
        if !seen.insert(item.product_id) {
            return Err(AppError::validation(
                "items",
                "Each product may appear only once per order",
            ));
        }
    }
    Ok(())
}

async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Order> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found("Order"))?;

    Ok(row.into())
}

fn rejected_transition(order: &Order, next: OrderStatus) -> AppError {
    tracing::warn!(order_id = %order.id, from = %order.status, to = %next, "order transition rejected");
    AppError::InvalidStateTransition(format!(
        "Order {} cannot move from {} to {}",
        order.order_number, order.status, next
    ))
}

impl OrderService {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Newest first
    pub async fn list_orders(&self, filter: &OrderFilter) -> AppResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {} FROM orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY created_at DESC
            "#,
            ORDER_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.warehouse_id)
        .fetch_all(&self.db)
        .await?;

        Ok(collect(rows))
    }

    pub async fn get_order(&self, order_id: Uuid) -> AppResult<OrderDetail> {
        let order: Order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?
        .into();

        let items = self.load_items(&self.db, order_id).await?;
        Ok(OrderDetail { order, items })
    }

    async fn load_items<'e, E>(&self, executor: E, order_id: Uuid) -> AppResult<Vec<OrderItem>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, quantity FROM order_items WHERE order_id = $1 ORDER BY product_id",
        )
        .bind(order_id)
        .fetch_all(executor)
        .await?;

        Ok(collect(rows))
    }

    pub async fn create_order(&self, actor: &Actor, input: CreateOrderInput) -> AppResult<OrderDetail> {
        let order_number = input.order_number.trim().to_string();
        if order_number.is_empty() {
            return Err(AppError::validation("order_number", "Order number is required"));
        }
        check_items(&input.items)?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let order: Order = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO orders (order_number, warehouse_id, status, notes, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(&order_number)
        .bind(input.warehouse_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(&input.notes)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .into();

        for item in &input.items {
            sqlx::query("INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3)")
                .bind(order.id)
                .bind(item.product_id)
                .bind(item.quantity)
                .execute(&mut *tx)
                .await?;
        }

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "Order").object(order.id, order.stock_reference()),
            now,
        )
        .await?;

        let items = self.load_items(&mut *tx, order.id).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");
        Ok(OrderDetail { order, items })
    }

    /// Move an order to `next`; confirmation deducts stock
    pub async fn update_status(&self, actor: &Actor, order_id: Uuid, next: OrderStatus) -> AppResult<Order> {
        if next == OrderStatus::Confirmed {
            return self.confirm(actor, order_id).await.map(|result| result.order);
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let order = lock_order(&mut tx, order_id).await?;
        if !order.status.can_transition_to(next) {
            return Err(rejected_transition(&order, next));
        }

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(next.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut changes = ChangeSet::new();
        changes.track("status", &order.status, &next);
        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Update, "Order")
                .object(order_id, order.stock_reference())
                .changes(changes.into_value()),
            now,
        )
        .await?;

        tx.commit().await?;
        if next == OrderStatus::Cancelled && order.confirmed_at.is_some() {
            tracing::info!(order_id = %order_id, "confirmed order cancelled; deducted stock is not returned");
        } else {
            tracing::info!(order_id = %order_id, status = %next, "order status changed");
        }
        Ok(row.into())
    }

    /// Confirm a pending order and deduct every line from stock
    pub async fn confirm(&self, actor: &Actor, order_id: Uuid) -> AppResult<ConfirmationResult> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut tx, order_id).await?;
        if !order.status.can_transition_to(OrderStatus::Confirmed) {
            return Err(rejected_transition(&order, OrderStatus::Confirmed));
        }

        let items = self.load_items(&mut *tx, order_id).await?;
        let lines: Vec<AllocationLine> = items
            .iter()
            .map(|item| AllocationLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();
        let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();

        // Candidate batches, locked in one statement in a stable order
        let locked = sqlx::query_as::<_, StockItemDetailRow>(&format!(
            r#"
            SELECT {}, {} FROM {}
            WHERE si.warehouse_id = $1 AND si.product_id = ANY($2)
            ORDER BY si.product_id, si.batch_number ASC NULLS LAST, si.id
            FOR UPDATE OF si
            "#,
            STOCK_ITEM_COLUMNS, STOCK_ITEM_DETAIL_LABELS, STOCK_ITEM_DETAIL_FROM
        ))
        .bind(order.warehouse_id)
        .bind(&product_ids)
        .fetch_all(&mut *tx)
        .await?;

        let candidates: Vec<BatchCandidate> = locked
            .iter()
            .map(|row| BatchCandidate {
                stock_item_id: row.item.id,
                product_id: row.item.product_id,
                batch_number: row.item.batch_number.clone(),
                quantity: row.item.quantity,
            })
            .collect();

        let allocations = match plan_allocations(&lines, &candidates) {
            Ok(allocations) => allocations,
            Err(AllocationError::Insufficient {
                product_id,
                requested,
                largest_available,
            }) => {
                let (product, warehouse) = self.labels(&mut tx, product_id, order.warehouse_id).await?;
                tracing::warn!(order_id = %order_id, product = %product, "order confirmation short of stock");
                return Err(AppError::InsufficientStock {
                    product,
                    warehouse,
                    available: largest_available,
                    requested,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let mut by_id: HashMap<Uuid, StockItemDetailRow> =
            locked.into_iter().map(|row| (row.item.id, row)).collect();
        let reference = order.stock_reference();
        let mut transactions = Vec::with_capacity(allocations.len());

        for allocation in &allocations {
            let row = by_id
                .get_mut(&allocation.stock_item_id)
                .ok_or_else(|| AppError::Internal("allocated batch was not locked".into()))?;
            let transaction = record_movement(
                &mut tx,
                row,
                Movement::new(TransactionKind::Out, allocation.quantity),
                LedgerContext {
                    reference: Some(reference.as_str()),
                    order_id: Some(order_id),
                    ..Default::default()
                },
                actor,
                now,
            )
            .await?;
            transactions.push(transaction);
        }

        let confirmed: Order = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, confirmed_at = $3, updated_at = $3 WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(OrderStatus::Confirmed.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .into();

        let mut changes = ChangeSet::new();
        changes.track("status", &order.status, &confirmed.status);
        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Update, "Order")
                .object(order_id, reference.clone())
                .changes(changes.into_value()),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(
            order_id = %order_id,
            lines = allocations.len(),
            "order confirmed and stock deducted"
        );

        Ok(ConfirmationResult {
            order: confirmed,
            allocations,
            transactions,
        })
    }

    async fn labels(
        &self,
        conn: &mut PgConnection,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<(String, String)> {
        let sku = sqlx::query_scalar::<_, String>("SELECT sku FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or_else(|| product_id.to_string());
        let code = sqlx::query_scalar::<_, String>("SELECT code FROM warehouses WHERE id = $1")
            .bind(warehouse_id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or_else(|| warehouse_id.to_string());
        Ok((sku, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(product_id: Uuid, quantity: Decimal) -> OrderItemInput {
        OrderItemInput {
            product_id,
            quantity,
        }
    }

    #[test]
    fn test_item_checks() {
        let product = Uuid::new_v4();
        assert!(check_items(&[line(product, dec!(2))]).is_ok());
        assert!(check_items(&[]).is_err());
        assert!(check_items(&[line(product, dec!(0))]).is_err());
        assert!(check_items(&[line(product, dec!(1)), line(product, dec!(2))]).is_err());
    }

    #[test]
    fn test_item_quantity_scale() {
        let product = Uuid::new_v4();
        assert!(check_items(&[line(product, dec!(2.50))]).is_ok());
        assert!(check_items(&[line(product, dec!(2.500))]).is_ok());
        assert!(check_items(&[line(product, dec!(0.005))]).is_err());
    }
}

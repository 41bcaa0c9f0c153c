//! Warehouse service

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{
    resolve_reorder_threshold, summarize, AuditAction, ChangeSet, StockSnapshot, Warehouse,
    WarehouseSummary,
};
use shared::validation::validate_code;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{collect, WarehouseRow, WAREHOUSE_COLUMNS};
use crate::services::audit::{Actor, AuditEntry, AuditService};

#[derive(Clone)]
pub struct WarehouseService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWarehouseInput {
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<String>,
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateWarehouseInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<String>,
    pub manager_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct WarehouseWithSummary {
    #[serde(flatten)]
    pub warehouse: Warehouse,
    pub summary: WarehouseSummary,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    reorder_threshold: Decimal,
    product_reorder_threshold: Decimal,
}

impl From<SnapshotRow> for StockSnapshot {
    fn from(r: SnapshotRow) -> Self {
        StockSnapshot {
            quantity: r.quantity,
            unit_cost: r.unit_cost,
            effective_threshold: resolve_reorder_threshold(
                r.reorder_threshold,
                Some(r.product_reorder_threshold),
            ),
        }
    }
}

impl WarehouseService {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn list_warehouses(&self, active_only: bool) -> AppResult<Vec<Warehouse>> {
        let rows = sqlx::query_as::<_, WarehouseRow>(&format!(
            "SELECT {} FROM warehouses WHERE ($1 = FALSE OR is_active) ORDER BY code",
            WAREHOUSE_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(collect(rows))
    }

    pub async fn get_warehouse(&self, warehouse_id: Uuid) -> AppResult<Warehouse> {
        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            "SELECT {} FROM warehouses WHERE id = $1",
            WAREHOUSE_COLUMNS
        ))
        .bind(warehouse_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Warehouse"))?;

        Ok(row.into())
    }

    /// Item count, stock value and low-stock count for one warehouse
    pub async fn summary(&self, warehouse_id: Uuid) -> AppResult<WarehouseWithSummary> {
        let warehouse = self.get_warehouse(warehouse_id).await?;

        let snapshots = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT si.quantity, si.unit_cost, si.reorder_threshold,
                   p.reorder_threshold AS product_reorder_threshold
            FROM stock_items si
            JOIN products p ON p.id = si.product_id
            WHERE si.warehouse_id = $1
            "#,
        )
        .bind(warehouse_id)
        .fetch_all(&self.db)
        .await?;

        Ok(WarehouseWithSummary {
            summary: summarize(snapshots.into_iter().map(StockSnapshot::from)),
            warehouse,
        })
    }

    pub async fn create_warehouse(
        &self,
        actor: &Actor,
        input: CreateWarehouseInput,
    ) -> AppResult<Warehouse> {
        input.validate()?;
        validate_code(&input.code).map_err(|m| AppError::validation("code", m))?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            r#"
            INSERT INTO warehouses (code, name, description, location, capacity, manager_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {}
            "#,
            WAREHOUSE_COLUMNS
        ))
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.location)
        .bind(&input.capacity)
        .bind(input.manager_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "Warehouse").object(row.id, row.code.clone()),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(warehouse_id = %row.id, code = %row.code, "warehouse created");
        Ok(row.into())
    }

    pub async fn update_warehouse(
        &self,
        actor: &Actor,
        warehouse_id: Uuid,
        input: UpdateWarehouseInput,
    ) -> AppResult<Warehouse> {
        input.validate()?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let before: Warehouse = sqlx::query_as::<_, WarehouseRow>(&format!(
            "SELECT {} FROM warehouses WHERE id = $1 FOR UPDATE",
            WAREHOUSE_COLUMNS
        ))
        .bind(warehouse_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Warehouse"))?
        .into();

        let mut warehouse = before.clone();
        if let Some(name) = input.name {
            warehouse.name = name;
        }
        if input.description.is_some() {
            warehouse.description = input.description;
        }
        if input.location.is_some() {
            warehouse.location = input.location;
        }
        if input.capacity.is_some() {
            warehouse.capacity = input.capacity;
        }
        if input.manager_id.is_some() {
            warehouse.manager_id = input.manager_id;
        }
        warehouse.is_active = input.is_active.unwrap_or(warehouse.is_active);

        let mut changes = ChangeSet::new();
        changes
            .track("name", &before.name, &warehouse.name)
            .track("description", &before.description, &warehouse.description)
            .track("location", &before.location, &warehouse.location)
            .track("capacity", &before.capacity, &warehouse.capacity)
            .track("manager_id", &before.manager_id, &warehouse.manager_id)
            .track("is_active", &before.is_active, &warehouse.is_active);

        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            r#"
            UPDATE warehouses
            SET name = $2, description = $3, location = $4, capacity = $5, manager_id = $6,
                is_active = $7, updated_at = $8
            WHERE id = $1
            RETURNING {}
            "#,
            WAREHOUSE_COLUMNS
        ))
        .bind(warehouse_id)
        .bind(&warehouse.name)
        .bind(&warehouse.description)
        .bind(&warehouse.location)
        .bind(&warehouse.capacity)
        .bind(warehouse.manager_id)
        .bind(warehouse.is_active)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if !changes.is_empty() {
            AuditService::record(
                &mut tx,
                actor,
                AuditEntry::new(AuditAction::Update, "Warehouse")
                    .object(warehouse_id, warehouse.code.clone())
                    .changes(changes.into_value()),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_snapshot_falls_back_to_product_threshold() {
        let snapshot = StockSnapshot::from(SnapshotRow {
            quantity: dec!(3),
            unit_cost: None,
            reorder_threshold: dec!(0),
            product_reorder_threshold: dec!(8),
        });
        assert_eq!(snapshot.effective_threshold, dec!(8));

        let snapshot = StockSnapshot::from(SnapshotRow {
            quantity: dec!(3),
            unit_cost: None,
            reorder_threshold: dec!(2),
            product_reorder_threshold: dec!(8),
        });
        assert_eq!(snapshot.effective_threshold, dec!(2));
    }
}

//! Reporting service
//! Read-only projections over the catalog, the stock ledger and orders

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{
    summarize, Bom, BomComponent, BomCostBreakdown, ExpiryStatus, ProcurementStatus,
    StockSnapshot, StockStatus, Warehouse, WarehouseSummary,
};
use shared::types::DateRange;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{collect, BomComponentRow, BomRow, StockItemDetail, WarehouseRow, BOM_COLUMNS, WAREHOUSE_COLUMNS};
use crate::services::bom::BOM_COMPONENT_COLUMNS;
use crate::services::stock::{StockFilter, StockService};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
    clock: Arc<dyn Clock>,
    stock: StockService,
}

/// Dashboard counters
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct DashboardMetrics {
    pub total_products: i64,
    pub active_products: i64,
    pub total_boms: i64,
    pub active_boms: i64,
    pub total_warehouses: i64,
    pub total_stock_items: i64,
    pub low_stock_items: i64,
    pub out_of_stock_items: i64,
    pub expired_items: i64,
    pub near_expiry_items: i64,
    pub total_stock_value: Decimal,
    pub active_alerts: i64,
    pub pending_orders: i64,
}

/// One low-stock item with how far it sits below its threshold
#[derive(Debug, Serialize)]
pub struct LowStockLine {
    #[serde(flatten)]
    pub item: StockItemDetail,
    pub deficit: Decimal,
}

/// Report filter parameters
#[derive(Debug, Default, Deserialize)]
pub struct LedgerReportFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub warehouse_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LedgerLine {
    pub transaction_id: Uuid,
    pub stock_item_id: Uuid,
    pub product_sku: String,
    pub warehouse_code: String,
    pub batch_number: Option<String>,
    pub kind: String,
    pub transfer_leg: Option<String>,
    pub quantity: Decimal,
    pub balance_after: Decimal,
    pub reference: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Stock movements over a period with per-kind totals
#[derive(Debug, Serialize)]
pub struct StockLedgerReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_in: Decimal,
    pub total_out: Decimal,
    pub adjustment_count: i64,
    pub transfer_count: i64,
    pub lines: Vec<LedgerLine>,
}

#[derive(Debug, Serialize)]
pub struct BomCostLine {
    pub bom_id: Uuid,
    pub bom_code: String,
    pub version: i32,
    pub is_active: bool,
    pub product_id: Uuid,
    pub product_sku: String,
    pub product_name: String,
    pub selling_price: Decimal,
    pub component_count: usize,
    pub cost: BomCostBreakdown,
    /// Selling price less total cost
    pub margin: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WarehouseStatus {
    #[serde(flatten)]
    pub warehouse: Warehouse,
    pub summary: WarehouseSummary,
}

#[derive(Debug, Serialize)]
pub struct ProcurementAgingLine {
    pub stock_item_id: Uuid,
    pub product_sku: String,
    pub warehouse_code: String,
    pub batch_number: Option<String>,
    pub procurement_status: ProcurementStatus,
    pub quantity: Decimal,
    pub since: DateTime<Utc>,
    pub age_days: i64,
}

#[derive(sqlx::FromRow)]
struct BomHeaderRow {
    #[sqlx(flatten)]
    bom: BomRow,
    product_sku: String,
    product_name: String,
    selling_price: Decimal,
}

#[derive(sqlx::FromRow)]
struct WarehouseSnapshotRow {
    warehouse_id: Uuid,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    reorder_threshold: Decimal,
    product_reorder_threshold: Decimal,
}

/// Fold derived stock state into the dashboard counters
fn tally_stock(metrics: &mut DashboardMetrics, items: &[StockItemDetail]) {
    for item in items {
        metrics.total_stock_items += 1;
        metrics.total_stock_value += item.total_value;
        match item.stock_status {
            StockStatus::OutOfStock => metrics.out_of_stock_items += 1,
            StockStatus::LowStock => metrics.low_stock_items += 1,
            StockStatus::InStock => {}
        }
        match item.expiry_status {
            ExpiryStatus::Expired => metrics.expired_items += 1,
            ExpiryStatus::NearExpiry => metrics.near_expiry_items += 1,
            ExpiryStatus::Ok | ExpiryStatus::NoExpiry => {}
        }
    }
}

/// Low-stock items, largest deficit first
fn low_stock_lines(items: Vec<StockItemDetail>) -> Vec<LowStockLine> {
    let mut lines: Vec<LowStockLine> = items
        .into_iter()
        .filter(|item| item.is_low_stock)
        .map(|item| LowStockLine {
            deficit: item.effective_reorder_threshold - item.item.quantity,
            item,
        })
        .collect();
    lines.sort_by(|a, b| {
        b.deficit
            .cmp(&a.deficit)
            .then_with(|| a.item.product_sku.cmp(&b.item.product_sku))
    });
    lines
}

fn aging_line(item: &StockItemDetail, today: NaiveDate) -> ProcurementAgingLine {
    let since = item.item.updated_at;
    ProcurementAgingLine {
        stock_item_id: item.item.id,
        product_sku: item.product_sku.clone(),
        warehouse_code: item.warehouse_code.clone(),
        batch_number: item.item.batch_number.clone(),
        procurement_status: item.item.procurement_status,
        quantity: item.item.quantity,
        since,
        age_days: (today - since.date_naive()).num_days().max(0),
    }
}

impl ReportingService {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            stock: StockService::new(db.clone(), clock.clone()),
            db,
            clock,
        }
    }

    pub async fn dashboard(&self) -> AppResult<DashboardMetrics> {
        let (total_products, active_products): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM products",
        )
        .fetch_one(&self.db)
        .await?;

        let (total_boms, active_boms): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM boms")
                .fetch_one(&self.db)
                .await?;

        let total_warehouses: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM warehouses WHERE is_active")
                .fetch_one(&self.db)
                .await?;

        let active_alerts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reorder_alerts WHERE status = 'active'")
                .fetch_one(&self.db)
                .await?;

        let pending_orders: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = 'pending'")
                .fetch_one(&self.db)
                .await?;

        let mut metrics = DashboardMetrics {
            total_products,
            active_products,
            total_boms,
            active_boms,
            total_warehouses,
            active_alerts,
            pending_orders,
            ..Default::default()
        };
        let items = self.stock.list_items(&StockFilter::default()).await?;
        tally_stock(&mut metrics, &items);

        Ok(metrics)
    }

    pub async fn low_stock(&self, warehouse_id: Option<Uuid>) -> AppResult<Vec<LowStockLine>> {
        let filter = StockFilter {
            warehouse_id,
            stock_status: Some(StockStatus::LowStock),
            ..Default::default()
        };
        let items = self.stock.list_items(&filter).await?;
        Ok(low_stock_lines(items))
    }

    /// Movements in the period, oldest first; defaults to the last 30 days
    pub async fn stock_ledger(&self, filter: &LedgerReportFilter) -> AppResult<StockLedgerReport> {
        let today = self.clock.today();
        let end = filter.end_date.unwrap_or(today);
        let start = filter.start_date.unwrap_or(end - Duration::days(30));
        let range = DateRange::new(start, end).map_err(|m| AppError::validation("start_date", m))?;

        let lines = sqlx::query_as::<_, LedgerLine>(
            r#"
            SELECT st.id AS transaction_id, st.stock_item_id, p.sku AS product_sku,
                   w.code AS warehouse_code, si.batch_number, st.kind, st.transfer_leg,
                   st.quantity, st.balance_after, st.reference, st.created_by, st.created_at
            FROM stock_transactions st
            JOIN stock_items si ON si.id = st.stock_item_id
            JOIN products p ON p.id = si.product_id
            JOIN warehouses w ON w.id = si.warehouse_id
            WHERE st.created_at::date BETWEEN $1 AND $2
              AND ($3::uuid IS NULL OR si.warehouse_id = $3)
              AND ($4::uuid IS NULL OR si.product_id = $4)
            ORDER BY st.seq
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(filter.warehouse_id)
        .bind(filter.product_id)
        .fetch_all(&self.db)
        .await?;

        let mut report = StockLedgerReport {
            start_date: range.start,
            end_date: range.end,
            total_in: Decimal::ZERO,
            total_out: Decimal::ZERO,
            adjustment_count: 0,
            transfer_count: 0,
            lines: Vec::new(),
        };
        for line in &lines {
            match line.kind.as_str() {
                "in" => report.total_in += line.quantity,
                "out" => report.total_out += line.quantity,
                "adjustment" => report.adjustment_count += 1,
                _ => report.transfer_count += 1,
            }
        }
        report.lines = lines;

        Ok(report)
    }

    /// Cost rollup of every BOM, most expensive first
    pub async fn bom_cost_analysis(&self, active_only: bool) -> AppResult<Vec<BomCostLine>> {
        let qualified_bom_columns = BOM_COLUMNS
            .split(", ")
            .map(|column| format!("b.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", ");

        let headers = sqlx::query_as::<_, BomHeaderRow>(&format!(
            r#"
            SELECT {}, p.sku AS product_sku, p.name AS product_name, p.selling_price
            FROM boms b
            JOIN products p ON p.id = b.product_id
            WHERE ($1 = FALSE OR b.is_active)
            "#,
            qualified_bom_columns
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        let bom_ids: Vec<Uuid> = headers.iter().map(|h| h.bom.id).collect();
        let component_rows = sqlx::query_as::<_, BomComponentRow>(&format!(
            "SELECT {} FROM bom_components c WHERE c.bom_id = ANY($1) ORDER BY c.position, c.id",
            BOM_COMPONENT_COLUMNS
        ))
        .bind(&bom_ids)
        .fetch_all(&self.db)
        .await?;

        let mut components: HashMap<Uuid, Vec<BomComponent>> = HashMap::new();
        for component in collect::<_, BomComponent>(component_rows) {
            components.entry(component.bom_id).or_default().push(component);
        }

        let mut lines: Vec<BomCostLine> = headers
            .into_iter()
            .map(|header| {
                let bom: Bom = header.bom.into();
                let parts = components.remove(&bom.id).unwrap_or_default();
                let cost = bom.cost_breakdown(&parts);
                BomCostLine {
                    bom_id: bom.id,
                    bom_code: bom.bom_code,
                    version: bom.version,
                    is_active: bom.is_active,
                    product_id: bom.product_id,
                    product_sku: header.product_sku,
                    product_name: header.product_name,
                    margin: header.selling_price - cost.total_cost,
                    selling_price: header.selling_price,
                    component_count: parts.len(),
                    cost,
                }
            })
            .collect();
        lines.sort_by(|a, b| {
            b.cost
                .total_cost
                .cmp(&a.cost.total_cost)
                .then_with(|| a.bom_code.cmp(&b.bom_code))
        });

        Ok(lines)
    }

    /// Summary of every active warehouse, ordered by code
    pub async fn warehouse_status(&self) -> AppResult<Vec<WarehouseStatus>> {
        let warehouses: Vec<Warehouse> = collect(
            sqlx::query_as::<_, WarehouseRow>(&format!(
                "SELECT {} FROM warehouses WHERE is_active ORDER BY code",
                WAREHOUSE_COLUMNS
            ))
            .fetch_all(&self.db)
            .await?,
        );

        let rows = sqlx::query_as::<_, WarehouseSnapshotRow>(
            r#"
            SELECT si.warehouse_id, si.quantity, si.unit_cost, si.reorder_threshold,
                   p.reorder_threshold AS product_reorder_threshold
            FROM stock_items si
            JOIN products p ON p.id = si.product_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut snapshots: HashMap<Uuid, Vec<StockSnapshot>> = HashMap::new();
        for row in rows {
            snapshots.entry(row.warehouse_id).or_default().push(StockSnapshot {
                quantity: row.quantity,
                unit_cost: row.unit_cost,
                effective_threshold: shared::models::resolve_reorder_threshold(
                    row.reorder_threshold,
                    Some(row.product_reorder_threshold),
                ),
            });
        }

        Ok(warehouses
            .into_iter()
            .map(|warehouse| WarehouseStatus {
                summary: summarize(snapshots.remove(&warehouse.id).unwrap_or_default()),
                warehouse,
            })
            .collect())
    }

    /// Items still ordered or pending, oldest first
    pub async fn procurement_aging(&self) -> AppResult<Vec<ProcurementAgingLine>> {
        let today = self.clock.today();
        let items = self.stock.list_items(&StockFilter::default()).await?;

        let mut lines: Vec<ProcurementAgingLine> = items
            .iter()
            .filter(|item| item.item.procurement_status != ProcurementStatus::Received)
            .map(|item| aging_line(item, today))
            .collect();
        lines.sort_by(|a, b| b.age_days.cmp(&a.age_days).then_with(|| a.product_sku.cmp(&b.product_sku)));

        Ok(lines)
    }

    /// Batches with stock on hand expiring within `within_days`, expired ones included
    pub async fn expiring_stock(&self, within_days: i64) -> AppResult<Vec<StockItemDetail>> {
        if within_days < 0 {
            return Err(AppError::validation("within_days", "Must not be negative"));
        }
        let horizon = self.clock.today() + Duration::days(within_days);
        let mut items: Vec<StockItemDetail> = self
            .stock
            .list_items(&StockFilter::default())
            .await?
            .into_iter()
            .filter(|item| item.item.quantity > Decimal::ZERO)
            .filter(|item| item.item.expiry_date.is_some_and(|date| date <= horizon))
            .collect();
        items.sort_by_key(|item| item.item.expiry_date);

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shared::models::StockItem;

    fn detail(sku: &str, quantity: Decimal, threshold: Decimal, expiry: Option<NaiveDate>) -> StockItemDetail {
        let now = Utc::now();
        let today = now.date_naive();
        let item = StockItem {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            batch_number: None,
            quantity,
            unit_cost: Some(dec!(2)),
            reorder_threshold: threshold,
            procurement_status: ProcurementStatus::Received,
            location: None,
            expiry_date: expiry,
            manufactured_date: None,
            notes: None,
            last_alert_sent: None,
            usage_rate: None,
            forecast_reorder_date: None,
            created_at: now,
            updated_at: now,
        };
        StockItemDetail {
            effective_reorder_threshold: threshold,
            is_low_stock: item.is_low_stock(Decimal::ZERO),
            stock_status: item.stock_status(Decimal::ZERO),
            expiry_status: item.expiry_status(today),
            total_value: item.total_value(),
            product_sku: sku.to_string(),
            product_name: sku.to_string(),
            warehouse_code: "WH-1".to_string(),
            item,
        }
    }

    #[test]
    fn test_low_stock_lines_sorted_by_deficit() {
        let lines = low_stock_lines(vec![
            detail("A", dec!(8), dec!(10), None),
            detail("B", dec!(1), dec!(10), None),
            detail("C", dec!(50), dec!(10), None),
            detail("D", dec!(0), dec!(10), None),
        ]);

        let skus: Vec<&str> = lines.iter().map(|l| l.item.product_sku.as_str()).collect();
        assert_eq!(skus, vec!["B", "A"]);
        assert_eq!(lines[0].deficit, dec!(9));
    }

    #[test]
    fn test_tally_stock() {
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        let mut metrics = DashboardMetrics::default();
        tally_stock(
            &mut metrics,
            &[
                detail("A", dec!(5), dec!(10), Some(yesterday)),
                detail("B", dec!(0), dec!(10), None),
                detail("C", dec!(20), dec!(10), None),
            ],
        );

        assert_eq!(metrics.total_stock_items, 3);
        assert_eq!(metrics.low_stock_items, 1);
        assert_eq!(metrics.out_of_stock_items, 1);
        assert_eq!(metrics.expired_items, 1);
        assert_eq!(metrics.total_stock_value, dec!(50));
    }
}

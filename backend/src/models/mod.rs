//! Database models for the IEEP ERP platform
//!
//! Re-exports models from the shared crate and adds the row types that map
//! PostgreSQL rows onto them. Enum columns are stored as text and parsed on
//! the way out.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub use shared::models::*;

#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub product_type: ProductType,
    pub category_id: Option<Uuid>,
    pub unit_of_measure_id: Uuid,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub reorder_threshold: Decimal,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id,
            sku: r.sku,
            name: r.name,
            description: r.description,
            product_type: r.product_type,
            category_id: r.category_id,
            unit_of_measure_id: r.unit_of_measure_id,
            cost_price: r.cost_price,
            selling_price: r.selling_price,
            reorder_threshold: r.reorder_threshold,
            is_active: r.is_active,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub const PRODUCT_COLUMNS: &str = "id, sku, name, description, product_type, category_id, \
    unit_of_measure_id, cost_price, selling_price, reorder_threshold, is_active, created_by, \
    created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct UnitOfMeasureRow {
    pub id: Uuid,
    pub name: String,
    pub symbol: String,
    pub description: Option<String>,
}

impl From<UnitOfMeasureRow> for UnitOfMeasure {
    fn from(r: UnitOfMeasureRow) -> Self {
        UnitOfMeasure {
            id: r.id,
            name: r.name,
            symbol: r.symbol,
            description: r.description,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category {
            id: r.id,
            name: r.name,
            parent_id: r.parent_id,
            description: r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BomRow {
    pub id: Uuid,
    pub bom_code: String,
    pub product_id: Uuid,
    pub version: i32,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub is_active: bool,
    pub is_draft: bool,
    pub effective_date: Option<NaiveDate>,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub expected_yield_percentage: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BomRow> for Bom {
    fn from(r: BomRow) -> Self {
        Bom {
            id: r.id,
            bom_code: r.bom_code,
            product_id: r.product_id,
            version: r.version,
            description: r.description,
            instructions: r.instructions,
            is_active: r.is_active,
            is_draft: r.is_draft,
            effective_date: r.effective_date,
            labor_cost: r.labor_cost,
            overhead_cost: r.overhead_cost,
            expected_yield_percentage: r.expected_yield_percentage,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub const BOM_COLUMNS: &str = "id, bom_code, product_id, version, description, instructions, \
    is_active, is_draft, effective_date, labor_cost, overhead_cost, expected_yield_percentage, \
    created_by, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct BomComponentRow {
    pub id: Uuid,
    pub bom_id: Uuid,
    pub component_id: Uuid,
    pub position: i32,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub waste_percentage: Decimal,
    pub notes: Option<String>,
}

impl From<BomComponentRow> for BomComponent {
    fn from(r: BomComponentRow) -> Self {
        BomComponent {
            id: r.id,
            bom_id: r.bom_id,
            component_id: r.component_id,
            position: r.position,
            quantity: r.quantity,
            unit_cost: r.unit_cost,
            waste_percentage: r.waste_percentage,
            notes: r.notes,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WarehouseRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<String>,
    pub manager_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WarehouseRow> for Warehouse {
    fn from(r: WarehouseRow) -> Self {
        Warehouse {
            id: r.id,
            code: r.code,
            name: r.name,
            description: r.description,
            location: r.location,
            capacity: r.capacity,
            manager_id: r.manager_id,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub const WAREHOUSE_COLUMNS: &str = "id, code, name, description, location, capacity, \
    manager_id, is_active, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct StockItemRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_number: Option<String>,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub reorder_threshold: Decimal,
    #[sqlx(try_from = "String")]
    pub procurement_status: ProcurementStatus,
    pub location: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub manufactured_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub last_alert_sent: Option<DateTime<Utc>>,
    pub usage_rate: Option<Decimal>,
    pub forecast_reorder_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StockItemRow> for StockItem {
    fn from(r: StockItemRow) -> Self {
        StockItem {
            id: r.id,
            product_id: r.product_id,
            warehouse_id: r.warehouse_id,
            batch_number: r.batch_number,
            quantity: r.quantity,
            unit_cost: r.unit_cost,
            reorder_threshold: r.reorder_threshold,
            procurement_status: r.procurement_status,
            location: r.location,
            expiry_date: r.expiry_date,
            manufactured_date: r.manufactured_date,
            notes: r.notes,
            last_alert_sent: r.last_alert_sent,
            usage_rate: r.usage_rate,
            forecast_reorder_date: r.forecast_reorder_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Stock item columns qualified with the `si` alias
pub const STOCK_ITEM_COLUMNS: &str = "si.id, si.product_id, si.warehouse_id, si.batch_number, \
    si.quantity, si.unit_cost, si.reorder_threshold, si.procurement_status, si.location, \
    si.expiry_date, si.manufactured_date, si.notes, si.last_alert_sent, si.usage_rate, \
    si.forecast_reorder_date, si.created_at, si.updated_at";

/// A stock item joined with the labels used in messages and reports
#[derive(Debug, Clone, FromRow)]
pub struct StockItemDetailRow {
    #[sqlx(flatten)]
    pub item: StockItemRow,
    pub product_sku: String,
    pub product_name: String,
    pub product_reorder_threshold: Decimal,
    pub warehouse_code: String,
}

/// Joins needed by [`StockItemDetailRow`]
pub const STOCK_ITEM_DETAIL_FROM: &str = "stock_items si \
    JOIN products p ON p.id = si.product_id \
    JOIN warehouses w ON w.id = si.warehouse_id";

pub const STOCK_ITEM_DETAIL_LABELS: &str = "p.sku AS product_sku, p.name AS product_name, \
    p.reorder_threshold AS product_reorder_threshold, w.code AS warehouse_code";

/// Stock item as returned by the API, with its derived state
#[derive(Debug, Clone, Serialize)]
pub struct StockItemDetail {
    #[serde(flatten)]
    pub item: StockItem,
    pub product_sku: String,
    pub product_name: String,
    pub warehouse_code: String,
    pub effective_reorder_threshold: Decimal,
    pub is_low_stock: bool,
    pub stock_status: StockStatus,
    pub expiry_status: ExpiryStatus,
    pub total_value: Decimal,
}

impl StockItemDetail {
    pub fn from_row(row: StockItemDetailRow, today: NaiveDate) -> Self {
        let item: StockItem = row.item.into();
        let default_threshold = row.product_reorder_threshold;
        StockItemDetail {
            effective_reorder_threshold: item.effective_reorder_threshold(default_threshold),
            is_low_stock: item.is_low_stock(default_threshold),
            stock_status: item.stock_status(default_threshold),
            expiry_status: item.expiry_status(today),
            total_value: item.total_value(),
            product_sku: row.product_sku,
            product_name: row.product_name,
            warehouse_code: row.warehouse_code,
            item,
        }
    }

    /// "SKU @ WAREHOUSE" label used in messages
    pub fn label(&self) -> String {
        format!("{} @ {}", self.product_sku, self.warehouse_code)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StockTransactionRow {
    pub id: Uuid,
    pub stock_item_id: Uuid,
    #[sqlx(try_from = "String")]
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub transfer_leg: Option<String>,
    pub transfer_group_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub balance_after: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StockTransactionRow> for StockTransaction {
    type Error = ParseEnumError;

    fn try_from(r: StockTransactionRow) -> Result<Self, Self::Error> {
        let transfer_leg = r.transfer_leg.map(TransferLeg::try_from).transpose()?;
        Ok(StockTransaction {
            id: r.id,
            stock_item_id: r.stock_item_id,
            kind: r.kind,
            quantity: r.quantity,
            transfer_leg,
            transfer_group_id: r.transfer_group_id,
            order_id: r.order_id,
            reference: r.reference,
            notes: r.notes,
            balance_after: r.balance_after,
            created_by: r.created_by,
            created_at: r.created_at,
        })
    }
}

pub const STOCK_TRANSACTION_COLUMNS: &str = "id, stock_item_id, kind, quantity, transfer_leg, \
    transfer_group_id, order_id, reference, notes, balance_after, created_by, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct ReorderAlertRow {
    pub id: Uuid,
    pub stock_item_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: AlertStatus,
    pub triggered_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReorderAlertRow> for ReorderAlert {
    fn from(r: ReorderAlertRow) -> Self {
        ReorderAlert {
            id: r.id,
            stock_item_id: r.stock_item_id,
            status: r.status,
            triggered_by: r.triggered_by,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub const REORDER_ALERT_COLUMNS: &str =
    "id, stock_item_id, status, triggered_by, notes, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub warehouse_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(r: OrderRow) -> Self {
        Order {
            id: r.id,
            order_number: r.order_number,
            warehouse_id: r.warehouse_id,
            status: r.status,
            notes: r.notes,
            created_by: r.created_by,
            confirmed_at: r.confirmed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub const ORDER_COLUMNS: &str = "id, order_number, warehouse_id, status, notes, created_by, \
    confirmed_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        OrderItem {
            id: r.id,
            order_id: r.order_id,
            product_id: r.product_id,
            quantity: r.quantity,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RoleRow {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub name: RoleName,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(r: RoleRow) -> Self {
        Role {
            id: r.id,
            name: r.name,
            description: r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role_id: Option<Uuid>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub is_active: bool,
    pub last_login_ip: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            role_id: r.role_id,
            phone: r.phone,
            department: r.department,
            is_active: r.is_active,
            last_login_ip: r.last_login_ip,
            last_login_at: r.last_login_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub const USER_COLUMNS: &str = "id, username, email, first_name, last_name, role_id, phone, \
    department, is_active, last_login_ip, last_login_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub action: AuditAction,
    pub model_name: String,
    pub object_id: Option<String>,
    pub object_repr: Option<String>,
    pub changes: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<AuditLogRow> for AuditLog {
    fn from(r: AuditLogRow) -> Self {
        AuditLog {
            id: r.id,
            user_id: r.user_id,
            action: r.action,
            model_name: r.model_name,
            object_id: r.object_id,
            object_repr: r.object_repr,
            changes: r.changes,
            ip_address: r.ip_address,
            timestamp: r.timestamp,
        }
    }
}

/// Convert a vector of rows into domain models
pub fn collect<R, T: From<R>>(rows: Vec<R>) -> Vec<T> {
    rows.into_iter().map(T::from).collect()
}

//! Warehouse models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Free-form capacity label, e.g. "1200 pallets"
    pub capacity: Option<String>,
    pub manager_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate of the stock items held in one warehouse
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarehouseSummary {
    pub total_items: i64,
    pub total_value: Decimal,
    pub low_stock_count: i64,
}

/// Per-item facts needed for a warehouse summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockSnapshot {
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub effective_threshold: Decimal,
}

pub fn summarize<I>(items: I) -> WarehouseSummary
where
    I: IntoIterator<Item = StockSnapshot>,
{
    items.into_iter().fold(WarehouseSummary::default(), |mut acc, item| {
        acc.total_items += 1;
        acc.total_value += item.unit_cost.map_or(Decimal::ZERO, |cost| item.quantity * cost);
        if super::is_low_stock(item.quantity, item.effective_threshold) {
            acc.low_stock_count += 1;
        }
        acc
    })
}

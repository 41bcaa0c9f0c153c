//! Stock ledger models
//!
//! A [`StockItem`] is the on-hand balance of one product batch in one
//! warehouse. Its quantity only changes through [`Movement`]s, each of which is
//! persisted as an immutable [`StockTransaction`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::validation::AMOUNT_SCALE;

/// Days before expiry at which a batch counts as near expiry
pub const NEAR_EXPIRY_DAYS: i64 = 30;

/// Procurement state of a stock item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcurementStatus {
    Ordered,
    Received,
    #[default]
    Pending,
}

string_enum!(ProcurementStatus, "procurement status", {
    Ordered => "ordered",
    Received => "received",
    Pending => "pending",
});

/// Kind of a stock transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    In,
    Out,
    /// Sets the quantity to an absolute value
    Adjustment,
    /// One leg of a transfer between two stock items
    Transfer,
}

string_enum!(TransactionKind, "transaction kind", {
    In => "in",
    Out => "out",
    Adjustment => "adjustment",
    Transfer => "transfer",
});

/// Which side of a transfer a transaction records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferLeg {
    Source,
    Destination,
}

string_enum!(TransferLeg, "transfer leg", {
    Source => "source",
    Destination => "destination",
});

/// Derived stock level classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

string_enum!(StockStatus, "stock status", {
    OutOfStock => "out_of_stock",
    LowStock => "low_stock",
    InStock => "in_stock",
});

/// Derived expiry classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired,
    NearExpiry,
    Ok,
    NoExpiry,
}

string_enum!(ExpiryStatus, "expiry status", {
    Expired => "expired",
    NearExpiry => "near_expiry",
    Ok => "ok",
    NoExpiry => "no_expiry",
});

/// Resolve the threshold a stock item is measured against.
///
/// A non-zero item threshold wins; otherwise the product default applies;
/// without either the threshold is zero.
pub fn resolve_reorder_threshold(item_threshold: Decimal, product_default: Option<Decimal>) -> Decimal {
    if !item_threshold.is_zero() {
        item_threshold
    } else {
        product_default.unwrap_or(Decimal::ZERO)
    }
}

/// Threshold stored on a new stock item: the explicit value, else the product default
pub fn seed_reorder_threshold(explicit: Option<Decimal>, product_default: Decimal) -> Decimal {
    explicit.unwrap_or(product_default)
}

/// Low stock means some quantity is left, but no more than the threshold
pub fn is_low_stock(quantity: Decimal, threshold: Decimal) -> bool {
    quantity > Decimal::ZERO && quantity <= threshold
}

pub fn classify_stock(quantity: Decimal, threshold: Decimal) -> StockStatus {
    if quantity <= Decimal::ZERO {
        StockStatus::OutOfStock
    } else if quantity <= threshold {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

pub fn classify_expiry(expiry_date: Option<NaiveDate>, today: NaiveDate) -> ExpiryStatus {
    match expiry_date {
        None => ExpiryStatus::NoExpiry,
        Some(date) if date < today => ExpiryStatus::Expired,
        Some(date) if date <= today + Duration::days(NEAR_EXPIRY_DAYS) => ExpiryStatus::NearExpiry,
        Some(_) => ExpiryStatus::Ok,
    }
}

/// On-hand inventory of one (product, warehouse, batch)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_number: Option<String>,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    /// Zero means "use the product default"
    pub reorder_threshold: Decimal,
    pub procurement_status: ProcurementStatus,
    /// Bin or shelf label inside the warehouse
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

impl StockItem {
    pub fn effective_reorder_threshold(&self, product_default: Decimal) -> Decimal {
        resolve_reorder_threshold(self.reorder_threshold, Some(product_default))
    }

    pub fn is_low_stock(&self, product_default: Decimal) -> bool {
        is_low_stock(self.quantity, self.effective_reorder_threshold(product_default))
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity <= Decimal::ZERO
    }

    pub fn stock_status(&self, product_default: Decimal) -> StockStatus {
        classify_stock(self.quantity, self.effective_reorder_threshold(product_default))
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map_or(false, |date| date < today)
    }

    pub fn expiry_status(&self, today: NaiveDate) -> ExpiryStatus {
        classify_expiry(self.expiry_date, today)
    }

    pub fn total_value(&self) -> Decimal {
        self.unit_cost
            .map_or(Decimal::ZERO, |cost| self.quantity * cost)
    }

    /// How far the quantity sits below the threshold (negative when above)
    pub fn stock_deficit(&self, product_default: Decimal) -> Decimal {
        self.effective_reorder_threshold(product_default) - self.quantity
    }
}

/// Reasons a movement cannot be applied
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("quantity must not be negative")]
    NegativeAmount,

    #[error("{0} quantity must be greater than zero")]
    ZeroAmount(TransactionKind),

    #[error("quantity must have at most {0} decimal places")]
    TooPrecise(u32),

    #[error("transfer movements must name a transfer leg")]
    TransferWithoutLeg,

    #[error("only transfer movements may name a transfer leg")]
    UnexpectedLeg,

    #[error("insufficient stock: {available} on hand, {requested} requested")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },
}

/// A requested change to one stock item's quantity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Movement {
    pub kind: TransactionKind,
    pub leg: Option<TransferLeg>,
    pub amount: Decimal,
}

impl Movement {
    pub fn new(kind: TransactionKind, amount: Decimal) -> Self {
        Self {
            kind,
            leg: None,
            amount,
        }
    }

    pub fn transfer(leg: TransferLeg, amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::Transfer,
            leg: Some(leg),
            amount,
        }
    }

    /// Check the movement on its own, before looking at any balance
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount);
        }
        if self.amount.normalize().scale() > AMOUNT_SCALE {
            return Err(LedgerError::TooPrecise(AMOUNT_SCALE));
        }
        match (self.kind, self.leg) {
            (TransactionKind::Transfer, None) => return Err(LedgerError::TransferWithoutLeg),
            (TransactionKind::Transfer, Some(_)) => {}
            (_, Some(_)) => return Err(LedgerError::UnexpectedLeg),
            _ => {}
        }
        if self.amount.is_zero() && self.kind != TransactionKind::Adjustment {
            return Err(LedgerError::ZeroAmount(self.kind));
        }
        Ok(())
    }

    /// Signed change this movement makes, or `None` for an absolute set
    pub fn delta(&self) -> Option<Decimal> {
        match (self.kind, self.leg) {
            (TransactionKind::In, _) => Some(self.amount),
            (TransactionKind::Out, _) => Some(-self.amount),
            (TransactionKind::Adjustment, _) => None,
            (TransactionKind::Transfer, Some(TransferLeg::Source)) => Some(-self.amount),
            (TransactionKind::Transfer, Some(TransferLeg::Destination)) => Some(self.amount),
            (TransactionKind::Transfer, None) => Some(Decimal::ZERO),
        }
    }

    /// Quantity after this movement, without any guard
    pub fn effect(&self, current: Decimal) -> Decimal {
        match self.delta() {
            Some(delta) => current + delta,
            None => self.amount,
        }
    }

    /// Validate and apply the movement to `current`.
    ///
    /// Decreases that would take the balance below zero are rejected; stock
    /// is never allowed to go negative.
    pub fn apply(&self, current: Decimal) -> Result<Decimal, LedgerError> {
        self.validate()?;
        let next = self.effect(current);
        if next < Decimal::ZERO {
            return Err(LedgerError::InsufficientStock {
                available: current,
                requested: self.amount,
            });
        }
        Ok(next)
    }
}

/// Rebuild a balance from its movements, oldest first
pub fn replay<'a, I>(movements: I) -> Decimal
where
    I: IntoIterator<Item = &'a Movement>,
{
    movements
        .into_iter()
        .fold(Decimal::ZERO, |balance, movement| movement.effect(balance))
}

/// Result of comparing a stored balance with its transaction history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reconciliation {
    pub recorded: Decimal,
    pub replayed: Decimal,
    pub drift: Decimal,
}

impl Reconciliation {
    pub fn new(recorded: Decimal, replayed: Decimal) -> Self {
        Self {
            recorded,
            replayed,
            drift: recorded - replayed,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

/// Immutable record of one applied movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: Uuid,
    pub stock_item_id: Uuid,
    pub kind: TransactionKind,
    pub quantity: Decimal,
    pub transfer_leg: Option<TransferLeg>,
    /// Shared by both legs of a transfer
    pub transfer_group_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    /// External document number (PO, work order, order number)
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub balance_after: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    pub fn movement(&self) -> Movement {
        Movement {
            kind: self.kind,
            leg: self.transfer_leg,
            amount: self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: Decimal, threshold: Decimal) -> StockItem {
        let now = Utc::now();
        StockItem {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            batch_number: Some("B1".to_string()),
            quantity,
            unit_cost: None,
            reorder_threshold: threshold,
            procurement_status: ProcurementStatus::default(),
            location: None,
            expiry_date: None,
            manufactured_date: None,
            notes: None,
            last_alert_sent: None,
            usage_rate: None,
            forecast_reorder_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_threshold_prefers_item_value() {
        assert_eq!(resolve_reorder_threshold(dec!(5), Some(dec!(20))), dec!(5));
        assert_eq!(resolve_reorder_threshold(dec!(0), Some(dec!(20))), dec!(20));
        assert_eq!(resolve_reorder_threshold(dec!(0), None), dec!(0));
    }

    #[test]
    fn test_seed_threshold() {
        assert_eq!(seed_reorder_threshold(None, dec!(12)), dec!(12));
        assert_eq!(seed_reorder_threshold(Some(dec!(3)), dec!(12)), dec!(3));
    }

    #[test]
    fn test_low_stock_excludes_empty_items() {
        assert!(item(dec!(5), dec!(10)).is_low_stock(dec!(0)));
        assert!(item(dec!(10), dec!(10)).is_low_stock(dec!(0)));
        assert!(!item(dec!(11), dec!(10)).is_low_stock(dec!(0)));
        assert!(!item(dec!(0), dec!(10)).is_low_stock(dec!(0)));
        assert!(!item(dec!(-2), dec!(10)).is_low_stock(dec!(0)));
    }

    #[test]
    fn test_low_stock_uses_product_default() {
        let stock = item(dec!(4), dec!(0));
        assert!(stock.is_low_stock(dec!(5)));
        assert!(!stock.is_low_stock(dec!(3)));
        assert_eq!(stock.stock_deficit(dec!(5)), dec!(1));
    }

    #[test]
    fn test_stock_status() {
        assert_eq!(classify_stock(dec!(0), dec!(5)), StockStatus::OutOfStock);
        assert_eq!(classify_stock(dec!(5), dec!(5)), StockStatus::LowStock);
        assert_eq!(classify_stock(dec!(6), dec!(5)), StockStatus::InStock);
        assert_eq!(classify_stock(dec!(1), dec!(0)), StockStatus::InStock);
    }

    #[test]
    fn test_expiry() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut stock = item(dec!(1), dec!(0));
        assert!(!stock.is_expired(today));
        assert_eq!(stock.expiry_status(today), ExpiryStatus::NoExpiry);

        stock.expiry_date = NaiveDate::from_ymd_opt(2024, 5, 31);
        assert!(stock.is_expired(today));

        stock.expiry_date = Some(today);
        assert!(!stock.is_expired(today));
        assert_eq!(stock.expiry_status(today), ExpiryStatus::NearExpiry);

        stock.expiry_date = NaiveDate::from_ymd_opt(2024, 7, 1);
        assert_eq!(stock.expiry_status(today), ExpiryStatus::NearExpiry);

        stock.expiry_date = NaiveDate::from_ymd_opt(2024, 7, 2);
        assert_eq!(stock.expiry_status(today), ExpiryStatus::Ok);
    }

    #[test]
    fn test_total_value() {
        let mut stock = item(dec!(4), dec!(0));
        assert_eq!(stock.total_value(), Decimal::ZERO);
        stock.unit_cost = Some(dec!(2.50));
        assert_eq!(stock.total_value(), dec!(10.00));
    }

    #[test]
    fn test_movement_rules() {
        assert_eq!(Movement::new(TransactionKind::In, dec!(5)).apply(dec!(10)), Ok(dec!(15)));
        assert_eq!(Movement::new(TransactionKind::Out, dec!(5)).apply(dec!(10)), Ok(dec!(5)));
        assert_eq!(
            Movement::new(TransactionKind::Adjustment, dec!(3)).apply(dec!(10)),
            Ok(dec!(3))
        );
        assert_eq!(
            Movement::new(TransactionKind::Adjustment, dec!(0)).apply(dec!(10)),
            Ok(dec!(0))
        );
        assert_eq!(
            Movement::transfer(TransferLeg::Source, dec!(4)).apply(dec!(10)),
            Ok(dec!(6))
        );
        assert_eq!(
            Movement::transfer(TransferLeg::Destination, dec!(4)).apply(dec!(10)),
            Ok(dec!(14))
        );
    }

    #[test]
    fn test_movement_rejections() {
        assert_eq!(
            Movement::new(TransactionKind::In, dec!(-1)).apply(dec!(10)),
            Err(LedgerError::NegativeAmount)
        );
        assert_eq!(
            Movement::new(TransactionKind::Out, dec!(0)).apply(dec!(10)),
            Err(LedgerError::ZeroAmount(TransactionKind::Out))
        );
        assert_eq!(
            Movement::new(TransactionKind::Transfer, dec!(1)).apply(dec!(10)),
            Err(LedgerError::TransferWithoutLeg)
        );
        assert_eq!(
            Movement::new(TransactionKind::Out, dec!(11)).apply(dec!(10)),
            Err(LedgerError::InsufficientStock {
                available: dec!(10),
                requested: dec!(11),
            })
        );
    }

    #[test]
    fn test_replay_with_adjustment_checkpoint() {
        let history = [
            Movement::new(TransactionKind::In, dec!(50)),
            Movement::new(TransactionKind::Out, dec!(20)),
            Movement::new(TransactionKind::Adjustment, dec!(12)),
            Movement::new(TransactionKind::In, dec!(3)),
            Movement::transfer(TransferLeg::Source, dec!(5)),
        ];
        assert_eq!(replay(&history), dec!(10));
        assert!(Reconciliation::new(dec!(10), replay(&history)).is_consistent());
        assert_eq!(Reconciliation::new(dec!(11), replay(&history)).drift, dec!(1));
    }
}

//! Order models and batch allocation planning

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Order lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Shipped, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub warehouse_id: Uuid,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Reference text written on the stock transactions of this order
    pub fn stock_reference(&self) -> String {
        format!("Order {}", self.order_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
}

/// A locked stock item that may fill an order line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCandidate {
    pub stock_item_id: Uuid,
    pub product_id: Uuid,
    pub batch_number: Option<String>,
    pub quantity: Decimal,
}

/// An order line to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationLine {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

/// Deduction of one order line from one batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub stock_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub balance_after: Decimal,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("no single batch of product {product_id} holds {requested} (largest batch: {largest_available})")]
    Insufficient {
        product_id: Uuid,
        requested: Decimal,
        largest_available: Decimal,
    },

    #[error("order quantity must be greater than zero")]
    NonPositiveQuantity { product_id: Uuid },
}

/// Plan the batch deduction for every line of an order.
///
/// Each line is taken whole from the first candidate (in the given order)
/// of its product that still holds at least the requested quantity; lines
/// are never split across batches. Quantities taken by earlier lines are
/// no longer available to later ones. The first line that cannot be filled
/// fails the whole plan.
pub fn plan_allocations(
    lines: &[AllocationLine],
    candidates: &[BatchCandidate],
) -> Result<Vec<Allocation>, AllocationError> {
    let mut remaining: Vec<Decimal> = candidates.iter().map(|c| c.quantity).collect();
    let mut allocations = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity <= Decimal::ZERO {
            return Err(AllocationError::NonPositiveQuantity {
                product_id: line.product_id,
            });
        }

        let chosen = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.product_id == line.product_id)
            .find(|(idx, _)| remaining[*idx] >= line.quantity);

        match chosen {
            Some((idx, candidate)) => {
                remaining[idx] -= line.quantity;
                allocations.push(Allocation {
                    stock_item_id: candidate.stock_item_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    balance_after: remaining[idx],
                });
            }
            None => {
                let largest_available = candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.product_id == line.product_id)
                    .map(|(idx, _)| remaining[idx])
                    .max()
                    .unwrap_or(Decimal::ZERO);
                return Err(AllocationError::Insufficient {
                    product_id: line.product_id,
                    requested: line.quantity,
                    largest_available,
                });
            }
        }
    }

    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn batch(product_id: Uuid, number: &str, quantity: Decimal) -> BatchCandidate {
        BatchCandidate {
            stock_item_id: Uuid::new_v4(),
            product_id,
            batch_number: Some(number.to_string()),
            quantity,
        }
    }

    #[test]
    fn test_order_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(Delivered.is_terminal());
    }

    #[test]
    fn test_first_sufficient_batch_wins() {
        let product = Uuid::new_v4();
        let candidates = vec![
            batch(product, "B1", dec!(3)),
            batch(product, "B2", dec!(10)),
            batch(product, "B3", dec!(20)),
        ];
        let lines = [AllocationLine {
            product_id: product,
            quantity: dec!(7),
        }];

        let plan = plan_allocations(&lines, &candidates).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].stock_item_id, candidates[1].stock_item_id);
        assert_eq!(plan[0].balance_after, dec!(3));
    }

    #[test]
    fn test_confirm_then_reject_second_order() {
        let product = Uuid::new_v4();
        let candidates = vec![batch(product, "B1", dec!(10))];

        let first = plan_allocations(
            &[AllocationLine {
                product_id: product,
                quantity: dec!(7),
            }],
            &candidates,
        )
        .unwrap();
        assert_eq!(first[0].balance_after, dec!(3));

        let after = vec![BatchCandidate {
            quantity: first[0].balance_after,
            ..candidates[0].clone()
        }];
        let second = plan_allocations(
            &[AllocationLine {
                product_id: product,
                quantity: dec!(5),
            }],
            &after,
        );
        assert_eq!(
            second,
            Err(AllocationError::Insufficient {
                product_id: product,
                requested: dec!(5),
                largest_available: dec!(3),
            })
        );
    }

    #[test]
    fn test_lines_share_remaining_quantity() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let candidates = vec![batch(a, "A1", dec!(10)), batch(b, "B1", dec!(4))];
        let lines = [
            AllocationLine {
                product_id: a,
                quantity: dec!(6),
            },
            AllocationLine {
                product_id: b,
                quantity: dec!(4),
            },
            AllocationLine {
                product_id: a,
                quantity: dec!(5),
            },
        ];

        assert!(matches!(
            plan_allocations(&lines, &candidates),
            Err(AllocationError::Insufficient { product_id, .. }) if product_id == a
        ));
    }

    #[test]
    fn test_missing_product_and_zero_quantity() {
        let product = Uuid::new_v4();
        let lines = [AllocationLine {
            product_id: product,
            quantity: dec!(1),
        }];
        assert!(matches!(
            plan_allocations(&lines, &[]),
            Err(AllocationError::Insufficient { largest_available, .. }) if largest_available.is_zero()
        ));

        let zero = [AllocationLine {
            product_id: product,
            quantity: dec!(0),
        }];
        assert_eq!(
            plan_allocations(&zero, &[batch(product, "B1", dec!(5))]),
            Err(AllocationError::NonPositiveQuantity { product_id: product })
        );
    }
}

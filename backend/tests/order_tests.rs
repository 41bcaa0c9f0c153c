//! Order confirmation tests
//!
//! Tests for batch allocation and the order lifecycle:
//! - Each line is taken whole from the first batch that can cover it
//! - A line no batch can cover fails the whole confirmation
//! - Status transitions follow the order state machine

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::models::{
    plan_allocations, AllocationError, AllocationLine, BatchCandidate, OrderStatus,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn batch(product_id: Uuid, number: &str, quantity: &str) -> BatchCandidate {
    BatchCandidate {
        stock_item_id: Uuid::new_v4(),
        product_id,
        batch_number: Some(number.to_string()),
        quantity: dec(quantity),
    }
}

fn line(product_id: Uuid, quantity: &str) -> AllocationLine {
    AllocationLine {
        product_id,
        quantity: dec(quantity),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_line_taken_from_first_sufficient_batch() {
        let product = Uuid::new_v4();
        let candidates = vec![batch(product, "B1", "3"), batch(product, "B2", "10")];

        let plan = plan_allocations(&[line(product, "5")], &candidates).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].stock_item_id, candidates[1].stock_item_id);
        assert_eq!(plan[0].balance_after, dec("5"));
    }

    #[test]
    fn test_second_order_cannot_oversell_remainder() {
        let product = Uuid::new_v4();
        let mut candidates = vec![batch(product, "B1", "10")];

        let first = plan_allocations(&[line(product, "7")], &candidates).unwrap();
        assert_eq!(first[0].quantity, dec("7"));
        assert_eq!(first[0].balance_after, dec("3"));

        candidates[0].quantity = first[0].balance_after;
        let err = plan_allocations(&[line(product, "5")], &candidates).unwrap_err();
        assert!(matches!(
            err,
            AllocationError::Insufficient { largest_available, .. } if largest_available == dec("3")
        ));
    }

    #[test]
    fn test_lines_are_never_split() {
        let product = Uuid::new_v4();
        // 4 + 4 would cover 6, but no single batch does
        let candidates = vec![batch(product, "B1", "4"), batch(product, "B2", "4")];

        let err = plan_allocations(&[line(product, "6")], &candidates).unwrap_err();

        assert_eq!(
            err,
            AllocationError::Insufficient {
                product_id: product,
                requested: dec("6"),
                largest_available: dec("4"),
            }
        );
    }

    #[test]
    fn test_earlier_lines_consume_stock() {
        let product = Uuid::new_v4();
        let candidates = vec![batch(product, "B1", "10")];

        let plan =
            plan_allocations(&[line(product, "6"), line(product, "4")], &candidates).unwrap();
        assert_eq!(plan[1].balance_after, Decimal::ZERO);

        let err = plan_allocations(&[line(product, "6"), line(product, "5")], &candidates)
            .unwrap_err();
        assert!(matches!(
            err,
            AllocationError::Insufficient { largest_available, .. } if largest_available == dec("4")
        ));
    }

    #[test]
    fn test_other_products_are_ignored() {
        let wanted = Uuid::new_v4();
        let other = Uuid::new_v4();
        let candidates = vec![batch(other, "X1", "100")];

        let err = plan_allocations(&[line(wanted, "1")], &candidates).unwrap_err();
        assert!(matches!(
            err,
            AllocationError::Insufficient { largest_available, .. } if largest_available.is_zero()
        ));
    }

    #[test]
    fn test_non_positive_line_rejected() {
        let product = Uuid::new_v4();
        let candidates = vec![batch(product, "B1", "10")];
        assert_eq!(
            plan_allocations(&[line(product, "0")], &candidates),
            Err(AllocationError::NonPositiveQuantity { product_id: product })
        );
    }

    #[test]
    fn test_status_machine() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));

        assert!(Delivered.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Confirmed.is_terminal());
    }

    #[test]
    fn test_status_wire_form() {
        assert_eq!(OrderStatus::from_str("confirmed"), Ok(OrderStatus::Confirmed));
        assert!(OrderStatus::from_str("Confirmed").is_err());
        assert_eq!(OrderStatus::default().as_str(), "pending");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=5000i64).prop_map(|n| Decimal::new(n, 1))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A successful plan never overdraws a batch, and each line is filled whole
        #[test]
        fn prop_plan_never_overdraws(
            batch_sizes in prop::collection::vec(quantity_strategy(), 1..6),
            requests in prop::collection::vec(quantity_strategy(), 1..6)
        ) {
            let product = Uuid::new_v4();
            let candidates: Vec<BatchCandidate> = batch_sizes
                .iter()
                .enumerate()
                .map(|(i, q)| BatchCandidate {
                    stock_item_id: Uuid::new_v4(),
                    product_id: product,
                    batch_number: Some(format!("B{}", i)),
                    quantity: *q,
                })
                .collect();
            let lines: Vec<AllocationLine> = requests
                .iter()
                .map(|q| AllocationLine { product_id: product, quantity: *q })
                .collect();

            if let Ok(plan) = plan_allocations(&lines, &candidates) {
                prop_assert_eq!(plan.len(), lines.len());
                for (allocation, line) in plan.iter().zip(&lines) {
                    prop_assert_eq!(allocation.quantity, line.quantity);
                    prop_assert!(allocation.balance_after >= Decimal::ZERO);
                }

                for candidate in &candidates {
                    let taken: Decimal = plan
                        .iter()
                        .filter(|a| a.stock_item_id == candidate.stock_item_id)
                        .map(|a| a.quantity)
                        .sum();
                    prop_assert!(taken <= candidate.quantity);
                }
            }
        }

        /// A line larger than every batch always fails
        #[test]
        fn prop_oversized_line_fails(
            batch_sizes in prop::collection::vec(quantity_strategy(), 1..6),
            excess in quantity_strategy()
        ) {
            let product = Uuid::new_v4();
            let candidates: Vec<BatchCandidate> = batch_sizes
                .iter()
                .map(|q| BatchCandidate {
                    stock_item_id: Uuid::new_v4(),
                    product_id: product,
                    batch_number: None,
                    quantity: *q,
                })
                .collect();
            let largest = batch_sizes.iter().copied().max().unwrap();
            let lines = [AllocationLine { product_id: product, quantity: largest + excess }];

            let is_insufficient = matches!(
                plan_allocations(&lines, &candidates),
                Err(AllocationError::Insufficient { .. })
            );
            prop_assert!(is_insufficient);
        }
    }
}

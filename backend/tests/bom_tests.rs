//! Bill of materials tests
//!
//! Tests for BOM costing and versioning:
//! - Waste-adjusted component quantities
//! - Cost rollup with labor and overhead
//! - At most one active BOM per product

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::models::{
    activate_bom, effective_quantity, estimate_material_cost, rollup_costs, Bom, BomComponent,
    CostEstimateLine, CostLine,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn bom(product_id: Uuid, version: i32, is_active: bool) -> Bom {
    let now = Utc::now();
    Bom {
        id: Uuid::new_v4(),
        bom_code: format!("BOM-{:03}", version),
        product_id,
        version,
        description: None,
        instructions: None,
        is_active,
        is_draft: !is_active,
        effective_date: None,
        labor_cost: dec("3"),
        overhead_cost: dec("2"),
        expected_yield_percentage: dec("100"),
        created_by: None,
        created_at: now,
        updated_at: now,
    }
}

fn component(bom_id: Uuid, quantity: &str, unit_cost: &str, waste: &str) -> BomComponent {
    BomComponent {
        id: Uuid::new_v4(),
        bom_id,
        component_id: Uuid::new_v4(),
        position: 1,
        quantity: dec(quantity),
        unit_cost: dec(unit_cost),
        waste_percentage: dec(waste),
        notes: None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_component_costing() {
        let recipe = bom(Uuid::new_v4(), 1, false);
        let line = component(recipe.id, "2", "5.00", "10");

        assert_eq!(line.effective_quantity(), dec("2.2"));
        assert_eq!(line.total_cost(), dec("10.00"));
        assert_eq!(line.waste_adjusted_cost(), dec("11.00"));
    }

    #[test]
    fn test_bom_total_includes_labor_and_overhead() {
        let recipe = bom(Uuid::new_v4(), 1, false);
        let components = vec![component(recipe.id, "2", "5.00", "10")];

        assert_eq!(recipe.total_material_cost(&components), dec("10.00"));
        assert_eq!(recipe.total_cost(&components), dec("15.00"));

        let breakdown = recipe.cost_breakdown(&components);
        assert_eq!(breakdown.total_cost, dec("15.00"));
        assert_eq!(breakdown.waste_adjusted_material_cost, dec("11.00"));
    }

    #[test]
    fn test_empty_bom_costs_only_fixed_costs() {
        let recipe = bom(Uuid::new_v4(), 1, false);
        assert_eq!(recipe.total_cost(&[]), dec("5"));
    }

    #[test]
    fn test_yield_scales_unit_cost() {
        let breakdown = rollup_costs(
            vec![CostLine {
                quantity: dec("4"),
                unit_cost: dec("2.50"),
                waste_percentage: Decimal::ZERO,
            }],
            Decimal::ZERO,
            Decimal::ZERO,
            dec("80"),
        );
        assert_eq!(breakdown.total_cost, dec("10.00"));
        assert_eq!(breakdown.cost_per_yielded_unit, Some(dec("12.5")));

        let no_yield = rollup_costs(Vec::new(), dec("1"), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(no_yield.cost_per_yielded_unit, None);
    }

    #[test]
    fn test_estimate_rounds_to_cents() {
        let lines = [CostEstimateLine {
            quantity: dec("1"),
            waste_percentage: dec("0.5"),
            cost_price: dec("0.99"),
        }];
        // 1.005 * 0.99 = 0.99495
        assert_eq!(estimate_material_cost(&lines), dec("0.99"));
    }

    #[test]
    fn test_activation_demotes_previous_version() {
        let product = Uuid::new_v4();
        let mut boms = vec![bom(product, 1, true), bom(product, 2, false)];
        let (old, new) = (boms[0].id, boms[1].id);

        let changed = activate_bom(&mut boms, new).unwrap();

        assert_eq!(changed.len(), 2);
        assert!(changed.contains(&old) && changed.contains(&new));
        assert!(!boms[0].is_active && boms[0].is_draft);
        assert!(boms[1].is_active && !boms[1].is_draft);
        assert!(boms[0].is_editable());
        assert!(!boms[1].is_editable());
    }

    #[test]
    fn test_activating_active_bom_changes_nothing() {
        let product = Uuid::new_v4();
        let mut boms = vec![bom(product, 1, true), bom(product, 2, false)];
        let active = boms[0].id;

        assert_eq!(activate_bom(&mut boms, active), Some(Vec::new()));
        assert!(activate_bom(&mut boms, Uuid::new_v4()).is_none());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn cost_line_strategy() -> impl Strategy<Value = CostLine> {
        (1i64..=10000i64, 0i64..=100000i64, 0i64..=500i64).prop_map(|(q, c, w)| CostLine {
            quantity: Decimal::new(q, 2),
            unit_cost: Decimal::new(c, 2),
            waste_percentage: Decimal::new(w, 1),
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Waste never reduces the quantity and zero waste changes nothing
        #[test]
        fn prop_effective_quantity_bounds(
            quantity in (1i64..=100000i64).prop_map(|n| Decimal::new(n, 2)),
            waste in (0i64..=1000i64).prop_map(|n| Decimal::new(n, 1))
        ) {
            prop_assert!(effective_quantity(quantity, waste) >= quantity);
            prop_assert_eq!(effective_quantity(quantity, Decimal::ZERO), quantity);
        }

        /// Total cost is material plus labor plus overhead
        #[test]
        fn prop_rollup_total(
            lines in prop::collection::vec(cost_line_strategy(), 0..12),
            labor in (0i64..=100000i64).prop_map(|n| Decimal::new(n, 2)),
            overhead in (0i64..=100000i64).prop_map(|n| Decimal::new(n, 2))
        ) {
            let material: Decimal = lines.iter().map(|l| l.quantity * l.unit_cost).sum();
            let breakdown = rollup_costs(lines.clone(), labor, overhead, Decimal::ONE_HUNDRED);

            prop_assert_eq!(breakdown.material_cost, material);
            prop_assert_eq!(breakdown.total_cost, material + labor + overhead);
            prop_assert!(breakdown.waste_adjusted_material_cost >= breakdown.material_cost);
            prop_assert_eq!(breakdown.cost_per_yielded_unit, Some(breakdown.total_cost));
        }

        /// After any activation sequence exactly one BOM of the product is active
        #[test]
        fn prop_single_active_bom(
            count in 1usize..8,
            initially_active in prop::collection::vec(any::<bool>(), 8),
            picks in prop::collection::vec(0usize..8, 1..10)
        ) {
            let product = Uuid::new_v4();
            let mut boms: Vec<Bom> = (0..count)
                .map(|i| bom(product, i as i32 + 1, initially_active[i]))
                .collect();

            for pick in picks {
                let target = boms[pick % count].id;
                prop_assert!(activate_bom(&mut boms, target).is_some());

                let active: Vec<&Bom> = boms.iter().filter(|b| b.is_active).collect();
                prop_assert_eq!(active.len(), 1);
                prop_assert_eq!(active[0].id, target);
                prop_assert!(boms.iter().all(|b| b.is_active != b.is_draft));
            }
        }
    }
}

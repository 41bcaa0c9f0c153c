//! Bill of materials models and cost rollup

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Versioned recipe for a finished good
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bom {
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

/// One material line of a BOM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomComponent {
    pub id: Uuid,
    pub bom_id: Uuid,
    pub component_id: Uuid,
    pub position: i32,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub waste_percentage: Decimal,
    pub notes: Option<String>,
}

/// Quantity including the expected waste
pub fn effective_quantity(quantity: Decimal, waste_percentage: Decimal) -> Decimal {
    quantity * (Decimal::ONE + waste_percentage / Decimal::ONE_HUNDRED)
}

impl BomComponent {
    pub fn effective_quantity(&self) -> Decimal {
        effective_quantity(self.quantity, self.waste_percentage)
    }

    /// Catalog cost of the line, before waste
    pub fn total_cost(&self) -> Decimal {
        self.quantity * self.unit_cost
    }

    pub fn waste_adjusted_cost(&self) -> Decimal {
        self.effective_quantity() * self.unit_cost
    }
}

/// Cost rollup of a BOM and its components
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BomCostBreakdown {
    pub material_cost: Decimal,
    pub waste_adjusted_material_cost: Decimal,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub total_cost: Decimal,
    /// `None` when the expected yield is not positive
    pub cost_per_yielded_unit: Option<Decimal>,
}

/// Priced quantity of one material, independent of any stored BOM
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostLine {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    #[serde(default)]
    pub waste_percentage: Decimal,
}

/// Roll material lines and fixed costs up into a [`BomCostBreakdown`]
pub fn rollup_costs<I>(
    lines: I,
    labor_cost: Decimal,
    overhead_cost: Decimal,
    expected_yield_percentage: Decimal,
) -> BomCostBreakdown
where
    I: IntoIterator<Item = CostLine>,
{
    let (material_cost, waste_adjusted_material_cost) = lines.into_iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(plain, adjusted), line| {
            (
                plain + line.quantity * line.unit_cost,
                adjusted + effective_quantity(line.quantity, line.waste_percentage) * line.unit_cost,
            )
        },
    );
    let total_cost = material_cost + labor_cost + overhead_cost;
    let cost_per_yielded_unit = if expected_yield_percentage > Decimal::ZERO {
        Some(total_cost / (expected_yield_percentage / Decimal::ONE_HUNDRED))
    } else {
        None
    };

    BomCostBreakdown {
        material_cost,
        waste_adjusted_material_cost,
        labor_cost,
        overhead_cost,
        total_cost,
        cost_per_yielded_unit,
    }
}

impl Bom {
    pub fn total_material_cost(&self, components: &[BomComponent]) -> Decimal {
        components.iter().map(BomComponent::total_cost).sum()
    }

    pub fn total_cost(&self, components: &[BomComponent]) -> Decimal {
        self.total_material_cost(components) + self.labor_cost + self.overhead_cost
    }

    pub fn cost_breakdown(&self, components: &[BomComponent]) -> BomCostBreakdown {
        rollup_costs(
            components.iter().map(|c| CostLine {
                quantity: c.quantity,
                unit_cost: c.unit_cost,
                waste_percentage: c.waste_percentage,
            }),
            self.labor_cost,
            self.overhead_cost,
            self.expected_yield_percentage,
        )
    }

    /// Components may only change while the BOM is an inactive draft
    pub fn is_editable(&self) -> bool {
        !self.is_active
    }
}

/// Make `target` the only active BOM among `boms` (all of one product).
///
/// Every other active BOM is demoted to draft. Returns the ids whose flags
/// changed, or `None` if `target` is not in the slice.
pub fn activate_bom(boms: &mut [Bom], target: Uuid) -> Option<Vec<Uuid>> {
    if !boms.iter().any(|b| b.id == target) {
        return None;
    }

    let mut changed = Vec::new();
    for bom in boms.iter_mut() {
        if bom.id == target {
            if !bom.is_active || bom.is_draft {
                bom.is_active = true;
                bom.is_draft = false;
                changed.push(bom.id);
            }
        } else if bom.is_active {
            bom.is_active = false;
            bom.is_draft = true;
            changed.push(bom.id);
        }
    }
    Some(changed)
}

/// A component line priced from the catalog, for the live estimate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostEstimateLine {
    pub quantity: Decimal,
    pub waste_percentage: Decimal,
    pub cost_price: Decimal,
}

/// Waste-adjusted material estimate, rounded half-up to cents
pub fn estimate_material_cost(lines: &[CostEstimateLine]) -> Decimal {
    lines
        .iter()
        .map(|line| effective_quantity(line.quantity, line.waste_percentage) * line.cost_price)
        .sum::<Decimal>()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bom(labor: Decimal, overhead: Decimal) -> Bom {
        let now = Utc::now();
        Bom {
            id: Uuid::new_v4(),
            bom_code: "BOM-001".to_string(),
            product_id: Uuid::new_v4(),
            version: 1,
            description: None,
            instructions: None,
            is_active: false,
            is_draft: true,
            effective_date: None,
            labor_cost: labor,
            overhead_cost: overhead,
            expected_yield_percentage: dec!(100),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn component(bom_id: Uuid, quantity: Decimal, unit_cost: Decimal, waste: Decimal) -> BomComponent {
        BomComponent {
            id: Uuid::new_v4(),
            bom_id,
            component_id: Uuid::new_v4(),
            position: 0,
            quantity,
            unit_cost,
            waste_percentage: waste,
            notes: None,
        }
    }

    #[test]
    fn test_component_costs() {
        let line = component(Uuid::new_v4(), dec!(2), dec!(5.00), dec!(10));
        assert_eq!(line.effective_quantity(), dec!(2.2));
        assert_eq!(line.total_cost(), dec!(10.00));
        assert_eq!(line.waste_adjusted_cost(), dec!(11.00));
    }

    #[test]
    fn test_bom_total_cost() {
        let recipe = bom(dec!(3), dec!(2));
        let lines = vec![component(recipe.id, dec!(2), dec!(5.00), dec!(10))];
        assert_eq!(recipe.total_material_cost(&lines), dec!(10.00));
        assert_eq!(recipe.total_cost(&lines), dec!(15.00));

        let breakdown = recipe.cost_breakdown(&lines);
        assert_eq!(breakdown.total_cost, dec!(15.00));
        assert_eq!(breakdown.waste_adjusted_material_cost, dec!(11.00));
        assert_eq!(breakdown.cost_per_yielded_unit, Some(dec!(15.00)));
    }

    #[test]
    fn test_yield_scales_unit_cost() {
        let mut recipe = bom(dec!(0), dec!(0));
        recipe.expected_yield_percentage = dec!(80);
        let lines = vec![component(recipe.id, dec!(4), dec!(2), dec!(0))];
        assert_eq!(recipe.cost_breakdown(&lines).cost_per_yielded_unit, Some(dec!(10)));

        recipe.expected_yield_percentage = dec!(0);
        assert_eq!(recipe.cost_breakdown(&lines).cost_per_yielded_unit, None);
    }

    #[test]
    fn test_empty_bom_costs_labor_and_overhead() {
        let recipe = bom(dec!(7.50), dec!(1.25));
        assert_eq!(recipe.total_cost(&[]), dec!(8.75));
    }

    #[test]
    fn test_activate_demotes_other_versions() {
        let product = Uuid::new_v4();
        let mut boms: Vec<Bom> = (0..3)
            .map(|v| {
                let mut b = bom(dec!(0), dec!(0));
                b.product_id = product;
                b.version = v + 1;
                b
            })
            .collect();
        boms[0].is_active = true;
        boms[0].is_draft = false;
        let target = boms[2].id;

        let changed = activate_bom(&mut boms, target).unwrap();
        assert_eq!(changed, vec![boms[0].id, target]);
        assert_eq!(boms.iter().filter(|b| b.is_active).count(), 1);
        assert!(boms[2].is_active && !boms[2].is_draft);
        assert!(boms[0].is_draft);

        // already active: nothing changes
        assert_eq!(activate_bom(&mut boms, target).unwrap(), Vec::<Uuid>::new());
        assert!(activate_bom(&mut boms, Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_estimate_rounds_to_cents() {
        let lines = [
            CostEstimateLine {
                quantity: dec!(2),
                waste_percentage: dec!(10),
                cost_price: dec!(5.00),
            },
            CostEstimateLine {
                quantity: dec!(1),
                waste_percentage: dec!(5),
                cost_price: dec!(0.333),
            },
        ];
        // 11.00 + 0.34965
        assert_eq!(estimate_material_cost(&lines), dec!(11.35));
    }
}

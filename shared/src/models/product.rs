//! Product catalog models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of product held in the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    FinishedGood,
    RawMaterial,
    Intermediate,
    Packaging,
}

string_enum!(ProductType, "product type", {
    FinishedGood => "finished_good",
    RawMaterial => "raw_material",
    Intermediate => "intermediate",
    Packaging => "packaging",
});

/// A unit in which product quantities are counted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    pub id: Uuid,
    pub name: String,
    /// Unique short form, e.g. "kg"
    pub symbol: String,
    pub description: Option<String>,
}

/// Product grouping, optionally nested under a parent category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Number of products in a category, split by type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryProductCounts {
    pub finished_goods: i64,
    pub raw_materials: i64,
    pub intermediates: i64,
    pub packaging: i64,
}

impl CategoryProductCounts {
    pub fn add(&mut self, product_type: ProductType, count: i64) {
        match product_type {
            ProductType::FinishedGood => self.finished_goods += count,
            ProductType::RawMaterial => self.raw_materials += count,
            ProductType::Intermediate => self.intermediates += count,
            ProductType::Packaging => self.packaging += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.finished_goods + self.raw_materials + self.intermediates + self.packaging
    }
}

/// A catalog product identified by its SKU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub product_type: ProductType,
    pub category_id: Option<Uuid>,
    pub unit_of_measure_id: Uuid,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    /// Default reorder threshold for stock items that do not set their own
    pub reorder_threshold: Decimal,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Only finished goods carry a bill of materials
    pub fn can_have_bom(&self) -> bool {
        self.product_type == ProductType::FinishedGood
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_type_round_trips_through_str() {
        for ty in ProductType::ALL {
            assert_eq!(ty.as_str().parse::<ProductType>().unwrap(), *ty);
        }
        assert!("finished".parse::<ProductType>().is_err());
    }

    #[test]
    fn test_category_counts() {
        let mut counts = CategoryProductCounts::default();
        counts.add(ProductType::FinishedGood, 3);
        counts.add(ProductType::RawMaterial, 5);
        counts.add(ProductType::Packaging, 1);

        assert_eq!(counts.finished_goods, 3);
        assert_eq!(counts.intermediates, 0);
        assert_eq!(counts.total(), 9);
    }
}

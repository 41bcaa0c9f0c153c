//! Product catalog service: products, categories and units of measure

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{
    AuditAction, Category, CategoryProductCounts, ChangeSet, Product, ProductType, UnitOfMeasure,
};
use shared::validation::{validate_amount, validate_sku};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{collect, CategoryRow, ProductRow, UnitOfMeasureRow, PRODUCT_COLUMNS};
use crate::services::audit::{Actor, AuditEntry, AuditService};

#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub product_type: ProductType,
    pub category_id: Option<Uuid>,
    pub unit_of_measure_id: Uuid,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default)]
    pub selling_price: Decimal,
    #[serde(default)]
    pub reorder_threshold: Decimal,
}

/// Identity (SKU and type) is fixed once created
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub unit_of_measure_id: Option<Uuid>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub reorder_threshold: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub product_type: Option<ProductType>,
    pub category_id: Option<Uuid>,
    pub is_active: Option<bool>,
    /// Matches SKU or name
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUnitInput {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(min = 1, max = 10))]
    pub symbol: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryWithCounts {
    #[serde(flatten)]
    pub category: Category,
    pub product_counts: CategoryProductCounts,
    pub total_products: i64,
}

fn check_prices(cost: Decimal, selling: Decimal, threshold: Decimal) -> AppResult<()> {
    validate_amount(cost).map_err(|m| AppError::validation("cost_price", m))?;
    validate_amount(selling).map_err(|m| AppError::validation("selling_price", m))?;
    validate_amount(threshold).map_err(|m| AppError::validation("reorder_threshold", m))
}

impl ProductService {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    // ========================================================================
    // Products
    // ========================================================================

    pub async fn list_products(&self, filter: &ProductFilter) -> AppResult<Vec<Product>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM products WHERE TRUE", PRODUCT_COLUMNS));
        if let Some(product_type) = filter.product_type {
            query.push(" AND product_type = ").push_bind(product_type.as_str());
        }
        if let Some(category_id) = filter.category_id {
            query.push(" AND category_id = ").push_bind(category_id);
        }
        if let Some(is_active) = filter.is_active {
            query.push(" AND is_active = ").push_bind(is_active);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (sku ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY sku");

        let rows = query.build_query_as::<ProductRow>().fetch_all(&self.db).await?;
        Ok(collect(rows))
    }

    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

        Ok(row.into())
    }

    pub async fn create_product(&self, actor: &Actor, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;
        validate_sku(&input.sku).map_err(|m| AppError::validation("sku", m))?;
        check_prices(input.cost_price, input.selling_price, input.reorder_threshold)?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (sku, name, description, product_type, category_id, unit_of_measure_id,
                                  cost_price, selling_price, reorder_threshold, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(&input.sku)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.product_type.as_str())
        .bind(input.category_id)
        .bind(input.unit_of_measure_id)
        .bind(input.cost_price)
        .bind(input.selling_price)
        .bind(input.reorder_threshold)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let product: Product = row.into();
        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "Product").object(product.id, product.sku.clone()),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    pub async fn update_product(
        &self,
        actor: &Actor,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        input.validate()?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let before: Product = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1 FOR UPDATE",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?
        .into();

        let mut product = before.clone();
        if let Some(name) = input.name {
            product.name = name;
        }
        if input.description.is_some() {
            product.description = input.description;
        }
        if input.category_id.is_some() {
            product.category_id = input.category_id;
        }
        product.unit_of_measure_id = input.unit_of_measure_id.unwrap_or(product.unit_of_measure_id);
        product.cost_price = input.cost_price.unwrap_or(product.cost_price);
        product.selling_price = input.selling_price.unwrap_or(product.selling_price);
        product.reorder_threshold = input.reorder_threshold.unwrap_or(product.reorder_threshold);
        product.is_active = input.is_active.unwrap_or(product.is_active);
        check_prices(product.cost_price, product.selling_price, product.reorder_threshold)?;

        let mut changes = ChangeSet::new();
        changes
            .track("name", &before.name, &product.name)
            .track("description", &before.description, &product.description)
            .track("category_id", &before.category_id, &product.category_id)
            .track("unit_of_measure_id", &before.unit_of_measure_id, &product.unit_of_measure_id)
            .track("cost_price", &before.cost_price, &product.cost_price)
            .track("selling_price", &before.selling_price, &product.selling_price)
            .track("reorder_threshold", &before.reorder_threshold, &product.reorder_threshold)
            .track("is_active", &before.is_active, &product.is_active);

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET name = $2, description = $3, category_id = $4, unit_of_measure_id = $5,
                cost_price = $6, selling_price = $7, reorder_threshold = $8, is_active = $9,
                updated_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.category_id)
        .bind(product.unit_of_measure_id)
        .bind(product.cost_price)
        .bind(product.selling_price)
        .bind(product.reorder_threshold)
        .bind(product.is_active)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if !changes.is_empty() {
            AuditService::record(
                &mut tx,
                actor,
                AuditEntry::new(AuditAction::Update, "Product")
                    .object(product_id, product.sku.clone())
                    .changes(changes.into_value()),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        Ok(row.into())
    }

    /// Products still referenced by stock, BOMs or orders fail with an integrity error
    pub async fn delete_product(&self, actor: &Actor, product_id: Uuid) -> AppResult<()> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let sku = sqlx::query_scalar::<_, String>("DELETE FROM products WHERE id = $1 RETURNING sku")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Product"))?;

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Delete, "Product").object(product_id, sku),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn list_categories(&self) -> AppResult<Vec<CategoryWithCounts>> {
        let categories: Vec<Category> = collect(
            sqlx::query_as::<_, CategoryRow>(
                "SELECT id, name, parent_id, description, created_at, updated_at FROM categories ORDER BY name",
            )
            .fetch_all(&self.db)
            .await?,
        );

        let counts = sqlx::query_as::<_, (Uuid, String, i64)>(
            r#"
            SELECT category_id, product_type, COUNT(*)
            FROM products
            WHERE category_id IS NOT NULL
            GROUP BY category_id, product_type
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut by_category: HashMap<Uuid, CategoryProductCounts> = HashMap::new();
        for (category_id, product_type, count) in counts {
            let product_type: ProductType = product_type
                .parse()
                .map_err(|e: shared::models::ParseEnumError| AppError::Internal(e.to_string()))?;
            by_category.entry(category_id).or_default().add(product_type, count);
        }

        Ok(categories
            .into_iter()
            .map(|category| {
                let product_counts = by_category.remove(&category.id).unwrap_or_default();
                CategoryWithCounts {
                    total_products: product_counts.total(),
                    product_counts,
                    category,
                }
            })
            .collect())
    }

    pub async fn create_category(&self, actor: &Actor, input: CreateCategoryInput) -> AppResult<Category> {
        input.validate()?;
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            INSERT INTO categories (name, parent_id, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, name, parent_id, description, created_at, updated_at
            "#,
        )
        .bind(&input.name)
        .bind(input.parent_id)
        .bind(&input.description)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "Category").object(row.id, row.name.clone()),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    // ========================================================================
    // Units of measure
    // ========================================================================

    pub async fn list_units(&self) -> AppResult<Vec<UnitOfMeasure>> {
        let rows = sqlx::query_as::<_, UnitOfMeasureRow>(
            "SELECT id, name, symbol, description FROM units_of_measure ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(collect(rows))
    }

    pub async fn create_unit(&self, actor: &Actor, input: CreateUnitInput) -> AppResult<UnitOfMeasure> {
        input.validate()?;
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, UnitOfMeasureRow>(
            r#"
            INSERT INTO units_of_measure (name, symbol, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, symbol, description
            "#,
        )
        .bind(&input.name)
        .bind(input.symbol.trim())
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "UnitOfMeasure").object(row.id, row.symbol.clone()),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_checks() {
        assert!(check_prices(dec!(1), dec!(2), dec!(0)).is_ok());
        assert!(check_prices(dec!(-1), dec!(2), dec!(0)).is_err());
        assert!(check_prices(dec!(1), dec!(2), dec!(-5)).is_err());
        assert!(check_prices(dec!(1.999), dec!(2), dec!(0)).is_err());
        assert!(check_prices(dec!(1), dec!(2), dec!(4.125)).is_err());
    }

    #[test]
    fn test_product_input_validation() {
        let input = UpdateProductInput {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(input.validate().is_err());
        assert!(UpdateProductInput::default().validate().is_ok());
    }
}

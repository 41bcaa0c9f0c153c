//! Bill of materials service

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::clock::Clock;
use shared::models::{
    activate_bom, estimate_material_cost, AuditAction, Bom, BomComponent, BomCostBreakdown,
    ChangeSet, CostEstimateLine, ProductType,
};
use shared::validation::{
    validate_amount, validate_bom_code, validate_non_negative, validate_positive, validate_scale,
    validate_waste_percentage, validate_yield_percentage, AMOUNT_SCALE, COMPONENT_QUANTITY_SCALE,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{collect, BomComponentRow, BomRow, BOM_COLUMNS};
use crate::services::audit::{Actor, AuditEntry, AuditService};

pub(crate) const BOM_COMPONENT_COLUMNS: &str =
    "c.id, c.bom_id, c.component_id, c.position, c.quantity, c.unit_cost, c.waste_percentage, c.notes";

#[derive(Clone)]
pub struct BomService {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
pub struct ComponentInput {
    pub component_id: Uuid,
    pub quantity: Decimal,
    /// Defaults to the component's catalog cost price
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub waste_percentage: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBomInput {
    pub bom_code: String,
    pub product_id: Uuid,
    /// Defaults to the next version for the product
    pub version: Option<i32>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub labor_cost: Decimal,
    #[serde(default)]
    pub overhead_cost: Decimal,
    pub expected_yield_percentage: Option<Decimal>,
    #[serde(default)]
    pub components: Vec<ComponentInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBomInput {
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub labor_cost: Option<Decimal>,
    pub overhead_cost: Option<Decimal>,
    pub expected_yield_percentage: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct EstimateLineInput {
    pub component_id: Uuid,
    pub quantity: Decimal,
    #[serde(default)]
    pub waste_percentage: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CostEstimate {
    pub material_cost: Decimal,
    pub line_count: usize,
}

#[derive(Debug, Clone, FromRow)]
struct BomComponentDetailRow {
    #[sqlx(flatten)]
    component: BomComponentRow,
    component_sku: String,
    component_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BomComponentDetail {
    #[serde(flatten)]
    pub component: BomComponent,
    pub component_sku: String,
    pub component_name: String,
    pub effective_quantity: Decimal,
    pub total_cost: Decimal,
}

impl From<BomComponentDetailRow> for BomComponentDetail {
    fn from(r: BomComponentDetailRow) -> Self {
        let component: BomComponent = r.component.into();
        BomComponentDetail {
            effective_quantity: component.effective_quantity(),
            total_cost: component.total_cost(),
            component,
            component_sku: r.component_sku,
            component_name: r.component_name,
        }
    }
}

/// A BOM with its components and cost rollup
#[derive(Debug, Serialize)]
pub struct BomDetail {
    #[serde(flatten)]
    pub bom: Bom,
    pub components: Vec<BomComponentDetail>,
    pub cost: BomCostBreakdown,
}

fn check_component(input: &ComponentInput) -> AppResult<()> {
    validate_positive(input.quantity)
        .and_then(|()| validate_scale(input.quantity, COMPONENT_QUANTITY_SCALE))
        .map_err(|m| AppError::validation("quantity", m))?;
    validate_waste_percentage(input.waste_percentage)
        .and_then(|()| validate_scale(input.waste_percentage, AMOUNT_SCALE))
        .map_err(|m| AppError::validation("waste_percentage", m))?;
    if let Some(cost) = input.unit_cost {
        validate_amount(cost).map_err(|m| AppError::validation("unit_cost", m))?;
    }
    Ok(())
}

fn check_costs(labor: Decimal, overhead: Decimal, yield_percentage: Decimal) -> AppResult<()> {
    validate_amount(labor).map_err(|m| AppError::validation("labor_cost", m))?;
    validate_amount(overhead).map_err(|m| AppError::validation("overhead_cost", m))?;
    validate_yield_percentage(yield_percentage)
        .and_then(|()| validate_scale(yield_percentage, AMOUNT_SCALE))
        .map_err(|m| AppError::validation("expected_yield_percentage", m))
}

/// Audit label for an activation, matching the label used on create
fn activation_label(bom: &Bom) -> String {
    format!("{} v{}", bom.bom_code, bom.version)
}

fn ensure_editable(bom: &Bom) -> AppResult<()> {
    if !bom.is_editable() {
        return Err(AppError::InvalidStateTransition(format!(
            "BOM {} is active; create a new version to change it",
            bom.bom_code
        )));
    }
    Ok(())
}

async fn lock_bom(conn: &mut PgConnection, bom_id: Uuid) -> AppResult<Bom> {
    let row = sqlx::query_as::<_, BomRow>(&format!(
        "SELECT {} FROM boms WHERE id = $1 FOR UPDATE",
        BOM_COLUMNS
    ))
    .bind(bom_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found("BOM"))?;

    Ok(row.into())
}

async fn insert_component(
    conn: &mut PgConnection,
    bom: &Bom,
    position: i32,
    input: &ComponentInput,
) -> AppResult<Uuid> {
    if input.component_id == bom.product_id {
        return Err(AppError::validation(
            "component_id",
            "A product cannot be a component of its own BOM",
        ));
    }

    let catalog_cost = sqlx::query_scalar::<_, Decimal>("SELECT cost_price FROM products WHERE id = $1")
        .bind(input.component_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Component product"))?;

    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO bom_components (bom_id, component_id, position, quantity, unit_cost, waste_percentage, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(bom.id)
    .bind(input.component_id)
    .bind(position)
    .bind(input.quantity)
    .bind(input.unit_cost.unwrap_or(catalog_cost))
    .bind(input.waste_percentage)
    .bind(&input.notes)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

impl BomService {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn list_boms(&self, product_id: Option<Uuid>, active_only: bool) -> AppResult<Vec<Bom>> {
        let rows = sqlx::query_as::<_, BomRow>(&format!(
            r#"
            SELECT {} FROM boms
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2 = false OR is_active = true)
            ORDER BY bom_code, version DESC
            "#,
            BOM_COLUMNS
        ))
        .bind(product_id)
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;

        Ok(collect(rows))
    }

    pub async fn get_bom(&self, bom_id: Uuid) -> AppResult<BomDetail> {
        let bom: Bom = sqlx::query_as::<_, BomRow>(&format!(
            "SELECT {} FROM boms WHERE id = $1",
            BOM_COLUMNS
        ))
        .bind(bom_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("BOM"))?
        .into();

        let rows = sqlx::query_as::<_, BomComponentDetailRow>(&format!(
            r#"
            SELECT {}, p.sku AS component_sku, p.name AS component_name
            FROM bom_components c
            JOIN products p ON p.id = c.component_id
            WHERE c.bom_id = $1
            ORDER BY c.position, c.id
            "#,
            BOM_COMPONENT_COLUMNS
        ))
        .bind(bom_id)
        .fetch_all(&self.db)
        .await?;

        let components: Vec<BomComponentDetail> = collect(rows);
        let plain: Vec<BomComponent> = components.iter().map(|c| c.component.clone()).collect();

        Ok(BomDetail {
            cost: bom.cost_breakdown(&plain),
            bom,
            components,
        })
    }

    /// New BOMs are always inactive drafts
    pub async fn create_bom(&self, actor: &Actor, input: CreateBomInput) -> AppResult<BomDetail> {
        validate_bom_code(&input.bom_code).map_err(|m| AppError::validation("bom_code", m))?;
        let yield_percentage = input.expected_yield_percentage.unwrap_or(Decimal::ONE_HUNDRED);
        check_costs(input.labor_cost, input.overhead_cost, yield_percentage)?;
        if let Some(version) = input.version {
            if version < 1 {
                return Err(AppError::validation("version", "Version must be at least 1"));
            }
        }

        let mut seen = HashSet::new();
        for component in &input.components {
            check_component(component)?;
            if !seen.insert(component.component_id) {
                return Err(AppError::validation(
                    "components",
                    "Each component may appear only once",
                ));
            }
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let product_type = sqlx::query_scalar::<_, String>(
            "SELECT product_type FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(input.product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;
        if product_type != ProductType::FinishedGood.as_str() {
            return Err(AppError::validation(
                "product_id",
                "Only finished goods can have a bill of materials",
            ));
        }

        let version = match input.version {
            Some(version) => version,
            None => {
                sqlx::query_scalar::<_, i32>(
                    "SELECT COALESCE(MAX(version), 0) + 1 FROM boms WHERE product_id = $1",
                )
                .bind(input.product_id)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let bom: Bom = sqlx::query_as::<_, BomRow>(&format!(
            r#"
            INSERT INTO boms (bom_code, product_id, version, description, instructions, is_active, is_draft,
                              effective_date, labor_cost, overhead_cost, expected_yield_percentage,
                              created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, false, true, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {}
            "#,
            BOM_COLUMNS
        ))
        .bind(&input.bom_code)
        .bind(input.product_id)
        .bind(version)
        .bind(&input.description)
        .bind(&input.instructions)
        .bind(input.effective_date)
        .bind(input.labor_cost)
        .bind(input.overhead_cost)
        .bind(yield_percentage)
        .bind(actor.user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .into();

        for (position, component) in input.components.iter().enumerate() {
            insert_component(&mut tx, &bom, position as i32, component).await?;
        }

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Create, "BOM")
                .object(bom.id, format!("{} v{}", bom.bom_code, bom.version)),
            now,
        )
        .await?;

        tx.commit().await?;
        tracing::info!(bom_id = %bom.id, bom_code = %bom.bom_code, version = bom.version, "BOM draft created");

        self.get_bom(bom.id).await
    }

    pub async fn update_bom(&self, actor: &Actor, bom_id: Uuid, input: UpdateBomInput) -> AppResult<BomDetail> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let before = lock_bom(&mut tx, bom_id).await?;
        ensure_editable(&before)?;

        let mut bom = before.clone();
        if input.description.is_some() {
            bom.description = input.description;
        }
        if input.instructions.is_some() {
            bom.instructions = input.instructions;
        }
        if input.effective_date.is_some() {
            bom.effective_date = input.effective_date;
        }
        bom.labor_cost = input.labor_cost.unwrap_or(bom.labor_cost);
        bom.overhead_cost = input.overhead_cost.unwrap_or(bom.overhead_cost);
        bom.expected_yield_percentage = input
            .expected_yield_percentage
            .unwrap_or(bom.expected_yield_percentage);
        check_costs(bom.labor_cost, bom.overhead_cost, bom.expected_yield_percentage)?;

        let mut changes = ChangeSet::new();
        changes
            .track("description", &before.description, &bom.description)
            .track("instructions", &before.instructions, &bom.instructions)
            .track("effective_date", &before.effective_date, &bom.effective_date)
            .track("labor_cost", &before.labor_cost, &bom.labor_cost)
            .track("overhead_cost", &before.overhead_cost, &bom.overhead_cost)
            .track(
                "expected_yield_percentage",
                &before.expected_yield_percentage,
                &bom.expected_yield_percentage,
            );

        sqlx::query(
            r#"
            UPDATE boms
            SET description = $2, instructions = $3, effective_date = $4, labor_cost = $5,
                overhead_cost = $6, expected_yield_percentage = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(bom_id)
        .bind(&bom.description)
        .bind(&bom.instructions)
        .bind(bom.effective_date)
        .bind(bom.labor_cost)
        .bind(bom.overhead_cost)
        .bind(bom.expected_yield_percentage)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if !changes.is_empty() {
            AuditService::record(
                &mut tx,
                actor,
                AuditEntry::new(AuditAction::Update, "BOM")
                    .object(bom_id, bom.bom_code.clone())
                    .changes(changes.into_value()),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        self.get_bom(bom_id).await
    }

    pub async fn add_component(
        &self,
        actor: &Actor,
        bom_id: Uuid,
        input: ComponentInput,
    ) -> AppResult<BomDetail> {
        check_component(&input)?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let bom = lock_bom(&mut tx, bom_id).await?;
        ensure_editable(&bom)?;

        let position = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM bom_components WHERE bom_id = $1",
        )
        .bind(bom_id)
        .fetch_one(&mut *tx)
        .await?;

        let component_row_id = insert_component(&mut tx, &bom, position, &input).await?;

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Update, "BOM")
                .object(bom_id, bom.bom_code.clone())
                .changes(Some(serde_json::json!({
                    "component_added": {
                        "id": component_row_id,
                        "component_id": input.component_id,
                        "quantity": input.quantity,
                    }
                }))),
            now,
        )
        .await?;

        tx.commit().await?;
        self.get_bom(bom_id).await
    }

    pub async fn remove_component(
        &self,
        actor: &Actor,
        bom_id: Uuid,
        component_row_id: Uuid,
    ) -> AppResult<BomDetail> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let bom = lock_bom(&mut tx, bom_id).await?;
        ensure_editable(&bom)?;

        let component_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM bom_components WHERE id = $1 AND bom_id = $2 RETURNING component_id",
        )
        .bind(component_row_id)
        .bind(bom_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("BOM component"))?;

        AuditService::record(
            &mut tx,
            actor,
            AuditEntry::new(AuditAction::Update, "BOM")
                .object(bom_id, bom.bom_code.clone())
                .changes(Some(serde_json::json!({
                    "component_removed": { "id": component_row_id, "component_id": component_id }
                }))),
            now,
        )
        .await?;

        tx.commit().await?;
        self.get_bom(bom_id).await
    }

    /// Make this BOM the product's only active BOM.
    ///
    /// The product row lock serializes concurrent activations of the same
    /// product; the partial unique index on active BOMs backs it up.
    pub async fn activate(&self, actor: &Actor, bom_id: Uuid) -> AppResult<BomDetail> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let product_id = sqlx::query_scalar::<_, Uuid>("SELECT product_id FROM boms WHERE id = $1")
            .bind(bom_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("BOM"))?;

        sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;

        let mut boms: Vec<Bom> = collect(
            sqlx::query_as::<_, BomRow>(&format!(
                "SELECT {} FROM boms WHERE product_id = $1 ORDER BY version",
                BOM_COLUMNS
            ))
            .bind(product_id)
            .fetch_all(&mut *tx)
            .await?,
        );

        let changed = activate_bom(&mut boms, bom_id).ok_or_else(|| AppError::not_found("BOM"))?;
        let states: HashMap<Uuid, &Bom> = boms.iter().map(|b| (b.id, b)).collect();

        // Demotions first so the active index never sees two rows
        let mut ordered = changed.clone();
        ordered.sort_by_key(|id| *id == bom_id);
        for id in &ordered {
            if let Some(bom) = states.get(id) {
                sqlx::query("UPDATE boms SET is_active = $2, is_draft = $3, updated_at = $4 WHERE id = $1")
                    .bind(id)
                    .bind(bom.is_active)
                    .bind(bom.is_draft)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if let (false, Some(activated)) = (changed.is_empty(), states.get(&bom_id)) {
            let demoted: Vec<Uuid> = changed.iter().copied().filter(|id| *id != bom_id).collect();
            AuditService::record(
                &mut tx,
                actor,
                AuditEntry::new(AuditAction::Update, "BOM")
                    .object(bom_id, activation_label(activated))
                    .changes(Some(serde_json::json!({
                        "is_active": { "old": false, "new": true },
                        "demoted": demoted,
                    }))),
                now,
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(bom_id = %bom_id, product_id = %product_id, changed = changed.len(), "BOM activated");

        self.get_bom(bom_id).await
    }

    /// Waste-adjusted material cost priced from current catalog cost prices
    pub async fn cost_estimate(&self, lines: &[EstimateLineInput]) -> AppResult<CostEstimate> {
        let ids: Vec<Uuid> = lines.iter().map(|l| l.component_id).collect();
        let prices: HashMap<Uuid, Decimal> = sqlx::query_as::<_, (Uuid, Decimal)>(
            "SELECT id, cost_price FROM products WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .collect();

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            validate_non_negative(line.quantity).map_err(|m| AppError::validation("quantity", m))?;
            validate_waste_percentage(line.waste_percentage)
                .map_err(|m| AppError::validation("waste_percentage", m))?;
            let cost_price = prices
                .get(&line.component_id)
                .copied()
                .ok_or_else(|| AppError::not_found("Component product"))?;
            priced.push(CostEstimateLine {
                quantity: line.quantity,
                waste_percentage: line.waste_percentage,
                cost_price,
            });
        }

        Ok(CostEstimate {
            material_cost: estimate_material_cost(&priced),
            line_count: priced.len(),
        })
    }
}

//! WebAssembly module for the IEEP ERP platform
//!
//! Provides client-side previews for:
//! - BOM cost rollup while a recipe is being edited
//! - Stock and expiry status of a stock item form
//! - Reorder forecast dates
//! - Offline field validation
//!
//! Decimal values cross the boundary as strings so no precision is lost.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, JsValue> {
    Decimal::from_str(value.trim())
        .map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", field, e)))
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, JsValue> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", field, e)))
}

#[derive(Debug, Deserialize)]
struct BomPreviewInput {
    #[serde(default)]
    labor_cost: Decimal,
    #[serde(default)]
    overhead_cost: Decimal,
    #[serde(default = "full_yield")]
    expected_yield_percentage: Decimal,
    #[serde(default)]
    components: Vec<CostLine>,
}

fn full_yield() -> Decimal {
    Decimal::ONE_HUNDRED
}

/// Cost breakdown of a recipe being edited, as JSON
#[wasm_bindgen]
pub fn preview_bom_cost(input_json: &str) -> Result<String, JsValue> {
    let input: BomPreviewInput = serde_json::from_str(input_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid BOM JSON: {}", e)))?;

    let breakdown = rollup_costs(
        input.components,
        input.labor_cost,
        input.overhead_cost,
        input.expected_yield_percentage,
    );
    serde_json::to_string(&breakdown).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Component quantity including waste
#[wasm_bindgen]
pub fn effective_component_quantity(quantity: &str, waste_percentage: &str) -> Result<String, JsValue> {
    let quantity = parse_decimal("quantity", quantity)?;
    let waste = parse_decimal("waste_percentage", waste_percentage)?;
    Ok(effective_quantity(quantity, waste).normalize().to_string())
}

/// `out_of_stock`, `low_stock` or `in_stock` for a stock item form
#[wasm_bindgen]
pub fn preview_stock_status(
    quantity: &str,
    item_threshold: &str,
    product_threshold: &str,
) -> Result<String, JsValue> {
    let quantity = parse_decimal("quantity", quantity)?;
    let threshold = resolve_reorder_threshold(
        parse_decimal("reorder_threshold", item_threshold)?,
        Some(parse_decimal("product reorder_threshold", product_threshold)?),
    );
    Ok(classify_stock(quantity, threshold).as_str().to_string())
}

/// Expiry classification of a batch; dates are `YYYY-MM-DD`
#[wasm_bindgen]
pub fn preview_expiry_status(expiry_date: Option<String>, today: &str) -> Result<String, JsValue> {
    let today = parse_date("today", today)?;
    let expiry = expiry_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| parse_date("expiry_date", d))
        .transpose()?;
    Ok(classify_expiry(expiry, today).as_str().to_string())
}

/// Forecast reorder date as `YYYY-MM-DD`, or `None` without consumption
#[wasm_bindgen]
pub fn preview_reorder_date(
    quantity: &str,
    threshold: &str,
    total_out: &str,
    lookback_days: i32,
    today: &str,
) -> Result<Option<String>, JsValue> {
    let forecast = forecast_reorder(
        parse_decimal("quantity", quantity)?,
        parse_decimal("threshold", threshold)?,
        parse_decimal("total_out", total_out)?,
        i64::from(lookback_days),
        parse_date("today", today)?,
    );
    Ok(forecast
        .forecast_reorder_date
        .map(|date| date.format("%Y-%m-%d").to_string()))
}

/// Error message for an invalid SKU, `None` when valid
#[wasm_bindgen]
pub fn check_sku(sku: &str) -> Option<String> {
    validate_sku(sku).err().map(str::to_string)
}

/// Browser's current UTC date as `YYYY-MM-DD`
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn today_utc() -> String {
    let now = js_sys::Date::new_0();
    let date = format!(
        "{:04}-{:02}-{:02}",
        now.get_utc_full_year(),
        now.get_utc_month() + 1,
        now.get_utc_date()
    );
    web_sys::console::debug_1(&JsValue::from_str(&date));
    date
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_bom_cost() {
        let json = r#"{
            "labor_cost": "3",
            "overhead_cost": "2",
            "components": [{"quantity": "2", "unit_cost": "5.00", "waste_percentage": "10"}]
        }"#;
        let breakdown: BomCostBreakdown = serde_json::from_str(&preview_bom_cost(json).unwrap()).unwrap();

        assert_eq!(breakdown.material_cost, Decimal::from(10));
        assert_eq!(breakdown.total_cost, Decimal::from(15));
        assert_eq!(breakdown.waste_adjusted_material_cost, Decimal::from(11));
        assert_eq!(breakdown.cost_per_yielded_unit, Some(Decimal::from(15)));
    }

    #[test]
    fn test_effective_component_quantity() {
        assert_eq!(effective_component_quantity("2", "10").unwrap(), "2.2");
        assert_eq!(effective_component_quantity("4", "0").unwrap(), "4");
    }

    #[test]
    fn test_preview_stock_status() {
        assert_eq!(preview_stock_status("5", "0", "10").unwrap(), "low_stock");
        assert_eq!(preview_stock_status("5", "3", "10").unwrap(), "in_stock");
        assert_eq!(preview_stock_status("0", "3", "10").unwrap(), "out_of_stock");
    }

    #[test]
    fn test_preview_expiry_status() {
        assert_eq!(preview_expiry_status(None, "2024-06-01").unwrap(), "no_expiry");
        assert_eq!(
            preview_expiry_status(Some("2024-05-31".to_string()), "2024-06-01").unwrap(),
            "expired"
        );
        assert_eq!(
            preview_expiry_status(Some("2024-06-20".to_string()), "2024-06-01").unwrap(),
            "near_expiry"
        );
    }

    #[test]
    fn test_preview_reorder_date() {
        // 60 out over 30 days -> 2 per day; (20 - 10) / 2 = 5 days
        assert_eq!(
            preview_reorder_date("20", "10", "60", 30, "2024-06-01").unwrap(),
            Some("2024-06-06".to_string())
        );
        assert_eq!(preview_reorder_date("20", "10", "0", 30, "2024-06-01").unwrap(), None);
    }
}

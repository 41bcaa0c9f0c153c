//! Validation utilities for the ERP domain
//!
//! Field rules shared by the API layer and the browser forms.

use rust_decimal::Decimal;

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate SKU format (1-50 chars of uppercase letters, digits, `-`, `_`)
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.is_empty() {
        return Err("SKU is required");
    }
    if sku.len() > 50 {
        return Err("SKU must be at most 50 characters");
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("SKU must contain only uppercase letters, digits, '-' or '_'");
    }
    Ok(())
}

/// Validate warehouse code format (2-20 uppercase alphanumeric or `-`)
pub fn validate_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Code must be at least 2 characters");
    }
    if code.len() > 20 {
        return Err("Code must be at most 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Code must be uppercase alphanumeric or '-'");
    }
    Ok(())
}

/// Validate BOM code format (same alphabet as SKUs)
pub fn validate_bom_code(code: &str) -> Result<(), &'static str> {
    validate_sku(code).map_err(|_| "BOM code must be 1-50 uppercase letters, digits, '-' or '_'")
}

/// Validate a quantity, price or threshold that must not be negative
pub fn validate_non_negative(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("Value must not be negative");
    }
    Ok(())
}

pub fn validate_positive(value: Decimal) -> Result<(), &'static str> {
    if value <= Decimal::ZERO {
        return Err("Value must be greater than zero");
    }
    Ok(())
}

/// Decimal places stored for stock quantities, prices and thresholds
pub const AMOUNT_SCALE: u32 = 2;

/// Decimal places stored for BOM component quantities
pub const COMPONENT_QUANTITY_SCALE: u32 = 4;

/// Reject values with more decimal places than the column keeps.
/// Trailing zeros do not count.
pub fn validate_scale(value: Decimal, max_scale: u32) -> Result<(), &'static str> {
    if value.normalize().scale() > max_scale {
        return Err("Value has more decimal places than can be stored");
    }
    Ok(())
}

/// Non-negative with at most [`AMOUNT_SCALE`] decimal places
pub fn validate_amount(value: Decimal) -> Result<(), &'static str> {
    validate_non_negative(value)?;
    validate_scale(value, AMOUNT_SCALE)
}

/// Waste percentage is 0-100 inclusive
pub fn validate_waste_percentage(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err("Waste percentage must be between 0 and 100");
    }
    Ok(())
}

/// Expected yield is above 0 and at most 100
pub fn validate_yield_percentage(value: Decimal) -> Result<(), &'static str> {
    if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err("Expected yield must be greater than 0 and at most 100");
    }
    Ok(())
}

// ============================================================================
// Account Validations
// ============================================================================

/// Validate username (3-150 chars of letters, digits and `@.+-_`)
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.len() < 3 {
        return Err("Username must be at least 3 characters");
    }
    if username.len() > 150 {
        return Err("Username must be at most 150 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c))
    {
        return Err("Username may contain only letters, digits and @.+-_");
    }
    Ok(())
}

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.ends_with('.') => {
            Ok(())
        }
        _ => Err("Invalid email format"),
    }
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("Password must not be entirely numeric");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("RM-STEEL_01").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("rm-steel").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("WH-01").is_ok());
        assert!(validate_code("W").is_err());
        assert!(validate_code("wh01").is_err());
        assert!(validate_bom_code("BOM-CHAIR-V2").is_ok());
        assert!(validate_bom_code("bom 1").is_err());
    }

    #[test]
    fn test_percentages() {
        assert!(validate_waste_percentage(dec!(0)).is_ok());
        assert!(validate_waste_percentage(dec!(100)).is_ok());
        assert!(validate_waste_percentage(dec!(100.01)).is_err());
        assert!(validate_waste_percentage(dec!(-1)).is_err());
        assert!(validate_yield_percentage(dec!(95.5)).is_ok());
        assert!(validate_yield_percentage(dec!(0)).is_err());
    }

    #[test]
    fn test_amounts() {
        assert!(validate_non_negative(dec!(0)).is_ok());
        assert!(validate_non_negative(dec!(-0.01)).is_err());
        assert!(validate_positive(dec!(0)).is_err());
        assert!(validate_positive(dec!(0.5)).is_ok());
    }

    #[test]
    fn test_account_fields() {
        assert!(validate_username("j.doe+ops").is_ok());
        assert!(validate_username("jd").is_err());
        assert!(validate_username("john doe").is_err());
        assert!(validate_email("ops@plant.example").is_ok());
        assert!(validate_email("ops@plant").is_err());
        assert!(validate_email("@plant.example").is_err());
        assert!(validate_password("s3cure-pass").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("12345678").is_err());
    }
}

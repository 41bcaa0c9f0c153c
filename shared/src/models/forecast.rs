//! Usage-rate forecasting

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trailing window of outbound transactions used for the usage rate
pub const USAGE_LOOKBACK_DAYS: i64 = 30;

/// Point-in-time consumption forecast for one stock item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageForecast {
    /// Average quantity consumed per day
    pub usage_rate: Decimal,
    /// Day the item is expected to reach its threshold, if it is consumed at all
    pub forecast_reorder_date: Option<NaiveDate>,
}

/// Average daily consumption over the lookback window
pub fn usage_rate(total_out: Decimal, lookback_days: i64) -> Decimal {
    if lookback_days <= 0 || total_out <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    total_out / Decimal::from(lookback_days)
}

/// Forecast when `quantity` falls to `threshold` at the current usage rate.
///
/// The day count is floored and not clamped, so an item already below its
/// threshold gets a date in the past. Without consumption there is no date.
pub fn forecast_reorder(
    quantity: Decimal,
    threshold: Decimal,
    total_out: Decimal,
    lookback_days: i64,
    today: NaiveDate,
) -> UsageForecast {
    let rate = usage_rate(total_out, lookback_days);
    if rate.is_zero() {
        return UsageForecast {
            usage_rate: rate,
            forecast_reorder_date: None,
        };
    }

    let forecast_reorder_date = ((quantity - threshold) / rate)
        .floor()
        .to_i64()
        .and_then(Duration::try_days)
        .and_then(|offset| today.checked_add_signed(offset));

    UsageForecast {
        usage_rate: rate,
        forecast_reorder_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_usage_rate() {
        assert_eq!(usage_rate(dec!(60), 30), dec!(2));
        assert_eq!(usage_rate(dec!(0), 30), dec!(0));
        assert_eq!(usage_rate(dec!(10), 0), dec!(0));
    }

    #[test]
    fn test_forecast_in_future() {
        // 2/day, 20 above threshold -> 10 days
        let forecast = forecast_reorder(dec!(30), dec!(10), dec!(60), 30, day(2024, 1, 1));
        assert_eq!(forecast.usage_rate, dec!(2));
        assert_eq!(forecast.forecast_reorder_date, Some(day(2024, 1, 11)));
    }

    #[test]
    fn test_forecast_floors_fractional_days() {
        // 4/day, 10 above threshold -> 2.5 days -> 2
        let forecast = forecast_reorder(dec!(20), dec!(10), dec!(120), 30, day(2024, 1, 1));
        assert_eq!(forecast.forecast_reorder_date, Some(day(2024, 1, 3)));
    }

    #[test]
    fn test_forecast_in_past_when_below_threshold() {
        // 4/day, 10 below threshold -> -2.5 days -> -3
        let forecast = forecast_reorder(dec!(0), dec!(10), dec!(120), 30, day(2024, 1, 10));
        assert_eq!(forecast.forecast_reorder_date, Some(day(2024, 1, 7)));
    }

    #[test]
    fn test_no_forecast_without_usage() {
        let forecast = forecast_reorder(dec!(30), dec!(10), dec!(0), 30, day(2024, 1, 1));
        assert_eq!(forecast.usage_rate, Decimal::ZERO);
        assert_eq!(forecast.forecast_reorder_date, None);
    }
}

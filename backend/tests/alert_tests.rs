//! Reorder alert tests
//!
//! Tests for the alert cooldown and recipient selection:
//! - An item alerts at most once per cooldown window
//! - Only low-stock items alert
//! - Recipients are deduplicated with the warehouse manager first

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::clock::{Clock, FixedClock};
use shared::models::{
    mark_alert_sent, merge_recipients, AlertPolicy, AlertRecipient, ProcurementStatus, StockItem,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

fn stock_item(quantity: Decimal, reorder_threshold: Decimal) -> StockItem {
    StockItem {
        id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        warehouse_id: Uuid::new_v4(),
        batch_number: Some("B-001".to_string()),
        quantity,
        unit_cost: Some(dec("4.50")),
        reorder_threshold,
        procurement_status: ProcurementStatus::Received,
        location: None,
        expiry_date: None,
        manufactured_date: None,
        notes: None,
        last_alert_sent: None,
        usage_rate: None,
        forecast_reorder_date: None,
        created_at: start(),
        updated_at: start(),
    }
}

fn recipient(user_id: Uuid, username: &str) -> AlertRecipient {
    AlertRecipient {
        user_id,
        username: username.to_string(),
        email: Some(format!("{}@example.com", username)),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_alert_sends_once_per_window() {
        let clock = FixedClock::new(start());
        let policy = AlertPolicy::default();
        let mut item = stock_item(dec("3"), dec("10"));

        assert!(policy.should_send_alert(&item, Decimal::ZERO, clock.now()));
        mark_alert_sent(&mut item, clock.now());

        clock.advance(Duration::hours(1));
        assert!(!policy.should_send_alert(&item, Decimal::ZERO, clock.now()));

        clock.advance(Duration::hours(22) + Duration::minutes(59));
        assert!(!policy.should_send_alert(&item, Decimal::ZERO, clock.now()));

        clock.advance(Duration::minutes(1));
        assert!(policy.should_send_alert(&item, Decimal::ZERO, clock.now()));
    }

    #[test]
    fn test_product_default_threshold_triggers_alert() {
        let policy = AlertPolicy::default();
        let item = stock_item(dec("8"), Decimal::ZERO);

        assert!(policy.should_send_alert(&item, dec("10"), start()));
        assert!(!policy.should_send_alert(&item, dec("5"), start()));
    }

    #[test]
    fn test_out_of_stock_does_not_alert() {
        let policy = AlertPolicy::default();
        let item = stock_item(Decimal::ZERO, dec("10"));
        assert!(!policy.should_send_alert(&item, Decimal::ZERO, start()));
    }

    #[test]
    fn test_configured_cooldown() {
        let policy = AlertPolicy::with_cooldown_hours(4);
        let mut item = stock_item(dec("1"), dec("2"));
        mark_alert_sent(&mut item, start());

        assert!(!policy.should_send_alert(&item, Decimal::ZERO, start() + Duration::hours(3)));
        assert!(policy.should_send_alert(&item, Decimal::ZERO, start() + Duration::hours(4)));
        assert_eq!(
            policy.next_allowed_at(item.last_alert_sent),
            Some(start() + Duration::hours(4))
        );
    }

    #[test]
    fn test_manager_listed_first() {
        let manager = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let merged = merge_recipients(
            Some(recipient(manager, "manager")),
            vec![recipient(buyer, "buyer"), recipient(manager, "manager")],
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].user_id, manager);
        assert_eq!(merged[1].user_id, buyer);
    }

    #[test]
    fn test_recipients_without_manager() {
        let buyer = Uuid::new_v4();
        let merged = merge_recipients(None, vec![recipient(buyer, "buyer")]);
        assert_eq!(merged, vec![recipient(buyer, "buyer")]);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Within one cooldown window at most one alert goes out
        #[test]
        fn prop_at_most_one_alert_per_window(
            steps in prop::collection::vec(1i64..=180i64, 1..60)
        ) {
            let clock = FixedClock::new(start());
            let policy = AlertPolicy::default();
            let mut item = stock_item(dec("2"), dec("5"));
            let mut sent: Vec<DateTime<Utc>> = Vec::new();

            if policy.should_send_alert(&item, Decimal::ZERO, clock.now()) {
                mark_alert_sent(&mut item, clock.now());
                sent.push(clock.now());
            }
            for minutes in steps {
                clock.advance(Duration::minutes(minutes));
                if policy.should_send_alert(&item, Decimal::ZERO, clock.now()) {
                    mark_alert_sent(&mut item, clock.now());
                    sent.push(clock.now());
                }
            }

            for pair in sent.windows(2) {
                prop_assert!(pair[1] - pair[0] >= policy.cooldown);
            }
        }

        /// Items above their threshold never alert, whatever the history
        #[test]
        fn prop_healthy_stock_never_alerts(
            threshold in (0i64..=1000i64).prop_map(|n| Decimal::new(n, 1)),
            surplus in (1i64..=1000i64).prop_map(|n| Decimal::new(n, 1)),
            hours_since in prop::option::of(0i64..=72i64)
        ) {
            let mut item = stock_item(threshold + surplus, threshold);
            item.last_alert_sent = hours_since.map(|h| start() - Duration::hours(h));
            prop_assert!(!AlertPolicy::default().should_send_alert(&item, Decimal::ZERO, start()));
        }

        /// Merged recipients are unique and keep every distinct user
        #[test]
        fn prop_recipients_unique(picks in prop::collection::vec(0usize..5, 0..20)) {
            let users: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
            let members: Vec<AlertRecipient> = picks
                .iter()
                .map(|&i| recipient(users[i], &format!("user{}", i)))
                .collect();

            let merged = merge_recipients(None, members);

            let mut ids: Vec<Uuid> = merged.iter().map(|r| r.user_id).collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), total);

            let mut distinct = picks.clone();
            distinct.sort();
            distinct.dedup();
            prop_assert_eq!(total, distinct.len());
        }
    }
}

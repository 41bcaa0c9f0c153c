//! Reorder alert models and the cooldown decision

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StockItem;

/// Minimum time between two notifications for the same stock item
pub const ALERT_COOLDOWN_HOURS: i64 = 24;

/// Lifecycle of a reorder alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Active,
    Resolved,
    Cancelled,
}

string_enum!(AlertStatus, "alert status", {
    Active => "active",
    Resolved => "resolved",
    Cancelled => "cancelled",
});

impl AlertStatus {
    /// Only active alerts move, and only to a closed state
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::Active, AlertStatus::Resolved) | (AlertStatus::Active, AlertStatus::Cancelled)
        )
    }
}

/// A low-stock condition raised for a stock item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderAlert {
    pub id: Uuid,
    pub stock_item_id: Uuid,
    pub status: AlertStatus,
    pub triggered_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Decides when a low-stock item may produce a new notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub cooldown: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::hours(ALERT_COOLDOWN_HOURS),
        }
    }
}

impl AlertPolicy {
    pub fn with_cooldown_hours(hours: i64) -> Self {
        Self {
            cooldown: Duration::hours(hours),
        }
    }

    /// True while the last send is less than one cooldown ago.
    ///
    /// A timestamp in the future (clock skew) also counts as cooling down.
    pub fn is_cooling_down(&self, last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_sent {
            Some(last) => now - last < self.cooldown,
            None => false,
        }
    }

    pub fn should_send_alert(
        &self,
        item: &StockItem,
        product_default_threshold: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        item.is_low_stock(product_default_threshold)
            && !self.is_cooling_down(item.last_alert_sent, now)
    }

    /// Earliest instant at which the item may alert again
    pub fn next_allowed_at(&self, last_sent: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        last_sent.map(|last| last + self.cooldown)
    }
}

/// Record that a notification went out at `now`
pub fn mark_alert_sent(item: &mut StockItem, now: DateTime<Utc>) {
    item.last_alert_sent = Some(now);
}

/// A user who receives reorder notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRecipient {
    pub user_id: Uuid,
    pub username: String,
    pub email: Option<String>,
}

/// Warehouse manager first, then role members, each user at most once
pub fn merge_recipients(
    manager: Option<AlertRecipient>,
    role_members: impl IntoIterator<Item = AlertRecipient>,
) -> Vec<AlertRecipient> {
    let mut recipients: Vec<AlertRecipient> = Vec::new();
    for candidate in manager.into_iter().chain(role_members) {
        if !recipients.iter().any(|r| r.user_id == candidate.user_id) {
            recipients.push(candidate);
        }
    }
    recipients
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcurementStatus;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn low_item(last_alert_sent: Option<DateTime<Utc>>) -> StockItem {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        StockItem {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            batch_number: None,
            quantity: dec!(2),
            unit_cost: None,
            reorder_threshold: dec!(5),
            procurement_status: ProcurementStatus::Pending,
            location: None,
            expiry_date: None,
            manufactured_date: None,
            notes: None,
            last_alert_sent,
            usage_rate: None,
            forecast_reorder_date: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn recipient(id: Uuid, name: &str) -> AlertRecipient {
        AlertRecipient {
            user_id: id,
            username: name.to_string(),
            email: None,
        }
    }

    #[test]
    fn test_cooldown_window() {
        let policy = AlertPolicy::default();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();

        let mut item = low_item(None);
        assert!(policy.should_send_alert(&item, dec!(0), now));

        mark_alert_sent(&mut item, now);
        assert!(!policy.should_send_alert(&item, dec!(0), now));
        assert!(!policy.should_send_alert(&item, dec!(0), now + Duration::hours(23)));
        assert!(policy.should_send_alert(&item, dec!(0), now + Duration::hours(24)));
        assert_eq!(policy.next_allowed_at(item.last_alert_sent), Some(now + Duration::hours(24)));
    }

    #[test]
    fn test_no_alert_unless_low() {
        let policy = AlertPolicy::default();
        let now = Utc::now();
        let mut item = low_item(None);
        item.quantity = dec!(6);
        assert!(!policy.should_send_alert(&item, dec!(0), now));
        item.quantity = dec!(0);
        assert!(!policy.should_send_alert(&item, dec!(0), now));
    }

    #[test]
    fn test_future_timestamp_counts_as_cooling_down() {
        let policy = AlertPolicy::default();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert!(policy.is_cooling_down(Some(now + Duration::minutes(5)), now));
    }

    #[test]
    fn test_mark_alert_sent_is_idempotent() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let mut item = low_item(None);
        mark_alert_sent(&mut item, now);
        mark_alert_sent(&mut item, now);
        assert_eq!(item.last_alert_sent, Some(now));
    }

    #[test]
    fn test_recipients_deduplicated() {
        let manager = Uuid::new_v4();
        let clerk = Uuid::new_v4();
        let merged = merge_recipients(
            Some(recipient(manager, "manager")),
            vec![
                recipient(clerk, "clerk"),
                recipient(manager, "manager"),
                recipient(clerk, "clerk"),
            ],
        );
        let ids: Vec<Uuid> = merged.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![manager, clerk]);

        assert!(merge_recipients(None, Vec::new()).is_empty());
    }

    #[test]
    fn test_alert_status_transitions() {
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Resolved));
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Cancelled));
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Active));
        assert!(!AlertStatus::Cancelled.can_transition_to(AlertStatus::Resolved));
        assert!(!AlertStatus::Active.can_transition_to(AlertStatus::Active));
    }
}

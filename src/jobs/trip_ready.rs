//! Client-side scan for trip tickets that are ready to start today.
//!
//! The backend does not push about this, so the app checks once a day
//! (triggered by the `daily_trip_check` notification) and synthesizes a local
//! notification per ticket. The cache's per-day marker makes repeat scans
//! no-ops.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::models::notification::LocalEvent;
use crate::notification::cache::NotificationCache;
use crate::notification::push::{marker_payload, PushChannelCoordinator};

pub const DAILY_TRIP_CHECK: &str = "daily_trip_check";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyTicket {
    pub id: i64,
    pub ticket_number: Option<String>,
    pub scheduled_for: NaiveDate,
    pub status: String,
}

impl ReadyTicket {
    pub fn is_ready_on(&self, day: NaiveDate) -> bool {
        self.scheduled_for == day && self.status.eq_ignore_ascii_case("approved")
    }
}

/// Create a local notification for every approved ticket scheduled on
/// `today`. Returns how many were created.
pub async fn notify_ready_tickets(
    cache: &NotificationCache,
    tickets: &[ReadyTicket],
    today: NaiveDate,
) -> Result<usize> {
    let mut created = 0;
    for ticket in tickets.iter().filter(|t| t.is_ready_on(today)) {
        let event = LocalEvent::TicketReadyToday {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
        };
        if cache.create_local_notification_on(event, today).await?.is_some() {
            created += 1;
        }
    }
    tracing::debug!(scanned = tickets.len(), created, "trip-ready scan finished");
    Ok(created)
}

/// Schedule the 06:00 daily reminder that triggers the scan.
pub async fn schedule_daily_check(push: &PushChannelCoordinator) -> Option<String> {
    push.schedule_daily_notification(
        6,
        0,
        "Trips today",
        "Check the trips scheduled for today.",
        marker_payload(DAILY_TRIP_CHECK),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_approved_tickets_for_today_are_ready() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();
        let ticket = |status: &str, day: NaiveDate| ReadyTicket {
            id: 1,
            ticket_number: None,
            scheduled_for: day,
            status: status.to_string(),
        };

        assert!(ticket("approved", today).is_ready_on(today));
        assert!(ticket("Approved", today).is_ready_on(today));
        assert!(!ticket("pending", today).is_ready_on(today));
        assert!(!ticket("approved", today.succ_opt().unwrap()).is_ready_on(today));
    }
}

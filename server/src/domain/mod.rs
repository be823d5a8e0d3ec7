//! Business rules. Handlers parse the request and call in here; these
//! functions validate, apply state transitions, persist through the store
//! and fire the notification and realtime side effects.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

pub mod accounts;
pub mod analytics;
pub mod appointments;
pub mod catalog;
pub mod notifications;
pub mod notifier;
pub mod organizations;
pub mod payments;
pub mod queues;
pub mod tickets;

/// The UTC calendar date of `now`.
pub fn today(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

/// Builds a template context from literal pairs.
pub fn context<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 15, 42, 10).unwrap();
        let start = start_of_day(today(now));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_context() {
        let ctx = context([("ticket_number", "A001".to_string())]);
        assert_eq!(ctx["ticket_number"], "A001");
    }
}

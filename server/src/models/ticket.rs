use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{Priority, ProcessingStrategy};
use crate::utils::error::AppError;

db_enum! {
    pub enum TicketStatus as "ticket_status" {
        Waiting,
        Called,
        Serving,
        Served,
        Cancelled,
        Expired,
        NoShow,
        Transferred,
    }
}

impl TicketStatus {
    pub const ACTIVE: [TicketStatus; 3] =
        [TicketStatus::Waiting, TicketStatus::Called, TicketStatus::Serving];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Waiting, Called)
                | (Called, Called)
                | (Called, Serving)
                | (Called, Served)
                | (Serving, Served)
                | (Waiting, Cancelled)
                | (Called, Cancelled)
                | (Called, NoShow)
                | (Waiting, Expired)
                | (Waiting, Transferred)
                | (Called, Transferred)
        )
    }

    pub fn ensure_transition(self, next: TicketStatus) -> Result<(), AppError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "Cannot change ticket status from '{self}' to '{next}'"
            )))
        }
    }
}

db_enum! {
    #[derive(Default)]
    pub enum CreationChannel as "creation_channel" {
        Mobile,
        #[default]
        Web,
        Sms,
        Kiosk,
        Counter,
        Phone,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub sequence: i32,
    pub issued_on: NaiveDate,
    pub queue_id: Uuid,
    pub service_id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub priority: Priority,
    pub creation_channel: CreationChannel,
    pub customer_notes: String,
    pub documents_brought: Vec<String>,
    pub status: TicketStatus,
    pub serving_agent_id: Option<Uuid>,
    pub transferred_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub service_started_at: Option<DateTime<Utc>>,
    pub service_ended_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub wait_time_minutes: Option<i32>,
    pub service_time_minutes: Option<i32>,
    pub call_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Waiting && self.expires_at < now
    }
}

/// `A001`, `A012`, `A1234`: the service letter then the zero padded sequence.
pub fn format_ticket_number(prefix: char, sequence: i32) -> String {
    format!("{prefix}{sequence:03}")
}

pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i32 {
    i32::try_from((to - from).num_minutes().max(0)).unwrap_or(i32::MAX)
}

/// Compares two tickets in the order a queue serves them.
pub fn service_order(strategy: ProcessingStrategy, a: &Ticket, b: &Ticket) -> Ordering {
    let by_arrival = a
        .created_at
        .cmp(&b.created_at)
        .then(a.sequence.cmp(&b.sequence));
    if strategy.ranks_by_priority() {
        b.priority.cmp(&a.priority).then(by_arrival)
    } else {
        by_arrival
    }
}

/// Sorts in place into service order.
pub fn sort_for_service(strategy: ProcessingStrategy, tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| service_order(strategy, a, b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket(sequence: i32, priority: Priority, created_at: DateTime<Utc>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: format_ticket_number('A', sequence),
            sequence,
            issued_on: created_at.date_naive(),
            queue_id: Uuid::nil(),
            service_id: Uuid::nil(),
            organization_id: Uuid::nil(),
            customer_id: Uuid::new_v4(),
            priority,
            creation_channel: CreationChannel::Web,
            customer_notes: String::new(),
            documents_brought: Vec::new(),
            status: TicketStatus::Waiting,
            serving_agent_id: None,
            transferred_to: None,
            created_at,
            called_at: None,
            service_started_at: None,
            service_ended_at: None,
            expires_at: created_at + Duration::minutes(30),
            wait_time_minutes: None,
            service_time_minutes: None,
            call_count: 0,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_ticket_number_format() {
        assert_eq!(format_ticket_number('A', 1), "A001");
        assert_eq!(format_ticket_number('A', 12), "A012");
        assert_eq!(format_ticket_number('A', 1234), "A1234");
    }

    #[test]
    fn test_allowed_transitions() {
        use TicketStatus::*;
        assert!(Waiting.can_transition_to(Called));
        assert!(Called.can_transition_to(Called));
        assert!(Serving.can_transition_to(Served));
        assert!(!Waiting.can_transition_to(Served));
        assert!(!Served.can_transition_to(Waiting));
        assert!(!Serving.can_transition_to(Cancelled));
        assert!(!Waiting.can_transition_to(NoShow));

        let err = Waiting.ensure_transition(Served).unwrap_err();
        assert!(err.to_string().contains("'waiting'"));
        assert!(err.to_string().contains("'served'"));
    }

    #[test]
    fn test_fifo_ignores_priority() {
        let t0 = Utc::now();
        let mut tickets = vec![
            ticket(2, Priority::Urgent, t0 + Duration::seconds(5)),
            ticket(1, Priority::Low, t0),
        ];
        sort_for_service(ProcessingStrategy::Fifo, &mut tickets);
        assert_eq!(tickets[0].sequence, 1);
    }

    #[test]
    fn test_priority_strategy_ranks_urgent_first() {
        let t0 = Utc::now();
        let mut tickets = vec![
            ticket(1, Priority::Low, t0),
            ticket(2, Priority::High, t0 + Duration::seconds(5)),
            ticket(3, Priority::High, t0 + Duration::seconds(9)),
        ];
        sort_for_service(ProcessingStrategy::Priority, &mut tickets);
        let order: Vec<i32> = tickets.iter().map(|t| t.sequence).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_same_instant_falls_back_to_sequence() {
        let t0 = Utc::now();
        let mut tickets = vec![ticket(4, Priority::Low, t0), ticket(3, Priority::Low, t0)];
        sort_for_service(ProcessingStrategy::Mixed, &mut tickets);
        assert_eq!(tickets[0].sequence, 3);
    }

    #[test]
    fn test_overdue() {
        let t0 = Utc::now();
        let t = ticket(1, Priority::Low, t0);
        assert!(!t.is_overdue(t0));
        assert!(t.is_overdue(t0 + Duration::minutes(31)));
    }
}

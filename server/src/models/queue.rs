use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

db_enum! {
    #[derive(Default)]
    pub enum QueueType as "queue_type" {
        #[default]
        Normal,
        Priority,
        Vip,
        Appointment,
        Express,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum QueueStatus as "queue_status" {
        Active,
        Paused,
        #[default]
        Closed,
        Maintenance,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum ProcessingStrategy as "processing_strategy" {
        #[default]
        Fifo,
        Priority,
        AppointmentFirst,
        Mixed,
    }
}

impl ProcessingStrategy {
    /// Whether higher priority tickets jump ahead of older ones.
    pub fn ranks_by_priority(self) -> bool {
        matches!(self, ProcessingStrategy::Priority | ProcessingStrategy::Mixed)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Queue {
    pub id: Uuid,
    pub service_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub queue_type: QueueType,
    pub description: String,
    pub processing_strategy: ProcessingStrategy,
    /// Zero means unlimited.
    pub max_capacity: i32,
    pub max_wait_time: i32,
    /// Minutes a waiting ticket stays valid.
    pub ticket_expiry_time: i32,
    pub current_status: QueueStatus,
    pub last_ticket_number: i32,
    pub current_ticket_number: i32,
    pub stats_date: NaiveDate,
    pub daily_tickets_issued: i32,
    pub daily_tickets_served: i32,
    pub notifications_enabled: bool,
    pub notify_before_turns: i32,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Queue {
    pub fn new(service_id: Uuid, organization_id: Uuid, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            organization_id,
            name,
            queue_type: QueueType::default(),
            description: String::new(),
            processing_strategy: ProcessingStrategy::default(),
            max_capacity: 0,
            max_wait_time: 120,
            ticket_expiry_time: 30,
            current_status: QueueStatus::default(),
            last_ticket_number: 0,
            current_ticket_number: 0,
            stats_date: now.date_naive(),
            daily_tickets_issued: 0,
            daily_tickets_served: 0,
            notifications_enabled: true,
            notify_before_turns: 3,
            is_active: true,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.current_status == QueueStatus::Active && self.is_active
    }

    pub fn is_full(&self, waiting_count: usize) -> bool {
        self.max_capacity > 0 && waiting_count >= self.max_capacity as usize
    }

    /// Resets the daily counters when the stored day is not `today`, then
    /// hands out the next sequence number.
    pub fn allocate_number(&mut self, today: NaiveDate, now: DateTime<Utc>) -> i32 {
        if self.stats_date != today {
            self.stats_date = today;
            self.last_ticket_number = 0;
            self.daily_tickets_issued = 0;
            self.daily_tickets_served = 0;
        }
        self.last_ticket_number += 1;
        self.daily_tickets_issued += 1;
        self.updated_at = now;
        self.last_ticket_number
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_CATEGORY_COLOR: &str = "#007bff";

db_enum! {
    /// Urgency shared by services (default) and tickets. Variants are
    /// declared in ascending order so the derived `Ord` ranks them.
    #[derive(Default, PartialOrd, Ord)]
    pub enum Priority as "priority_level" {
        #[default]
        Low,
        Medium,
        High,
        Urgent,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum ServiceStatus as "service_status" {
        #[default]
        Active,
        Inactive,
        Maintenance,
        Seasonal,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceCategory {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub display_order: i32,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceCategory {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            display_order: 0,
            is_active: true,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Service {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub code: String,
    pub description: String,
    pub instructions: String,
    pub default_priority: Priority,
    /// Minutes one customer usually takes at the counter.
    pub estimated_duration: i32,
    pub max_wait_time: i32,
    pub cost: Option<Decimal>,
    pub allows_appointments: bool,
    pub requires_appointment: bool,
    /// Hours.
    pub min_appointment_notice: i32,
    /// Days.
    pub max_appointment_advance: i32,
    pub required_documents: Vec<String>,
    pub optional_documents: Vec<String>,
    pub status: ServiceStatus,
    pub is_public: bool,
    pub display_order: i32,
    pub total_tickets_issued: i64,
    pub average_rating: Decimal,
    pub total_ratings: i64,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn new(organization_id: Uuid, name: String, code: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            category_id: None,
            name,
            code,
            description: String::new(),
            instructions: String::new(),
            default_priority: Priority::default(),
            estimated_duration: 5,
            max_wait_time: 60,
            cost: None,
            allows_appointments: true,
            requires_appointment: false,
            min_appointment_notice: 2,
            max_appointment_advance: 30,
            required_documents: Vec::new(),
            optional_documents: Vec::new(),
            status: ServiceStatus::default(),
            is_public: true,
            display_order: 0,
            total_tickets_issued: 0,
            average_rating: Decimal::ZERO,
            total_ratings: 0,
            is_active: true,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ServiceStatus::Active && self.is_public && self.is_active
    }

    /// Leading letter of ticket numbers issued for this service.
    pub fn ticket_prefix(&self) -> char {
        self.code
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('T')
    }

    /// Folds one more rating into the running average, kept to one decimal.
    pub fn record_rating(&mut self, rating: i16, now: DateTime<Utc>) {
        let total = self.average_rating * Decimal::from(self.total_ratings) + Decimal::from(rating);
        self.total_ratings += 1;
        self.average_rating = (total / Decimal::from(self.total_ratings)).round_dp(1);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(Priority::default(), Priority::Low);
    }

    #[test]
    fn test_ticket_prefix() {
        let now = Utc::now();
        let mut service = Service::new(Uuid::new_v4(), "Ouverture".into(), "ouv".into(), now);
        assert_eq!(service.ticket_prefix(), 'O');
        service.code.clear();
        assert_eq!(service.ticket_prefix(), 'T');
    }

    #[test]
    fn test_rating_average_rounds_to_one_decimal() {
        let now = Utc::now();
        let mut service = Service::new(Uuid::new_v4(), "Caisse".into(), "C".into(), now);
        service.record_rating(5, now);
        service.record_rating(4, now);
        service.record_rating(4, now);
        assert_eq!(service.total_ratings, 3);
        assert_eq!(service.average_rating, Decimal::from_str("4.3").unwrap());
    }

    #[test]
    fn test_availability() {
        let now = Utc::now();
        let mut service = Service::new(Uuid::new_v4(), "Caisse".into(), "C".into(), now);
        assert!(service.is_available());
        service.status = ServiceStatus::Maintenance;
        assert!(!service.is_available());
    }
}

//! Persistence seams. Each aggregate has a repository trait; `PgStore` and
//! `MemoryStore` implement all of them and `Store` bundles the trait objects
//! handed to the rest of the application.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentHistory, AppointmentSlot, AppointmentStatus, CustomerSatisfaction,
    Notification, NotificationCategory, NotificationChannel, NotificationStatus,
    NotificationTemplate, Organization, OrganizationStatus, OrganizationType, Payment,
    PaymentProvider, PaymentStatus, Priority, Queue, QueueStatus, QueueType, Region, Service,
    ServiceCategory, ServiceStatus, Ticket, TicketStatus, User, UserRole,
};
use crate::utils::pagination::PageRequest;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ForeignKey(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return StoreError::NotFound("record".to_string());
        }
        if let Some(db) = err.as_database_error() {
            let constraint = db.constraint().unwrap_or("constraint").to_string();
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return StoreError::Conflict(conflict_message(&constraint));
                }
                Some(FOREIGN_KEY_VIOLATION) => return StoreError::ForeignKey(constraint),
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

/// Turns a unique constraint name into the message shown to clients.
pub fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_email_key" => "A user with this email already exists".into(),
        "users_phone_number_key" => "A user with this phone number already exists".into(),
        "services_organization_id_code_key" => {
            "This organization already has a service with this code".into()
        }
        "queues_service_id_queue_type_key" => {
            "This service already has a queue of this type".into()
        }
        "tickets_queue_id_issued_on_sequence_key" => "Ticket number already issued".into(),
        "tickets_one_active_per_customer_key" => {
            "You already have an active ticket in this queue".into()
        }
        "appointment_slots_service_id_day_of_week_start_time_key" => {
            "A slot already starts at this time on this day".into()
        }
        "appointments_appointment_number_key" => "Appointment number already issued".into(),
        "appointments_slot_full" => "This slot is full".into(),
        "appointments_customer_booked" => "You already have an appointment at this time".into(),
        "notification_templates_category_channel_key" => {
            "A template already exists for this category and channel".into()
        }
        "payments_payment_number_key" => "Payment number already issued".into(),
        "customer_satisfaction_ticket_id_key" => "This ticket has already been rated".into(),
        "customer_satisfaction_appointment_id_key" => {
            "This appointment has already been rated".into()
        }
        other => format!("Duplicate value violates {other}"),
    }
}

/// One page of results plus the size of the whole filtered set.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Listing<T> {
    pub fn into_parts(self) -> (Vec<T>, i64) {
        (self.items, self.total)
    }
}

#[derive(Debug, Default, Clone)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub organization_id: Option<Uuid>,
    pub include_inactive: bool,
}

#[derive(Debug, Default, Clone)]
pub struct OrganizationFilter {
    pub region: Option<Region>,
    pub org_type: Option<OrganizationType>,
    pub status: Option<OrganizationStatus>,
    pub city: Option<String>,
    pub search: Option<String>,
    pub include_inactive: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ServiceFilter {
    pub organization_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub status: Option<ServiceStatus>,
    pub is_public: Option<bool>,
    pub search: Option<String>,
    pub include_inactive: bool,
}

#[derive(Debug, Default, Clone)]
pub struct QueueFilter {
    pub organization_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub current_status: Option<QueueStatus>,
    pub queue_type: Option<QueueType>,
    pub include_inactive: bool,
}

#[derive(Debug, Default, Clone)]
pub struct TicketFilter {
    pub customer_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub queue_id: Option<Uuid>,
    pub statuses: Vec<TicketStatus>,
    pub priority: Option<Priority>,
    pub created_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
pub struct SlotFilter {
    pub organization_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub day_of_week: Option<i16>,
    pub include_inactive: bool,
}

#[derive(Debug, Default, Clone)]
pub struct AppointmentFilter {
    pub customer_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    /// Oldest first by date and time instead of newest first.
    pub ascending: bool,
}

#[derive(Debug, Default, Clone)]
pub struct NotificationFilter {
    pub recipient_id: Option<Uuid>,
    pub status: Option<NotificationStatus>,
    pub channel: Option<NotificationChannel>,
    pub unread_only: bool,
}

#[derive(Debug, Default, Clone)]
pub struct PaymentFilter {
    pub customer_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub completed_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
pub struct SatisfactionFilter {
    pub customer_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub created_since: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn insert(&self, user: &User) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update(&self, user: &User) -> StoreResult<()>;
    /// Ordered by email.
    async fn list(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<Listing<User>>;
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync + 'static {
    async fn insert(&self, organization: &Organization) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Organization>>;
    async fn update(&self, organization: &Organization) -> StoreResult<()>;
    /// Ordered by name.
    async fn list(
        &self,
        filter: &OrganizationFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Organization>>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync + 'static {
    async fn insert(&self, category: &ServiceCategory) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<ServiceCategory>>;
    async fn update(&self, category: &ServiceCategory) -> StoreResult<()>;
    /// Ordered by display order, then name.
    async fn list(
        &self,
        include_inactive: bool,
        page: PageRequest,
    ) -> StoreResult<Listing<ServiceCategory>>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync + 'static {
    async fn insert(&self, service: &Service) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Service>>;
    /// Leaves the issued-ticket and rating counters untouched.
    async fn update(&self, service: &Service) -> StoreResult<()>;
    /// Ordered by display order, then name.
    async fn list(&self, filter: &ServiceFilter, page: PageRequest)
        -> StoreResult<Listing<Service>>;
    async fn record_ticket_issued(&self, id: Uuid) -> StoreResult<()>;
    /// Folds a rating into the running average and returns the service.
    async fn record_rating(&self, id: Uuid, rating: i16, now: DateTime<Utc>)
        -> StoreResult<Service>;
}

#[async_trait]
pub trait QueueRepository: Send + Sync + 'static {
    async fn insert(&self, queue: &Queue) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Queue>>;
    /// Writes everything except the numbering and daily counters, which only
    /// `allocate_ticket_number` and `record_served` change.
    async fn update(&self, queue: &Queue) -> StoreResult<()>;
    /// Ordered by name.
    async fn list(&self, filter: &QueueFilter, page: PageRequest) -> StoreResult<Listing<Queue>>;
    /// Atomically resets the counters when `today` is a new day, then
    /// increments and returns the last ticket number.
    async fn allocate_ticket_number(
        &self,
        id: Uuid,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<i32>;
    async fn record_served(&self, id: Uuid, today: NaiveDate, now: DateTime<Utc>)
        -> StoreResult<()>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync + 'static {
    /// Fails with `Conflict` when the customer already holds an active
    /// ticket in the same queue.
    async fn insert(&self, ticket: &Ticket) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Ticket>>;
    /// Writes the ticket only if its stored status is still `expected`.
    async fn update(&self, ticket: &Ticket, expected: TicketStatus) -> StoreResult<bool>;
    /// Newest first.
    async fn list(&self, filter: &TicketFilter, page: PageRequest) -> StoreResult<Listing<Ticket>>;
    /// Waiting tickets of a queue by arrival; callers apply the strategy.
    async fn waiting(&self, queue_id: Uuid) -> StoreResult<Vec<Ticket>>;
    async fn find_active(&self, queue_id: Uuid, customer_id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn count_issued_to(&self, customer_id: Uuid, day: NaiveDate) -> StoreResult<i64>;
    /// Marks overdue waiting tickets as expired and returns them.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Ticket>>;
}

#[async_trait]
pub trait SlotRepository: Send + Sync + 'static {
    async fn insert(&self, slot: &AppointmentSlot) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<AppointmentSlot>>;
    async fn update(&self, slot: &AppointmentSlot) -> StoreResult<()>;
    /// Ordered by day of week, then start time.
    async fn list(
        &self,
        filter: &SlotFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<AppointmentSlot>>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync + 'static {
    /// Inserts a booking while holding the slot, so the capacity and the
    /// one-booking-per-customer rule are checked against committed rows.
    /// `replacing` is an appointment being moved; it does not count against
    /// the new time. Fails with `Conflict` when either rule is broken.
    async fn insert_booking(
        &self,
        appointment: &Appointment,
        capacity: i32,
        replacing: Option<Uuid>,
    ) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Appointment>>;
    /// Writes the appointment only if its stored status is still `expected`.
    async fn update(&self, appointment: &Appointment, expected: AppointmentStatus)
        -> StoreResult<bool>;
    async fn list(
        &self,
        filter: &AppointmentFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Appointment>>;
    /// Appointments holding capacity at one slot time.
    async fn count_booked(&self, slot_id: Uuid, date: NaiveDate, time: NaiveTime)
        -> StoreResult<i64>;
    async fn find_customer_booking(
        &self,
        customer_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> StoreResult<Option<Appointment>>;
    async fn count_created_by(&self, customer_id: Uuid, day: NaiveDate) -> StoreResult<i64>;
    /// Next number for the month and day of `day`. The count is shared by
    /// every year so `RDV` + MMDD + sequence never repeats.
    async fn next_daily_sequence(&self, day: NaiveDate) -> StoreResult<i32>;
    async fn add_history(&self, entry: &AppointmentHistory) -> StoreResult<()>;
    /// Oldest first.
    async fn history(&self, appointment_id: Uuid) -> StoreResult<Vec<AppointmentHistory>>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync + 'static {
    async fn insert(&self, notification: &Notification) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Notification>>;
    async fn update(&self, notification: &Notification) -> StoreResult<()>;
    /// Newest first.
    async fn list(
        &self,
        filter: &NotificationFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Notification>>;
    async fn count_unread(&self, recipient_id: Uuid, channel: NotificationChannel)
        -> StoreResult<i64>;
    async fn mark_all_read(
        &self,
        recipient_id: Uuid,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn insert_template(&self, template: &NotificationTemplate) -> StoreResult<()>;
    async fn get_template(&self, id: Uuid) -> StoreResult<Option<NotificationTemplate>>;
    async fn update_template(&self, template: &NotificationTemplate) -> StoreResult<()>;
    async fn delete_template(&self, id: Uuid) -> StoreResult<()>;
    /// Ordered by category, then channel.
    async fn list_templates(&self, page: PageRequest)
        -> StoreResult<Listing<NotificationTemplate>>;
    /// The active stored template for a category and channel, if any.
    async fn find_template(
        &self,
        category: NotificationCategory,
        channel: NotificationChannel,
    ) -> StoreResult<Option<NotificationTemplate>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync + 'static {
    async fn insert_provider(&self, provider: &PaymentProvider) -> StoreResult<()>;
    async fn get_provider(&self, id: Uuid) -> StoreResult<Option<PaymentProvider>>;
    async fn update_provider(&self, provider: &PaymentProvider) -> StoreResult<()>;
    /// Ordered by priority, then name.
    async fn list_providers(&self, include_inactive: bool) -> StoreResult<Vec<PaymentProvider>>;

    async fn insert(&self, payment: &Payment) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Payment>>;
    async fn find_by_number(&self, payment_number: &str) -> StoreResult<Option<Payment>>;
    /// Writes the payment only if its stored status is one of `expected`.
    async fn update(&self, payment: &Payment, expected: &[PaymentStatus]) -> StoreResult<bool>;
    /// Newest first.
    async fn list(&self, filter: &PaymentFilter, page: PageRequest)
        -> StoreResult<Listing<Payment>>;
}

#[async_trait]
pub trait SatisfactionRepository: Send + Sync + 'static {
    /// Fails with `Conflict` when the ticket or appointment is already rated.
    async fn insert(&self, rating: &CustomerSatisfaction) -> StoreResult<()>;
    /// Newest first.
    async fn list(
        &self,
        filter: &SatisfactionFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<CustomerSatisfaction>>;
}

/// All repositories behind one cloneable handle.
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserRepository>,
    pub organizations: Arc<dyn OrganizationRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub queues: Arc<dyn QueueRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub slots: Arc<dyn SlotRepository>,
    pub appointments: Arc<dyn AppointmentRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub satisfaction: Arc<dyn SatisfactionRepository>,
}

impl Store {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_backend(Arc::new(PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::default()))
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserRepository
            + OrganizationRepository
            + CategoryRepository
            + ServiceRepository
            + QueueRepository
            + TicketRepository
            + SlotRepository
            + AppointmentRepository
            + NotificationRepository
            + PaymentRepository
            + SatisfactionRepository,
    {
        Self {
            users: backend.clone(),
            organizations: backend.clone(),
            categories: backend.clone(),
            services: backend.clone(),
            queues: backend.clone(),
            tickets: backend.clone(),
            slots: backend.clone(),
            appointments: backend.clone(),
            notifications: backend.clone(),
            payments: backend.clone(),
            satisfaction: backend,
        }
    }
}

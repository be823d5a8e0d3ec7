//! In-process backend used by the test-suite and `STORAGE_BACKEND=memory`.
//! Every operation takes the table lock once, so read-modify-write steps
//! such as ticket numbering are atomic.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentHistory, AppointmentSlot, CustomerSatisfaction, Notification,
    NotificationTemplate, Organization, Payment, PaymentProvider, Queue, Service,
    ServiceCategory, Ticket, User,
};
use crate::store::{conflict_message, Listing, StoreError, StoreResult};
use crate::utils::pagination::PageRequest;

mod accounts;
mod appointments;
mod catalog;
mod notifications;
mod payments;
mod tickets;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    categories: HashMap<Uuid, ServiceCategory>,
    services: HashMap<Uuid, Service>,
    queues: HashMap<Uuid, Queue>,
    tickets: HashMap<Uuid, Ticket>,
    slots: HashMap<Uuid, AppointmentSlot>,
    appointments: HashMap<Uuid, Appointment>,
    appointment_history: Vec<AppointmentHistory>,
    /// Keyed by (month, day).
    appointment_counters: HashMap<(u32, u32), i32>,
    notifications: HashMap<Uuid, Notification>,
    templates: HashMap<Uuid, NotificationTemplate>,
    providers: HashMap<Uuid, PaymentProvider>,
    payments: HashMap<Uuid, Payment>,
    ratings: Vec<CustomerSatisfaction>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

/// Counts the filtered, ordered rows and cuts out the requested page.
fn paginate<T: Clone>(rows: Vec<T>, page: PageRequest) -> Listing<T> {
    let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    Listing {
        items: page.slice(&rows),
        total,
    }
}

fn conflict(constraint: &str) -> StoreError {
    StoreError::Conflict(conflict_message(constraint))
}

/// Replaces an existing row, failing when it was never inserted.
fn replace<T: Clone>(
    table: &mut HashMap<Uuid, T>,
    id: Uuid,
    row: &T,
    what: &str,
) -> StoreResult<()> {
    match table.get_mut(&id) {
        Some(existing) => {
            *existing = row.clone();
            Ok(())
        }
        None => Err(StoreError::NotFound(what.to_string())),
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

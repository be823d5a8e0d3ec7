use chrono::{DateTime, Utc};

/// Declares a string-valued enum shared by the JSON API (serde), Postgres
/// (`sqlx::Type` over a native enum type) and query strings (strum).
macro_rules! db_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $pg:tt {
            $($(#[$vmeta:meta])* $variant:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            serde::Serialize,
            serde::Deserialize,
            sqlx::Type,
            strum::Display,
            strum::EnumString,
            strum::EnumIter,
        )]
        #[serde(rename_all = "snake_case")]
        #[sqlx(type_name = $pg, rename_all = "snake_case")]
        #[strum(serialize_all = "snake_case")]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }
    };
}

pub mod appointment;
pub mod notification;
pub mod organization;
pub mod payment;
pub mod queue;
pub mod satisfaction;
pub mod service;
pub mod ticket;
pub mod user;

pub use appointment::{
    Appointment, AppointmentHistory, AppointmentPriority, AppointmentSlot, AppointmentStatus,
    SlotAvailability,
};
pub use notification::{
    Notification, NotificationCategory, NotificationChannel, NotificationPriority,
    NotificationStatus, NotificationTemplate, RelatedKind,
};
pub use organization::{
    Organization, OrganizationStatus, OrganizationType, Region, SubscriptionPlan,
};
pub use payment::{Payment, PaymentProvider, PaymentStatus, PaymentType, ProviderType};
pub use queue::{ProcessingStrategy, Queue, QueueStatus, QueueType};
pub use satisfaction::CustomerSatisfaction;
pub use service::{Priority, Service, ServiceCategory, ServiceStatus};
pub use ticket::{CreationChannel, Ticket, TicketStatus};
pub use user::{Language, User, UserRole};

/// Records that are deactivated instead of deleted.
pub trait SoftDelete {
    fn is_active(&self) -> bool;
    fn deactivate(&mut self, now: DateTime<Utc>);
    fn reactivate(&mut self, now: DateTime<Utc>);
}

macro_rules! impl_soft_delete {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SoftDelete for $ty {
                fn is_active(&self) -> bool {
                    self.is_active
                }

                fn deactivate(&mut self, now: DateTime<Utc>) {
                    self.is_active = false;
                    self.deactivated_at = Some(now);
                    self.updated_at = now;
                }

                fn reactivate(&mut self, now: DateTime<Utc>) {
                    self.is_active = true;
                    self.deactivated_at = None;
                    self.updated_at = now;
                }
            }
        )+
    };
}

impl_soft_delete!(
    User,
    Organization,
    ServiceCategory,
    Service,
    Queue,
    AppointmentSlot,
    PaymentProvider,
);

/// Drops deactivated records unless the caller asked for them.
pub fn active_only<T: SoftDelete>(
    items: impl IntoIterator<Item = T>,
    include_inactive: bool,
) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| include_inactive || item.is_active())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_enum_string_forms_agree() {
        let status = TicketStatus::NoShow;
        assert_eq!(status.to_string(), "no_show");
        assert_eq!(TicketStatus::from_str("no_show").unwrap(), status);
        assert_eq!(serde_json::to_value(status).unwrap(), "no_show");
    }

    #[test]
    fn test_region_with_hyphen() {
        assert_eq!(Region::SaintLouis.to_string(), "saint-louis");
        let parsed: Region = serde_json::from_str("\"saint-louis\"").unwrap();
        assert_eq!(parsed, Region::SaintLouis);
    }

    #[test]
    fn test_soft_delete_round_trip() {
        let now = Utc::now();
        let mut category = ServiceCategory::new("Comptes", now);
        category.deactivate(now);
        assert!(!category.is_active());
        assert_eq!(category.deactivated_at, Some(now));

        let kept = active_only(vec![category.clone()], false);
        assert!(kept.is_empty());
        let kept = active_only(vec![category.clone()], true);
        assert_eq!(kept.len(), 1);

        category.reactivate(now);
        assert!(category.is_active());
        assert!(category.deactivated_at.is_none());
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::Language;

db_enum! {
    pub enum NotificationChannel as "notification_channel" {
        Sms,
        Email,
        Push,
        Web,
    }
}

db_enum! {
    pub enum NotificationCategory as "notification_category" {
        TicketCreated,
        TicketCalled,
        TicketCompleted,
        TicketCancelled,
        QueuePositionUpdate,
        AppointmentCreated,
        AppointmentConfirmed,
        AppointmentReminder,
        AppointmentCancelled,
        AppointmentRescheduled,
        QueueOpened,
        QueueClosed,
        QueueFull,
        AccountCreated,
        PasswordReset,
        SystemMaintenance,
        PaymentCompleted,
        PaymentFailed,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum NotificationStatus as "notification_status" {
        #[default]
        Pending,
        Queued,
        Sending,
        Sent,
        Delivered,
        Read,
        Failed,
        Cancelled,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum NotificationPriority as "notification_priority" {
        Low,
        #[default]
        Normal,
        High,
        Urgent,
    }
}

db_enum! {
    pub enum RelatedKind as "related_kind" {
        Ticket,
        Appointment,
        Queue,
        Payment,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NotificationTemplate {
    pub id: Uuid,
    pub name: String,
    pub category: NotificationCategory,
    pub channel: NotificationChannel,
    pub subject_fr: String,
    pub subject_wo: String,
    pub message_fr: String,
    pub message_wo: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A subject and message ready for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub message: String,
}

impl NotificationTemplate {
    /// Wolof falls back to French when empty; English uses French.
    pub fn render(&self, language: Language, context: &HashMap<String, String>) -> RenderedMessage {
        let (subject, message) = match language {
            Language::Wo if !self.message_wo.trim().is_empty() => {
                let subject = if self.subject_wo.trim().is_empty() {
                    &self.subject_fr
                } else {
                    &self.subject_wo
                };
                (subject, &self.message_wo)
            }
            _ => (&self.subject_fr, &self.message_fr),
        };
        RenderedMessage {
            subject: fill_placeholders(subject, context),
            message: fill_placeholders(message, context),
        }
    }

    /// The French text every category ships with.
    pub fn builtin(
        category: NotificationCategory,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> Self {
        let (subject, message) = builtin_text(category);
        Self {
            id: Uuid::nil(),
            name: format!("{category} ({channel})"),
            category,
            channel,
            subject_fr: subject.to_string(),
            subject_wo: String::new(),
            message_fr: message.to_string(),
            message_wo: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

fn builtin_text(category: NotificationCategory) -> (&'static str, &'static str) {
    use NotificationCategory::*;
    match category {
        TicketCreated => (
            "Ticket {ticket_number}",
            "Votre ticket {ticket_number} pour {service_name} est enregistré. Position : {position}.",
        ),
        TicketCalled => (
            "C'est votre tour",
            "Le ticket {ticket_number} est appelé. Présentez-vous au guichet.",
        ),
        TicketCompleted => (
            "Service terminé",
            "Merci de votre visite. Le ticket {ticket_number} est clôturé.",
        ),
        TicketCancelled => (
            "Ticket annulé",
            "Le ticket {ticket_number} a été annulé.",
        ),
        QueuePositionUpdate => (
            "Votre tour approche",
            "Ticket {ticket_number} : il reste {position} personne(s) avant vous.",
        ),
        AppointmentCreated => (
            "Rendez-vous {appointment_number}",
            "Votre rendez-vous du {date} à {time} pour {service_name} est enregistré.",
        ),
        AppointmentConfirmed => (
            "Rendez-vous confirmé",
            "Votre rendez-vous {appointment_number} du {date} à {time} est confirmé.",
        ),
        AppointmentReminder => (
            "Rappel de rendez-vous",
            "Rappel : rendez-vous {appointment_number} le {date} à {time}.",
        ),
        AppointmentCancelled => (
            "Rendez-vous annulé",
            "Le rendez-vous {appointment_number} du {date} à {time} est annulé.",
        ),
        AppointmentRescheduled => (
            "Rendez-vous reporté",
            "Le rendez-vous {appointment_number} est reporté au {date} à {time}.",
        ),
        QueueOpened => (
            "File ouverte",
            "La file {queue_name} est ouverte.",
        ),
        QueueClosed => (
            "File fermée",
            "La file {queue_name} est fermée. Votre ticket {ticket_number} reste en attente.",
        ),
        QueueFull => (
            "File complète",
            "La file {queue_name} a atteint sa capacité maximale.",
        ),
        AccountCreated => (
            "Bienvenue sur SmartQueue",
            "Bonjour {first_name}, votre compte SmartQueue est créé.",
        ),
        PasswordReset => (
            "Mot de passe",
            "Votre mot de passe a été modifié.",
        ),
        SystemMaintenance => (
            "Maintenance",
            "{message}",
        ),
        PaymentCompleted => (
            "Paiement reçu",
            "Votre paiement {payment_number} de {amount} XOF est confirmé.",
        ),
        PaymentFailed => (
            "Paiement échoué",
            "Le paiement {payment_number} n'a pas abouti : {reason}.",
        ),
    }
}

/// Replaces every `{key}` found in `context`; unknown keys stay as written.
pub fn fill_placeholders(text: &str, context: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match context.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub category: NotificationCategory,
    pub channel: NotificationChannel,
    pub subject: String,
    pub message: String,
    pub related_kind: Option<RelatedKind>,
    pub related_id: Option<Uuid>,
    pub status: NotificationStatus,
    pub priority: NotificationPriority,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        category: NotificationCategory,
        channel: NotificationChannel,
        rendered: RenderedMessage,
        related: Option<(RelatedKind, Uuid)>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            category,
            channel,
            subject: rendered.subject,
            message: rendered.message,
            related_kind: related.map(|(kind, _)| kind),
            related_id: related.map(|(_, id)| id),
            status: NotificationStatus::Pending,
            priority: priority_for(category),
            scheduled_at: None,
            sent_at: None,
            read_at: None,
            attempt_count: 0,
            max_attempts: 3,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    pub fn can_retry(&self) -> bool {
        self.status == NotificationStatus::Failed && self.attempt_count < self.max_attempts
    }

    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if self.read_at.is_none() {
            self.read_at = Some(now);
            self.status = NotificationStatus::Read;
            self.updated_at = now;
        }
    }
}

fn priority_for(category: NotificationCategory) -> NotificationPriority {
    match category {
        NotificationCategory::TicketCalled => NotificationPriority::Urgent,
        NotificationCategory::QueuePositionUpdate
        | NotificationCategory::AppointmentReminder
        | NotificationCategory::QueueClosed => NotificationPriority::High,
        _ => NotificationPriority::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholders() {
        let context = ctx(&[("ticket_number", "A012"), ("position", "3")]);
        assert_eq!(
            fill_placeholders("Ticket {ticket_number} at {position}, {unknown}", &context),
            "Ticket A012 at 3, {unknown}"
        );
        assert_eq!(fill_placeholders("open { brace", &context), "open { brace");
    }

    #[test]
    fn test_wolof_falls_back_to_french() {
        let now = Utc::now();
        let mut template =
            NotificationTemplate::builtin(NotificationCategory::TicketCalled, NotificationChannel::Sms, now);
        let context = ctx(&[("ticket_number", "B004")]);

        let fr = template.render(Language::Wo, &context);
        assert!(fr.message.contains("B004"));
        assert!(fr.message.contains("Présentez-vous"));

        template.message_wo = "Sa tour la, {ticket_number}".into();
        let wo = template.render(Language::Wo, &context);
        assert_eq!(wo.message, "Sa tour la, B004");
        assert_eq!(wo.subject, template.subject_fr);

        let en = template.render(Language::En, &context);
        assert_eq!(en, fr);
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let now = Utc::now();
        let rendered = RenderedMessage {
            subject: "s".into(),
            message: "m".into(),
        };
        let mut n = Notification::new(
            Uuid::new_v4(),
            NotificationCategory::TicketCreated,
            NotificationChannel::Web,
            rendered,
            None,
            now,
        );
        n.mark_read(now);
        let first = n.read_at;
        n.mark_read(now + chrono::Duration::minutes(1));
        assert_eq!(n.read_at, first);
        assert!(!n.is_unread());
    }
}

//! The user's inbox, manual sends, templates and channel preferences.
//! Dispatch itself lives in [`crate::domain::notifier`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_admin, require_staff, require_super_admin};
use crate::models::{
    Language, Notification, NotificationCategory, NotificationChannel, NotificationStatus,
    NotificationTemplate, User,
};
use crate::state::AppState;
use crate::store::{Listing, NotificationFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

/// The channel whose records make up the in-app inbox.
pub const INBOX: NotificationChannel = NotificationChannel::Web;

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    pub status: Option<NotificationStatus>,
    pub channel: Option<NotificationChannel>,
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub user_id: Uuid,
    pub category: NotificationCategory,
    #[serde(default)]
    pub context: HashMap<String, String>,
    /// Only this channel instead of every channel the user accepts.
    pub channel: Option<NotificationChannel>,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub user_ids: Vec<Uuid>,
    pub category: NotificationCategory,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub recipients: usize,
    pub notifications: usize,
    pub missing: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplatePayload {
    pub name: Option<String>,
    pub category: Option<NotificationCategory>,
    pub channel: Option<NotificationChannel>,
    pub subject_fr: Option<String>,
    pub subject_wo: Option<String>,
    pub message_fr: Option<String>,
    pub message_wo: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct Preferences {
    pub push_notifications_enabled: bool,
    pub email_notifications_enabled: bool,
    pub sms_notifications_enabled: bool,
    pub preferred_language: Language,
}

impl From<&User> for Preferences {
    fn from(user: &User) -> Self {
        Self {
            push_notifications_enabled: user.push_notifications_enabled,
            email_notifications_enabled: user.email_notifications_enabled,
            sms_notifications_enabled: user.sms_notifications_enabled,
            preferred_language: user.preferred_language,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub push_notifications_enabled: Option<bool>,
    pub email_notifications_enabled: Option<bool>,
    pub sms_notifications_enabled: Option<bool>,
    pub preferred_language: Option<Language>,
}

pub async fn list(
    state: &AppState,
    user: &User,
    query: InboxQuery,
    page: PageRequest,
) -> AppResult<Listing<Notification>> {
    let filter = NotificationFilter {
        recipient_id: Some(user.id),
        status: query.status,
        channel: query.channel,
        unread_only: query.unread,
    };
    Ok(state.store.notifications.list(&filter, page).await?)
}

async fn own(state: &AppState, user: &User, id: Uuid) -> AppResult<Notification> {
    let notification = state
        .store
        .notifications
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Notification", id))?;
    if notification.recipient_id != user.id {
        return Err(AppError::forbidden("This notification belongs to another user"));
    }
    Ok(notification)
}

pub async fn detail(state: &AppState, user: &User, id: Uuid) -> AppResult<Notification> {
    own(state, user, id).await
}

pub async fn mark_read(
    state: &AppState,
    user: &User,
    id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Notification> {
    let mut notification = own(state, user, id).await?;
    if notification.is_unread() {
        notification.mark_read(now);
        state.store.notifications.update(&notification).await?;
    }
    Ok(notification)
}

pub async fn mark_all_read(state: &AppState, user: &User, now: DateTime<Utc>) -> AppResult<MarkedRead> {
    let marked = state
        .store
        .notifications
        .mark_all_read(user.id, INBOX, now)
        .await?;
    Ok(MarkedRead { marked })
}

pub async fn unread_count(state: &AppState, user: &User) -> AppResult<UnreadCount> {
    let unread = state.store.notifications.count_unread(user.id, INBOX).await?;
    Ok(UnreadCount { unread })
}

async fn recipient(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .store
        .users
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))
}

pub async fn send(
    state: &AppState,
    actor: &User,
    request: SendRequest,
    now: DateTime<Utc>,
) -> AppResult<Vec<Notification>> {
    require_staff(actor)?;
    let user = recipient(state, request.user_id).await?;
    let sent = match request.channel {
        Some(channel) => vec![
            state
                .notifier
                .send(&user, request.category, channel, &request.context, None, now)
                .await?,
        ],
        None => {
            state
                .notifier
                .notify(&user, request.category, &request.context, None, now)
                .await
        }
    };
    info!(sender = %actor.id, recipient = %user.id, category = %request.category, count = sent.len(), "Manual notification sent");
    Ok(sent)
}

pub async fn bulk(
    state: &AppState,
    actor: &User,
    request: BulkRequest,
    now: DateTime<Utc>,
) -> AppResult<BulkResult> {
    require_admin(actor)?;
    if request.user_ids.is_empty() {
        return Err(AppError::validation("user_ids cannot be empty"));
    }
    let mut result = BulkResult {
        recipients: 0,
        notifications: 0,
        missing: Vec::new(),
    };
    for id in request.user_ids {
        match state.store.users.get(id).await? {
            Some(user) => {
                let sent = state
                    .notifier
                    .notify(&user, request.category, &request.context, None, now)
                    .await;
                result.recipients += 1;
                result.notifications += sent.len();
            }
            None => result.missing.push(id),
        }
    }
    info!(sender = %actor.id, category = %request.category, recipients = result.recipients, "Bulk notification sent");
    Ok(result)
}

pub async fn retry(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Notification> {
    require_staff(actor)?;
    let notification = state
        .store
        .notifications
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Notification", id))?;
    state.notifier.retry(notification, now).await
}

fn apply_template(template: &mut NotificationTemplate, payload: TemplatePayload) -> AppResult<()> {
    if let Some(name) = payload.name {
        template.name = name.trim().to_string();
    }
    if let Some(category) = payload.category {
        template.category = category;
    }
    if let Some(channel) = payload.channel {
        template.channel = channel;
    }
    if let Some(subject) = payload.subject_fr {
        template.subject_fr = subject;
    }
    if let Some(subject) = payload.subject_wo {
        template.subject_wo = subject;
    }
    if let Some(message) = payload.message_fr {
        template.message_fr = message;
    }
    if let Some(message) = payload.message_wo {
        template.message_wo = message;
    }
    if let Some(active) = payload.is_active {
        template.is_active = active;
    }
    validation::not_blank("name", &template.name)?;
    validation::max_len("name", &template.name, 100)?;
    validation::max_len("subject_fr", &template.subject_fr, 200)?;
    validation::max_len("subject_wo", &template.subject_wo, 200)?;
    validation::not_blank("message_fr", &template.message_fr)
}

pub async fn get_template(state: &AppState, id: Uuid) -> AppResult<NotificationTemplate> {
    state
        .store
        .notifications
        .get_template(id)
        .await?
        .ok_or_else(|| AppError::not_found("Notification template", id))
}

pub async fn list_templates(
    state: &AppState,
    actor: &User,
    page: PageRequest,
) -> AppResult<Listing<NotificationTemplate>> {
    require_staff(actor)?;
    Ok(state.store.notifications.list_templates(page).await?)
}

pub async fn create_template(
    state: &AppState,
    actor: &User,
    payload: TemplatePayload,
    now: DateTime<Utc>,
) -> AppResult<NotificationTemplate> {
    require_super_admin(actor)?;
    let (Some(category), Some(channel)) = (payload.category, payload.channel) else {
        return Err(AppError::validation("category and channel are required"));
    };
    let mut template = NotificationTemplate::builtin(category, channel, now);
    template.id = Uuid::new_v4();
    template.message_fr.clear();
    apply_template(&mut template, payload)?;
    state.store.notifications.insert_template(&template).await?;
    info!(template_id = %template.id, %category, %channel, "Notification template created");
    Ok(template)
}

pub async fn update_template(
    state: &AppState,
    actor: &User,
    id: Uuid,
    payload: TemplatePayload,
    now: DateTime<Utc>,
) -> AppResult<NotificationTemplate> {
    require_super_admin(actor)?;
    let mut template = get_template(state, id).await?;
    apply_template(&mut template, payload)?;
    template.updated_at = now;
    state.store.notifications.update_template(&template).await?;
    Ok(template)
}

pub async fn delete_template(state: &AppState, actor: &User, id: Uuid) -> AppResult<()> {
    require_super_admin(actor)?;
    get_template(state, id).await?;
    Ok(state.store.notifications.delete_template(id).await?)
}

pub async fn update_preferences(
    state: &AppState,
    mut user: User,
    update: PreferencesUpdate,
    now: DateTime<Utc>,
) -> AppResult<Preferences> {
    if let Some(flag) = update.push_notifications_enabled {
        user.push_notifications_enabled = flag;
    }
    if let Some(flag) = update.email_notifications_enabled {
        user.email_notifications_enabled = flag;
    }
    if let Some(flag) = update.sms_notifications_enabled {
        user.sms_notifications_enabled = flag;
    }
    if let Some(language) = update.preferred_language {
        user.preferred_language = language;
    }
    user.updated_at = now;
    state.store.users.update(&user).await?;
    Ok(Preferences::from(&user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::context;
    use crate::models::UserRole;
    use crate::store::Store;

    async fn user(state: &AppState, email: &str, role: UserRole) -> User {
        let user = User::new(
            email.into(),
            String::new(),
            "Awa".into(),
            "Ba".into(),
            role,
            Utc::now(),
        );
        state.store.users.insert(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_inbox_counts_web_only() {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let customer = user(&state, "awa@example.sn", UserRole::Customer).await;
        let now = Utc::now();
        let sent = state
            .notifier
            .notify(
                &customer,
                NotificationCategory::AccountCreated,
                &context([("first_name", "Awa".to_string())]),
                None,
                now,
            )
            .await;
        // web, push and email; no phone so no sms
        assert_eq!(sent.len(), 3);
        assert_eq!(unread_count(&state, &customer).await.unwrap().unread, 1);

        let marked = mark_all_read(&state, &customer, now).await.unwrap();
        assert_eq!(marked.marked, 1);
        assert_eq!(unread_count(&state, &customer).await.unwrap().unread, 0);
    }

    #[tokio::test]
    async fn test_cannot_read_someone_elses_notification() {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let owner = user(&state, "owner@example.sn", UserRole::Customer).await;
        let other = user(&state, "other@example.sn", UserRole::Customer).await;
        let sent = state
            .notifier
            .send(
                &owner,
                NotificationCategory::PasswordReset,
                NotificationChannel::Web,
                &HashMap::new(),
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(matches!(
            mark_read(&state, &other, sent.id, Utc::now()).await,
            Err(AppError::Forbidden(_))
        ));
        let read = mark_read(&state, &owner, sent.id, Utc::now()).await.unwrap();
        assert_eq!(read.status, NotificationStatus::Read);
    }

    #[tokio::test]
    async fn test_send_requires_staff_and_honours_channel() {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let customer = user(&state, "c@example.sn", UserRole::Customer).await;
        let staff = user(&state, "s@example.sn", UserRole::Staff).await;
        let request = |channel| SendRequest {
            user_id: customer.id,
            category: NotificationCategory::SystemMaintenance,
            context: context([("message", "Coupure 14h".to_string())]),
            channel,
        };

        assert!(send(&state, &customer, request(None), Utc::now()).await.is_err());
        let sent = send(&state, &staff, request(Some(NotificationChannel::Email)), Utc::now())
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, NotificationChannel::Email);
        assert_eq!(sent[0].message, "Coupure 14h");
    }

    #[tokio::test]
    async fn test_template_and_preferences() {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let root = user(&state, "root@example.sn", UserRole::SuperAdmin).await;
        let customer = user(&state, "pref@example.sn", UserRole::Customer).await;
        let now = Utc::now();

        let payload = TemplatePayload {
            name: Some("Appel SMS".into()),
            category: Some(NotificationCategory::TicketCalled),
            channel: Some(NotificationChannel::Sms),
            message_fr: Some("{ticket_number} au guichet".into()),
            ..Default::default()
        };
        let template = create_template(&state, &root, payload, now).await.unwrap();
        assert_eq!(template.message_fr, "{ticket_number} au guichet");

        let missing_message = TemplatePayload {
            name: Some("Vide".into()),
            category: Some(NotificationCategory::TicketCreated),
            channel: Some(NotificationChannel::Sms),
            ..Default::default()
        };
        assert!(create_template(&state, &root, missing_message, now).await.is_err());

        let prefs = update_preferences(
            &state,
            customer.clone(),
            PreferencesUpdate {
                email_notifications_enabled: Some(false),
                preferred_language: Some(Language::Wo),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();
        assert!(!prefs.email_notifications_enabled);
        let stored = state.store.users.get(customer.id).await.unwrap().unwrap();
        assert_eq!(stored.preferred_language, Language::Wo);
        assert!(!state
            .notifier
            .channels_for(&stored)
            .contains(&NotificationChannel::Email));
    }
}

//! Notification dispatch: picks the channels a user can be reached on,
//! renders the template for each, stores one record per channel and hands it
//! to that channel's provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ChannelConfig;
use crate::models::{
    Notification, NotificationCategory, NotificationChannel, NotificationStatus,
    NotificationTemplate, RelatedKind, User,
};
use crate::models::notification::RenderedMessage;
use crate::realtime::{Channel, Event, Hub};
use crate::store::{Store, StoreResult};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// One outbound channel. Real SMS, push and e-mail gateways plug in here.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    async fn deliver(&self, recipient: &User, notification: &Notification)
        -> Result<(), DeliveryError>;
}

pub struct MockSmsProvider {
    simulate_failure: bool,
}

impl MockSmsProvider {
    pub fn new(simulate_failure: bool) -> Self {
        Self { simulate_failure }
    }
}

#[async_trait]
impl ChannelProvider for MockSmsProvider {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Sms
    }

    async fn deliver(&self, recipient: &User, notification: &Notification) -> Result<(), DeliveryError> {
        if self.simulate_failure {
            return Err(DeliveryError("SMS gateway unavailable".into()));
        }
        let phone = recipient
            .phone_number
            .as_deref()
            .ok_or_else(|| DeliveryError("Recipient has no phone number".into()))?;
        info!(to = %phone, notification_id = %notification.id, "SMS sent (mock)");
        Ok(())
    }
}

pub struct MockPushProvider;

#[async_trait]
impl ChannelProvider for MockPushProvider {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Push
    }

    async fn deliver(&self, recipient: &User, notification: &Notification) -> Result<(), DeliveryError> {
        info!(user_id = %recipient.id, notification_id = %notification.id, "Push sent (mock)");
        Ok(())
    }
}

pub struct MockEmailProvider;

#[async_trait]
impl ChannelProvider for MockEmailProvider {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn deliver(&self, recipient: &User, notification: &Notification) -> Result<(), DeliveryError> {
        info!(to = %recipient.email, notification_id = %notification.id, "E-mail sent (mock)");
        Ok(())
    }
}

/// In-app inbox: pushes the record to the user's realtime channel.
pub struct WebProvider {
    hub: Hub,
}

#[async_trait]
impl ChannelProvider for WebProvider {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Web
    }

    async fn deliver(&self, recipient: &User, notification: &Notification) -> Result<(), DeliveryError> {
        let mut delivered = notification.clone();
        delivered.status = NotificationStatus::Sent;
        self.hub.publish(
            Channel::User(recipient.id),
            Event::Notification {
                notification: delivered,
            },
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    store: Store,
    channels: ChannelConfig,
    providers: Arc<HashMap<NotificationChannel, Arc<dyn ChannelProvider>>>,
}

impl Notifier {
    /// Mock providers for every channel.
    pub fn new(store: Store, hub: Hub, channels: ChannelConfig) -> Self {
        let providers: Vec<Arc<dyn ChannelProvider>> = vec![
            Arc::new(WebProvider { hub }),
            Arc::new(MockSmsProvider::new(channels.sms_simulate_failure)),
            Arc::new(MockPushProvider),
            Arc::new(MockEmailProvider),
        ];
        Self::with_providers(store, channels, providers)
    }

    pub fn with_providers(
        store: Store,
        channels: ChannelConfig,
        providers: Vec<Arc<dyn ChannelProvider>>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.channel(), provider))
            .collect();
        Self {
            store,
            channels,
            providers: Arc::new(providers),
        }
    }

    /// Web always; the others when enabled for the deployment and by the user.
    pub fn channels_for(&self, user: &User) -> Vec<NotificationChannel> {
        let mut channels = vec![NotificationChannel::Web];
        if self.channels.push_enabled && user.push_notifications_enabled {
            channels.push(NotificationChannel::Push);
        }
        if self.channels.sms_enabled
            && user.sms_notifications_enabled
            && user.phone_number.is_some()
        {
            channels.push(NotificationChannel::Sms);
        }
        if self.channels.email_enabled && user.email_notifications_enabled {
            channels.push(NotificationChannel::Email);
        }
        channels
    }

    /// Sends on every channel the user accepts. Failures are logged and never
    /// bubble up to the request that triggered the notification.
    pub async fn notify(
        &self,
        user: &User,
        category: NotificationCategory,
        context: &HashMap<String, String>,
        related: Option<(RelatedKind, Uuid)>,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let mut sent = Vec::new();
        for channel in self.channels_for(user) {
            match self.send(user, category, channel, context, related, now).await {
                Ok(notification) => sent.push(notification),
                Err(e) => warn!(
                    user_id = %user.id,
                    %category,
                    %channel,
                    error = %e,
                    "Notification dispatch failed"
                ),
            }
        }
        sent
    }

    /// Looks the recipient up first; a missing user is logged and skipped.
    pub async fn notify_user(
        &self,
        user_id: Uuid,
        category: NotificationCategory,
        context: &HashMap<String, String>,
        related: Option<(RelatedKind, Uuid)>,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        match self.store.users.get(user_id).await {
            Ok(Some(user)) => self.notify(&user, category, context, related, now).await,
            Ok(None) => {
                warn!(%user_id, %category, "Notification recipient not found");
                Vec::new()
            }
            Err(e) => {
                warn!(%user_id, error = %e, "Could not load notification recipient");
                Vec::new()
            }
        }
    }

    /// Renders, stores and delivers one notification on one channel.
    pub async fn send(
        &self,
        user: &User,
        category: NotificationCategory,
        channel: NotificationChannel,
        context: &HashMap<String, String>,
        related: Option<(RelatedKind, Uuid)>,
        now: DateTime<Utc>,
    ) -> AppResult<Notification> {
        let template = self.template(category, channel, now).await?;
        let rendered: RenderedMessage = template.render(user.preferred_language, context);
        let notification = Notification::new(user.id, category, channel, rendered, related, now);
        self.store.notifications.insert(&notification).await?;
        Ok(self.deliver(user, notification, now).await?)
    }

    /// Another delivery round for a failed notification, with a fresh
    /// attempt budget.
    pub async fn retry(&self, mut notification: Notification, now: DateTime<Utc>) -> AppResult<Notification> {
        if notification.status != NotificationStatus::Failed {
            return Err(AppError::validation(format!(
                "Only failed notifications can be retried (status is '{}')",
                notification.status
            )));
        }
        let user = self
            .store
            .users
            .get(notification.recipient_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", notification.recipient_id))?;
        notification.attempt_count = 0;
        Ok(self.deliver(&user, notification, now).await?)
    }

    async fn template(
        &self,
        category: NotificationCategory,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> StoreResult<NotificationTemplate> {
        Ok(self
            .store
            .notifications
            .find_template(category, channel)
            .await?
            .unwrap_or_else(|| NotificationTemplate::builtin(category, channel, now)))
    }

    /// Tries the provider until it succeeds or the attempts run out.
    async fn deliver(
        &self,
        user: &User,
        mut notification: Notification,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let Some(provider) = self.providers.get(&notification.channel).cloned() else {
            notification.status = NotificationStatus::Failed;
            notification.attempt_count = notification.max_attempts;
            notification.error_message = Some(format!("No provider for {}", notification.channel));
            notification.updated_at = now;
            self.store.notifications.update(&notification).await?;
            return Ok(notification);
        };

        loop {
            notification.status = NotificationStatus::Sending;
            match provider.deliver(user, &notification).await {
                Ok(()) => {
                    notification.status = NotificationStatus::Sent;
                    notification.sent_at = Some(now);
                    notification.error_message = None;
                    debug!(notification_id = %notification.id, channel = %notification.channel, "Notification sent");
                    break;
                }
                Err(e) => {
                    notification.attempt_count += 1;
                    notification.status = NotificationStatus::Failed;
                    notification.error_message = Some(e.to_string());
                    if !notification.can_retry() {
                        warn!(
                            notification_id = %notification.id,
                            channel = %notification.channel,
                            attempts = notification.attempt_count,
                            error = %e,
                            "Notification delivery failed"
                        );
                        break;
                    }
                }
            }
        }
        notification.updated_at = now;
        self.store.notifications.update(&notification).await?;
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::UserRole;
    use crate::store::NotificationFilter;
    use crate::utils::pagination::PageRequest;

    async fn customer(store: &Store) -> User {
        let mut user = User::new(
            "fatou@example.sn".into(),
            String::new(),
            "Fatou".into(),
            "Sall".into(),
            UserRole::Customer,
            Utc::now(),
        );
        user.phone_number = Some("+221771234567".into());
        user.sms_notifications_enabled = true;
        store.users.insert(&user).await.unwrap();
        user
    }

    fn notifier(store: &Store, sms_fails: bool) -> Notifier {
        let mut channels = Config::for_tests().channels;
        channels.sms_simulate_failure = sms_fails;
        Notifier::new(store.clone(), Hub::new(), channels)
    }

    #[test]
    fn test_channel_selection() {
        let store = Store::in_memory();
        let notifier = notifier(&store, false);
        let mut user = User::new(
            "a@b.sn".into(),
            String::new(),
            "A".into(),
            "B".into(),
            UserRole::Customer,
            Utc::now(),
        );
        assert_eq!(
            notifier.channels_for(&user),
            vec![
                NotificationChannel::Web,
                NotificationChannel::Push,
                NotificationChannel::Email
            ]
        );

        user.sms_notifications_enabled = true;
        assert!(!notifier.channels_for(&user).contains(&NotificationChannel::Sms));
        user.phone_number = Some("+221770000000".into());
        assert!(notifier.channels_for(&user).contains(&NotificationChannel::Sms));

        user.push_notifications_enabled = false;
        user.email_notifications_enabled = false;
        user.sms_notifications_enabled = false;
        assert_eq!(notifier.channels_for(&user), vec![NotificationChannel::Web]);
    }

    #[tokio::test]
    async fn test_notify_stores_one_record_per_channel() {
        let store = Store::in_memory();
        let user = customer(&store).await;
        let notifier = notifier(&store, false);
        let ctx = HashMap::from([("ticket_number".to_string(), "A007".to_string())]);

        let sent = notifier
            .notify(&user, NotificationCategory::TicketCalled, &ctx, None, Utc::now())
            .await;
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|n| n.status == NotificationStatus::Sent));
        assert!(sent.iter().all(|n| n.message.contains("A007")));

        let filter = NotificationFilter {
            recipient_id: Some(user.id),
            ..Default::default()
        };
        let stored = store
            .notifications
            .list(&filter, PageRequest::everything())
            .await
            .unwrap();
        assert_eq!(stored.total, 4);
    }

    #[tokio::test]
    async fn test_failed_sms_is_retried_then_marked_failed() {
        let store = Store::in_memory();
        let user = customer(&store).await;
        let notifier = notifier(&store, true);

        let sent = notifier
            .notify(&user, NotificationCategory::TicketCreated, &HashMap::new(), None, Utc::now())
            .await;
        let sms = sent
            .iter()
            .find(|n| n.channel == NotificationChannel::Sms)
            .unwrap();
        assert_eq!(sms.status, NotificationStatus::Failed);
        assert_eq!(sms.attempt_count, sms.max_attempts);
        assert_eq!(sms.error_message.as_deref(), Some("SMS gateway unavailable"));

        let web = sent
            .iter()
            .find(|n| n.channel == NotificationChannel::Web)
            .unwrap();
        assert_eq!(web.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_stored_template_overrides_builtin() {
        let store = Store::in_memory();
        let user = customer(&store).await;
        let now = Utc::now();
        let mut template =
            NotificationTemplate::builtin(NotificationCategory::TicketCalled, NotificationChannel::Web, now);
        template.id = Uuid::new_v4();
        template.message_fr = "Guichet libre pour {ticket_number}".into();
        store.notifications.insert_template(&template).await.unwrap();

        let ctx = HashMap::from([("ticket_number".to_string(), "B002".to_string())]);
        let sent = notifier(&store, false)
            .send(
                &user,
                NotificationCategory::TicketCalled,
                NotificationChannel::Web,
                &ctx,
                None,
                now,
            )
            .await
            .unwrap();
        assert_eq!(sent.message, "Guichet libre pour B002");
    }

    #[tokio::test]
    async fn test_retry_requires_failed_status() {
        let store = Store::in_memory();
        let user = customer(&store).await;
        let notifier = notifier(&store, false);
        let sent = notifier
            .send(
                &user,
                NotificationCategory::TicketCreated,
                NotificationChannel::Web,
                &HashMap::new(),
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(notifier.retry(sent, Utc::now()).await.is_err());
    }
}

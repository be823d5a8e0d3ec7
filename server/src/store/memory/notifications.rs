use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{conflict, paginate, replace, MemoryStore, Tables};
use crate::models::{
    Notification, NotificationCategory, NotificationChannel, NotificationTemplate,
};
use crate::store::{
    Listing, NotificationFilter, NotificationRepository, StoreError, StoreResult,
};
use crate::utils::pagination::PageRequest;

fn check_template_unique(tables: &Tables, template: &NotificationTemplate) -> StoreResult<()> {
    if tables.templates.values().any(|t| {
        t.id != template.id && t.category == template.category && t.channel == template.channel
    }) {
        return Err(conflict("notification_templates_category_channel_key"));
    }
    Ok(())
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert(&self, notification: &Notification) -> StoreResult<()> {
        self.tables
            .write()
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        Ok(self.tables.read().notifications.get(&id).cloned())
    }

    async fn update(&self, notification: &Notification) -> StoreResult<()> {
        let mut tables = self.tables.write();
        replace(
            &mut tables.notifications,
            notification.id,
            notification,
            "notification",
        )
    }

    async fn list(
        &self,
        filter: &NotificationFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Notification>> {
        let tables = self.tables.read();
        let mut rows: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| filter.recipient_id.map_or(true, |r| n.recipient_id == r))
            .filter(|n| filter.status.map_or(true, |s| n.status == s))
            .filter(|n| filter.channel.map_or(true, |c| n.channel == c))
            .filter(|n| !filter.unread_only || n.is_unread())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn count_unread(
        &self,
        recipient_id: Uuid,
        channel: NotificationChannel,
    ) -> StoreResult<i64> {
        let count = self
            .tables
            .read()
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id && n.channel == channel && n.is_unread())
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn mark_all_read(
        &self,
        recipient_id: Uuid,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let mut changed = 0u64;
        for notification in tables.notifications.values_mut().filter(|n| {
            n.recipient_id == recipient_id && n.channel == channel && n.is_unread()
        }) {
            notification.mark_read(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn insert_template(&self, template: &NotificationTemplate) -> StoreResult<()> {
        let mut tables = self.tables.write();
        check_template_unique(&tables, template)?;
        tables.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> StoreResult<Option<NotificationTemplate>> {
        Ok(self.tables.read().templates.get(&id).cloned())
    }

    async fn update_template(&self, template: &NotificationTemplate) -> StoreResult<()> {
        let mut tables = self.tables.write();
        check_template_unique(&tables, template)?;
        replace(&mut tables.templates, template.id, template, "template")
    }

    async fn delete_template(&self, id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .templates
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("template".into()))
    }

    async fn list_templates(
        &self,
        page: PageRequest,
    ) -> StoreResult<Listing<NotificationTemplate>> {
        let tables = self.tables.read();
        let mut rows: Vec<NotificationTemplate> = tables.templates.values().cloned().collect();
        rows.sort_by(|a, b| {
            a.category
                .to_string()
                .cmp(&b.category.to_string())
                .then_with(|| a.channel.to_string().cmp(&b.channel.to_string()))
        });
        Ok(paginate(rows, page))
    }

    async fn find_template(
        &self,
        category: NotificationCategory,
        channel: NotificationChannel,
    ) -> StoreResult<Option<NotificationTemplate>> {
        Ok(self
            .tables
            .read()
            .templates
            .values()
            .find(|t| t.category == category && t.channel == channel && t.is_active)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::notification::RenderedMessage;
    use crate::models::{Notification, NotificationCategory, NotificationChannel};
    use crate::store::Store;

    fn notification(recipient: Uuid, channel: NotificationChannel) -> Notification {
        Notification::new(
            recipient,
            NotificationCategory::TicketCreated,
            channel,
            RenderedMessage {
                subject: "Ticket".into(),
                message: "A001".into(),
            },
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_mark_all_read_only_touches_one_channel() {
        let store = Store::in_memory();
        let me = Uuid::new_v4();
        for channel in [
            NotificationChannel::Web,
            NotificationChannel::Web,
            NotificationChannel::Sms,
        ] {
            store
                .notifications
                .insert(&notification(me, channel))
                .await
                .unwrap();
        }
        store
            .notifications
            .insert(&notification(Uuid::new_v4(), NotificationChannel::Web))
            .await
            .unwrap();

        assert_eq!(
            store
                .notifications
                .count_unread(me, NotificationChannel::Web)
                .await
                .unwrap(),
            2
        );
        let changed = store
            .notifications
            .mark_all_read(me, NotificationChannel::Web, Utc::now())
            .await
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(
            store
                .notifications
                .count_unread(me, NotificationChannel::Sms)
                .await
                .unwrap(),
            1
        );
    }
}

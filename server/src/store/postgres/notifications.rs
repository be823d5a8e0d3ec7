use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_page, PgStore};
use crate::models::{
    Notification, NotificationCategory, NotificationChannel, NotificationTemplate,
};
use crate::store::{
    Listing, NotificationFilter, NotificationRepository, StoreError, StoreResult,
};
use crate::utils::pagination::PageRequest;

fn push_notification_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &NotificationFilter) {
    if let Some(recipient) = filter.recipient_id {
        qb.push(" AND recipient_id = ").push_bind(recipient);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(channel) = filter.channel {
        qb.push(" AND channel = ").push_bind(channel);
    }
    if filter.unread_only {
        qb.push(" AND read_at IS NULL");
    }
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn insert(&self, n: &Notification) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, category, channel, subject, message, \
             related_kind, related_id, status, priority, scheduled_at, sent_at, read_at, \
             attempt_count, max_attempts, error_message, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(n.id)
        .bind(n.recipient_id)
        .bind(n.category)
        .bind(n.channel)
        .bind(&n.subject)
        .bind(&n.message)
        .bind(n.related_kind)
        .bind(n.related_id)
        .bind(n.status)
        .bind(n.priority)
        .bind(n.scheduled_at)
        .bind(n.sent_at)
        .bind(n.read_at)
        .bind(n.attempt_count)
        .bind(n.max_attempts)
        .bind(&n.error_message)
        .bind(n.created_at)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        Ok(
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update(&self, n: &Notification) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET subject = $2, message = $3, status = $4, priority = $5, \
             scheduled_at = $6, sent_at = $7, read_at = $8, attempt_count = $9, \
             max_attempts = $10, error_message = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(n.id)
        .bind(&n.subject)
        .bind(&n.message)
        .bind(n.status)
        .bind(n.priority)
        .bind(n.scheduled_at)
        .bind(n.sent_at)
        .bind(n.read_at)
        .bind(n.attempt_count)
        .bind(n.max_attempts)
        .bind(&n.error_message)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("notification".into()));
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &NotificationFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Notification>> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications WHERE TRUE");
        push_notification_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM notifications WHERE TRUE");
        push_notification_filters(&mut rows, filter);
        push_page(&mut rows, "created_at DESC, id DESC", page);
        let items = rows
            .build_query_as::<Notification>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Listing { items, total })
    }

    async fn count_unread(
        &self,
        recipient_id: Uuid,
        channel: NotificationChannel,
    ) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications \
             WHERE recipient_id = $1 AND channel = $2 AND read_at IS NULL",
        )
        .bind(recipient_id)
        .bind(channel)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn mark_all_read(
        &self,
        recipient_id: Uuid,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $3, status = 'read', updated_at = $3 \
             WHERE recipient_id = $1 AND channel = $2 AND read_at IS NULL",
        )
        .bind(recipient_id)
        .bind(channel)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_template(&self, t: &NotificationTemplate) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO notification_templates (id, name, category, channel, subject_fr, \
             subject_wo, message_fr, message_wo, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(t.id)
        .bind(&t.name)
        .bind(t.category)
        .bind(t.channel)
        .bind(&t.subject_fr)
        .bind(&t.subject_wo)
        .bind(&t.message_fr)
        .bind(&t.message_wo)
        .bind(t.is_active)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> StoreResult<Option<NotificationTemplate>> {
        Ok(sqlx::query_as::<_, NotificationTemplate>(
            "SELECT * FROM notification_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn update_template(&self, t: &NotificationTemplate) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE notification_templates SET name = $2, category = $3, channel = $4, \
             subject_fr = $5, subject_wo = $6, message_fr = $7, message_wo = $8, \
             is_active = $9, updated_at = $10 WHERE id = $1",
        )
        .bind(t.id)
        .bind(&t.name)
        .bind(t.category)
        .bind(t.channel)
        .bind(&t.subject_fr)
        .bind(&t.subject_wo)
        .bind(&t.message_fr)
        .bind(&t.message_wo)
        .bind(t.is_active)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("template".into()));
        }
        Ok(())
    }

    async fn delete_template(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM notification_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("template".into()));
        }
        Ok(())
    }

    async fn list_templates(
        &self,
        page: PageRequest,
    ) -> StoreResult<Listing<NotificationTemplate>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notification_templates")
            .fetch_one(&self.pool)
            .await?;
        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM notification_templates");
        push_page(&mut rows, "category::text, channel::text", page);
        let items = rows
            .build_query_as::<NotificationTemplate>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Listing { items, total })
    }

    async fn find_template(
        &self,
        category: NotificationCategory,
        channel: NotificationChannel,
    ) -> StoreResult<Option<NotificationTemplate>> {
        Ok(sqlx::query_as::<_, NotificationTemplate>(
            "SELECT * FROM notification_templates \
             WHERE category = $1 AND channel = $2 AND is_active",
        )
        .bind(category)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?)
    }
}

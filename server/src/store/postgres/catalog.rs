use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_page, push_search, PgStore};
use crate::models::{Queue, Service, ServiceCategory};
use crate::store::{
    CategoryRepository, Listing, QueueFilter, QueueRepository, ServiceFilter, ServiceRepository,
    StoreError, StoreResult,
};
use crate::utils::pagination::PageRequest;

#[async_trait]
impl CategoryRepository for PgStore {
    async fn insert(&self, category: &ServiceCategory) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO service_categories (id, name, description, icon, color, display_order, \
             is_active, deactivated_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(category.display_order)
        .bind(category.is_active)
        .bind(category.deactivated_at)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ServiceCategory>> {
        Ok(
            sqlx::query_as::<_, ServiceCategory>("SELECT * FROM service_categories WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update(&self, category: &ServiceCategory) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE service_categories SET name = $2, description = $3, icon = $4, color = $5, \
             display_order = $6, is_active = $7, deactivated_at = $8, updated_at = $9 \
             WHERE id = $1",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(category.display_order)
        .bind(category.is_active)
        .bind(category.deactivated_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("category".into()));
        }
        Ok(())
    }

    async fn list(
        &self,
        include_inactive: bool,
        page: PageRequest,
    ) -> StoreResult<Listing<ServiceCategory>> {
        let active_clause = if include_inactive { "" } else { " AND is_active" };

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM service_categories WHERE TRUE{active_clause}"
        ))
        .fetch_one(&self.pool)
        .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM service_categories WHERE TRUE");
        rows.push(active_clause);
        push_page(&mut rows, "display_order, name", page);
        let items = rows
            .build_query_as::<ServiceCategory>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Listing { items, total })
    }
}

fn push_service_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ServiceFilter) {
    if !filter.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
    if let Some(category) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(is_public) = filter.is_public {
        qb.push(" AND is_public = ").push_bind(is_public);
    }
    if let Some(search) = &filter.search {
        push_search(qb, &["name", "code", "description"], search);
    }
}

#[async_trait]
impl ServiceRepository for PgStore {
    async fn insert(&self, service: &Service) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO services (id, organization_id, category_id, name, code, description, \
             instructions, default_priority, estimated_duration, max_wait_time, cost, \
             allows_appointments, requires_appointment, min_appointment_notice, \
             max_appointment_advance, required_documents, optional_documents, status, is_public, \
             display_order, total_tickets_issued, average_rating, total_ratings, is_active, \
             deactivated_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, \
             $27)",
        )
        .bind(service.id)
        .bind(service.organization_id)
        .bind(service.category_id)
        .bind(&service.name)
        .bind(&service.code)
        .bind(&service.description)
        .bind(&service.instructions)
        .bind(service.default_priority)
        .bind(service.estimated_duration)
        .bind(service.max_wait_time)
        .bind(service.cost)
        .bind(service.allows_appointments)
        .bind(service.requires_appointment)
        .bind(service.min_appointment_notice)
        .bind(service.max_appointment_advance)
        .bind(&service.required_documents)
        .bind(&service.optional_documents)
        .bind(service.status)
        .bind(service.is_public)
        .bind(service.display_order)
        .bind(service.total_tickets_issued)
        .bind(service.average_rating)
        .bind(service.total_ratings)
        .bind(service.is_active)
        .bind(service.deactivated_at)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Service>> {
        Ok(sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update(&self, service: &Service) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE services SET category_id = $2, name = $3, code = $4, description = $5, \
             instructions = $6, default_priority = $7, estimated_duration = $8, \
             max_wait_time = $9, cost = $10, allows_appointments = $11, \
             requires_appointment = $12, min_appointment_notice = $13, \
             max_appointment_advance = $14, required_documents = $15, optional_documents = $16, \
             status = $17, is_public = $18, display_order = $19, is_active = $20, \
             deactivated_at = $21, updated_at = $22 WHERE id = $1",
        )
        .bind(service.id)
        .bind(service.category_id)
        .bind(&service.name)
        .bind(&service.code)
        .bind(&service.description)
        .bind(&service.instructions)
        .bind(service.default_priority)
        .bind(service.estimated_duration)
        .bind(service.max_wait_time)
        .bind(service.cost)
        .bind(service.allows_appointments)
        .bind(service.requires_appointment)
        .bind(service.min_appointment_notice)
        .bind(service.max_appointment_advance)
        .bind(&service.required_documents)
        .bind(&service.optional_documents)
        .bind(service.status)
        .bind(service.is_public)
        .bind(service.display_order)
        .bind(service.is_active)
        .bind(service.deactivated_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("service".into()));
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &ServiceFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Service>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM services WHERE TRUE");
        push_service_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM services WHERE TRUE");
        push_service_filters(&mut rows, filter);
        push_page(&mut rows, "display_order, name", page);
        let items = rows.build_query_as::<Service>().fetch_all(&self.pool).await?;
        Ok(Listing { items, total })
    }

    async fn record_ticket_issued(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE services SET total_tickets_issued = total_tickets_issued + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("service".into()));
        }
        Ok(())
    }

    async fn record_rating(
        &self,
        id: Uuid,
        rating: i16,
        now: DateTime<Utc>,
    ) -> StoreResult<Service> {
        sqlx::query_as::<_, Service>(
            "UPDATE services SET \
             average_rating = ROUND((average_rating * total_ratings + $2) / (total_ratings + 1), 1), \
             total_ratings = total_ratings + 1, updated_at = $3 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(i32::from(rating))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("service".into()))
    }
}

fn push_queue_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &QueueFilter) {
    if !filter.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
    if let Some(service) = filter.service_id {
        qb.push(" AND service_id = ").push_bind(service);
    }
    if let Some(status) = filter.current_status {
        qb.push(" AND current_status = ").push_bind(status);
    }
    if let Some(queue_type) = filter.queue_type {
        qb.push(" AND queue_type = ").push_bind(queue_type);
    }
}

#[async_trait]
impl QueueRepository for PgStore {
    async fn insert(&self, queue: &Queue) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO queues (id, service_id, organization_id, name, queue_type, description, \
             processing_strategy, max_capacity, max_wait_time, ticket_expiry_time, \
             current_status, last_ticket_number, current_ticket_number, stats_date, \
             daily_tickets_issued, daily_tickets_served, notifications_enabled, \
             notify_before_turns, is_active, deactivated_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21, $22)",
        )
        .bind(queue.id)
        .bind(queue.service_id)
        .bind(queue.organization_id)
        .bind(&queue.name)
        .bind(queue.queue_type)
        .bind(&queue.description)
        .bind(queue.processing_strategy)
        .bind(queue.max_capacity)
        .bind(queue.max_wait_time)
        .bind(queue.ticket_expiry_time)
        .bind(queue.current_status)
        .bind(queue.last_ticket_number)
        .bind(queue.current_ticket_number)
        .bind(queue.stats_date)
        .bind(queue.daily_tickets_issued)
        .bind(queue.daily_tickets_served)
        .bind(queue.notifications_enabled)
        .bind(queue.notify_before_turns)
        .bind(queue.is_active)
        .bind(queue.deactivated_at)
        .bind(queue.created_at)
        .bind(queue.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Queue>> {
        Ok(sqlx::query_as::<_, Queue>("SELECT * FROM queues WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update(&self, queue: &Queue) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE queues SET name = $2, queue_type = $3, description = $4, \
             processing_strategy = $5, max_capacity = $6, max_wait_time = $7, \
             ticket_expiry_time = $8, current_status = $9, current_ticket_number = $10, \
             notifications_enabled = $11, notify_before_turns = $12, is_active = $13, \
             deactivated_at = $14, updated_at = $15 WHERE id = $1",
        )
        .bind(queue.id)
        .bind(&queue.name)
        .bind(queue.queue_type)
        .bind(&queue.description)
        .bind(queue.processing_strategy)
        .bind(queue.max_capacity)
        .bind(queue.max_wait_time)
        .bind(queue.ticket_expiry_time)
        .bind(queue.current_status)
        .bind(queue.current_ticket_number)
        .bind(queue.notifications_enabled)
        .bind(queue.notify_before_turns)
        .bind(queue.is_active)
        .bind(queue.deactivated_at)
        .bind(queue.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("queue".into()));
        }
        Ok(())
    }

    async fn list(&self, filter: &QueueFilter, page: PageRequest) -> StoreResult<Listing<Queue>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM queues WHERE TRUE");
        push_queue_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM queues WHERE TRUE");
        push_queue_filters(&mut rows, filter);
        push_page(&mut rows, "name, id", page);
        let items = rows.build_query_as::<Queue>().fetch_all(&self.pool).await?;
        Ok(Listing { items, total })
    }

    async fn allocate_ticket_number(
        &self,
        id: Uuid,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<i32> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE queues SET \
             last_ticket_number = CASE WHEN stats_date = $2 THEN last_ticket_number + 1 ELSE 1 END, \
             daily_tickets_issued = CASE WHEN stats_date = $2 THEN daily_tickets_issued + 1 ELSE 1 END, \
             daily_tickets_served = CASE WHEN stats_date = $2 THEN daily_tickets_served ELSE 0 END, \
             stats_date = $2, updated_at = $3 \
             WHERE id = $1 RETURNING last_ticket_number",
        )
        .bind(id)
        .bind(today)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("queue".into()))
    }

    async fn record_served(
        &self,
        id: Uuid,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE queues SET \
             daily_tickets_served = CASE WHEN stats_date = $2 THEN daily_tickets_served + 1 ELSE 1 END, \
             daily_tickets_issued = CASE WHEN stats_date = $2 THEN daily_tickets_issued ELSE 0 END, \
             last_ticket_number = CASE WHEN stats_date = $2 THEN last_ticket_number ELSE 0 END, \
             stats_date = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(today)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("queue".into()));
        }
        Ok(())
    }
}

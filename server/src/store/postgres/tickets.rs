use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_page, PgStore};
use crate::models::{Ticket, TicketStatus};
use crate::store::{Listing, StoreError, StoreResult, TicketFilter, TicketRepository};
use crate::utils::pagination::PageRequest;

fn push_ticket_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TicketFilter) {
    if let Some(customer) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer);
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
    if let Some(queue) = filter.queue_id {
        qb.push(" AND queue_id = ").push_bind(queue);
    }
    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut statuses = qb.separated(", ");
        for status in &filter.statuses {
            statuses.push_bind(*status);
        }
        statuses.push_unseparated(")");
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(since) = filter.created_since {
        qb.push(" AND created_at >= ").push_bind(since);
    }
}

#[async_trait]
impl TicketRepository for PgStore {
    async fn insert(&self, ticket: &Ticket) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tickets (id, ticket_number, sequence, issued_on, queue_id, service_id, \
             organization_id, customer_id, priority, creation_channel, customer_notes, \
             documents_brought, status, serving_agent_id, transferred_to, created_at, called_at, \
             service_started_at, service_ended_at, expires_at, wait_time_minutes, \
             service_time_minutes, call_count, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, \
             $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)",
        )
        .bind(ticket.id)
        .bind(&ticket.ticket_number)
        .bind(ticket.sequence)
        .bind(ticket.issued_on)
        .bind(ticket.queue_id)
        .bind(ticket.service_id)
        .bind(ticket.organization_id)
        .bind(ticket.customer_id)
        .bind(ticket.priority)
        .bind(ticket.creation_channel)
        .bind(&ticket.customer_notes)
        .bind(&ticket.documents_brought)
        .bind(ticket.status)
        .bind(ticket.serving_agent_id)
        .bind(ticket.transferred_to)
        .bind(ticket.created_at)
        .bind(ticket.called_at)
        .bind(ticket.service_started_at)
        .bind(ticket.service_ended_at)
        .bind(ticket.expires_at)
        .bind(ticket.wait_time_minutes)
        .bind(ticket.service_time_minutes)
        .bind(ticket.call_count)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update(&self, ticket: &Ticket, expected: TicketStatus) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tickets SET priority = $3, customer_notes = $4, documents_brought = $5, \
             status = $6, serving_agent_id = $7, transferred_to = $8, called_at = $9, \
             service_started_at = $10, service_ended_at = $11, expires_at = $12, \
             wait_time_minutes = $13, service_time_minutes = $14, call_count = $15, \
             updated_at = $16 WHERE id = $1 AND status = $2",
        )
        .bind(ticket.id)
        .bind(expected)
        .bind(ticket.priority)
        .bind(&ticket.customer_notes)
        .bind(&ticket.documents_brought)
        .bind(ticket.status)
        .bind(ticket.serving_agent_id)
        .bind(ticket.transferred_to)
        .bind(ticket.called_at)
        .bind(ticket.service_started_at)
        .bind(ticket.service_ended_at)
        .bind(ticket.expires_at)
        .bind(ticket.wait_time_minutes)
        .bind(ticket.service_time_minutes)
        .bind(ticket.call_count)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM tickets WHERE id = $1)")
            .bind(ticket.id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound("ticket".into()))
        }
    }

    async fn list(&self, filter: &TicketFilter, page: PageRequest) -> StoreResult<Listing<Ticket>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tickets WHERE TRUE");
        push_ticket_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM tickets WHERE TRUE");
        push_ticket_filters(&mut rows, filter);
        push_page(&mut rows, "created_at DESC, sequence DESC", page);
        let items = rows.build_query_as::<Ticket>().fetch_all(&self.pool).await?;
        Ok(Listing { items, total })
    }

    async fn waiting(&self, queue_id: Uuid) -> StoreResult<Vec<Ticket>> {
        Ok(sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE queue_id = $1 AND status = 'waiting' \
             ORDER BY created_at, sequence",
        )
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_active(&self, queue_id: Uuid, customer_id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE queue_id = $1 AND customer_id = $2 \
             AND status IN ('waiting', 'called', 'serving') LIMIT 1",
        )
        .bind(queue_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn count_issued_to(&self, customer_id: Uuid, day: NaiveDate) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE customer_id = $1 AND issued_on = $2",
        )
        .bind(customer_id)
        .bind(day)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Ticket>> {
        Ok(sqlx::query_as::<_, Ticket>(
            "UPDATE tickets SET status = 'expired', updated_at = $1 \
             WHERE status = 'waiting' AND expires_at < $1 RETURNING *",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }
}

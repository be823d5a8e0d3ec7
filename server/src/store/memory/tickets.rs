use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::{conflict, paginate, MemoryStore};
use crate::models::{Ticket, TicketStatus};
use crate::store::{Listing, StoreError, StoreResult, TicketFilter, TicketRepository};
use crate::utils::pagination::PageRequest;

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn insert(&self, ticket: &Ticket) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.tickets.values().any(|t| {
            t.queue_id == ticket.queue_id
                && t.issued_on == ticket.issued_on
                && t.sequence == ticket.sequence
        }) {
            return Err(conflict("tickets_queue_id_issued_on_sequence_key"));
        }
        if ticket.is_active()
            && tables.tickets.values().any(|t| {
                t.queue_id == ticket.queue_id && t.customer_id == ticket.customer_id && t.is_active()
            })
        {
            return Err(conflict("tickets_one_active_per_customer_key"));
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.tables.read().tickets.get(&id).cloned())
    }

    async fn update(&self, ticket: &Ticket, expected: TicketStatus) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let stored = tables
            .tickets
            .get_mut(&ticket.id)
            .ok_or_else(|| StoreError::NotFound("ticket".into()))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = ticket.clone();
        Ok(true)
    }

    async fn list(&self, filter: &TicketFilter, page: PageRequest) -> StoreResult<Listing<Ticket>> {
        let tables = self.tables.read();
        let mut rows: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| filter.customer_id.map_or(true, |c| t.customer_id == c))
            .filter(|t| filter.organization_id.map_or(true, |o| t.organization_id == o))
            .filter(|t| filter.queue_id.map_or(true, |q| t.queue_id == q))
            .filter(|t| filter.statuses.is_empty() || filter.statuses.contains(&t.status))
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| filter.created_since.map_or(true, |since| t.created_at >= since))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        Ok(paginate(rows, page))
    }

    async fn waiting(&self, queue_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let tables = self.tables.read();
        let mut rows: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.queue_id == queue_id && t.status == TicketStatus::Waiting)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.sequence.cmp(&b.sequence)));
        Ok(rows)
    }

    async fn find_active(&self, queue_id: Uuid, customer_id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self
            .tables
            .read()
            .tickets
            .values()
            .find(|t| t.queue_id == queue_id && t.customer_id == customer_id && t.is_active())
            .cloned())
    }

    async fn count_issued_to(&self, customer_id: Uuid, day: NaiveDate) -> StoreResult<i64> {
        let count = self
            .tables
            .read()
            .tickets
            .values()
            .filter(|t| t.customer_id == customer_id && t.issued_on == day)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> StoreResult<Vec<Ticket>> {
        let mut tables = self.tables.write();
        let mut expired = Vec::new();
        for ticket in tables.tickets.values_mut().filter(|t| t.is_overdue(now)) {
            ticket.status = TicketStatus::Expired;
            ticket.updated_at = now;
            expired.push(ticket.clone());
        }
        Ok(expired)
    }
}

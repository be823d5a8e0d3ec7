use async_trait::async_trait;
use uuid::Uuid;

use super::{conflict, paginate, replace, MemoryStore};
use crate::models::{CustomerSatisfaction, Payment, PaymentProvider, PaymentStatus};
use crate::store::{
    Listing, PaymentFilter, PaymentRepository, SatisfactionFilter, SatisfactionRepository,
    StoreError, StoreResult,
};
use crate::utils::pagination::PageRequest;

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_provider(&self, provider: &PaymentProvider) -> StoreResult<()> {
        self.tables
            .write()
            .providers
            .insert(provider.id, provider.clone());
        Ok(())
    }

    async fn get_provider(&self, id: Uuid) -> StoreResult<Option<PaymentProvider>> {
        Ok(self.tables.read().providers.get(&id).cloned())
    }

    async fn update_provider(&self, provider: &PaymentProvider) -> StoreResult<()> {
        let mut tables = self.tables.write();
        replace(&mut tables.providers, provider.id, provider, "payment provider")
    }

    async fn list_providers(&self, include_inactive: bool) -> StoreResult<Vec<PaymentProvider>> {
        let tables = self.tables.read();
        let mut rows: Vec<PaymentProvider> = tables
            .providers
            .values()
            .filter(|p| include_inactive || p.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(rows)
    }

    async fn insert(&self, payment: &Payment) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables
            .payments
            .values()
            .any(|p| p.payment_number == payment.payment_number)
        {
            return Err(conflict("payments_payment_number_key"));
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.read().payments.get(&id).cloned())
    }

    async fn find_by_number(&self, payment_number: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .tables
            .read()
            .payments
            .values()
            .find(|p| p.payment_number == payment_number)
            .cloned())
    }

    async fn update(&self, payment: &Payment, expected: &[PaymentStatus]) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let stored = tables
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| StoreError::NotFound("payment".into()))?;
        if !expected.contains(&stored.status) {
            return Ok(false);
        }
        *stored = payment.clone();
        Ok(true)
    }

    async fn list(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Payment>> {
        let tables = self.tables.read();
        let mut rows: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| filter.customer_id.map_or(true, |c| p.customer_id == c))
            .filter(|p| filter.organization_id.map_or(true, |o| p.organization_id == o))
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| {
                filter
                    .completed_since
                    .map_or(true, |since| p.completed_at.is_some_and(|at| at >= since))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }
}

#[async_trait]
impl SatisfactionRepository for MemoryStore {
    async fn insert(&self, rating: &CustomerSatisfaction) -> StoreResult<()> {
        let mut tables = self.tables.write();
        for existing in &tables.ratings {
            if rating.ticket_id.is_some() && existing.ticket_id == rating.ticket_id {
                return Err(conflict("customer_satisfaction_ticket_id_key"));
            }
            if rating.appointment_id.is_some() && existing.appointment_id == rating.appointment_id {
                return Err(conflict("customer_satisfaction_appointment_id_key"));
            }
        }
        tables.ratings.push(rating.clone());
        Ok(())
    }

    async fn list(
        &self,
        filter: &SatisfactionFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<CustomerSatisfaction>> {
        let tables = self.tables.read();
        let mut rows: Vec<CustomerSatisfaction> = tables
            .ratings
            .iter()
            .filter(|r| filter.customer_id.map_or(true, |c| r.customer_id == c))
            .filter(|r| filter.organization_id.map_or(true, |o| r.organization_id == o))
            .filter(|r| filter.service_id.map_or(true, |s| r.service_id == s))
            .filter(|r| filter.created_since.map_or(true, |since| r.created_at >= since))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }
}

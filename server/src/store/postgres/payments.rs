use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_page, PgStore};
use crate::models::{CustomerSatisfaction, Payment, PaymentProvider, PaymentStatus};
use crate::store::{
    Listing, PaymentFilter, PaymentRepository, SatisfactionFilter, SatisfactionRepository,
    StoreError, StoreResult,
};
use crate::utils::pagination::PageRequest;

fn push_payment_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PaymentFilter) {
    if let Some(customer) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer);
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(since) = filter.completed_since {
        qb.push(" AND completed_at >= ").push_bind(since);
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert_provider(&self, p: &PaymentProvider) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO payment_providers (id, name, provider_type, supported_currency, \
             min_amount, max_amount, transaction_fee_fixed, transaction_fee_percent, is_default, \
             priority, is_active, deactivated_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(p.provider_type)
        .bind(&p.supported_currency)
        .bind(p.min_amount)
        .bind(p.max_amount)
        .bind(p.transaction_fee_fixed)
        .bind(p.transaction_fee_percent)
        .bind(p.is_default)
        .bind(p.priority)
        .bind(p.is_active)
        .bind(p.deactivated_at)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_provider(&self, id: Uuid) -> StoreResult<Option<PaymentProvider>> {
        Ok(
            sqlx::query_as::<_, PaymentProvider>("SELECT * FROM payment_providers WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update_provider(&self, p: &PaymentProvider) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE payment_providers SET name = $2, provider_type = $3, supported_currency = $4, \
             min_amount = $5, max_amount = $6, transaction_fee_fixed = $7, \
             transaction_fee_percent = $8, is_default = $9, priority = $10, is_active = $11, \
             deactivated_at = $12, updated_at = $13 WHERE id = $1",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(p.provider_type)
        .bind(&p.supported_currency)
        .bind(p.min_amount)
        .bind(p.max_amount)
        .bind(p.transaction_fee_fixed)
        .bind(p.transaction_fee_percent)
        .bind(p.is_default)
        .bind(p.priority)
        .bind(p.is_active)
        .bind(p.deactivated_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("payment provider".into()));
        }
        Ok(())
    }

    async fn list_providers(&self, include_inactive: bool) -> StoreResult<Vec<PaymentProvider>> {
        Ok(sqlx::query_as::<_, PaymentProvider>(
            "SELECT * FROM payment_providers WHERE ($1 OR is_active) ORDER BY priority, name",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert(&self, p: &Payment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO payments (id, payment_number, external_reference, customer_id, \
             provider_id, organization_id, ticket_id, appointment_id, payment_type, amount, fees, \
             total_amount, currency, payer_phone, payer_name, description, status, error_code, \
             error_message, expires_at, completed_at, created_at, updated_at) VALUES ($1, $2, $3, \
             $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, \
             $22, $23)",
        )
        .bind(p.id)
        .bind(&p.payment_number)
        .bind(&p.external_reference)
        .bind(p.customer_id)
        .bind(p.provider_id)
        .bind(p.organization_id)
        .bind(p.ticket_id)
        .bind(p.appointment_id)
        .bind(p.payment_type)
        .bind(p.amount)
        .bind(p.fees)
        .bind(p.total_amount)
        .bind(&p.currency)
        .bind(&p.payer_phone)
        .bind(&p.payer_name)
        .bind(&p.description)
        .bind(p.status)
        .bind(&p.error_code)
        .bind(&p.error_message)
        .bind(p.expires_at)
        .bind(p.completed_at)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_number(&self, payment_number: &str) -> StoreResult<Option<Payment>> {
        Ok(
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE payment_number = $1")
                .bind(payment_number)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update(&self, p: &Payment, expected: &[PaymentStatus]) -> StoreResult<bool> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE payments SET external_reference = ");
        qb.push_bind(p.external_reference.clone())
            .push(", status = ")
            .push_bind(p.status)
            .push(", error_code = ")
            .push_bind(p.error_code.clone())
            .push(", error_message = ")
            .push_bind(p.error_message.clone())
            .push(", completed_at = ")
            .push_bind(p.completed_at)
            .push(", updated_at = ")
            .push_bind(p.updated_at)
            .push(" WHERE id = ")
            .push_bind(p.id)
            .push(" AND status IN (");
        let mut statuses = qb.separated(", ");
        for status in expected {
            statuses.push_bind(*status);
        }
        statuses.push_unseparated(")");

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM payments WHERE id = $1)")
                .bind(p.id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound("payment".into()))
        }
    }

    async fn list(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Payment>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM payments WHERE TRUE");
        push_payment_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM payments WHERE TRUE");
        push_payment_filters(&mut rows, filter);
        push_page(&mut rows, "created_at DESC, id DESC", page);
        let items = rows.build_query_as::<Payment>().fetch_all(&self.pool).await?;
        Ok(Listing { items, total })
    }
}

fn push_satisfaction_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &SatisfactionFilter) {
    if let Some(customer) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer);
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
    if let Some(service) = filter.service_id {
        qb.push(" AND service_id = ").push_bind(service);
    }
    if let Some(since) = filter.created_since {
        qb.push(" AND created_at >= ").push_bind(since);
    }
}

#[async_trait]
impl SatisfactionRepository for PgStore {
    async fn insert(&self, r: &CustomerSatisfaction) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO customer_satisfaction (id, customer_id, organization_id, service_id, \
             ticket_id, appointment_id, rating, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(r.id)
        .bind(r.customer_id)
        .bind(r.organization_id)
        .bind(r.service_id)
        .bind(r.ticket_id)
        .bind(r.appointment_id)
        .bind(r.rating)
        .bind(&r.comment)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &SatisfactionFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<CustomerSatisfaction>> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM customer_satisfaction WHERE TRUE");
        push_satisfaction_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows =
            QueryBuilder::<Postgres>::new("SELECT * FROM customer_satisfaction WHERE TRUE");
        push_satisfaction_filters(&mut rows, filter);
        push_page(&mut rows, "created_at DESC, id DESC", page);
        let items = rows
            .build_query_as::<CustomerSatisfaction>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Listing { items, total })
    }
}

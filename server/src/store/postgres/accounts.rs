use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_page, push_search, PgStore};
use crate::models::{Organization, User};
use crate::store::{
    Listing, OrganizationFilter, OrganizationRepository, StoreError, StoreResult, UserFilter,
    UserRepository,
};
use crate::utils::pagination::PageRequest;

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    if !filter.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, phone_number, \
             preferred_language, role, organization_id, is_email_verified, \
             push_notifications_enabled, email_notifications_enabled, sms_notifications_enabled, \
             terms_accepted_at, last_login_at, is_active, deactivated_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(user.preferred_language)
        .bind(user.role)
        .bind(user.organization_id)
        .bind(user.is_email_verified)
        .bind(user.push_notifications_enabled)
        .bind(user.email_notifications_enabled)
        .bind(user.sms_notifications_enabled)
        .bind(user.terms_accepted_at)
        .bind(user.last_login_at)
        .bind(user.is_active)
        .bind(user.deactivated_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email = $2, password_hash = $3, first_name = $4, last_name = $5, \
             phone_number = $6, preferred_language = $7, role = $8, organization_id = $9, \
             is_email_verified = $10, push_notifications_enabled = $11, \
             email_notifications_enabled = $12, sms_notifications_enabled = $13, \
             terms_accepted_at = $14, last_login_at = $15, is_active = $16, \
             deactivated_at = $17, updated_at = $18 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(user.preferred_language)
        .bind(user.role)
        .bind(user.organization_id)
        .bind(user.is_email_verified)
        .bind(user.push_notifications_enabled)
        .bind(user.email_notifications_enabled)
        .bind(user.sms_notifications_enabled)
        .bind(user.terms_accepted_at)
        .bind(user.last_login_at)
        .bind(user.is_active)
        .bind(user.deactivated_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user".into()));
        }
        Ok(())
    }

    async fn list(&self, filter: &UserFilter, page: PageRequest) -> StoreResult<Listing<User>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE TRUE");
        push_user_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM users WHERE TRUE");
        push_user_filters(&mut rows, filter);
        push_page(&mut rows, "email", page);
        let items = rows.build_query_as::<User>().fetch_all(&self.pool).await?;
        Ok(Listing { items, total })
    }
}

fn push_organization_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrganizationFilter) {
    if !filter.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(region) = filter.region {
        qb.push(" AND region = ").push_bind(region);
    }
    if let Some(org_type) = filter.org_type {
        qb.push(" AND org_type = ").push_bind(org_type);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(city) = &filter.city {
        qb.push(" AND LOWER(city) = LOWER(").push_bind(city.clone()).push(")");
    }
    if let Some(search) = &filter.search {
        push_search(qb, &["name", "trade_name", "city"], search);
    }
}

#[async_trait]
impl OrganizationRepository for PgStore {
    async fn insert(&self, org: &Organization) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO organizations (id, name, trade_name, org_type, description, \
             registration_number, phone_number, email, website, address, city, region, latitude, \
             longitude, subscription_plan, status, max_counters, max_staff_users, timezone, \
             default_language, opening_hours, created_by, is_active, deactivated_at, created_at, \
             updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)",
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.trade_name)
        .bind(org.org_type)
        .bind(&org.description)
        .bind(&org.registration_number)
        .bind(&org.phone_number)
        .bind(&org.email)
        .bind(&org.website)
        .bind(&org.address)
        .bind(&org.city)
        .bind(org.region)
        .bind(org.latitude)
        .bind(org.longitude)
        .bind(org.subscription_plan)
        .bind(org.status)
        .bind(org.max_counters)
        .bind(org.max_staff_users)
        .bind(&org.timezone)
        .bind(org.default_language)
        .bind(&org.opening_hours)
        .bind(org.created_by)
        .bind(org.is_active)
        .bind(org.deactivated_at)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update(&self, org: &Organization) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE organizations SET name = $2, trade_name = $3, org_type = $4, \
             description = $5, registration_number = $6, phone_number = $7, email = $8, \
             website = $9, address = $10, city = $11, region = $12, latitude = $13, \
             longitude = $14, subscription_plan = $15, status = $16, max_counters = $17, \
             max_staff_users = $18, timezone = $19, default_language = $20, \
             opening_hours = $21, is_active = $22, deactivated_at = $23, updated_at = $24 \
             WHERE id = $1",
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.trade_name)
        .bind(org.org_type)
        .bind(&org.description)
        .bind(&org.registration_number)
        .bind(&org.phone_number)
        .bind(&org.email)
        .bind(&org.website)
        .bind(&org.address)
        .bind(&org.city)
        .bind(org.region)
        .bind(org.latitude)
        .bind(org.longitude)
        .bind(org.subscription_plan)
        .bind(org.status)
        .bind(org.max_counters)
        .bind(org.max_staff_users)
        .bind(&org.timezone)
        .bind(org.default_language)
        .bind(&org.opening_hours)
        .bind(org.is_active)
        .bind(org.deactivated_at)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("organization".into()));
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &OrganizationFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Organization>> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM organizations WHERE TRUE");
        push_organization_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM organizations WHERE TRUE");
        push_organization_filters(&mut rows, filter);
        push_page(&mut rows, "name, id", page);
        let items = rows
            .build_query_as::<Organization>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Listing { items, total })
    }
}

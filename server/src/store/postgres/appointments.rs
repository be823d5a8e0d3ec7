use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{push_page, PgStore};
use crate::models::{Appointment, AppointmentHistory, AppointmentSlot, AppointmentStatus};
use crate::store::{
    conflict_message, AppointmentFilter, AppointmentRepository, Listing, SlotFilter,
    SlotRepository, StoreError, StoreResult,
};
use crate::utils::pagination::PageRequest;

const HOLDS_CAPACITY: &str = "status IN ('pending', 'confirmed', 'checked_in', 'in_progress')";

fn push_slot_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &SlotFilter) {
    if !filter.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
    if let Some(service) = filter.service_id {
        qb.push(" AND service_id = ").push_bind(service);
    }
    if let Some(day) = filter.day_of_week {
        qb.push(" AND day_of_week = ").push_bind(day);
    }
}

#[async_trait]
impl SlotRepository for PgStore {
    async fn insert(&self, slot: &AppointmentSlot) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO appointment_slots (id, organization_id, service_id, day_of_week, \
             start_time, end_time, slot_duration, max_appointments, is_active, deactivated_at, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(slot.id)
        .bind(slot.organization_id)
        .bind(slot.service_id)
        .bind(slot.day_of_week)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.slot_duration)
        .bind(slot.max_appointments)
        .bind(slot.is_active)
        .bind(slot.deactivated_at)
        .bind(slot.created_at)
        .bind(slot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<AppointmentSlot>> {
        Ok(
            sqlx::query_as::<_, AppointmentSlot>("SELECT * FROM appointment_slots WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update(&self, slot: &AppointmentSlot) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE appointment_slots SET day_of_week = $2, start_time = $3, end_time = $4, \
             slot_duration = $5, max_appointments = $6, is_active = $7, deactivated_at = $8, \
             updated_at = $9 WHERE id = $1",
        )
        .bind(slot.id)
        .bind(slot.day_of_week)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.slot_duration)
        .bind(slot.max_appointments)
        .bind(slot.is_active)
        .bind(slot.deactivated_at)
        .bind(slot.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("appointment slot".into()));
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: &SlotFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<AppointmentSlot>> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM appointment_slots WHERE TRUE");
        push_slot_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM appointment_slots WHERE TRUE");
        push_slot_filters(&mut rows, filter);
        push_page(&mut rows, "day_of_week, start_time, id", page);
        let items = rows
            .build_query_as::<AppointmentSlot>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Listing { items, total })
    }
}

fn push_appointment_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &AppointmentFilter) {
    if let Some(customer) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer);
    }
    if let Some(org) = filter.organization_id {
        qb.push(" AND organization_id = ").push_bind(org);
    }
    if let Some(service) = filter.service_id {
        qb.push(" AND service_id = ").push_bind(service);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(date) = filter.date {
        qb.push(" AND scheduled_date = ").push_bind(date);
    }
}

#[async_trait]
impl AppointmentRepository for PgStore {
    async fn insert_booking(
        &self,
        appointment: &Appointment,
        capacity: i32,
        replacing: Option<Uuid>,
    ) -> StoreResult<()> {
        let a = appointment;
        let mut tx = self.pool.begin().await?;
        // Bookings on one slot queue up behind this row lock.
        sqlx::query("SELECT id FROM appointment_slots WHERE id = $1 FOR UPDATE")
            .bind(a.slot_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound("appointment slot".into()))?;

        let holding = sqlx::query_as::<_, (Uuid,)>(&format!(
            "SELECT customer_id FROM appointments WHERE slot_id = $1 AND scheduled_date = $2 \
             AND scheduled_time = $3 AND {HOLDS_CAPACITY} \
             AND ($4::uuid IS NULL OR id <> $4)"
        ))
        .bind(a.slot_id)
        .bind(a.scheduled_date)
        .bind(a.scheduled_time)
        .bind(replacing)
        .fetch_all(&mut *tx)
        .await?;
        if holding.iter().any(|(customer,)| *customer == a.customer_id) {
            return Err(StoreError::Conflict(conflict_message("appointments_customer_booked")));
        }
        if holding.len() >= usize::try_from(capacity).unwrap_or(0) {
            return Err(StoreError::Conflict(conflict_message("appointments_slot_full")));
        }

        sqlx::query(
            "INSERT INTO appointments (id, appointment_number, customer_id, slot_id, \
             organization_id, service_id, scheduled_date, scheduled_time, status, priority, \
             customer_notes, customer_phone, assigned_staff_id, staff_notes, rescheduled_from, \
             confirmed_at, checked_in_at, started_at, completed_at, cancelled_at, reminder_sent, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
             $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)",
        )
        .bind(a.id)
        .bind(&a.appointment_number)
        .bind(a.customer_id)
        .bind(a.slot_id)
        .bind(a.organization_id)
        .bind(a.service_id)
        .bind(a.scheduled_date)
        .bind(a.scheduled_time)
        .bind(a.status)
        .bind(a.priority)
        .bind(&a.customer_notes)
        .bind(&a.customer_phone)
        .bind(a.assigned_staff_id)
        .bind(&a.staff_notes)
        .bind(a.rescheduled_from)
        .bind(a.confirmed_at)
        .bind(a.checked_in_at)
        .bind(a.started_at)
        .bind(a.completed_at)
        .bind(a.cancelled_at)
        .bind(a.reminder_sent)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(
            sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> StoreResult<bool> {
        let a = appointment;
        let result = sqlx::query(
            "UPDATE appointments SET status = $3, priority = $4, customer_notes = $5, \
             customer_phone = $6, assigned_staff_id = $7, staff_notes = $8, confirmed_at = $9, \
             checked_in_at = $10, started_at = $11, completed_at = $12, cancelled_at = $13, \
             reminder_sent = $14, updated_at = $15 WHERE id = $1 AND status = $2",
        )
        .bind(a.id)
        .bind(expected)
        .bind(a.status)
        .bind(a.priority)
        .bind(&a.customer_notes)
        .bind(&a.customer_phone)
        .bind(a.assigned_staff_id)
        .bind(&a.staff_notes)
        .bind(a.confirmed_at)
        .bind(a.checked_in_at)
        .bind(a.started_at)
        .bind(a.completed_at)
        .bind(a.cancelled_at)
        .bind(a.reminder_sent)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM appointments WHERE id = $1)")
                .bind(a.id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound("appointment".into()))
        }
    }

    async fn list(
        &self,
        filter: &AppointmentFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Appointment>> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM appointments WHERE TRUE");
        push_appointment_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let order = if filter.ascending {
            "scheduled_date, scheduled_time, appointment_number"
        } else {
            "scheduled_date DESC, scheduled_time DESC, appointment_number DESC"
        };
        let mut rows = QueryBuilder::<Postgres>::new("SELECT * FROM appointments WHERE TRUE");
        push_appointment_filters(&mut rows, filter);
        push_page(&mut rows, order, page);
        let items = rows
            .build_query_as::<Appointment>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Listing { items, total })
    }

    async fn count_booked(
        &self,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM appointments WHERE slot_id = $1 AND scheduled_date = $2 \
             AND scheduled_time = $3 AND {HOLDS_CAPACITY}"
        ))
        .bind(slot_id)
        .bind(date)
        .bind(time)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_customer_booking(
        &self,
        customer_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> StoreResult<Option<Appointment>> {
        Ok(sqlx::query_as::<_, Appointment>(&format!(
            "SELECT * FROM appointments WHERE customer_id = $1 AND slot_id = $2 \
             AND scheduled_date = $3 AND scheduled_time = $4 AND {HOLDS_CAPACITY} LIMIT 1"
        ))
        .bind(customer_id)
        .bind(slot_id)
        .bind(date)
        .bind(time)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn count_created_by(&self, customer_id: Uuid, day: NaiveDate) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM appointments WHERE customer_id = $1 \
             AND (created_at AT TIME ZONE 'UTC')::date = $2",
        )
        .bind(customer_id)
        .bind(day)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn next_daily_sequence(&self, day: NaiveDate) -> StoreResult<i32> {
        Ok(sqlx::query_scalar::<_, i32>(
            "INSERT INTO appointment_counters (month_day, last_value) VALUES ($1, 1) \
             ON CONFLICT (month_day) \
             DO UPDATE SET last_value = appointment_counters.last_value + 1 \
             RETURNING last_value",
        )
        .bind(day.format("%m%d").to_string())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn add_history(&self, entry: &AppointmentHistory) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO appointment_history (id, appointment_id, action, old_status, new_status, \
             performed_by, reason, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.appointment_id)
        .bind(&entry.action)
        .bind(entry.old_status)
        .bind(entry.new_status)
        .bind(entry.performed_by)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(&self, appointment_id: Uuid) -> StoreResult<Vec<AppointmentHistory>> {
        Ok(sqlx::query_as::<_, AppointmentHistory>(
            "SELECT * FROM appointment_history WHERE appointment_id = $1 ORDER BY created_at, id",
        )
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

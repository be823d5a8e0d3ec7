use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime};
use uuid::Uuid;

use super::{conflict, paginate, replace, MemoryStore, Tables};
use crate::models::{Appointment, AppointmentHistory, AppointmentSlot, AppointmentStatus};
use crate::store::{
    AppointmentFilter, AppointmentRepository, Listing, SlotFilter, SlotRepository, StoreError,
    StoreResult,
};
use crate::utils::pagination::PageRequest;

fn check_slot_unique(tables: &Tables, slot: &AppointmentSlot) -> StoreResult<()> {
    if tables.slots.values().any(|s| {
        s.id != slot.id
            && s.service_id == slot.service_id
            && s.day_of_week == slot.day_of_week
            && s.start_time == slot.start_time
    }) {
        return Err(conflict(
            "appointment_slots_service_id_day_of_week_start_time_key",
        ));
    }
    Ok(())
}

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn insert(&self, slot: &AppointmentSlot) -> StoreResult<()> {
        let mut tables = self.tables.write();
        check_slot_unique(&tables, slot)?;
        tables.slots.insert(slot.id, slot.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<AppointmentSlot>> {
        Ok(self.tables.read().slots.get(&id).cloned())
    }

    async fn update(&self, slot: &AppointmentSlot) -> StoreResult<()> {
        let mut tables = self.tables.write();
        check_slot_unique(&tables, slot)?;
        replace(&mut tables.slots, slot.id, slot, "appointment slot")
    }

    async fn list(
        &self,
        filter: &SlotFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<AppointmentSlot>> {
        let tables = self.tables.read();
        let mut rows: Vec<AppointmentSlot> = tables
            .slots
            .values()
            .filter(|s| filter.include_inactive || s.is_active)
            .filter(|s| filter.organization_id.map_or(true, |o| s.organization_id == o))
            .filter(|s| filter.service_id.map_or(true, |id| s.service_id == id))
            .filter(|s| filter.day_of_week.map_or(true, |d| s.day_of_week == d))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.day_of_week
                .cmp(&b.day_of_week)
                .then(a.start_time.cmp(&b.start_time))
                .then(a.id.cmp(&b.id))
        });
        Ok(paginate(rows, page))
    }
}

#[async_trait]
impl AppointmentRepository for MemoryStore {
    async fn insert_booking(
        &self,
        appointment: &Appointment,
        capacity: i32,
        replacing: Option<Uuid>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables
            .appointments
            .values()
            .any(|a| a.appointment_number == appointment.appointment_number)
        {
            return Err(conflict("appointments_appointment_number_key"));
        }
        let holding: Vec<&Appointment> = tables
            .appointments
            .values()
            .filter(|a| {
                Some(a.id) != replacing
                    && a.slot_id == appointment.slot_id
                    && a.scheduled_date == appointment.scheduled_date
                    && a.scheduled_time == appointment.scheduled_time
                    && a.status.holds_capacity()
            })
            .collect();
        if holding.iter().any(|a| a.customer_id == appointment.customer_id) {
            return Err(conflict("appointments_customer_booked"));
        }
        if holding.len() >= usize::try_from(capacity).unwrap_or(0) {
            return Err(conflict("appointments_slot_full"));
        }
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.read().appointments.get(&id).cloned())
    }

    async fn update(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let stored = tables
            .appointments
            .get_mut(&appointment.id)
            .ok_or_else(|| StoreError::NotFound("appointment".into()))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = appointment.clone();
        Ok(true)
    }

    async fn list(
        &self,
        filter: &AppointmentFilter,
        page: PageRequest,
    ) -> StoreResult<Listing<Appointment>> {
        let tables = self.tables.read();
        let mut rows: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| filter.customer_id.map_or(true, |c| a.customer_id == c))
            .filter(|a| filter.organization_id.map_or(true, |o| a.organization_id == o))
            .filter(|a| filter.service_id.map_or(true, |s| a.service_id == s))
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.date.map_or(true, |d| a.scheduled_date == d))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let ordering = a
                .scheduled_date
                .cmp(&b.scheduled_date)
                .then(a.scheduled_time.cmp(&b.scheduled_time))
                .then(a.appointment_number.cmp(&b.appointment_number));
            if filter.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        Ok(paginate(rows, page))
    }

    async fn count_booked(
        &self,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> StoreResult<i64> {
        let count = self
            .tables
            .read()
            .appointments
            .values()
            .filter(|a| {
                a.slot_id == slot_id
                    && a.scheduled_date == date
                    && a.scheduled_time == time
                    && a.status.holds_capacity()
            })
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn find_customer_booking(
        &self,
        customer_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> StoreResult<Option<Appointment>> {
        Ok(self
            .tables
            .read()
            .appointments
            .values()
            .find(|a| {
                a.customer_id == customer_id
                    && a.slot_id == slot_id
                    && a.scheduled_date == date
                    && a.scheduled_time == time
                    && a.status.holds_capacity()
            })
            .cloned())
    }

    async fn count_created_by(&self, customer_id: Uuid, day: NaiveDate) -> StoreResult<i64> {
        let count = self
            .tables
            .read()
            .appointments
            .values()
            .filter(|a| a.customer_id == customer_id && a.created_at.date_naive() == day)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn next_daily_sequence(&self, day: NaiveDate) -> StoreResult<i32> {
        let mut tables = self.tables.write();
        let counter = tables
            .appointment_counters
            .entry((day.month(), day.day()))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn add_history(&self, entry: &AppointmentHistory) -> StoreResult<()> {
        self.tables.write().appointment_history.push(entry.clone());
        Ok(())
    }

    async fn history(&self, appointment_id: Uuid) -> StoreResult<Vec<AppointmentHistory>> {
        Ok(self
            .tables
            .read()
            .appointment_history
            .iter()
            .filter(|h| h.appointment_id == appointment_id)
            .cloned()
            .collect())
    }
}

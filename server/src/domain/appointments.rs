//! Appointment slots, availability and the appointment lifecycle. Every
//! status change is recorded in the appointment's history.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{can_manage_organization, ensure_manages, require_staff, staff_scope};
use crate::domain::{catalog, context, today};
use crate::models::appointment::{format_appointment_number, scheduled_instant};
use crate::models::{
    Appointment, AppointmentHistory, AppointmentPriority, AppointmentSlot, AppointmentStatus,
    NotificationCategory, RelatedKind, Service, SlotAvailability, SoftDelete, User, UserRole,
};
use crate::state::AppState;
use crate::store::{AppointmentFilter, Listing, SlotFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

/// Customers cannot cancel or move an appointment closer to it than this.
pub const CUSTOMER_CHANGE_NOTICE_HOURS: i64 = 2;

#[derive(Debug, Default, Deserialize)]
pub struct SlotPayload {
    pub service_id: Option<Uuid>,
    pub day_of_week: Option<i16>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub slot_duration: Option<i32>,
    pub max_appointments: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub slot_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub notes: Option<String>,
    pub phone: Option<String>,
    pub priority: Option<AppointmentPriority>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub slot_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub history: Vec<AppointmentHistory>,
}

fn apply_slot(slot: &mut AppointmentSlot, payload: SlotPayload) -> AppResult<()> {
    if let Some(day) = payload.day_of_week {
        validation::in_range("day_of_week", day, 0, 6)?;
        slot.day_of_week = day;
    }
    if let Some(start) = payload.start_time {
        slot.start_time = start;
    }
    if let Some(end) = payload.end_time {
        slot.end_time = end;
    }
    if let Some(minutes) = payload.slot_duration {
        validation::in_range("slot_duration", minutes, 15, 120)?;
        slot.slot_duration = minutes;
    }
    if let Some(max) = payload.max_appointments {
        validation::in_range("max_appointments", max, 1, 10)?;
        slot.max_appointments = max;
    }
    if slot.end_time <= slot.start_time {
        return Err(AppError::validation("end_time must be after start_time"));
    }
    Ok(())
}

pub async fn get_slot(state: &AppState, id: Uuid) -> AppResult<AppointmentSlot> {
    state
        .store
        .slots
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Appointment slot", id))
}

pub async fn create_slot(
    state: &AppState,
    actor: &User,
    payload: SlotPayload,
    now: DateTime<Utc>,
) -> AppResult<AppointmentSlot> {
    let service_id = payload
        .service_id
        .ok_or_else(|| AppError::validation("service_id is required"))?;
    let service = catalog::get_service(state, service_id).await?;
    ensure_manages(actor, service.organization_id)?;
    if !service.allows_appointments {
        return Err(AppError::validation("This service does not take appointments"));
    }
    let (Some(start_time), Some(end_time)) = (payload.start_time, payload.end_time) else {
        return Err(AppError::validation("start_time and end_time are required"));
    };
    if payload.day_of_week.is_none() {
        return Err(AppError::validation("day_of_week is required"));
    }

    let mut slot = AppointmentSlot {
        id: Uuid::new_v4(),
        organization_id: service.organization_id,
        service_id: service.id,
        day_of_week: 0,
        start_time,
        end_time,
        slot_duration: 30,
        max_appointments: 1,
        is_active: true,
        deactivated_at: None,
        created_at: now,
        updated_at: now,
    };
    apply_slot(&mut slot, payload)?;
    state.store.slots.insert(&slot).await?;
    Ok(slot)
}

pub async fn update_slot(
    state: &AppState,
    actor: &User,
    id: Uuid,
    mut payload: SlotPayload,
    now: DateTime<Utc>,
) -> AppResult<AppointmentSlot> {
    let mut slot = get_slot(state, id).await?;
    ensure_manages(actor, slot.organization_id)?;
    if payload.service_id.take().is_some_and(|service| service != slot.service_id) {
        return Err(AppError::validation("A slot cannot move to another service"));
    }
    apply_slot(&mut slot, payload)?;
    slot.updated_at = now;
    state.store.slots.update(&slot).await?;
    Ok(slot)
}

pub async fn set_slot_active(
    state: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> AppResult<AppointmentSlot> {
    let mut slot = get_slot(state, id).await?;
    ensure_manages(actor, slot.organization_id)?;
    if active {
        slot.reactivate(now);
    } else {
        slot.deactivate(now);
    }
    state.store.slots.update(&slot).await?;
    Ok(slot)
}

pub async fn list_slots(
    state: &AppState,
    actor: Option<&User>,
    mut filter: SlotFilter,
    page: PageRequest,
) -> AppResult<Listing<AppointmentSlot>> {
    if !actor.is_some_and(|user| user.role.is_staff()) {
        filter.include_inactive = false;
    }
    Ok(state.store.slots.list(&filter, page).await?)
}

/// Free places per bookable time of one slot on one date.
pub async fn slot_availability(
    state: &AppState,
    slot: &AppointmentSlot,
    date: NaiveDate,
) -> AppResult<SlotAvailability> {
    let mut booked = HashMap::new();
    if slot.is_active && slot.runs_on(date) {
        for time in slot.times() {
            let count = state.store.appointments.count_booked(slot.id, date, time).await?;
            booked.insert(time, count);
        }
    }
    Ok(slot.availability(date, |time| booked.get(&time).copied().unwrap_or(0)))
}

pub async fn available_times(state: &AppState, slot_id: Uuid, date: NaiveDate) -> AppResult<SlotAvailability> {
    let slot = get_slot(state, slot_id).await?;
    slot_availability(state, &slot, date).await
}

/// Every active slot of a service for one date.
pub async fn service_availability(
    state: &AppState,
    service_id: Uuid,
    date: NaiveDate,
) -> AppResult<Vec<SlotAvailability>> {
    catalog::get_service(state, service_id).await?;
    let slots = state
        .store
        .slots
        .list(
            &SlotFilter {
                service_id: Some(service_id),
                ..Default::default()
            },
            PageRequest::everything(),
        )
        .await?;
    let mut result = Vec::new();
    for slot in slots.items.iter().filter(|slot| slot.runs_on(date)) {
        result.push(slot_availability(state, slot, date).await?);
    }
    Ok(result)
}

/// Checks a slot time can take one more booking for `customer_id`.
/// `moving` is the appointment being rescheduled, which keeps its own place
/// until the move succeeds.
async fn check_target(
    state: &AppState,
    customer_id: Uuid,
    slot: &AppointmentSlot,
    date: NaiveDate,
    time: NaiveTime,
    moving: Option<&Appointment>,
    now: DateTime<Utc>,
) -> AppResult<Service> {
    if !slot.is_active {
        return Err(AppError::validation("This slot is no longer offered"));
    }
    let service = catalog::get_service(state, slot.service_id).await?;
    if !service.allows_appointments || !service.is_active {
        return Err(AppError::validation("This service does not take appointments"));
    }
    if !slot.runs_on(date) {
        return Err(AppError::validation("The slot does not run on this day"));
    }
    if !slot.is_on_grid(time) {
        return Err(AppError::validation("This time is not offered by the slot"));
    }

    let at = scheduled_instant(date, time);
    if at < now + Duration::hours(i64::from(service.min_appointment_notice)) {
        return Err(AppError::validation(format!(
            "Appointments must be booked at least {} hours ahead",
            service.min_appointment_notice
        )));
    }
    if at > now + Duration::days(i64::from(service.max_appointment_advance)) {
        return Err(AppError::validation(format!(
            "Appointments cannot be booked more than {} days ahead",
            service.max_appointment_advance
        )));
    }

    let duplicate = state
        .store
        .appointments
        .find_customer_booking(customer_id, slot.id, date, time)
        .await?;
    if duplicate.is_some_and(|existing| moving.map_or(true, |m| m.id != existing.id)) {
        return Err(AppError::Conflict(
            "You already have an appointment at this time".into(),
        ));
    }

    let mut booked = state.store.appointments.count_booked(slot.id, date, time).await?;
    if let Some(m) = moving {
        let same_place = m.slot_id == slot.id && m.scheduled_date == date && m.scheduled_time == time;
        if same_place && m.status.holds_capacity() {
            booked -= 1;
        }
    }
    if booked >= i64::from(slot.max_appointments) {
        return Err(AppError::Conflict("This slot is full".into()));
    }
    Ok(service)
}

fn appointment_context(appointment: &Appointment, service: Option<&Service>) -> HashMap<String, String> {
    context([
        ("appointment_number", appointment.appointment_number.clone()),
        ("date", appointment.scheduled_date.format("%d/%m/%Y").to_string()),
        ("time", appointment.scheduled_time.format("%H:%M").to_string()),
        (
            "service_name",
            service.map(|s| s.name.clone()).unwrap_or_default(),
        ),
    ])
}

async fn record(
    state: &AppState,
    appointment: &Appointment,
    action: &str,
    old_status: Option<AppointmentStatus>,
    actor: &User,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let entry = AppointmentHistory {
        id: Uuid::new_v4(),
        appointment_id: appointment.id,
        action: action.to_string(),
        old_status,
        new_status: appointment.status,
        performed_by: Some(actor.id),
        reason: reason.to_string(),
        created_at: now,
    };
    Ok(state.store.appointments.add_history(&entry).await?)
}

async fn notify(
    state: &AppState,
    appointment: &Appointment,
    category: NotificationCategory,
    now: DateTime<Utc>,
) {
    let service = state
        .store
        .services
        .get(appointment.service_id)
        .await
        .ok()
        .flatten();
    state
        .notifier
        .notify_user(
            appointment.customer_id,
            category,
            &appointment_context(appointment, service.as_ref()),
            Some((RelatedKind::Appointment, appointment.id)),
            now,
        )
        .await;
}

async fn create_appointment(
    state: &AppState,
    customer_id: Uuid,
    slot: &AppointmentSlot,
    date: NaiveDate,
    time: NaiveTime,
    now: DateTime<Utc>,
) -> AppResult<Appointment> {
    let sequence = state
        .store
        .appointments
        .next_daily_sequence(today(now))
        .await?;
    Ok(Appointment {
        id: Uuid::new_v4(),
        appointment_number: format_appointment_number(today(now), sequence),
        customer_id,
        slot_id: slot.id,
        organization_id: slot.organization_id,
        service_id: slot.service_id,
        scheduled_date: date,
        scheduled_time: time,
        status: AppointmentStatus::Pending,
        priority: AppointmentPriority::default(),
        customer_notes: String::new(),
        customer_phone: None,
        assigned_staff_id: None,
        staff_notes: String::new(),
        rescheduled_from: None,
        confirmed_at: None,
        checked_in_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        reminder_sent: false,
        created_at: now,
        updated_at: now,
    })
}

pub async fn book(
    state: &AppState,
    actor: &User,
    request: BookRequest,
    now: DateTime<Utc>,
) -> AppResult<Appointment> {
    let slot = get_slot(state, request.slot_id).await?;
    check_target(
        state,
        actor.id,
        &slot,
        request.scheduled_date,
        request.scheduled_time,
        None,
        now,
    )
    .await?;

    let booked_today = state
        .store
        .appointments
        .count_created_by(actor.id, today(now))
        .await?;
    if booked_today >= state.config.max_appointments_per_user_per_day {
        return Err(AppError::validation(format!(
            "Daily limit of {} appointments reached",
            state.config.max_appointments_per_user_per_day
        )));
    }

    let notes = request.notes.unwrap_or_default();
    validation::max_len("notes", &notes, 500)?;
    let phone = match request.phone.filter(|p| !p.trim().is_empty()) {
        Some(phone) => {
            validation::phone(phone.trim())?;
            Some(phone.trim().to_string())
        }
        None => actor.phone_number.clone(),
    };

    let mut appointment = create_appointment(
        state,
        actor.id,
        &slot,
        request.scheduled_date,
        request.scheduled_time,
        now,
    )
    .await?;
    appointment.customer_notes = notes;
    appointment.customer_phone = phone;
    appointment.priority = request.priority.unwrap_or_default();
    state
        .store
        .appointments
        .insert_booking(&appointment, slot.max_appointments, None)
        .await?;
    record(state, &appointment, "created", None, actor, "", now).await?;
    info!(appointment_id = %appointment.id, number = %appointment.appointment_number, "Appointment booked");

    notify(state, &appointment, NotificationCategory::AppointmentCreated, now).await;
    Ok(appointment)
}

pub async fn get_appointment(state: &AppState, id: Uuid) -> AppResult<Appointment> {
    state
        .store
        .appointments
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Appointment", id))
}

fn staff_of(actor: &User, appointment: &Appointment) -> bool {
    actor.role.is_staff() && can_manage_organization(actor, appointment.organization_id)
}

fn ensure_can_see(actor: &User, appointment: &Appointment) -> AppResult<()> {
    if appointment.customer_id == actor.id || staff_of(actor, appointment) {
        Ok(())
    } else {
        Err(AppError::forbidden("You cannot access this appointment"))
    }
}

/// Owner or staff; customers must leave at least two hours of notice.
fn ensure_changeable(actor: &User, appointment: &Appointment, now: DateTime<Utc>) -> AppResult<()> {
    ensure_can_see(actor, appointment)?;
    if !appointment.status.is_changeable() {
        return Err(AppError::validation(format!(
            "A {} appointment can no longer be changed",
            appointment.status
        )));
    }
    if !staff_of(actor, appointment)
        && appointment.scheduled_at() - now < Duration::hours(CUSTOMER_CHANGE_NOTICE_HOURS)
    {
        return Err(AppError::validation(format!(
            "Appointments can only be changed up to {CUSTOMER_CHANGE_NOTICE_HOURS} hours before they start"
        )));
    }
    Ok(())
}

fn ensure_status(
    appointment: &Appointment,
    allowed: &[AppointmentStatus],
    next: AppointmentStatus,
) -> AppResult<()> {
    if allowed.contains(&appointment.status) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Cannot change appointment status from '{}' to '{next}'",
            appointment.status
        )))
    }
}

fn stale() -> AppError {
    AppError::Conflict("The appointment was changed by another request; reload and try again".into())
}

async fn staff_appointment(state: &AppState, actor: &User, id: Uuid) -> AppResult<Appointment> {
    require_staff(actor)?;
    let appointment = get_appointment(state, id).await?;
    ensure_manages(actor, appointment.organization_id)?;
    Ok(appointment)
}

/// Applies a status change, saves it and writes the history entry.
#[allow(clippy::too_many_arguments)]
async fn change_status(
    state: &AppState,
    actor: &User,
    mut appointment: Appointment,
    next: AppointmentStatus,
    action: &str,
    reason: &str,
    now: DateTime<Utc>,
    apply: impl FnOnce(&mut Appointment),
) -> AppResult<Appointment> {
    let old = appointment.status;
    appointment.status = next;
    apply(&mut appointment);
    appointment.updated_at = now;
    if !state.store.appointments.update(&appointment, old).await? {
        return Err(stale());
    }
    record(state, &appointment, action, Some(old), actor, reason, now).await?;
    info!(appointment_id = %appointment.id, from = %old, to = %next, "Appointment status changed");
    Ok(appointment)
}

pub async fn confirm(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Appointment> {
    let appointment = staff_appointment(state, actor, id).await?;
    ensure_status(&appointment, &[AppointmentStatus::Pending], AppointmentStatus::Confirmed)?;
    let appointment = change_status(
        state,
        actor,
        appointment,
        AppointmentStatus::Confirmed,
        "confirmed",
        "",
        now,
        |a| a.confirmed_at = Some(now),
    )
    .await?;
    notify(state, &appointment, NotificationCategory::AppointmentConfirmed, now).await;
    Ok(appointment)
}

pub async fn cancel(
    state: &AppState,
    actor: &User,
    id: Uuid,
    request: CancelRequest,
    now: DateTime<Utc>,
) -> AppResult<Appointment> {
    let appointment = get_appointment(state, id).await?;
    ensure_changeable(actor, &appointment, now)?;
    let reason = request.reason.unwrap_or_default();
    let appointment = change_status(
        state,
        actor,
        appointment,
        AppointmentStatus::Cancelled,
        "cancelled",
        &reason,
        now,
        |a| {
            a.cancelled_at = Some(now);
            if !reason.trim().is_empty() {
                a.append_staff_note(&format!("Cancelled: {}", reason.trim()));
            }
        },
    )
    .await?;
    notify(state, &appointment, NotificationCategory::AppointmentCancelled, now).await;
    Ok(appointment)
}

pub async fn check_in(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Appointment> {
    let appointment = staff_appointment(state, actor, id).await?;
    ensure_status(&appointment, &[AppointmentStatus::Confirmed], AppointmentStatus::CheckedIn)?;
    if appointment.scheduled_date != today(now) {
        return Err(AppError::validation("Only today's appointments can be checked in"));
    }
    change_status(
        state,
        actor,
        appointment,
        AppointmentStatus::CheckedIn,
        "checked_in",
        "",
        now,
        |a| a.checked_in_at = Some(now),
    )
    .await
}

pub async fn start(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Appointment> {
    let appointment = staff_appointment(state, actor, id).await?;
    ensure_status(&appointment, &[AppointmentStatus::CheckedIn], AppointmentStatus::InProgress)?;
    change_status(
        state,
        actor,
        appointment,
        AppointmentStatus::InProgress,
        "started",
        "",
        now,
        |a| {
            a.started_at = Some(now);
            a.assigned_staff_id = Some(actor.id);
        },
    )
    .await
}

pub async fn complete(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Appointment> {
    let appointment = staff_appointment(state, actor, id).await?;
    ensure_status(&appointment, &[AppointmentStatus::InProgress], AppointmentStatus::Completed)?;
    change_status(
        state,
        actor,
        appointment,
        AppointmentStatus::Completed,
        "completed",
        "",
        now,
        |a| a.completed_at = Some(now),
    )
    .await
}

pub async fn no_show(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Appointment> {
    let appointment = staff_appointment(state, actor, id).await?;
    ensure_status(
        &appointment,
        &[AppointmentStatus::Confirmed, AppointmentStatus::CheckedIn],
        AppointmentStatus::NoShow,
    )?;
    change_status(
        state,
        actor,
        appointment,
        AppointmentStatus::NoShow,
        "no_show",
        "",
        now,
        |_| {},
    )
    .await
}

/// Books the new time first, then retires the old appointment as
/// `rescheduled`. The daily booking quota does not apply.
pub async fn reschedule(
    state: &AppState,
    actor: &User,
    id: Uuid,
    request: RescheduleRequest,
    now: DateTime<Utc>,
) -> AppResult<Appointment> {
    let old = get_appointment(state, id).await?;
    ensure_changeable(actor, &old, now)?;
    let slot = get_slot(state, request.slot_id.unwrap_or(old.slot_id)).await?;
    if slot.service_id != old.service_id {
        return Err(AppError::validation(
            "An appointment can only move to a slot of the same service",
        ));
    }
    check_target(
        state,
        old.customer_id,
        &slot,
        request.scheduled_date,
        request.scheduled_time,
        Some(&old),
        now,
    )
    .await?;

    let mut moved = create_appointment(
        state,
        old.customer_id,
        &slot,
        request.scheduled_date,
        request.scheduled_time,
        now,
    )
    .await?;
    moved.customer_notes = old.customer_notes.clone();
    moved.customer_phone = old.customer_phone.clone();
    moved.priority = old.priority;
    moved.rescheduled_from = Some(old.id);
    state
        .store
        .appointments
        .insert_booking(&moved, slot.max_appointments, Some(old.id))
        .await?;

    let reason = request.reason.unwrap_or_default();
    record(
        state,
        &moved,
        "created",
        None,
        actor,
        &format!("Rescheduled from {}", old.appointment_number),
        now,
    )
    .await?;
    let retired = change_status(
        state,
        actor,
        old,
        AppointmentStatus::Rescheduled,
        "rescheduled",
        &reason,
        now,
        |_| {},
    )
    .await;
    if let Err(e) = retired {
        // The old booking moved on meanwhile; give the new place back.
        let mut orphan = moved;
        orphan.status = AppointmentStatus::Cancelled;
        orphan.cancelled_at = Some(now);
        orphan.updated_at = now;
        state
            .store
            .appointments
            .update(&orphan, AppointmentStatus::Pending)
            .await?;
        return Err(e);
    }

    notify(state, &moved, NotificationCategory::AppointmentRescheduled, now).await;
    Ok(moved)
}

/// Customers see their own appointments, staff their organization's.
pub async fn list(
    state: &AppState,
    actor: &User,
    mut filter: AppointmentFilter,
    page: PageRequest,
) -> AppResult<Listing<Appointment>> {
    if actor.role == UserRole::Customer {
        filter.customer_id = Some(actor.id);
    } else {
        filter.organization_id = staff_scope(actor)?.or(filter.organization_id);
    }
    Ok(state.store.appointments.list(&filter, page).await?)
}

pub async fn detail(state: &AppState, actor: &User, id: Uuid) -> AppResult<AppointmentDetail> {
    let appointment = get_appointment(state, id).await?;
    ensure_can_see(actor, &appointment)?;
    let history = state.store.appointments.history(appointment.id).await?;
    Ok(AppointmentDetail {
        appointment,
        history,
    })
}

pub async fn todays(state: &AppState, actor: &User, now: DateTime<Utc>) -> AppResult<Vec<Appointment>> {
    let filter = AppointmentFilter {
        organization_id: staff_scope(actor)?,
        date: Some(today(now)),
        ascending: true,
        ..Default::default()
    };
    Ok(state
        .store
        .appointments
        .list(&filter, PageRequest::everything())
        .await?
        .items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{Store, StoreError};
    use chrono::{Datelike, TimeZone};

    struct Fixture {
        state: AppState,
        staff: User,
        customer: User,
        slot: AppointmentSlot,
        /// Next Monday at least three days away.
        monday: NaiveDate,
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 5, 8, 0, 0).unwrap()
    }

    async fn fixture(max_appointments: i32) -> Fixture {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let now = now();
        let org = Uuid::new_v4();
        let service = Service::new(org, "Consultation".into(), "CONS".into(), now);
        state.store.services.insert(&service).await.unwrap();

        let mut staff = User::new(
            "agent@clinic.sn".into(),
            String::new(),
            "Rokhaya".into(),
            "Sy".into(),
            UserRole::Staff,
            now,
        );
        staff.organization_id = Some(org);
        state.store.users.insert(&staff).await.unwrap();
        let customer = User::new(
            "patient@example.sn".into(),
            String::new(),
            "Mamadou".into(),
            "Kane".into(),
            UserRole::Customer,
            now,
        );
        state.store.users.insert(&customer).await.unwrap();

        let payload = SlotPayload {
            service_id: Some(service.id),
            day_of_week: Some(0),
            start_time: Some(hm(9, 0)),
            end_time: Some(hm(11, 0)),
            slot_duration: Some(30),
            max_appointments: Some(max_appointments),
        };
        let slot = create_slot(&state, &staff, payload, now).await.unwrap();
        // 2024-06-05 is a Wednesday; the following Monday is the 10th.
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(monday.weekday().num_days_from_monday(), 0);
        Fixture {
            state,
            staff,
            customer,
            slot,
            monday,
        }
    }

    fn booking(f: &Fixture, time: NaiveTime) -> BookRequest {
        BookRequest {
            slot_id: f.slot.id,
            scheduled_date: f.monday,
            scheduled_time: time,
            notes: None,
            phone: None,
            priority: None,
        }
    }

    #[tokio::test]
    async fn test_book_and_availability() {
        let f = fixture(1).await;
        let before = available_times(&f.state, f.slot.id, f.monday).await.unwrap();
        assert_eq!(before.times.len(), 4);

        let appointment = book(&f.state, &f.customer, booking(&f, hm(9, 30)), now())
            .await
            .unwrap();
        assert_eq!(appointment.appointment_number, "RDV0605001");
        assert_eq!(appointment.status, AppointmentStatus::Pending);

        let after = available_times(&f.state, f.slot.id, f.monday).await.unwrap();
        assert_eq!(after.times.len(), 3);
        assert!(after.times.iter().all(|t| t.time != hm(9, 30)));

        let history = f.state.store.appointments.history(appointment.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "created");
    }

    #[tokio::test]
    async fn test_booking_rules() {
        let f = fixture(1).await;
        // Off the 30 minute grid.
        assert!(book(&f.state, &f.customer, booking(&f, hm(9, 15)), now()).await.is_err());

        // Wrong weekday.
        let mut tuesday = booking(&f, hm(9, 0));
        tuesday.scheduled_date = f.monday.succ_opt().unwrap();
        assert!(book(&f.state, &f.customer, tuesday, now()).await.is_err());

        // Too far ahead.
        let mut far = booking(&f, hm(9, 0));
        far.scheduled_date = f.monday + Duration::days(35);
        assert!(book(&f.state, &f.customer, far, now()).await.is_err());

        // Full slot.
        book(&f.state, &f.customer, booking(&f, hm(9, 0)), now()).await.unwrap();
        let full = book(&f.state, &f.staff, booking(&f, hm(9, 0)), now()).await;
        assert!(matches!(full, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_same_customer_cannot_book_twice() {
        let f = fixture(3).await;
        book(&f.state, &f.customer, booking(&f, hm(10, 0)), now()).await.unwrap();
        let twice = book(&f.state, &f.customer, booking(&f, hm(10, 0)), now()).await;
        assert!(matches!(twice, Err(AppError::Conflict(msg)) if msg.contains("already")));
    }

    #[tokio::test]
    async fn test_lifecycle_writes_history() {
        let f = fixture(1).await;
        let appointment = book(&f.state, &f.customer, booking(&f, hm(9, 0)), now())
            .await
            .unwrap();
        confirm(&f.state, &f.staff, appointment.id, now()).await.unwrap();

        // Check-in is only possible on the day itself.
        assert!(check_in(&f.state, &f.staff, appointment.id, now()).await.is_err());
        let on_the_day = scheduled_instant(f.monday, hm(8, 50));
        check_in(&f.state, &f.staff, appointment.id, on_the_day).await.unwrap();
        start(&f.state, &f.staff, appointment.id, on_the_day).await.unwrap();
        let done = complete(&f.state, &f.staff, appointment.id, on_the_day)
            .await
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert_eq!(done.assigned_staff_id, Some(f.staff.id));

        let detail = detail(&f.state, &f.customer, appointment.id).await.unwrap();
        let actions: Vec<&str> = detail.history.iter().map(|h| h.action.as_str()).collect();
        assert_eq!(
            actions,
            vec!["created", "confirmed", "checked_in", "started", "completed"]
        );
    }

    #[tokio::test]
    async fn test_customer_cannot_cancel_late() {
        let f = fixture(1).await;
        let appointment = book(&f.state, &f.customer, booking(&f, hm(9, 0)), now())
            .await
            .unwrap();
        let an_hour_before = scheduled_instant(f.monday, hm(8, 0));
        let late = cancel(
            &f.state,
            &f.customer,
            appointment.id,
            CancelRequest::default(),
            an_hour_before,
        )
        .await;
        assert!(late.is_err());

        // Staff still can, and the reason lands in the notes.
        let cancelled = cancel(
            &f.state,
            &f.staff,
            appointment.id,
            CancelRequest {
                reason: Some("Médecin absent".into()),
            },
            an_hour_before,
        )
        .await
        .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(cancelled.staff_notes.contains("Médecin absent"));
    }

    #[tokio::test]
    async fn test_reschedule_frees_the_old_time() {
        let f = fixture(1).await;
        let appointment = book(&f.state, &f.customer, booking(&f, hm(9, 0)), now())
            .await
            .unwrap();
        let request = RescheduleRequest {
            slot_id: None,
            scheduled_date: f.monday,
            scheduled_time: hm(10, 30),
            reason: None,
        };
        let moved = reschedule(&f.state, &f.customer, appointment.id, request, now())
            .await
            .unwrap();
        assert_eq!(moved.rescheduled_from, Some(appointment.id));
        assert_eq!(moved.status, AppointmentStatus::Pending);

        let old = get_appointment(&f.state, appointment.id).await.unwrap();
        assert_eq!(old.status, AppointmentStatus::Rescheduled);

        let times = available_times(&f.state, f.slot.id, f.monday).await.unwrap();
        assert!(times.times.iter().any(|t| t.time == hm(9, 0)));
        assert!(times.times.iter().all(|t| t.time != hm(10, 30)));
    }

    #[tokio::test]
    async fn test_numbers_stay_unique_across_years() {
        let f = fixture(1).await;
        let first = book(&f.state, &f.customer, booking(&f, hm(9, 0)), now())
            .await
            .unwrap();
        assert_eq!(first.appointment_number, "RDV0605001");

        // Same month and day one year later.
        let next_year = Utc.with_ymd_and_hms(2025, 6, 5, 8, 0, 0).unwrap();
        let monday = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        assert_eq!(monday.weekday().num_days_from_monday(), 0);
        let mut request = booking(&f, hm(9, 0));
        request.scheduled_date = monday;
        let second = book(&f.state, &f.customer, request, next_year).await.unwrap();
        assert_eq!(second.appointment_number, "RDV0605002");
    }

    #[tokio::test]
    async fn test_stale_transition_is_rejected() {
        let f = fixture(1).await;
        let appointment = book(&f.state, &f.customer, booking(&f, hm(9, 0)), now())
            .await
            .unwrap();
        let outdated = appointment.clone();
        confirm(&f.state, &f.staff, appointment.id, now()).await.unwrap();

        // A cancel that read the appointment before the confirmation landed.
        let late = change_status(
            &f.state,
            &f.customer,
            outdated,
            AppointmentStatus::Cancelled,
            "cancelled",
            "",
            now(),
            |_| {},
        )
        .await;
        assert!(matches!(late, Err(AppError::Conflict(_))));

        let detail = detail(&f.state, &f.customer, appointment.id).await.unwrap();
        assert_eq!(detail.appointment.status, AppointmentStatus::Confirmed);
        let actions: Vec<&str> = detail.history.iter().map(|h| h.action.as_str()).collect();
        assert_eq!(actions, vec!["created", "confirmed"]);
    }

    #[tokio::test]
    async fn test_store_enforces_slot_capacity() {
        let f = fixture(1).await;
        let taken = book(&f.state, &f.customer, booking(&f, hm(9, 0)), now())
            .await
            .unwrap();

        // Inserts that skipped the availability lookup, as a concurrent
        // request would.
        let other = Uuid::new_v4();
        let late = create_appointment(&f.state, other, &f.slot, f.monday, hm(9, 0), now())
            .await
            .unwrap();
        let full = f
            .state
            .store
            .appointments
            .insert_booking(&late, f.slot.max_appointments, None)
            .await
            .unwrap_err();
        assert!(matches!(full, StoreError::Conflict(ref msg) if msg.contains("full")));

        let twice = create_appointment(&f.state, f.customer.id, &f.slot, f.monday, hm(9, 0), now())
            .await
            .unwrap();
        let duplicate = f
            .state
            .store
            .appointments
            .insert_booking(&twice, f.slot.max_appointments, None)
            .await
            .unwrap_err();
        assert!(matches!(duplicate, StoreError::Conflict(ref msg) if msg.contains("already")));

        // Moving a booking does not count against its own place.
        f.state
            .store
            .appointments
            .insert_booking(&twice, f.slot.max_appointments, Some(taken.id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_daily_booking_quota() {
        let f = fixture(10).await;
        for time in [hm(9, 0), hm(9, 30), hm(10, 0)] {
            book(&f.state, &f.customer, booking(&f, time), now()).await.unwrap();
        }
        let fourth = book(&f.state, &f.customer, booking(&f, hm(10, 30)), now()).await;
        assert!(matches!(fourth, Err(AppError::ValidationError(msg)) if msg.contains("limit")));
    }
}

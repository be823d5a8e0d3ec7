use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::paged;
use crate::auth::{CurrentUser, OptionalUser};
use crate::domain::appointments::{
    self, BookRequest, CancelRequest, DateQuery, RescheduleRequest, SlotPayload,
};
use crate::models::AppointmentStatus;
use crate::state::AppState;
use crate::store::{AppointmentFilter, SlotFilter};
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::{created, no_content, success};

#[derive(Debug, Default, Deserialize)]
pub struct SlotQuery {
    pub organization: Option<Uuid>,
    pub service: Option<Uuid>,
    pub day_of_week: Option<i16>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub service: Option<Uuid>,
    pub organization: Option<Uuid>,
}

pub async fn list_slots(
    State(state): State<AppState>,
    OptionalUser(actor): OptionalUser,
    Query(params): Query<PageParams>,
    Query(query): Query<SlotQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let filter = SlotFilter {
        organization_id: query.organization,
        service_id: query.service,
        day_of_week: query.day_of_week,
        include_inactive: query.include_inactive,
    };
    let listing = appointments::list_slots(&state, actor.as_ref(), filter, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn create_slot(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<SlotPayload>,
) -> AppResult<Response> {
    let slot = appointments::create_slot(&state, &actor, payload, Utc::now()).await?;
    Ok(created(slot, "Appointment slot created"))
}

pub async fn get_slot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let slot = appointments::get_slot(&state, id).await?;
    Ok(success(slot, "Appointment slot"))
}

pub async fn update_slot(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SlotPayload>,
) -> AppResult<Response> {
    let slot = appointments::update_slot(&state, &actor, id, payload, Utc::now()).await?;
    Ok(success(slot, "Appointment slot updated"))
}

pub async fn delete_slot(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    appointments::set_slot_active(&state, &actor, id, false, Utc::now()).await?;
    Ok(no_content())
}

pub async fn reactivate_slot(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let slot = appointments::set_slot_active(&state, &actor, id, true, Utc::now()).await?;
    Ok(success(slot, "Appointment slot reactivated"))
}

pub async fn available_times(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> AppResult<Response> {
    let availability = appointments::available_times(&state, id, query.date).await?;
    Ok(success(availability, "Available times"))
}

pub async fn service_availability(
    State(state): State<AppState>,
    Path(service_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> AppResult<Response> {
    let availability = appointments::service_availability(&state, service_id, query.date).await?;
    Ok(success(availability, "Service availability"))
}

pub async fn book(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<BookRequest>,
) -> AppResult<Response> {
    let appointment = appointments::book(&state, &actor, request, Utc::now()).await?;
    Ok(created(appointment, "Appointment booked"))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<PageParams>,
    Query(query): Query<AppointmentQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let filter = AppointmentFilter {
        organization_id: query.organization,
        service_id: query.service,
        status: query.status,
        date: query.date,
        ..Default::default()
    };
    let listing = appointments::list(&state, &actor, filter, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn today(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Response> {
    let found = appointments::todays(&state, &actor, Utc::now()).await?;
    Ok(success(found, "Today's appointments"))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let detail = appointments::detail(&state, &actor, id).await?;
    Ok(success(detail, "Appointment"))
}

pub async fn confirm(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let appointment = appointments::confirm(&state, &actor, id, Utc::now()).await?;
    Ok(success(appointment, "Appointment confirmed"))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    request: Option<Json<CancelRequest>>,
) -> AppResult<Response> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let appointment = appointments::cancel(&state, &actor, id, request, Utc::now()).await?;
    Ok(success(appointment, "Appointment cancelled"))
}

pub async fn check_in(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let appointment = appointments::check_in(&state, &actor, id, Utc::now()).await?;
    Ok(success(appointment, "Checked in"))
}

pub async fn start(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let appointment = appointments::start(&state, &actor, id, Utc::now()).await?;
    Ok(success(appointment, "Appointment started"))
}

pub async fn complete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let appointment = appointments::complete(&state, &actor, id, Utc::now()).await?;
    Ok(success(appointment, "Appointment completed"))
}

pub async fn no_show(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let appointment = appointments::no_show(&state, &actor, id, Utc::now()).await?;
    Ok(success(appointment, "Marked as no-show"))
}

pub async fn reschedule(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> AppResult<Response> {
    let appointment = appointments::reschedule(&state, &actor, id, request, Utc::now()).await?;
    Ok(created(appointment, "Appointment rescheduled"))
}

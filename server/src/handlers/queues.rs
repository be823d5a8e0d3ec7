use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::paged;
use crate::auth::{CurrentUser, OptionalUser};
use crate::domain::queues::{self, QueuePayload, QueueView, StatusChange};
use crate::domain::tickets::{self, TakeTicketRequest};
use crate::models::{QueueStatus, QueueType, TicketStatus};
use crate::state::AppState;
use crate::store::{Listing, QueueFilter};
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::{created, no_content, success};

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub organization: Option<Uuid>,
    pub service: Option<Uuid>,
    pub current_status: Option<QueueStatus>,
    pub queue_type: Option<QueueType>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketStatusQuery {
    pub status: Option<TicketStatus>,
}

pub async fn list_queues(
    State(state): State<AppState>,
    OptionalUser(actor): OptionalUser,
    Query(params): Query<PageParams>,
    Query(query): Query<QueueQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let filter = QueueFilter {
        organization_id: query.organization,
        service_id: query.service,
        current_status: query.current_status,
        queue_type: query.queue_type,
        include_inactive: query.include_inactive,
    };
    let (found, total) = queues::list(&state, actor.as_ref(), filter, request)
        .await?
        .into_parts();
    let mut items = Vec::with_capacity(found.len());
    for queue in found {
        items.push(queues::view(&state, queue).await?);
    }
    let listing: Listing<QueueView> = Listing { items, total };
    Ok(paged(listing, request, &uri))
}

pub async fn create_queue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<QueuePayload>,
) -> AppResult<Response> {
    let queue = queues::create(&state, &actor, payload, Utc::now()).await?;
    let view = queues::view(&state, queue).await?;
    Ok(created(view, "Queue created"))
}

pub async fn get_queue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let queue = queues::get(&state, id).await?;
    let view = queues::view(&state, queue).await?;
    Ok(success(view, "Queue"))
}

pub async fn update_queue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<QueuePayload>,
) -> AppResult<Response> {
    let queue = queues::update(&state, &actor, id, payload, Utc::now()).await?;
    let view = queues::view(&state, queue).await?;
    Ok(success(view, "Queue updated"))
}

pub async fn delete_queue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    queues::set_active(&state, &actor, id, false, Utc::now()).await?;
    Ok(no_content())
}

pub async fn reactivate_queue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let queue = queues::set_active(&state, &actor, id, true, Utc::now()).await?;
    let view = queues::view(&state, queue).await?;
    Ok(success(view, "Queue reactivated"))
}

pub async fn change_status(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(change): Json<StatusChange>,
) -> AppResult<Response> {
    let queue = queues::change_status(&state, &actor, id, change.status, Utc::now()).await?;
    let view = queues::view(&state, queue).await?;
    Ok(success(view, "Queue status updated"))
}

pub async fn queue_tickets(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
    Query(query): Query<TicketStatusQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let listing = queues::queue_tickets(&state, &actor, id, query.status, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let dashboard = queues::dashboard(&state, &actor, id, Utc::now()).await?;
    Ok(success(dashboard, "Queue dashboard"))
}

pub async fn global_stats(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Response> {
    let stats = queues::global_stats(&state, &actor).await?;
    Ok(success(stats, "Queue statistics"))
}

pub async fn take_ticket(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    request: Option<Json<TakeTicketRequest>>,
) -> AppResult<Response> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let ticket = tickets::take_ticket(&state, &actor, id, request, Utc::now()).await?;
    Ok(created(ticket, "Ticket created"))
}

pub async fn call_next(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    Ok(match tickets::call_next(&state, &actor, id, Utc::now()).await? {
        Some(ticket) => success(ticket, "Ticket called"),
        None => success(Option::<()>::None, "No tickets waiting"),
    })
}

use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::paged;
use crate::auth::CurrentUser;
use crate::domain::tickets::{self, TransferRequest};
use crate::models::{Priority, Ticket, TicketStatus};
use crate::state::AppState;
use crate::store::TicketFilter;
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::success;

#[derive(Debug, Default, Deserialize)]
pub struct TicketQuery {
    pub queue: Option<Uuid>,
    pub organization: Option<Uuid>,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
}

#[derive(Serialize)]
struct ExpiredTickets {
    expired: usize,
    tickets: Vec<Ticket>,
}

pub async fn list_tickets(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<PageParams>,
    Query(query): Query<TicketQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let filter = TicketFilter {
        queue_id: query.queue,
        organization_id: query.organization,
        statuses: query.status.into_iter().collect(),
        priority: query.priority,
        ..Default::default()
    };
    let listing = tickets::list(&state, &actor, filter, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let ticket = tickets::get(&state, &actor, id).await?;
    Ok(success(ticket, "Ticket"))
}

pub async fn mine_active(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Response> {
    let active = tickets::mine_active(&state, &actor).await?;
    Ok(success(active, "Active tickets"))
}

pub async fn recall(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let ticket = tickets::recall(&state, &actor, id, Utc::now()).await?;
    Ok(success(ticket, "Ticket recalled"))
}

pub async fn start(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let ticket = tickets::start(&state, &actor, id, Utc::now()).await?;
    Ok(success(ticket, "Service started"))
}

pub async fn complete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let ticket = tickets::complete(&state, &actor, id, Utc::now()).await?;
    Ok(success(ticket, "Service completed"))
}

pub async fn no_show(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let ticket = tickets::no_show(&state, &actor, id, Utc::now()).await?;
    Ok(success(ticket, "Marked as no-show"))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let ticket = tickets::cancel(&state, &actor, id, Utc::now()).await?;
    Ok(success(ticket, "Ticket cancelled"))
}

pub async fn transfer(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<TransferRequest>,
) -> AppResult<Response> {
    let ticket = tickets::transfer(&state, &actor, id, request, Utc::now()).await?;
    Ok(success(ticket, "Ticket transferred"))
}

pub async fn expire_overdue(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Response> {
    let tickets = tickets::expire_overdue_as(&state, &actor, Utc::now()).await?;
    let expired = ExpiredTickets {
        expired: tickets.len(),
        tickets,
    };
    Ok(success(expired, "Overdue tickets expired"))
}

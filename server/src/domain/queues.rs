use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{ensure_manages, require_staff, staff_scope};
use crate::domain::tickets::{self, TicketView};
use crate::domain::{catalog, context, start_of_day, today};
use crate::models::ticket::sort_for_service;
use crate::models::{
    NotificationCategory, ProcessingStrategy, Queue, QueueStatus, QueueType, RelatedKind,
    SoftDelete, Ticket, TicketStatus, User,
};
use crate::realtime::{Channel, Event};
use crate::state::AppState;
use crate::store::{Listing, QueueFilter, TicketFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

const DASHBOARD_UPCOMING: usize = 5;

#[derive(Debug, Default, Deserialize)]
pub struct QueuePayload {
    pub service_id: Option<Uuid>,
    pub name: Option<String>,
    pub queue_type: Option<QueueType>,
    pub description: Option<String>,
    pub processing_strategy: Option<ProcessingStrategy>,
    pub max_capacity: Option<i32>,
    pub max_wait_time: Option<i32>,
    pub ticket_expiry_time: Option<i32>,
    pub notifications_enabled: Option<bool>,
    pub notify_before_turns: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: QueueStatus,
}

/// A queue with its live figures.
#[derive(Debug, Serialize)]
pub struct QueueView {
    #[serde(flatten)]
    pub queue: Queue,
    pub waiting_count: usize,
    pub estimated_wait_minutes: i64,
    pub is_open: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueDashboard {
    pub queue: QueueView,
    pub current_ticket: Option<Ticket>,
    pub next_tickets: Vec<TicketView>,
    pub served_today: i64,
    pub cancelled_today: i64,
    pub no_show_today: i64,
}

#[derive(Debug, Serialize)]
pub struct QueueStats {
    pub active_queues: usize,
    pub waiting: i64,
    pub serving: i64,
}

fn apply(queue: &mut Queue, payload: QueuePayload) -> AppResult<()> {
    if let Some(name) = payload.name {
        queue.name = name.trim().to_string();
    }
    if let Some(queue_type) = payload.queue_type {
        queue.queue_type = queue_type;
    }
    if let Some(description) = payload.description {
        queue.description = description;
    }
    if let Some(strategy) = payload.processing_strategy {
        queue.processing_strategy = strategy;
    }
    if let Some(capacity) = payload.max_capacity {
        validation::in_range("max_capacity", capacity, 0, 10_000)?;
        queue.max_capacity = capacity;
    }
    if let Some(minutes) = payload.max_wait_time {
        validation::in_range("max_wait_time", minutes, 5, 1440)?;
        queue.max_wait_time = minutes;
    }
    if let Some(minutes) = payload.ticket_expiry_time {
        validation::in_range("ticket_expiry_time", minutes, 5, 1440)?;
        queue.ticket_expiry_time = minutes;
    }
    if let Some(flag) = payload.notifications_enabled {
        queue.notifications_enabled = flag;
    }
    if let Some(turns) = payload.notify_before_turns {
        validation::in_range("notify_before_turns", turns, 1, 10)?;
        queue.notify_before_turns = turns;
    }
    validation::not_blank("name", &queue.name)?;
    validation::max_len("name", &queue.name, 100)
}

pub async fn get(state: &AppState, id: Uuid) -> AppResult<Queue> {
    state
        .store
        .queues
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Queue", id))
}

pub async fn view(state: &AppState, queue: Queue) -> AppResult<QueueView> {
    let service = catalog::get_service(state, queue.service_id).await?;
    let waiting_count = state.store.tickets.waiting(queue.id).await?.len();
    Ok(QueueView {
        waiting_count,
        estimated_wait_minutes: waiting_count as i64 * i64::from(service.estimated_duration),
        is_open: queue.is_open(),
        queue,
    })
}

pub async fn update_event(state: &AppState, queue: &Queue) -> AppResult<Event> {
    let view = view(state, queue.clone()).await?;
    Ok(Event::QueueUpdate {
        queue_id: queue.id,
        status: queue.current_status,
        waiting_count: view.waiting_count,
        current_ticket_number: queue.current_ticket_number,
        estimated_wait_minutes: view.estimated_wait_minutes,
    })
}

/// Pushes the queue's current figures to its subscribers and its organization.
pub async fn publish_update(state: &AppState, queue: &Queue) {
    match update_event(state, queue).await {
        Ok(event) => {
            state.hub.publish(Channel::Queue(queue.id), event.clone());
            state
                .hub
                .publish(Channel::Organization(queue.organization_id), event);
        }
        Err(e) => warn!(queue_id = %queue.id, error = %e, "Could not publish queue update"),
    }
}

pub async fn create(
    state: &AppState,
    actor: &User,
    payload: QueuePayload,
    now: DateTime<Utc>,
) -> AppResult<Queue> {
    let service_id = payload
        .service_id
        .ok_or_else(|| AppError::validation("service_id is required"))?;
    let service = catalog::get_service(state, service_id).await?;
    ensure_manages(actor, service.organization_id)?;

    let mut queue = Queue::new(service.id, service.organization_id, String::new(), now);
    apply(&mut queue, payload)?;
    state.store.queues.insert(&queue).await?;
    info!(queue_id = %queue.id, service_id = %service.id, "Queue created");
    Ok(queue)
}

pub async fn update(
    state: &AppState,
    actor: &User,
    id: Uuid,
    mut payload: QueuePayload,
    now: DateTime<Utc>,
) -> AppResult<Queue> {
    let mut queue = get(state, id).await?;
    ensure_manages(actor, queue.organization_id)?;
    if payload.service_id.take().is_some_and(|service| service != queue.service_id) {
        return Err(AppError::validation("A queue cannot move to another service"));
    }
    apply(&mut queue, payload)?;
    queue.updated_at = now;
    state.store.queues.update(&queue).await?;
    publish_update(state, &queue).await;
    Ok(queue)
}

pub async fn set_active(
    state: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> AppResult<Queue> {
    let mut queue = get(state, id).await?;
    ensure_manages(actor, queue.organization_id)?;
    if active {
        queue.reactivate(now);
    } else {
        queue.deactivate(now);
    }
    state.store.queues.update(&queue).await?;
    publish_update(state, &queue).await;
    Ok(queue)
}

pub async fn list(
    state: &AppState,
    actor: Option<&User>,
    mut filter: QueueFilter,
    page: PageRequest,
) -> AppResult<Listing<Queue>> {
    if !actor.is_some_and(|user| user.role.is_staff()) {
        filter.include_inactive = false;
    }
    Ok(state.store.queues.list(&filter, page).await?)
}

/// Opens, pauses or closes a queue. Closing tells everyone still waiting.
pub async fn change_status(
    state: &AppState,
    actor: &User,
    id: Uuid,
    status: QueueStatus,
    now: DateTime<Utc>,
) -> AppResult<Queue> {
    require_staff(actor)?;
    let mut queue = get(state, id).await?;
    ensure_manages(actor, queue.organization_id)?;
    let previous = queue.current_status;
    queue.current_status = status;
    queue.updated_at = now;
    state.store.queues.update(&queue).await?;
    info!(queue_id = %id, from = %previous, to = %status, "Queue status changed");
    publish_update(state, &queue).await;

    if status == QueueStatus::Closed && previous != QueueStatus::Closed {
        for ticket in state.store.tickets.waiting(queue.id).await? {
            let ctx = context([
                ("queue_name", queue.name.clone()),
                ("ticket_number", ticket.ticket_number.clone()),
            ]);
            state
                .notifier
                .notify_user(
                    ticket.customer_id,
                    NotificationCategory::QueueClosed,
                    &ctx,
                    Some((RelatedKind::Queue, queue.id)),
                    now,
                )
                .await;
        }
    }
    Ok(queue)
}

pub(crate) async fn managed_queue(state: &AppState, actor: &User, id: Uuid) -> AppResult<Queue> {
    require_staff(actor)?;
    let queue = get(state, id).await?;
    ensure_manages(actor, queue.organization_id)?;
    Ok(queue)
}

/// The queue's tickets in the order the counter serves them.
pub async fn queue_tickets(
    state: &AppState,
    actor: &User,
    id: Uuid,
    status: Option<TicketStatus>,
    page: PageRequest,
) -> AppResult<Listing<TicketView>> {
    let queue = managed_queue(state, actor, id).await?;
    let filter = TicketFilter {
        queue_id: Some(queue.id),
        statuses: status.into_iter().collect(),
        ..Default::default()
    };
    let mut all = state
        .store
        .tickets
        .list(&filter, PageRequest::everything())
        .await?
        .items;
    sort_for_service(queue.processing_strategy, &mut all);
    let total = all.len() as i64;
    let items = tickets::views(state, page.slice(&all)).await?;
    Ok(Listing { items, total })
}

async fn count_today(
    state: &AppState,
    queue_id: Uuid,
    status: TicketStatus,
    now: DateTime<Utc>,
) -> AppResult<i64> {
    let filter = TicketFilter {
        queue_id: Some(queue_id),
        statuses: vec![status],
        created_since: Some(start_of_day(today(now))),
        ..Default::default()
    };
    Ok(state.store.tickets.list(&filter, PageRequest::first(1)).await?.total)
}

pub async fn dashboard(
    state: &AppState,
    actor: &User,
    id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<QueueDashboard> {
    let queue = managed_queue(state, actor, id).await?;

    let at_counter = TicketFilter {
        queue_id: Some(queue.id),
        statuses: vec![TicketStatus::Called, TicketStatus::Serving],
        ..Default::default()
    };
    let current_ticket = state
        .store
        .tickets
        .list(&at_counter, PageRequest::everything())
        .await?
        .items
        .into_iter()
        .max_by_key(|ticket| ticket.called_at);

    let mut waiting = state.store.tickets.waiting(queue.id).await?;
    sort_for_service(queue.processing_strategy, &mut waiting);
    waiting.truncate(DASHBOARD_UPCOMING);
    let next_tickets = tickets::views(state, waiting).await?;

    Ok(QueueDashboard {
        served_today: count_today(state, queue.id, TicketStatus::Served, now).await?,
        cancelled_today: count_today(state, queue.id, TicketStatus::Cancelled, now).await?,
        no_show_today: count_today(state, queue.id, TicketStatus::NoShow, now).await?,
        queue: view(state, queue).await?,
        current_ticket,
        next_tickets,
    })
}

/// Figures across every queue the caller can see.
pub async fn global_stats(state: &AppState, actor: &User) -> AppResult<QueueStats> {
    let organization_id = staff_scope(actor)?;
    let queues = state
        .store
        .queues
        .list(
            &QueueFilter {
                organization_id,
                ..Default::default()
            },
            PageRequest::everything(),
        )
        .await?;
    let count = |status: TicketStatus| TicketFilter {
        organization_id,
        statuses: vec![status],
        ..Default::default()
    };
    let waiting = state
        .store
        .tickets
        .list(&count(TicketStatus::Waiting), PageRequest::first(1))
        .await?
        .total;
    let serving = state
        .store
        .tickets
        .list(&count(TicketStatus::Serving), PageRequest::first(1))
        .await?
        .total;
    Ok(QueueStats {
        active_queues: queues.items.iter().filter(|queue| queue.is_open()).count(),
        waiting,
        serving,
    })
}

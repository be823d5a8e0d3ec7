//! Ticket lifecycle: issuing, calling, serving, closing and expiry.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{ensure_manages, require_admin, require_staff, staff_scope};
use crate::domain::{catalog, context, queues, today};
use crate::models::ticket::{format_ticket_number, minutes_between, sort_for_service};
use crate::models::{
    CreationChannel, NotificationCategory, Priority, Queue, RelatedKind, Ticket, TicketStatus,
    User, UserRole,
};
use crate::realtime::{Channel, Event};
use crate::state::AppState;
use crate::store::{Listing, TicketFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

#[derive(Debug, Default, Deserialize)]
pub struct TakeTicketRequest {
    pub priority: Option<Priority>,
    pub channel: Option<CreationChannel>,
    pub notes: Option<String>,
    pub documents: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub queue_id: Uuid,
}

/// A ticket with its place in line; both extra fields are null unless waiting.
#[derive(Debug, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub position: Option<usize>,
    pub estimated_wait_minutes: Option<i64>,
}

struct LinePositions {
    positions: HashMap<Uuid, usize>,
    minutes_per_ticket: i64,
}

async fn line_positions(state: &AppState, queue_id: Uuid) -> AppResult<LinePositions> {
    let queue = queues::get(state, queue_id).await?;
    let service = catalog::get_service(state, queue.service_id).await?;
    let mut waiting = state.store.tickets.waiting(queue_id).await?;
    sort_for_service(queue.processing_strategy, &mut waiting);
    Ok(LinePositions {
        positions: waiting
            .iter()
            .enumerate()
            .map(|(index, ticket)| (ticket.id, index + 1))
            .collect(),
        minutes_per_ticket: i64::from(service.estimated_duration),
    })
}

/// Annotates tickets with positions, loading each queue's line once.
pub async fn views(state: &AppState, tickets: Vec<Ticket>) -> AppResult<Vec<TicketView>> {
    let mut lines: HashMap<Uuid, LinePositions> = HashMap::new();
    let mut views = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        if ticket.status != TicketStatus::Waiting {
            views.push(TicketView {
                ticket,
                position: None,
                estimated_wait_minutes: None,
            });
            continue;
        }
        if !lines.contains_key(&ticket.queue_id) {
            let line = line_positions(state, ticket.queue_id).await?;
            lines.insert(ticket.queue_id, line);
        }
        let line = &lines[&ticket.queue_id];
        let position = line.positions.get(&ticket.id).copied();
        views.push(TicketView {
            estimated_wait_minutes: position.map(|p| (p as i64 - 1) * line.minutes_per_ticket),
            position,
            ticket,
        });
    }
    Ok(views)
}

pub async fn view(state: &AppState, ticket: Ticket) -> AppResult<TicketView> {
    let mut views = views(state, vec![ticket]).await?;
    views
        .pop()
        .ok_or_else(|| AppError::InternalServerError("ticket view lost".into()))
}

pub async fn get_ticket(state: &AppState, id: Uuid) -> AppResult<Ticket> {
    state
        .store
        .tickets
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Ticket", id))
}

fn ensure_can_see(actor: &User, ticket: &Ticket) -> AppResult<()> {
    if ticket.customer_id == actor.id {
        return Ok(());
    }
    require_staff(actor)?;
    ensure_manages(actor, ticket.organization_id)
}

async fn staff_ticket(state: &AppState, actor: &User, id: Uuid) -> AppResult<Ticket> {
    require_staff(actor)?;
    let ticket = get_ticket(state, id).await?;
    ensure_manages(actor, ticket.organization_id)?;
    Ok(ticket)
}

fn stale() -> AppError {
    AppError::Conflict("The ticket was changed by another request; reload and try again".into())
}

fn ticket_context(ticket: &Ticket, queue: &Queue) -> HashMap<String, String> {
    context([
        ("ticket_number", ticket.ticket_number.clone()),
        ("queue_name", queue.name.clone()),
    ])
}

/// Moves a ticket to `next` if the stored status is still the one we read.
async fn transition(
    state: &AppState,
    mut ticket: Ticket,
    next: TicketStatus,
    now: DateTime<Utc>,
    apply: impl FnOnce(&mut Ticket),
) -> AppResult<Ticket> {
    let expected = ticket.status;
    expected.ensure_transition(next)?;
    ticket.status = next;
    apply(&mut ticket);
    ticket.updated_at = now;
    if !state.store.tickets.update(&ticket, expected).await? {
        return Err(stale());
    }
    info!(ticket_id = %ticket.id, from = %expected, to = %next, "Ticket status changed");
    announce_status(state, &ticket).await;
    Ok(ticket)
}

async fn announce_status(state: &AppState, ticket: &Ticket) {
    let event = Event::TicketStatus {
        ticket_id: ticket.id,
        status: ticket.status,
    };
    state
        .hub
        .publish(Channel::User(ticket.customer_id), event.clone());
    state.hub.publish(Channel::Queue(ticket.queue_id), event);
    match state.store.queues.get(ticket.queue_id).await {
        Ok(Some(queue)) => queues::publish_update(state, &queue).await,
        Ok(None) => {}
        Err(e) => warn!(queue_id = %ticket.queue_id, error = %e, "Could not reload queue"),
    }
}

pub async fn take_ticket(
    state: &AppState,
    actor: &User,
    queue_id: Uuid,
    request: TakeTicketRequest,
    now: DateTime<Utc>,
) -> AppResult<TicketView> {
    let queue = queues::get(state, queue_id).await?;
    if !queue.is_open() {
        return Err(AppError::validation("This queue is closed"));
    }
    let service = catalog::get_service(state, queue.service_id).await?;

    if let Some(existing) = state.store.tickets.find_active(queue.id, actor.id).await? {
        return Err(AppError::validation(format!(
            "You already have an active ticket in this queue: {}",
            existing.ticket_number
        )));
    }
    let day = today(now);
    let issued_today = state.store.tickets.count_issued_to(actor.id, day).await?;
    if issued_today >= state.config.max_tickets_per_user_per_day {
        return Err(AppError::validation(format!(
            "Daily limit of {} tickets reached",
            state.config.max_tickets_per_user_per_day
        )));
    }
    let waiting = state.store.tickets.waiting(queue.id).await?.len();
    if queue.is_full(waiting) {
        return Err(AppError::validation("This queue is full"));
    }

    let notes = request.notes.unwrap_or_default();
    validation::max_len("notes", &notes, 500)?;
    let priority = match request.priority {
        Some(priority) if actor.role.is_staff() => priority,
        _ => service.default_priority,
    };

    let sequence = state
        .store
        .queues
        .allocate_ticket_number(queue.id, day, now)
        .await?;
    let ticket = Ticket {
        id: Uuid::new_v4(),
        ticket_number: format_ticket_number(service.ticket_prefix(), sequence),
        sequence,
        issued_on: day,
        queue_id: queue.id,
        service_id: service.id,
        organization_id: queue.organization_id,
        customer_id: actor.id,
        priority,
        creation_channel: request.channel.unwrap_or_default(),
        customer_notes: notes,
        documents_brought: request.documents.unwrap_or_default(),
        status: TicketStatus::Waiting,
        serving_agent_id: None,
        transferred_to: None,
        created_at: now,
        called_at: None,
        service_started_at: None,
        service_ended_at: None,
        expires_at: now + Duration::minutes(i64::from(queue.ticket_expiry_time)),
        wait_time_minutes: None,
        service_time_minutes: None,
        call_count: 0,
        updated_at: now,
    };
    state.store.tickets.insert(&ticket).await?;
    state.store.services.record_ticket_issued(service.id).await?;
    info!(ticket_id = %ticket.id, number = %ticket.ticket_number, queue_id = %queue.id, "Ticket issued");

    let view = view(state, ticket).await?;
    let ctx = context([
        ("ticket_number", view.ticket.ticket_number.clone()),
        ("service_name", service.name.clone()),
        ("queue_name", queue.name.clone()),
        (
            "position",
            view.position.map(|p| p.to_string()).unwrap_or_default(),
        ),
    ]);
    state
        .notifier
        .notify(
            actor,
            NotificationCategory::TicketCreated,
            &ctx,
            Some((RelatedKind::Ticket, view.ticket.id)),
            now,
        )
        .await;
    queues::publish_update(state, &queue).await;
    Ok(view)
}

/// Calls the first waiting ticket in service order, or returns `None` when
/// nobody is waiting.
pub async fn call_next(
    state: &AppState,
    actor: &User,
    queue_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Option<Ticket>> {
    require_staff(actor)?;
    let mut queue = queues::get(state, queue_id).await?;
    ensure_manages(actor, queue.organization_id)?;

    let mut waiting = state.store.tickets.waiting(queue.id).await?;
    sort_for_service(queue.processing_strategy, &mut waiting);

    let mut called = None;
    for candidate in waiting {
        let mut ticket = candidate;
        ticket.status = TicketStatus::Called;
        ticket.called_at = Some(now);
        ticket.call_count += 1;
        ticket.serving_agent_id = Some(actor.id);
        ticket.wait_time_minutes = Some(minutes_between(ticket.created_at, now));
        ticket.updated_at = now;
        // Another counter may have taken this one already.
        if state.store.tickets.update(&ticket, TicketStatus::Waiting).await? {
            called = Some(ticket);
            break;
        }
    }
    let Some(ticket) = called else {
        return Ok(None);
    };

    queue.current_ticket_number = ticket.sequence;
    queue.updated_at = now;
    state.store.queues.update(&queue).await?;
    info!(ticket_id = %ticket.id, number = %ticket.ticket_number, agent = %actor.id, "Ticket called");

    state.hub.publish(
        Channel::Queue(queue.id),
        Event::TicketCalled {
            queue_id: queue.id,
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
        },
    );
    announce_status(state, &ticket).await;
    state
        .notifier
        .notify_user(
            ticket.customer_id,
            NotificationCategory::TicketCalled,
            &ticket_context(&ticket, &queue),
            Some((RelatedKind::Ticket, ticket.id)),
            now,
        )
        .await;

    if queue.notifications_enabled {
        warn_upcoming(state, &queue, now).await?;
    }
    Ok(Some(ticket))
}

/// Tells the customer who is now `notify_before_turns` places from the counter.
async fn warn_upcoming(state: &AppState, queue: &Queue, now: DateTime<Utc>) -> AppResult<()> {
    let Ok(turns) = usize::try_from(queue.notify_before_turns) else {
        return Ok(());
    };
    let mut waiting = state.store.tickets.waiting(queue.id).await?;
    sort_for_service(queue.processing_strategy, &mut waiting);
    if let Some(ticket) = turns.checked_sub(1).and_then(|index| waiting.get(index)) {
        let ctx = context([
            ("ticket_number", ticket.ticket_number.clone()),
            ("position", turns.to_string()),
            ("queue_name", queue.name.clone()),
        ]);
        state
            .notifier
            .notify_user(
                ticket.customer_id,
                NotificationCategory::QueuePositionUpdate,
                &ctx,
                Some((RelatedKind::Ticket, ticket.id)),
                now,
            )
            .await;
    }
    Ok(())
}

pub async fn recall(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
    let ticket = staff_ticket(state, actor, id).await?;
    let ticket = transition(state, ticket, TicketStatus::Called, now, |t| t.call_count += 1).await?;
    let queue = queues::get(state, ticket.queue_id).await?;
    state.hub.publish(
        Channel::Queue(queue.id),
        Event::TicketCalled {
            queue_id: queue.id,
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
        },
    );
    state
        .notifier
        .notify_user(
            ticket.customer_id,
            NotificationCategory::TicketCalled,
            &ticket_context(&ticket, &queue),
            Some((RelatedKind::Ticket, ticket.id)),
            now,
        )
        .await;
    Ok(ticket)
}

pub async fn start(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
    let ticket = staff_ticket(state, actor, id).await?;
    transition(state, ticket, TicketStatus::Serving, now, |t| {
        t.service_started_at = Some(now);
        t.serving_agent_id = Some(actor.id);
    })
    .await
}

pub async fn complete(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
    let ticket = staff_ticket(state, actor, id).await?;
    let ticket = transition(state, ticket, TicketStatus::Served, now, |t| {
        let began = t.service_started_at.or(t.called_at).unwrap_or(t.created_at);
        t.service_ended_at = Some(now);
        t.service_time_minutes = Some(minutes_between(began, now));
    })
    .await?;
    state
        .store
        .queues
        .record_served(ticket.queue_id, today(now), now)
        .await?;

    let queue = queues::get(state, ticket.queue_id).await?;
    state
        .notifier
        .notify_user(
            ticket.customer_id,
            NotificationCategory::TicketCompleted,
            &ticket_context(&ticket, &queue),
            Some((RelatedKind::Ticket, ticket.id)),
            now,
        )
        .await;
    Ok(ticket)
}

pub async fn no_show(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
    let ticket = staff_ticket(state, actor, id).await?;
    transition(state, ticket, TicketStatus::NoShow, now, |_| {}).await
}

/// The owner or staff of the organization may cancel.
pub async fn cancel(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Ticket> {
    let ticket = get_ticket(state, id).await?;
    ensure_can_see(actor, &ticket)?;
    let ticket = transition(state, ticket, TicketStatus::Cancelled, now, |_| {}).await?;

    let queue = queues::get(state, ticket.queue_id).await?;
    state
        .notifier
        .notify_user(
            ticket.customer_id,
            NotificationCategory::TicketCancelled,
            &ticket_context(&ticket, &queue),
            Some((RelatedKind::Ticket, ticket.id)),
            now,
        )
        .await;
    Ok(ticket)
}

/// Moves a customer to another queue of the same organization. The old
/// ticket ends as `transferred` and points at the new one.
pub async fn transfer(
    state: &AppState,
    actor: &User,
    id: Uuid,
    request: TransferRequest,
    now: DateTime<Utc>,
) -> AppResult<Ticket> {
    let ticket = staff_ticket(state, actor, id).await?;
    ticket.status.ensure_transition(TicketStatus::Transferred)?;
    if request.queue_id == ticket.queue_id {
        return Err(AppError::validation("The target queue is the ticket's current queue"));
    }
    let target = queues::get(state, request.queue_id).await?;
    if target.organization_id != ticket.organization_id {
        return Err(AppError::validation(
            "Tickets can only move between queues of the same organization",
        ));
    }
    if !target.is_open() {
        return Err(AppError::validation("The target queue is closed"));
    }
    if let Some(existing) = state
        .store
        .tickets
        .find_active(target.id, ticket.customer_id)
        .await?
    {
        return Err(AppError::validation(format!(
            "The customer already has an active ticket in the target queue: {}",
            existing.ticket_number
        )));
    }
    let service = catalog::get_service(state, target.service_id).await?;

    let day = today(now);
    let sequence = state
        .store
        .queues
        .allocate_ticket_number(target.id, day, now)
        .await?;
    let moved = Ticket {
        id: Uuid::new_v4(),
        ticket_number: format_ticket_number(service.ticket_prefix(), sequence),
        sequence,
        issued_on: day,
        queue_id: target.id,
        service_id: service.id,
        status: TicketStatus::Waiting,
        serving_agent_id: None,
        transferred_to: None,
        created_at: now,
        called_at: None,
        service_started_at: None,
        service_ended_at: None,
        expires_at: now + Duration::minutes(i64::from(target.ticket_expiry_time)),
        wait_time_minutes: None,
        service_time_minutes: None,
        call_count: 0,
        updated_at: now,
        ..ticket.clone()
    };
    state.store.tickets.insert(&moved).await?;

    let expected = ticket.status;
    let mut old = ticket;
    old.status = TicketStatus::Transferred;
    old.transferred_to = Some(moved.id);
    old.updated_at = now;
    if !state.store.tickets.update(&old, expected).await? {
        let mut orphan = moved;
        orphan.status = TicketStatus::Cancelled;
        orphan.updated_at = now;
        state
            .store
            .tickets
            .update(&orphan, TicketStatus::Waiting)
            .await?;
        return Err(stale());
    }
    state.store.services.record_ticket_issued(service.id).await?;
    info!(from = %old.id, to = %moved.id, queue_id = %target.id, "Ticket transferred");

    announce_status(state, &old).await;
    queues::publish_update(state, &target).await;
    Ok(moved)
}

/// Customers see their own tickets, staff their organization's.
pub async fn list(
    state: &AppState,
    actor: &User,
    mut filter: TicketFilter,
    page: PageRequest,
) -> AppResult<Listing<TicketView>> {
    if actor.role == UserRole::Customer {
        filter.customer_id = Some(actor.id);
    } else {
        filter.organization_id = staff_scope(actor)?.or(filter.organization_id);
    }
    let listing = state.store.tickets.list(&filter, page).await?;
    Ok(Listing {
        items: views(state, listing.items).await?,
        total: listing.total,
    })
}

pub async fn get(state: &AppState, actor: &User, id: Uuid) -> AppResult<TicketView> {
    let ticket = get_ticket(state, id).await?;
    ensure_can_see(actor, &ticket)?;
    view(state, ticket).await
}

pub async fn mine_active(state: &AppState, actor: &User) -> AppResult<Vec<TicketView>> {
    let filter = TicketFilter {
        customer_id: Some(actor.id),
        statuses: TicketStatus::ACTIVE.to_vec(),
        ..Default::default()
    };
    let tickets = state
        .store
        .tickets
        .list(&filter, PageRequest::everything())
        .await?
        .items;
    views(state, tickets).await
}

/// Expires overdue waiting tickets and refreshes the affected queues.
pub async fn expire_overdue(state: &AppState, now: DateTime<Utc>) -> AppResult<Vec<Ticket>> {
    let expired = state.store.tickets.expire_overdue(now).await?;
    let mut refreshed = Vec::new();
    for ticket in &expired {
        state.hub.publish(
            Channel::User(ticket.customer_id),
            Event::TicketStatus {
                ticket_id: ticket.id,
                status: ticket.status,
            },
        );
        if !refreshed.contains(&ticket.queue_id) {
            refreshed.push(ticket.queue_id);
        }
    }
    for queue_id in refreshed {
        if let Some(queue) = state.store.queues.get(queue_id).await? {
            queues::publish_update(state, &queue).await;
        }
    }
    if !expired.is_empty() {
        info!(count = expired.len(), "Expired overdue tickets");
    }
    Ok(expired)
}

pub async fn expire_overdue_as(state: &AppState, actor: &User, now: DateTime<Utc>) -> AppResult<Vec<Ticket>> {
    require_admin(actor)?;
    expire_overdue(state, now).await
}

/// Runs the expiry sweep on a fixed interval; disabled when the interval is 0.
pub fn spawn_expiry_sweep(state: AppState) -> Option<JoinHandle<()>> {
    let secs = state.config.expiry_sweep_interval_secs;
    if secs == 0 {
        return None;
    }
    info!(interval_secs = secs, "Starting ticket expiry sweep");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = expire_overdue(&state, Utc::now()).await {
                error!(error = %e, "Ticket expiry sweep failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{ProcessingStrategy, QueueStatus, Service};
    use crate::store::{Store, StoreError};

    struct Fixture {
        state: AppState,
        staff: User,
        queue: Queue,
        service: Service,
    }

    fn person(email: &str, role: UserRole, org: Option<Uuid>) -> User {
        let mut user = User::new(
            email.into(),
            String::new(),
            "Cheikh".into(),
            "Mbaye".into(),
            role,
            Utc::now(),
        );
        user.organization_id = org;
        user
    }

    async fn customer(state: &AppState, email: &str) -> User {
        let user = person(email, UserRole::Customer, None);
        state.store.users.insert(&user).await.unwrap();
        user
    }

    async fn fixture(strategy: ProcessingStrategy) -> Fixture {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let now = Utc::now();
        let org = Uuid::new_v4();
        let service = Service::new(org, "Dépôt".into(), "D".into(), now);
        state.store.services.insert(&service).await.unwrap();
        let mut queue = Queue::new(service.id, org, "Dépôts".into(), now);
        queue.current_status = QueueStatus::Active;
        queue.processing_strategy = strategy;
        state.store.queues.insert(&queue).await.unwrap();
        let staff = person("agent@bank.sn", UserRole::Staff, Some(org));
        state.store.users.insert(&staff).await.unwrap();
        Fixture {
            state,
            staff,
            queue,
            service,
        }
    }

    #[tokio::test]
    async fn test_numbers_and_positions() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let first = customer(&f.state, "a@example.sn").await;
        let second = customer(&f.state, "b@example.sn").await;

        let a = take_ticket(&f.state, &first, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();
        let b = take_ticket(&f.state, &second, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();
        assert_eq!(a.ticket.ticket_number, "D001");
        assert_eq!(b.ticket.ticket_number, "D002");
        assert_eq!(b.position, Some(2));
        assert_eq!(b.estimated_wait_minutes, Some(i64::from(f.service.estimated_duration)));

        let service = f.state.store.services.get(f.service.id).await.unwrap().unwrap();
        assert_eq!(service.total_tickets_issued, 2);
    }

    #[tokio::test]
    async fn test_one_active_ticket_per_queue() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let user = customer(&f.state, "a@example.sn").await;
        take_ticket(&f.state, &user, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();
        let err = take_ticket(&f.state, &user, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("D001"));
    }

    #[tokio::test]
    async fn test_closed_and_full_queues_refuse_tickets() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let mut queue = f.queue.clone();
        queue.max_capacity = 1;
        f.state.store.queues.update(&queue).await.unwrap();

        let a = customer(&f.state, "a@example.sn").await;
        let b = customer(&f.state, "b@example.sn").await;
        take_ticket(&f.state, &a, queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();
        let full = take_ticket(&f.state, &b, queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap_err();
        assert!(full.to_string().contains("full"));

        queue.current_status = QueueStatus::Paused;
        f.state.store.queues.update(&queue).await.unwrap();
        let closed = take_ticket(&f.state, &b, queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap_err();
        assert!(closed.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_customers_cannot_raise_priority() {
        let f = fixture(ProcessingStrategy::Priority).await;
        let user = customer(&f.state, "a@example.sn").await;
        let request = TakeTicketRequest {
            priority: Some(Priority::Urgent),
            ..Default::default()
        };
        let view = take_ticket(&f.state, &user, f.queue.id, request, Utc::now())
            .await
            .unwrap();
        assert_eq!(view.ticket.priority, f.service.default_priority);
    }

    #[tokio::test]
    async fn test_call_next_follows_priority_strategy() {
        let f = fixture(ProcessingStrategy::Priority).await;
        let now = Utc::now();
        let early = customer(&f.state, "early@example.sn").await;
        take_ticket(&f.state, &early, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();

        // Staff issue an urgent ticket a minute later.
        let urgent = take_ticket(
            &f.state,
            &f.staff,
            f.queue.id,
            TakeTicketRequest {
                priority: Some(Priority::Urgent),
                ..Default::default()
            },
            now + Duration::minutes(1),
        )
        .await
        .unwrap();

        let called = call_next(&f.state, &f.staff, f.queue.id, now + Duration::minutes(4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(called.id, urgent.ticket.id);
        assert_eq!(called.status, TicketStatus::Called);
        assert_eq!(called.call_count, 1);
        assert_eq!(called.wait_time_minutes, Some(3));

        let queue = f.state.store.queues.get(f.queue.id).await.unwrap().unwrap();
        assert_eq!(queue.current_ticket_number, called.sequence);
    }

    #[tokio::test]
    async fn test_call_next_on_empty_queue() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        assert!(call_next(&f.state, &f.staff, f.queue.id, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_full_service_cycle() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let user = customer(&f.state, "a@example.sn").await;
        let taken = take_ticket(&f.state, &user, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();

        // Serving before being called is refused.
        let err = start(&f.state, &f.staff, taken.ticket.id, now).await.unwrap_err();
        assert!(err.to_string().contains("'waiting'"));

        call_next(&f.state, &f.staff, f.queue.id, now + Duration::minutes(2))
            .await
            .unwrap();
        start(&f.state, &f.staff, taken.ticket.id, now + Duration::minutes(3))
            .await
            .unwrap();
        let done = complete(&f.state, &f.staff, taken.ticket.id, now + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(done.status, TicketStatus::Served);
        assert_eq!(done.service_time_minutes, Some(7));

        let queue = f.state.store.queues.get(f.queue.id).await.unwrap().unwrap();
        assert_eq!(queue.daily_tickets_served, 1);

        let again = cancel(&f.state, &user, taken.ticket.id, now).await;
        assert!(matches!(again, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_strangers_cannot_cancel() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let owner = customer(&f.state, "a@example.sn").await;
        let stranger = customer(&f.state, "b@example.sn").await;
        let taken = take_ticket(&f.state, &owner, f.queue.id, TakeTicketRequest::default(), Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            cancel(&f.state, &stranger, taken.ticket.id, Utc::now()).await,
            Err(AppError::Forbidden(_))
        ));
        let cancelled = cancel(&f.state, &owner, taken.ticket.id, Utc::now()).await.unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_transfer_issues_new_ticket() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let other_service = Service::new(f.queue.organization_id, "Change".into(), "X".into(), now);
        f.state.store.services.insert(&other_service).await.unwrap();
        let mut target = Queue::new(other_service.id, f.queue.organization_id, "Change".into(), now);
        target.current_status = QueueStatus::Active;
        f.state.store.queues.insert(&target).await.unwrap();

        let user = customer(&f.state, "a@example.sn").await;
        let taken = take_ticket(&f.state, &user, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();
        let moved = transfer(
            &f.state,
            &f.staff,
            taken.ticket.id,
            TransferRequest { queue_id: target.id },
            now,
        )
        .await
        .unwrap();
        assert_eq!(moved.ticket_number, "X001");
        assert_eq!(moved.customer_id, user.id);
        assert_eq!(moved.status, TicketStatus::Waiting);

        let old = f.state.store.tickets.get(taken.ticket.id).await.unwrap().unwrap();
        assert_eq!(old.status, TicketStatus::Transferred);
        assert_eq!(old.transferred_to, Some(moved.id));

        let same = transfer(
            &f.state,
            &f.staff,
            moved.id,
            TransferRequest { queue_id: target.id },
            now,
        )
        .await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn test_transfer_refuses_second_active_ticket() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let other_service = Service::new(f.queue.organization_id, "Change".into(), "X".into(), now);
        f.state.store.services.insert(&other_service).await.unwrap();
        let mut target = Queue::new(other_service.id, f.queue.organization_id, "Change".into(), now);
        target.current_status = QueueStatus::Active;
        f.state.store.queues.insert(&target).await.unwrap();

        let user = customer(&f.state, "a@example.sn").await;
        let here = take_ticket(&f.state, &user, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();
        take_ticket(&f.state, &user, target.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();

        let err = transfer(
            &f.state,
            &f.staff,
            here.ticket.id,
            TransferRequest { queue_id: target.id },
            now,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(ref msg) if msg.contains("X001")));

        let kept = f.state.store.tickets.get(here.ticket.id).await.unwrap().unwrap();
        assert_eq!(kept.status, TicketStatus::Waiting);
        let filter = TicketFilter {
            queue_id: Some(target.id),
            customer_id: Some(user.id),
            statuses: TicketStatus::ACTIVE.to_vec(),
            ..Default::default()
        };
        let active = f
            .state
            .store
            .tickets
            .list(&filter, PageRequest::everything())
            .await
            .unwrap();
        assert_eq!(active.total, 1);
    }

    #[tokio::test]
    async fn test_store_rejects_duplicate_active_ticket() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let user = customer(&f.state, "a@example.sn").await;
        let taken = take_ticket(&f.state, &user, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();

        // A second insert that skipped the lookup, as a concurrent request would.
        let twin = Ticket {
            id: Uuid::new_v4(),
            sequence: taken.ticket.sequence + 1,
            ticket_number: "D002".into(),
            ..taken.ticket.clone()
        };
        let err = f.state.store.tickets.insert(&twin).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref msg) if msg.contains("active ticket")));

        // Once the first ticket is finished the customer may queue again.
        cancel(&f.state, &user, taken.ticket.id, now).await.unwrap();
        f.state.store.tickets.insert(&twin).await.unwrap();
    }

    #[tokio::test]
    async fn test_expiry_sweep() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let user = customer(&f.state, "a@example.sn").await;
        let taken = take_ticket(&f.state, &user, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();

        assert!(expire_overdue(&f.state, now).await.unwrap().is_empty());
        let later = now + Duration::minutes(i64::from(f.queue.ticket_expiry_time) + 1);
        let expired = expire_overdue(&f.state, later).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, taken.ticket.id);
        assert_eq!(expired[0].status, TicketStatus::Expired);
        assert!(spawn_expiry_sweep(f.state.clone()).is_none());
    }

    #[tokio::test]
    async fn test_listing_is_scoped() {
        let f = fixture(ProcessingStrategy::Fifo).await;
        let now = Utc::now();
        let a = customer(&f.state, "a@example.sn").await;
        let b = customer(&f.state, "b@example.sn").await;
        take_ticket(&f.state, &a, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();
        take_ticket(&f.state, &b, f.queue.id, TakeTicketRequest::default(), now)
            .await
            .unwrap();

        let own = list(&f.state, &a, TicketFilter::default(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(own.total, 1);
        let all = list(&f.state, &f.staff, TicketFilter::default(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(all.total, 2);

        let outsider = person("other@bank.sn", UserRole::Staff, Some(Uuid::new_v4()));
        let none = list(&f.state, &outsider, TicketFilter::default(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }
}

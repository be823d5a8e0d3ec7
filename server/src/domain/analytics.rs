//! Customer ratings and the figures behind the staff dashboards.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::staff_scope;
use crate::domain::{queues, start_of_day, today};
use crate::models::satisfaction::SatisfactionStats;
use crate::models::{
    AppointmentStatus, CustomerSatisfaction, PaymentStatus, Ticket, TicketStatus, User, UserRole,
};
use crate::state::AppState;
use crate::store::{
    AppointmentFilter, Listing, OrganizationFilter, PaymentFilter, QueueFilter, SatisfactionFilter,
    TicketFilter,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

const TOP_SERVICES: usize = 5;
const TREND_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub ticket_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SatisfactionQuery {
    pub service_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub organization: Option<Uuid>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TicketsToday {
    pub total: usize,
    pub served: usize,
    pub waiting: usize,
    pub cancelled: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Evolution {
    pub yesterday: usize,
    pub change: i64,
    pub change_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct AppointmentsToday {
    pub total: usize,
    pub completed: usize,
    pub confirmed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TopService {
    pub service_id: Uuid,
    pub name: String,
    pub tickets: usize,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub date: NaiveDate,
    pub organizations_count: i64,
    pub tickets_today: TicketsToday,
    pub tickets_evolution: Evolution,
    pub appointments_today: AppointmentsToday,
    pub avg_wait_minutes: Option<f64>,
    pub avg_service_minutes: Option<f64>,
    pub avg_satisfaction: Option<f64>,
    pub active_queues: usize,
    pub daily_revenue: Decimal,
    pub top_services: Vec<TopService>,
    pub peak_hour: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RealtimeQueue {
    pub id: Uuid,
    pub name: String,
    pub waiting: usize,
    pub current_ticket_number: i32,
    pub estimated_wait_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct QueueAnalytics {
    pub queue_id: Uuid,
    pub date: NaiveDate,
    pub issued: usize,
    pub served: usize,
    pub cancelled: usize,
    pub no_show: usize,
    pub avg_wait_minutes: Option<f64>,
    pub avg_service_minutes: Option<f64>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mean(values: impl IntoIterator<Item = i32>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), v| (sum + i64::from(v), count + 1));
    (count > 0).then(|| round1(sum as f64 / count as f64))
}

fn count_status(tickets: &[Ticket], status: TicketStatus) -> usize {
    tickets.iter().filter(|t| t.status == status).count()
}

/// Mean wait of the tickets called since `since`.
fn avg_wait(tickets: &[Ticket], since: DateTime<Utc>) -> Option<f64> {
    mean(
        tickets
            .iter()
            .filter(|t| t.called_at.is_some_and(|at| at >= since))
            .filter_map(|t| t.wait_time_minutes),
    )
}

/// Mean service time of the tickets finished since `since`.
fn avg_service(tickets: &[Ticket], since: DateTime<Utc>) -> Option<f64> {
    mean(
        tickets
            .iter()
            .filter(|t| t.service_ended_at.is_some_and(|at| at >= since))
            .filter_map(|t| t.service_time_minutes),
    )
}

fn evolution(today: usize, yesterday: usize) -> Evolution {
    let change = today as i64 - yesterday as i64;
    let change_percent = if yesterday == 0 {
        0.0
    } else {
        round1(change as f64 * 100.0 / yesterday as f64)
    };
    Evolution {
        yesterday,
        change,
        change_percent,
    }
}

/// The hour of day that saw the most tickets; ties go to the earliest hour.
fn peak_hour(tickets: &[Ticket]) -> Option<u32> {
    let mut per_hour = [0usize; 24];
    for ticket in tickets {
        per_hour[ticket.created_at.hour() as usize] += 1;
    }
    let (hour, count) = per_hour
        .iter()
        .enumerate()
        .max_by(|(ha, a), (hb, b)| a.cmp(b).then(hb.cmp(ha)))?;
    (*count > 0).then_some(hour as u32)
}

/// Ticket counts per service, busiest first.
fn busiest_services(tickets: &[Ticket]) -> Vec<(Uuid, usize)> {
    let mut counts: HashMap<Uuid, usize> = HashMap::new();
    for ticket in tickets {
        *counts.entry(ticket.service_id).or_default() += 1;
    }
    let mut ranked: Vec<(Uuid, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(TOP_SERVICES);
    ranked
}

async fn tickets_since(
    state: &AppState,
    organization_id: Option<Uuid>,
    queue_id: Option<Uuid>,
    since: DateTime<Utc>,
) -> AppResult<Vec<Ticket>> {
    let filter = TicketFilter {
        organization_id,
        queue_id,
        created_since: Some(since),
        ..Default::default()
    };
    Ok(state
        .store
        .tickets
        .list(&filter, PageRequest::everything())
        .await?
        .items)
}

pub async fn rate(
    state: &AppState,
    actor: &User,
    request: RatingRequest,
    now: DateTime<Utc>,
) -> AppResult<CustomerSatisfaction> {
    validation::in_range("rating", request.rating, 1, 5)?;
    let comment = request.comment.unwrap_or_default();
    validation::max_len("comment", &comment, 1000)?;

    let (organization_id, service_id) = match (request.ticket_id, request.appointment_id) {
        (Some(ticket_id), None) => {
            let ticket = state
                .store
                .tickets
                .get(ticket_id)
                .await?
                .ok_or_else(|| AppError::not_found("Ticket", ticket_id))?;
            if ticket.customer_id != actor.id {
                return Err(AppError::forbidden("You can only rate your own tickets"));
            }
            if ticket.status != TicketStatus::Served {
                return Err(AppError::validation("Only served tickets can be rated"));
            }
            (ticket.organization_id, ticket.service_id)
        }
        (None, Some(appointment_id)) => {
            let appointment = state
                .store
                .appointments
                .get(appointment_id)
                .await?
                .ok_or_else(|| AppError::not_found("Appointment", appointment_id))?;
            if appointment.customer_id != actor.id {
                return Err(AppError::forbidden("You can only rate your own appointments"));
            }
            if appointment.status != AppointmentStatus::Completed {
                return Err(AppError::validation("Only completed appointments can be rated"));
            }
            (appointment.organization_id, appointment.service_id)
        }
        _ => {
            return Err(AppError::validation(
                "Provide exactly one of ticket_id or appointment_id",
            ))
        }
    };

    let rating = CustomerSatisfaction {
        id: Uuid::new_v4(),
        customer_id: actor.id,
        organization_id,
        service_id,
        ticket_id: request.ticket_id,
        appointment_id: request.appointment_id,
        rating: request.rating,
        comment,
        created_at: now,
    };
    state.store.satisfaction.insert(&rating).await?;
    let service = state
        .store
        .services
        .record_rating(service_id, rating.rating, now)
        .await?;
    info!(service_id = %service.id, rating = rating.rating, average = %service.average_rating, "Rating recorded");
    Ok(rating)
}

fn satisfaction_filter(actor: &User, query: SatisfactionQuery) -> AppResult<SatisfactionFilter> {
    let mut filter = SatisfactionFilter {
        service_id: query.service_id,
        ..Default::default()
    };
    if actor.role == UserRole::Customer {
        filter.customer_id = Some(actor.id);
    } else {
        filter.organization_id = staff_scope(actor)?;
    }
    Ok(filter)
}

pub async fn list_ratings(
    state: &AppState,
    actor: &User,
    query: SatisfactionQuery,
    page: PageRequest,
) -> AppResult<Listing<CustomerSatisfaction>> {
    let filter = satisfaction_filter(actor, query)?;
    Ok(state.store.satisfaction.list(&filter, page).await?)
}

pub async fn rating_stats(
    state: &AppState,
    actor: &User,
    query: SatisfactionQuery,
) -> AppResult<SatisfactionStats> {
    let filter = satisfaction_filter(actor, query)?;
    let ratings = state
        .store
        .satisfaction
        .list(&filter, PageRequest::everything())
        .await?;
    Ok(SatisfactionStats::from_ratings(&ratings.items))
}

pub async fn dashboard(
    state: &AppState,
    actor: &User,
    query: DashboardQuery,
    now: DateTime<Utc>,
) -> AppResult<Dashboard> {
    let organization_id = staff_scope(actor)?.or(query.organization);
    let day = today(now);
    let day_start = start_of_day(day);
    let yesterday_start = day_start - Duration::days(1);
    let trend_start = now - Duration::days(TREND_DAYS);

    let organizations_count = match organization_id {
        Some(_) => 1,
        None => {
            state
                .store
                .organizations
                .list(&OrganizationFilter::default(), PageRequest::first(1))
                .await?
                .total
        }
    };

    let recent = tickets_since(state, organization_id, None, yesterday_start.min(trend_start)).await?;
    let todays: Vec<Ticket> = recent
        .iter()
        .filter(|t| t.created_at >= day_start)
        .cloned()
        .collect();
    let yesterdays = recent
        .iter()
        .filter(|t| t.created_at >= yesterday_start && t.created_at < day_start)
        .count();
    let trend: Vec<Ticket> = recent
        .iter()
        .filter(|t| t.created_at >= trend_start)
        .cloned()
        .collect();

    let appointments = state
        .store
        .appointments
        .list(
            &AppointmentFilter {
                organization_id,
                date: Some(day),
                ..Default::default()
            },
            PageRequest::everything(),
        )
        .await?
        .items;
    let count_appointments =
        |status: AppointmentStatus| appointments.iter().filter(|a| a.status == status).count();

    let ratings = state
        .store
        .satisfaction
        .list(
            &SatisfactionFilter {
                organization_id,
                created_since: Some(day_start),
                ..Default::default()
            },
            PageRequest::everything(),
        )
        .await?;

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

    let daily_revenue = state
        .store
        .payments
        .list(
            &PaymentFilter {
                organization_id,
                status: Some(PaymentStatus::Completed),
                completed_since: Some(day_start),
                ..Default::default()
            },
            PageRequest::everything(),
        )
        .await?
        .items
        .iter()
        .map(|p| p.amount)
        .sum();

    let mut top_services = Vec::new();
    for (service_id, tickets) in busiest_services(&trend) {
        let name = state
            .store
            .services
            .get(service_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_default();
        top_services.push(TopService {
            service_id,
            name,
            tickets,
        });
    }

    Ok(Dashboard {
        date: day,
        organizations_count,
        tickets_today: TicketsToday {
            total: todays.len(),
            served: count_status(&todays, TicketStatus::Served),
            waiting: count_status(&todays, TicketStatus::Waiting),
            cancelled: count_status(&todays, TicketStatus::Cancelled),
        },
        tickets_evolution: evolution(todays.len(), yesterdays),
        appointments_today: AppointmentsToday {
            total: appointments.len(),
            completed: count_appointments(AppointmentStatus::Completed),
            confirmed: count_appointments(AppointmentStatus::Confirmed),
            cancelled: count_appointments(AppointmentStatus::Cancelled),
        },
        avg_wait_minutes: avg_wait(&recent, day_start),
        avg_service_minutes: avg_service(&recent, day_start),
        avg_satisfaction: SatisfactionStats::from_ratings(&ratings.items).average,
        active_queues: queues.items.iter().filter(|q| q.is_open()).count(),
        daily_revenue,
        top_services,
        peak_hour: peak_hour(&trend),
    })
}

/// Live figures for every open queue in the caller's scope.
pub async fn realtime(state: &AppState, actor: &User) -> AppResult<Vec<RealtimeQueue>> {
    let queues = state
        .store
        .queues
        .list(
            &QueueFilter {
                organization_id: staff_scope(actor)?,
                ..Default::default()
            },
            PageRequest::everything(),
        )
        .await?;
    let mut result = Vec::new();
    for queue in queues.items.into_iter().filter(|q| q.is_open()) {
        let view = queues::view(state, queue).await?;
        result.push(RealtimeQueue {
            id: view.queue.id,
            name: view.queue.name,
            waiting: view.waiting_count,
            current_ticket_number: view.queue.current_ticket_number,
            estimated_wait_minutes: view.estimated_wait_minutes,
        });
    }
    Ok(result)
}

pub async fn queue_analytics(
    state: &AppState,
    actor: &User,
    id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<QueueAnalytics> {
    let queue = queues::managed_queue(state, actor, id).await?;
    let day = today(now);
    let since = start_of_day(day);
    let tickets = tickets_since(state, None, Some(queue.id), since).await?;
    Ok(QueueAnalytics {
        queue_id: queue.id,
        date: day,
        issued: tickets.len(),
        served: count_status(&tickets, TicketStatus::Served),
        cancelled: count_status(&tickets, TicketStatus::Cancelled),
        no_show: count_status(&tickets, TicketStatus::NoShow),
        avg_wait_minutes: avg_wait(&tickets, since),
        avg_service_minutes: avg_service(&tickets, since),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::tickets::{self, TakeTicketRequest};
    use crate::models::{Queue, QueueStatus, Service};
    use crate::store::Store;
    use chrono::TimeZone;

    fn ticket_at(hour: u32, service_id: Uuid) -> Ticket {
        let created = Utc.with_ymd_and_hms(2024, 3, 4, hour, 15, 0).unwrap();
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: "A001".into(),
            sequence: 1,
            issued_on: created.date_naive(),
            queue_id: Uuid::nil(),
            service_id,
            organization_id: Uuid::nil(),
            customer_id: Uuid::new_v4(),
            priority: Default::default(),
            creation_channel: Default::default(),
            customer_notes: String::new(),
            documents_brought: Vec::new(),
            status: TicketStatus::Waiting,
            serving_agent_id: None,
            transferred_to: None,
            created_at: created,
            called_at: None,
            service_started_at: None,
            service_ended_at: None,
            expires_at: created + Duration::minutes(30),
            wait_time_minutes: None,
            service_time_minutes: None,
            call_count: 0,
            updated_at: created,
        }
    }

    #[test]
    fn test_evolution_without_yesterday() {
        assert_eq!(
            evolution(4, 0),
            Evolution {
                yesterday: 0,
                change: 4,
                change_percent: 0.0
            }
        );
        assert_eq!(evolution(3, 4).change_percent, -25.0);
    }

    #[test]
    fn test_peak_hour_and_top_services() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let tickets = vec![
            ticket_at(9, a),
            ticket_at(10, a),
            ticket_at(10, b),
            ticket_at(11, a),
        ];
        assert_eq!(peak_hour(&tickets), Some(10));
        assert_eq!(peak_hour(&[]), None);
        assert_eq!(busiest_services(&tickets), vec![(a, 3), (b, 1)]);
    }

    #[test]
    fn test_mean_rounds_to_one_decimal() {
        assert_eq!(mean([10, 11, 11]), Some(10.7));
        assert_eq!(mean(Vec::new()), None);
    }

    #[tokio::test]
    async fn test_rating_a_served_ticket() {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let now = Utc::now();
        let org = Uuid::new_v4();
        let service = Service::new(org, "Guichet".into(), "G".into(), now);
        state.store.services.insert(&service).await.unwrap();
        let mut queue = Queue::new(service.id, org, "Principal".into(), now);
        queue.current_status = QueueStatus::Active;
        state.store.queues.insert(&queue).await.unwrap();

        let customer = User::new(
            "client@example.sn".into(),
            String::new(),
            "Ndeye".into(),
            "Diop".into(),
            UserRole::Customer,
            now,
        );
        state.store.users.insert(&customer).await.unwrap();
        let mut agent = customer.clone();
        agent.id = Uuid::new_v4();
        agent.role = UserRole::Staff;
        agent.organization_id = Some(org);

        let taken = tickets::take_ticket(
            &state,
            &customer,
            queue.id,
            TakeTicketRequest::default(),
            now,
        )
        .await
        .unwrap();
        let request = |rating| RatingRequest {
            ticket_id: Some(taken.ticket.id),
            appointment_id: None,
            rating,
            comment: None,
        };
        // Not served yet.
        assert!(rate(&state, &customer, request(5), now).await.is_err());

        tickets::call_next(&state, &agent, queue.id, now).await.unwrap();
        tickets::complete(&state, &agent, taken.ticket.id, now).await.unwrap();

        assert!(rate(&state, &customer, request(6), now).await.is_err());
        rate(&state, &customer, request(4), now).await.unwrap();
        let twice = rate(&state, &customer, request(5), now).await;
        assert!(matches!(twice, Err(AppError::Conflict(_))));

        let stored = state.store.services.get(service.id).await.unwrap().unwrap();
        assert_eq!(stored.total_ratings, 1);

        let stats = rating_stats(&state, &agent, SatisfactionQuery::default())
            .await
            .unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.average, Some(4.0));

        let analytics = queue_analytics(&state, &agent, queue.id, now).await.unwrap();
        assert_eq!(analytics.issued, 1);
        assert_eq!(analytics.served, 1);
    }
}

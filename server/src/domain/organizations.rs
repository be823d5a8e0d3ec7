use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{ensure_manages, require_admin, require_super_admin};
use crate::domain::today;
use crate::models::{
    Language, Organization, OrganizationStatus, OrganizationType, Region, SoftDelete,
    SubscriptionPlan, TicketStatus, User,
};
use crate::state::AppState;
use crate::store::{Listing, OrganizationFilter, QueueFilter, ServiceFilter, TicketFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

pub const DEFAULT_RADIUS_KM: f64 = 10.0;
const DEFAULT_TIMEZONE: &str = "Africa/Dakar";

/// Create and update body; create requires the identifying fields.
#[derive(Debug, Default, Deserialize)]
pub struct OrganizationPayload {
    pub name: Option<String>,
    pub trade_name: Option<String>,
    pub org_type: Option<OrganizationType>,
    pub description: Option<String>,
    pub registration_number: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<Region>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub status: Option<OrganizationStatus>,
    pub max_counters: Option<i32>,
    pub max_staff_users: Option<i32>,
    pub timezone: Option<String>,
    pub default_language: Option<Language>,
    pub opening_hours: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct NearbyOrganization {
    #[serde(flatten)]
    pub organization: Organization,
    pub distance_km: f64,
}

#[derive(Debug, Serialize)]
pub struct OrganizationStats {
    pub organization_id: Uuid,
    pub services_count: i64,
    pub active_queues: usize,
    pub tickets_waiting: i64,
    pub tickets_today: i64,
}

fn required<T>(field: &str, value: Option<T>) -> AppResult<T> {
    value.ok_or_else(|| AppError::validation(format!("{field} is required")))
}

fn apply(organization: &mut Organization, payload: OrganizationPayload) -> AppResult<()> {
    if let Some(name) = payload.name {
        organization.name = name.trim().to_string();
    }
    if let Some(trade_name) = payload.trade_name {
        organization.trade_name = trade_name.trim().to_string();
    }
    if let Some(org_type) = payload.org_type {
        organization.org_type = org_type;
    }
    if let Some(description) = payload.description {
        organization.description = description;
    }
    if let Some(number) = payload.registration_number {
        organization.registration_number = number.trim().to_string();
    }
    if let Some(phone) = payload.phone_number {
        organization.phone_number = phone.trim().to_string();
    }
    if let Some(email) = payload.email {
        organization.email = match email.trim() {
            "" => String::new(),
            email => validation::email(email)?,
        };
    }
    if let Some(website) = payload.website {
        organization.website = website.trim().to_string();
    }
    if let Some(address) = payload.address {
        organization.address = address;
    }
    if let Some(city) = payload.city {
        organization.city = city.trim().to_string();
    }
    if let Some(region) = payload.region {
        organization.region = region;
    }
    if payload.latitude.is_some() || payload.longitude.is_some() {
        validation::coordinates(payload.latitude, payload.longitude)?;
        organization.latitude = payload.latitude;
        organization.longitude = payload.longitude;
    }
    if let Some(plan) = payload.subscription_plan {
        organization.subscription_plan = plan;
    }
    if let Some(status) = payload.status {
        organization.status = status;
    }
    if let Some(max) = payload.max_counters {
        validation::in_range("max_counters", max, 1, 1000)?;
        organization.max_counters = max;
    }
    if let Some(max) = payload.max_staff_users {
        validation::in_range("max_staff_users", max, 1, 10_000)?;
        organization.max_staff_users = max;
    }
    if let Some(timezone) = payload.timezone {
        organization.timezone = timezone;
    }
    if let Some(language) = payload.default_language {
        organization.default_language = language;
    }
    if let Some(hours) = payload.opening_hours {
        if !hours.is_object() {
            return Err(AppError::validation(
                "opening_hours must be an object keyed by weekday",
            ));
        }
        organization.opening_hours = hours;
    }

    validation::not_blank("name", &organization.name)?;
    validation::max_len("name", &organization.name, 200)?;
    validation::not_blank("city", &organization.city)?;
    validation::phone(&organization.phone_number)
}

pub async fn create(
    state: &AppState,
    actor: &User,
    payload: OrganizationPayload,
    now: DateTime<Utc>,
) -> AppResult<Organization> {
    require_admin(actor)?;
    let org_type = required("org_type", payload.org_type)?;
    let region = required("region", payload.region)?;

    let mut organization = Organization {
        id: Uuid::new_v4(),
        name: String::new(),
        trade_name: String::new(),
        org_type,
        description: String::new(),
        registration_number: String::new(),
        phone_number: String::new(),
        email: String::new(),
        website: String::new(),
        address: String::new(),
        city: String::new(),
        region,
        latitude: None,
        longitude: None,
        subscription_plan: SubscriptionPlan::default(),
        status: OrganizationStatus::default(),
        max_counters: 3,
        max_staff_users: 5,
        timezone: DEFAULT_TIMEZONE.to_string(),
        default_language: Language::default(),
        opening_hours: serde_json::json!({}),
        created_by: Some(actor.id),
        is_active: true,
        deactivated_at: None,
        created_at: now,
        updated_at: now,
    };
    apply(&mut organization, payload)?;
    state.store.organizations.insert(&organization).await?;
    info!(organization_id = %organization.id, created_by = %actor.id, "Organization created");
    Ok(organization)
}

pub async fn get(state: &AppState, id: Uuid) -> AppResult<Organization> {
    state
        .store
        .organizations
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization", id))
}

/// Inactive organizations are only visible to staff asking for them.
pub async fn get_visible(state: &AppState, actor: Option<&User>, id: Uuid) -> AppResult<Organization> {
    let organization = get(state, id).await?;
    let staff = actor.is_some_and(|user| user.role.is_staff());
    if organization.is_active || staff {
        Ok(organization)
    } else {
        Err(AppError::not_found("Organization", id))
    }
}

pub async fn update(
    state: &AppState,
    actor: &User,
    id: Uuid,
    payload: OrganizationPayload,
    now: DateTime<Utc>,
) -> AppResult<Organization> {
    let mut organization = get(state, id).await?;
    ensure_manages(actor, organization.id)?;
    apply(&mut organization, payload)?;
    organization.updated_at = now;
    state.store.organizations.update(&organization).await?;
    Ok(organization)
}

pub async fn set_active(
    state: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> AppResult<Organization> {
    require_super_admin(actor)?;
    let mut organization = get(state, id).await?;
    if active {
        organization.reactivate(now);
    } else {
        organization.deactivate(now);
    }
    state.store.organizations.update(&organization).await?;
    info!(organization_id = %id, active, "Organization activation changed");
    Ok(organization)
}

pub async fn list(
    state: &AppState,
    actor: Option<&User>,
    mut filter: OrganizationFilter,
    page: PageRequest,
) -> AppResult<Listing<Organization>> {
    if !actor.is_some_and(|user| user.role.is_staff()) {
        filter.include_inactive = false;
    }
    Ok(state.store.organizations.list(&filter, page).await?)
}

/// Active organizations within the radius, nearest first.
pub async fn nearby(state: &AppState, query: NearbyQuery) -> AppResult<Vec<NearbyOrganization>> {
    validation::coordinates(Some(query.lat), Some(query.lng))?;
    let radius = query.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
    if radius.is_nan() || radius <= 0.0 {
        return Err(AppError::validation("radius_km must be positive"));
    }

    let candidates = state
        .store
        .organizations
        .list(&OrganizationFilter::default(), PageRequest::everything())
        .await?;
    let mut found: Vec<NearbyOrganization> = candidates
        .items
        .into_iter()
        .filter_map(|organization| {
            let distance = organization.distance_to(query.lat, query.lng)?;
            (distance <= radius).then(|| NearbyOrganization {
                organization,
                distance_km: (distance * 100.0).round() / 100.0,
            })
        })
        .collect();
    found.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(found)
}

pub async fn stats(
    state: &AppState,
    actor: &User,
    id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<OrganizationStats> {
    let organization = get(state, id).await?;
    ensure_manages(actor, organization.id)?;

    let services = state
        .store
        .services
        .list(
            &ServiceFilter {
                organization_id: Some(id),
                ..Default::default()
            },
            PageRequest::first(1),
        )
        .await?;
    let queues = state
        .store
        .queues
        .list(
            &QueueFilter {
                organization_id: Some(id),
                ..Default::default()
            },
            PageRequest::everything(),
        )
        .await?;
    let waiting = state
        .store
        .tickets
        .list(
            &TicketFilter {
                organization_id: Some(id),
                statuses: vec![TicketStatus::Waiting],
                ..Default::default()
            },
            PageRequest::first(1),
        )
        .await?;
    let issued_today = state
        .store
        .tickets
        .list(
            &TicketFilter {
                organization_id: Some(id),
                created_since: Some(super::start_of_day(today(now))),
                ..Default::default()
            },
            PageRequest::first(1),
        )
        .await?;

    Ok(OrganizationStats {
        organization_id: id,
        services_count: services.total,
        active_queues: queues.items.iter().filter(|queue| queue.is_open()).count(),
        tickets_waiting: waiting.total,
        tickets_today: issued_today.total,
    })
}

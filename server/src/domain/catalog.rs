//! Service categories and the services organizations offer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{ensure_manages, require_super_admin};
use crate::models::{Priority, Service, ServiceCategory, ServiceStatus, SoftDelete, User};
use crate::state::AppState;
use crate::store::{Listing, ServiceFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

#[derive(Debug, Default, Deserialize)]
pub struct CategoryPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServicePayload {
    pub organization_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub default_priority: Option<Priority>,
    pub estimated_duration: Option<i32>,
    pub max_wait_time: Option<i32>,
    pub cost: Option<Decimal>,
    pub allows_appointments: Option<bool>,
    pub requires_appointment: Option<bool>,
    pub min_appointment_notice: Option<i32>,
    pub max_appointment_advance: Option<i32>,
    pub required_documents: Option<Vec<String>>,
    pub optional_documents: Option<Vec<String>>,
    pub status: Option<ServiceStatus>,
    pub is_public: Option<bool>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub service: Service,
    pub is_available: bool,
}

impl From<Service> for ServiceView {
    fn from(service: Service) -> Self {
        Self {
            is_available: service.is_available(),
            service,
        }
    }
}

fn apply_category(category: &mut ServiceCategory, payload: CategoryPayload) -> AppResult<()> {
    if let Some(name) = payload.name {
        category.name = name.trim().to_string();
    }
    if let Some(description) = payload.description {
        category.description = description;
    }
    if let Some(icon) = payload.icon {
        validation::max_len("icon", &icon, 50)?;
        category.icon = icon;
    }
    if let Some(color) = payload.color {
        validation::hex_color(&color)?;
        category.color = color;
    }
    if let Some(order) = payload.display_order {
        category.display_order = order;
    }
    validation::not_blank("name", &category.name)?;
    validation::max_len("name", &category.name, 100)
}

pub async fn get_category(state: &AppState, id: Uuid) -> AppResult<ServiceCategory> {
    state
        .store
        .categories
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Service category", id))
}

pub async fn create_category(
    state: &AppState,
    actor: &User,
    payload: CategoryPayload,
    now: DateTime<Utc>,
) -> AppResult<ServiceCategory> {
    require_super_admin(actor)?;
    let mut category = ServiceCategory::new(String::new(), now);
    apply_category(&mut category, payload)?;
    state.store.categories.insert(&category).await?;
    Ok(category)
}

pub async fn update_category(
    state: &AppState,
    actor: &User,
    id: Uuid,
    payload: CategoryPayload,
    now: DateTime<Utc>,
) -> AppResult<ServiceCategory> {
    require_super_admin(actor)?;
    let mut category = get_category(state, id).await?;
    apply_category(&mut category, payload)?;
    category.updated_at = now;
    state.store.categories.update(&category).await?;
    Ok(category)
}

pub async fn set_category_active(
    state: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> AppResult<ServiceCategory> {
    require_super_admin(actor)?;
    let mut category = get_category(state, id).await?;
    if active {
        category.reactivate(now);
    } else {
        category.deactivate(now);
    }
    state.store.categories.update(&category).await?;
    Ok(category)
}

pub async fn list_categories(
    state: &AppState,
    actor: Option<&User>,
    include_inactive: bool,
    page: PageRequest,
) -> AppResult<Listing<ServiceCategory>> {
    let include_inactive = include_inactive && actor.is_some_and(|user| user.role.is_staff());
    Ok(state.store.categories.list(include_inactive, page).await?)
}

fn apply_service(service: &mut Service, payload: ServicePayload) -> AppResult<()> {
    if let Some(category_id) = payload.category_id {
        service.category_id = Some(category_id);
    }
    if let Some(name) = payload.name {
        service.name = name.trim().to_string();
    }
    if let Some(code) = payload.code {
        service.code = validation::service_code(&code)?;
    }
    if let Some(description) = payload.description {
        service.description = description;
    }
    if let Some(instructions) = payload.instructions {
        service.instructions = instructions;
    }
    if let Some(priority) = payload.default_priority {
        service.default_priority = priority;
    }
    if let Some(minutes) = payload.estimated_duration {
        validation::in_range("estimated_duration", minutes, 1, 180)?;
        service.estimated_duration = minutes;
    }
    if let Some(minutes) = payload.max_wait_time {
        validation::in_range("max_wait_time", minutes, 5, 480)?;
        service.max_wait_time = minutes;
    }
    if let Some(cost) = payload.cost {
        if cost.is_sign_negative() {
            return Err(AppError::validation("cost cannot be negative"));
        }
        service.cost = Some(cost);
    }
    if let Some(flag) = payload.allows_appointments {
        service.allows_appointments = flag;
    }
    if let Some(flag) = payload.requires_appointment {
        service.requires_appointment = flag;
    }
    if let Some(hours) = payload.min_appointment_notice {
        validation::in_range("min_appointment_notice", hours, 0, 720)?;
        service.min_appointment_notice = hours;
    }
    if let Some(days) = payload.max_appointment_advance {
        validation::in_range("max_appointment_advance", days, 1, 365)?;
        service.max_appointment_advance = days;
    }
    if let Some(documents) = payload.required_documents {
        service.required_documents = documents;
    }
    if let Some(documents) = payload.optional_documents {
        service.optional_documents = documents;
    }
    if let Some(status) = payload.status {
        service.status = status;
    }
    if let Some(flag) = payload.is_public {
        service.is_public = flag;
    }
    if let Some(order) = payload.display_order {
        service.display_order = order;
    }

    if service.requires_appointment {
        service.allows_appointments = true;
    }
    validation::not_blank("name", &service.name)?;
    validation::max_len("name", &service.name, 200)?;
    if service.code.is_empty() {
        return Err(AppError::validation("code is required"));
    }
    Ok(())
}

pub async fn get_service(state: &AppState, id: Uuid) -> AppResult<Service> {
    state
        .store
        .services
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Service", id))
}

pub async fn create_service(
    state: &AppState,
    actor: &User,
    payload: ServicePayload,
    now: DateTime<Utc>,
) -> AppResult<Service> {
    let organization_id = payload
        .organization_id
        .ok_or_else(|| AppError::validation("organization_id is required"))?;
    ensure_manages(actor, organization_id)?;
    state
        .store
        .organizations
        .get(organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization", organization_id))?;
    if let Some(category_id) = payload.category_id {
        get_category(state, category_id).await?;
    }

    let mut service = Service::new(organization_id, String::new(), String::new(), now);
    apply_service(&mut service, payload)?;
    state.store.services.insert(&service).await?;
    Ok(service)
}

pub async fn update_service(
    state: &AppState,
    actor: &User,
    id: Uuid,
    mut payload: ServicePayload,
    now: DateTime<Utc>,
) -> AppResult<Service> {
    let mut service = get_service(state, id).await?;
    ensure_manages(actor, service.organization_id)?;
    if payload.organization_id.take().is_some_and(|org| org != service.organization_id) {
        return Err(AppError::validation(
            "A service cannot move to another organization",
        ));
    }
    if let Some(category_id) = payload.category_id {
        get_category(state, category_id).await?;
    }
    apply_service(&mut service, payload)?;
    service.updated_at = now;
    state.store.services.update(&service).await?;
    Ok(service)
}

pub async fn set_service_active(
    state: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> AppResult<Service> {
    let mut service = get_service(state, id).await?;
    ensure_manages(actor, service.organization_id)?;
    if active {
        service.reactivate(now);
    } else {
        service.deactivate(now);
    }
    state.store.services.update(&service).await?;
    Ok(service)
}

pub async fn list_services(
    state: &AppState,
    actor: Option<&User>,
    mut filter: ServiceFilter,
    page: PageRequest,
) -> AppResult<Listing<Service>> {
    if !actor.is_some_and(|user| user.role.is_staff()) {
        filter.include_inactive = false;
        filter.is_public = Some(true);
    }
    Ok(state.store.services.list(&filter, page).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::UserRole;
    use crate::store::Store;

    fn staff(org: Uuid) -> User {
        let mut user = User::new(
            "agent@example.sn".into(),
            String::new(),
            "Khady".into(),
            "Gueye".into(),
            UserRole::Staff,
            Utc::now(),
        );
        user.organization_id = Some(org);
        user
    }

    fn service_payload(org: Uuid) -> ServicePayload {
        ServicePayload {
            organization_id: Some(org),
            name: Some("Retrait".into()),
            code: Some("ret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_appointment_implies_allows() {
        let now = Utc::now();
        let mut service = Service::new(Uuid::new_v4(), "Visa".into(), "V".into(), now);
        let payload = ServicePayload {
            allows_appointments: Some(false),
            requires_appointment: Some(true),
            ..Default::default()
        };
        apply_service(&mut service, payload).unwrap();
        assert!(service.allows_appointments);
    }

    #[test]
    fn test_service_ranges() {
        let now = Utc::now();
        let mut service = Service::new(Uuid::new_v4(), "Visa".into(), "V".into(), now);
        let too_long = ServicePayload {
            estimated_duration: Some(181),
            ..Default::default()
        };
        assert!(apply_service(&mut service, too_long).is_err());

        let negative = ServicePayload {
            cost: Some(Decimal::from(-1)),
            ..Default::default()
        };
        assert!(apply_service(&mut service, negative).is_err());

        let short_wait = ServicePayload {
            max_wait_time: Some(4),
            ..Default::default()
        };
        assert!(apply_service(&mut service, short_wait).is_err());
    }

    #[tokio::test]
    async fn test_create_service_upper_cases_code() {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let now = Utc::now();
        let admin = User::new(
            "root@example.sn".into(),
            String::new(),
            "Root".into(),
            "Admin".into(),
            UserRole::SuperAdmin,
            now,
        );
        let org = crate::domain::organizations::create(
            &state,
            &admin,
            crate::domain::organizations::OrganizationPayload {
                name: Some("Orange".into()),
                org_type: Some(crate::models::OrganizationType::Telecom),
                region: Some(crate::models::Region::Thies),
                city: Some("Thies".into()),
                phone_number: Some("+221338112233".into()),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();

        let service = create_service(&state, &staff(org.id), service_payload(org.id), now)
            .await
            .unwrap();
        assert_eq!(service.code, "RET");

        let duplicate = create_service(&state, &staff(org.id), service_payload(org.id), now).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let outsider = staff(Uuid::new_v4());
        assert!(matches!(
            create_service(&state, &outsider, service_payload(org.id), now).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_category_writes_need_super_admin() {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let payload = CategoryPayload {
            name: Some("Banque".into()),
            color: Some("#112233".into()),
            ..Default::default()
        };
        assert!(create_category(&state, &staff(Uuid::new_v4()), payload, Utc::now())
            .await
            .is_err());
    }
}

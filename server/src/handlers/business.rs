//! Organizations, service categories and services.

use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{paged, InactiveParam};
use crate::auth::{CurrentUser, OptionalUser};
use crate::domain::catalog::{self, CategoryPayload, ServicePayload, ServiceView};
use crate::domain::organizations::{self, NearbyQuery, OrganizationPayload};
use crate::models::{OrganizationStatus, OrganizationType, Region, ServiceStatus};
use crate::state::AppState;
use crate::store::{Listing, OrganizationFilter, ServiceFilter};
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::{created, no_content, success};

#[derive(Debug, Default, Deserialize)]
pub struct OrganizationQuery {
    pub region: Option<Region>,
    pub org_type: Option<OrganizationType>,
    pub status: Option<OrganizationStatus>,
    pub city: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceQuery {
    pub organization: Option<Uuid>,
    pub category: Option<Uuid>,
    pub status: Option<ServiceStatus>,
    pub is_public: Option<bool>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn list_organizations(
    State(state): State<AppState>,
    OptionalUser(actor): OptionalUser,
    Query(params): Query<PageParams>,
    Query(query): Query<OrganizationQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let filter = OrganizationFilter {
        region: query.region,
        org_type: query.org_type,
        status: query.status,
        city: query.city,
        search: query.search,
        include_inactive: query.include_inactive,
    };
    let listing = organizations::list(&state, actor.as_ref(), filter, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn create_organization(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<OrganizationPayload>,
) -> AppResult<Response> {
    let organization = organizations::create(&state, &actor, payload, Utc::now()).await?;
    Ok(created(organization, "Organization created"))
}

pub async fn nearby_organizations(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Response> {
    let found = organizations::nearby(&state, query).await?;
    Ok(success(found, "Nearby organizations"))
}

pub async fn get_organization(
    State(state): State<AppState>,
    OptionalUser(actor): OptionalUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let organization = organizations::get_visible(&state, actor.as_ref(), id).await?;
    Ok(success(organization, "Organization"))
}

pub async fn update_organization(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrganizationPayload>,
) -> AppResult<Response> {
    let organization = organizations::update(&state, &actor, id, payload, Utc::now()).await?;
    Ok(success(organization, "Organization updated"))
}

pub async fn delete_organization(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    organizations::set_active(&state, &actor, id, false, Utc::now()).await?;
    Ok(no_content())
}

pub async fn reactivate_organization(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let organization = organizations::set_active(&state, &actor, id, true, Utc::now()).await?;
    Ok(success(organization, "Organization reactivated"))
}

pub async fn organization_stats(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let stats = organizations::stats(&state, &actor, id, Utc::now()).await?;
    Ok(success(stats, "Organization statistics"))
}

pub async fn list_categories(
    State(state): State<AppState>,
    OptionalUser(actor): OptionalUser,
    Query(params): Query<PageParams>,
    Query(inactive): Query<InactiveParam>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let listing =
        catalog::list_categories(&state, actor.as_ref(), inactive.include_inactive, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn create_category(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<CategoryPayload>,
) -> AppResult<Response> {
    let category = catalog::create_category(&state, &actor, payload, Utc::now()).await?;
    Ok(created(category, "Category created"))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let category = catalog::get_category(&state, id).await?;
    Ok(success(category, "Category"))
}

pub async fn update_category(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryPayload>,
) -> AppResult<Response> {
    let category = catalog::update_category(&state, &actor, id, payload, Utc::now()).await?;
    Ok(success(category, "Category updated"))
}

pub async fn delete_category(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    catalog::set_category_active(&state, &actor, id, false, Utc::now()).await?;
    Ok(no_content())
}

pub async fn reactivate_category(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let category = catalog::set_category_active(&state, &actor, id, true, Utc::now()).await?;
    Ok(success(category, "Category reactivated"))
}

pub async fn list_services(
    State(state): State<AppState>,
    OptionalUser(actor): OptionalUser,
    Query(params): Query<PageParams>,
    Query(query): Query<ServiceQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let filter = ServiceFilter {
        organization_id: query.organization,
        category_id: query.category,
        status: query.status,
        is_public: query.is_public,
        search: query.search,
        include_inactive: query.include_inactive,
    };
    let listing = catalog::list_services(&state, actor.as_ref(), filter, request).await?;
    let (services, total) = listing.into_parts();
    let listing: Listing<ServiceView> = Listing {
        items: services.into_iter().map(ServiceView::from).collect(),
        total,
    };
    Ok(paged(listing, request, &uri))
}

pub async fn create_service(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<ServicePayload>,
) -> AppResult<Response> {
    let service = catalog::create_service(&state, &actor, payload, Utc::now()).await?;
    Ok(created(ServiceView::from(service), "Service created"))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let service = catalog::get_service(&state, id).await?;
    Ok(success(ServiceView::from(service), "Service"))
}

pub async fn update_service(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ServicePayload>,
) -> AppResult<Response> {
    let service = catalog::update_service(&state, &actor, id, payload, Utc::now()).await?;
    Ok(success(ServiceView::from(service), "Service updated"))
}

pub async fn delete_service(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    catalog::set_service_active(&state, &actor, id, false, Utc::now()).await?;
    Ok(no_content())
}

pub async fn reactivate_service(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let service = catalog::set_service_active(&state, &actor, id, true, Utc::now()).await?;
    Ok(success(ServiceView::from(service), "Service reactivated"))
}

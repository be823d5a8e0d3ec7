use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use super::{paged, InactiveParam};
use crate::auth::{CurrentUser, OptionalUser};
use crate::domain::payments::{self, CallbackRequest, InitiateRequest, PaymentQuery, ProviderPayload};
use crate::models::ProviderType;
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::{created, no_content, success};

pub async fn list_providers(
    State(state): State<AppState>,
    OptionalUser(actor): OptionalUser,
    Query(inactive): Query<InactiveParam>,
) -> AppResult<Response> {
    let providers =
        payments::list_providers(&state, actor.as_ref(), inactive.include_inactive).await?;
    Ok(success(providers, "Payment providers"))
}

pub async fn create_provider(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<ProviderPayload>,
) -> AppResult<Response> {
    let provider = payments::create_provider(&state, &actor, payload, Utc::now()).await?;
    Ok(created(provider, "Payment provider created"))
}

pub async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let provider = payments::get_provider(&state, id).await?;
    Ok(success(provider, "Payment provider"))
}

pub async fn update_provider(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProviderPayload>,
) -> AppResult<Response> {
    let provider = payments::update_provider(&state, &actor, id, payload, Utc::now()).await?;
    Ok(success(provider, "Payment provider updated"))
}

pub async fn delete_provider(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    payments::set_provider_active(&state, &actor, id, false, Utc::now()).await?;
    Ok(no_content())
}

pub async fn reactivate_provider(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let provider = payments::set_provider_active(&state, &actor, id, true, Utc::now()).await?;
    Ok(success(provider, "Payment provider reactivated"))
}

pub async fn initiate(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<InitiateRequest>,
) -> AppResult<Response> {
    let payment = payments::initiate(&state, &actor, request, Utc::now()).await?;
    Ok(created(payment, "Payment initiated"))
}

pub async fn list_payments(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<PageParams>,
    Query(query): Query<PaymentQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let listing = payments::list(&state, &actor, query, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn get_payment(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let payment = payments::get(&state, &actor, id).await?;
    Ok(success(payment, "Payment"))
}

pub async fn status(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let payment = payments::status(&state, &actor, id, Utc::now()).await?;
    Ok(success(payment, "Payment status"))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let payment = payments::cancel(&state, &actor, id, Utc::now()).await?;
    Ok(success(payment, "Payment cancelled"))
}

pub async fn refund(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let payment = payments::refund(&state, &actor, id, Utc::now()).await?;
    Ok(success(payment, "Payment refunded"))
}

pub async fn simulate_success(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let payment = payments::simulate_success(&state, &actor, id, Utc::now()).await?;
    Ok(success(payment, "Payment completed"))
}

pub async fn simulate_failure(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let payment = payments::simulate_failure(&state, &actor, id, Utc::now()).await?;
    Ok(success(payment, "Payment failed"))
}

pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<ProviderType>,
    Json(request): Json<CallbackRequest>,
) -> AppResult<Response> {
    let payment = payments::callback(&state, provider, request, Utc::now()).await?;
    Ok(success(payment, "Callback processed"))
}

pub async fn stats(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Response> {
    let stats = payments::stats(&state, &actor).await?;
    Ok(success(stats, "Payment statistics"))
}

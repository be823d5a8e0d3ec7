use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use super::paged;
use crate::auth::CurrentUser;
use crate::domain::analytics::{self, DashboardQuery, RatingRequest, SatisfactionQuery};
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::{created, success};

pub async fn rate(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<RatingRequest>,
) -> AppResult<Response> {
    let rating = analytics::rate(&state, &actor, request, Utc::now()).await?;
    Ok(created(rating, "Thank you for your feedback"))
}

pub async fn list_ratings(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<PageParams>,
    Query(query): Query<SatisfactionQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let listing = analytics::list_ratings(&state, &actor, query, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn rating_stats(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<SatisfactionQuery>,
) -> AppResult<Response> {
    let stats = analytics::rating_stats(&state, &actor, query).await?;
    Ok(success(stats, "Satisfaction statistics"))
}

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> AppResult<Response> {
    let dashboard = analytics::dashboard(&state, &actor, query, Utc::now()).await?;
    Ok(success(dashboard, "Dashboard"))
}

pub async fn realtime(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Response> {
    let queues = analytics::realtime(&state, &actor).await?;
    Ok(success(queues, "Realtime queue figures"))
}

pub async fn queue_analytics(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let analytics = analytics::queue_analytics(&state, &actor, id, Utc::now()).await?;
    Ok(success(analytics, "Queue analytics"))
}

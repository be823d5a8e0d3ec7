use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use super::paged;
use crate::auth::{require_staff, CurrentUser};
use crate::domain::notifications::{
    self, BulkRequest, InboxQuery, Preferences, PreferencesUpdate, SendRequest, TemplatePayload,
};
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::{created, no_content, success};

pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<PageParams>,
    Query(query): Query<InboxQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let listing = notifications::list(&state, &user, query, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn get_notification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let notification = notifications::detail(&state, &user, id).await?;
    Ok(success(notification, "Notification"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let notification = notifications::mark_read(&state, &user, id, Utc::now()).await?;
    Ok(success(notification, "Notification marked as read"))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let marked = notifications::mark_all_read(&state, &user, Utc::now()).await?;
    Ok(success(marked, "Notifications marked as read"))
}

pub async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let count = notifications::unread_count(&state, &user).await?;
    Ok(success(count, "Unread notifications"))
}

pub async fn send(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<SendRequest>,
) -> AppResult<Response> {
    let sent = notifications::send(&state, &actor, request, Utc::now()).await?;
    Ok(created(sent, "Notification sent"))
}

pub async fn bulk(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<BulkRequest>,
) -> AppResult<Response> {
    let result = notifications::bulk(&state, &actor, request, Utc::now()).await?;
    Ok(created(result, "Bulk notification sent"))
}

pub async fn retry(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let notification = notifications::retry(&state, &actor, id, Utc::now()).await?;
    Ok(success(notification, "Notification retried"))
}

pub async fn list_templates(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<PageParams>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let listing = notifications::list_templates(&state, &actor, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn get_template(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    require_staff(&actor)?;
    let template = notifications::get_template(&state, id).await?;
    Ok(success(template, "Notification template"))
}

pub async fn create_template(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<TemplatePayload>,
) -> AppResult<Response> {
    let template = notifications::create_template(&state, &actor, payload, Utc::now()).await?;
    Ok(created(template, "Notification template created"))
}

pub async fn update_template(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TemplatePayload>,
) -> AppResult<Response> {
    let template = notifications::update_template(&state, &actor, id, payload, Utc::now()).await?;
    Ok(success(template, "Notification template updated"))
}

pub async fn delete_template(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    notifications::delete_template(&state, &actor, id).await?;
    Ok(no_content())
}

pub async fn preferences(CurrentUser(user): CurrentUser) -> Response {
    success(Preferences::from(&user), "Notification preferences")
}

pub async fn update_preferences(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<PreferencesUpdate>,
) -> AppResult<Response> {
    let preferences = notifications::update_preferences(&state, user, update, Utc::now()).await?;
    Ok(success(preferences, "Notification preferences updated"))
}

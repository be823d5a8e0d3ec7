use axum::extract::{OriginalUri, Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::paged;
use crate::auth::{CurrentUser, OptionalUser};
use crate::domain::accounts::{
    self, AuthStatus, ChangePasswordRequest, CreateStaffRequest, LoginRequest, ProfileUpdate,
    RefreshRequest, RegisterRequest,
};
use crate::models::UserRole;
use crate::state::AppState;
use crate::store::UserFilter;
use crate::utils::error::AppResult;
use crate::utils::pagination::PageParams;
use crate::utils::response::{created, empty_success, no_content, success};

#[derive(Serialize)]
struct AccessToken {
    access: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub organization: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<Response> {
    let payload = accounts::register(&state, request, Utc::now()).await?;
    Ok(created(payload, "Account created"))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    let payload = accounts::login(&state, request, Utc::now()).await?;
    Ok(success(payload, "Login successful"))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Response> {
    let access = accounts::refresh(&state, request, Utc::now()).await?;
    Ok(success(AccessToken { access }, "Token refreshed"))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Response> {
    accounts::logout(&state, &user, request, Utc::now())?;
    Ok(empty_success("Logged out"))
}

pub async fn profile(CurrentUser(user): CurrentUser) -> Response {
    success(user, "Profile")
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Response> {
    let user = accounts::update_profile(&state, user, update, Utc::now()).await?;
    Ok(success(user, "Profile updated"))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    accounts::deactivate_self(&state, user, Utc::now()).await?;
    Ok(no_content())
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<Response> {
    accounts::change_password(&state, user, request, Utc::now()).await?;
    Ok(empty_success("Password changed"))
}

pub async fn status(OptionalUser(user): OptionalUser) -> Response {
    let status = AuthStatus {
        authenticated: user.is_some(),
        user,
    };
    success(status, "Authentication status")
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<PageParams>,
    Query(query): Query<UserQuery>,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let request = state.page(&params);
    let filter = UserFilter {
        role: query.role,
        organization_id: query.organization,
        include_inactive: query.include_inactive,
    };
    let listing = accounts::list_users(&state, &actor, filter, request).await?;
    Ok(paged(listing, request, &uri))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<CreateStaffRequest>,
) -> AppResult<Response> {
    let user = accounts::create_staff(&state, &actor, request, Utc::now()).await?;
    Ok(created(user, "User created"))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let user = accounts::get_user(&state, &actor, id).await?;
    Ok(success(user, "User"))
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    accounts::set_user_active(&state, &actor, id, false, Utc::now()).await?;
    Ok(no_content())
}

pub async fn reactivate_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let user = accounts::set_user_active(&state, &actor, id, true, Utc::now()).await?;
    Ok(success(user, "User reactivated"))
}

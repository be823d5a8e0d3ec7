use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{hash_password, require_admin, verify_password, TokenPair, TokenType};
use crate::domain::context;
use crate::models::{Language, NotificationCategory, SoftDelete, User, UserRole};
use crate::state::AppState;
use crate::store::{Listing, UserFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub preferred_language: Language,
    #[serde(default)]
    pub terms_accepted: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// Fields a user may change on their own profile.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub preferred_language: Option<Language>,
    pub push_notifications_enabled: Option<bool>,
    pub email_notifications_enabled: Option<bool>,
    pub sms_notifications_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub role: UserRole,
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub preferred_language: Language,
}

#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub user: Option<User>,
}

fn check_phone(phone: Option<&str>) -> AppResult<Option<String>> {
    match phone.map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => {
            validation::phone(phone)?;
            Ok(Some(phone.to_string()))
        }
        None => Ok(None),
    }
}

fn check_names(first_name: &str, last_name: &str) -> AppResult<()> {
    validation::not_blank("first_name", first_name)?;
    validation::not_blank("last_name", last_name)?;
    validation::max_len("first_name", first_name, 150)?;
    validation::max_len("last_name", last_name, 150)
}

/// Creates a customer account and signs it in.
pub async fn register(
    state: &AppState,
    request: RegisterRequest,
    now: DateTime<Utc>,
) -> AppResult<AuthPayload> {
    let email = validation::email(&request.email)?;
    validation::password(&request.password)?;
    if request.password != request.password_confirm {
        return Err(AppError::validation("Passwords do not match"));
    }
    check_names(&request.first_name, &request.last_name)?;
    let phone_number = check_phone(request.phone_number.as_deref())?;
    if !request.terms_accepted {
        return Err(AppError::validation("You must accept the terms of use"));
    }

    let mut user = User::new(
        email,
        hash_password(&request.password)?,
        request.first_name.trim().to_string(),
        request.last_name.trim().to_string(),
        UserRole::Customer,
        now,
    );
    user.phone_number = phone_number;
    user.preferred_language = request.preferred_language;
    user.terms_accepted_at = Some(now);
    state.store.users.insert(&user).await?;
    info!(user_id = %user.id, "Customer registered");

    state
        .notifier
        .notify(
            &user,
            NotificationCategory::AccountCreated,
            &context([("first_name", user.first_name.clone())]),
            None,
            now,
        )
        .await;

    let tokens = state.tokens.issue_pair(&user, now)?;
    Ok(AuthPayload { user, tokens })
}

pub async fn login(state: &AppState, request: LoginRequest, now: DateTime<Utc>) -> AppResult<AuthPayload> {
    let email = request.email.trim().to_lowercase();
    let user = state
        .store
        .users
        .find_by_email(&email)
        .await?
        .filter(|user| user.is_active && verify_password(&request.password, &user.password_hash));
    let Some(mut user) = user else {
        return Err(AppError::AuthError(INVALID_CREDENTIALS.into()));
    };

    user.last_login_at = Some(now);
    user.updated_at = now;
    state.store.users.update(&user).await?;

    let tokens = state.tokens.issue_pair(&user, now)?;
    Ok(AuthPayload { user, tokens })
}

/// A fresh access token for a valid refresh token.
pub async fn refresh(state: &AppState, request: RefreshRequest, now: DateTime<Utc>) -> AppResult<String> {
    let claims = state.tokens.decode(&request.refresh, TokenType::Refresh)?;
    let user = state
        .store
        .users
        .get(claims.sub)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::AuthError("User not found or inactive".into()))?;
    state.tokens.issue(&user, TokenType::Access, now)
}

pub fn logout(state: &AppState, user: &User, request: RefreshRequest, now: DateTime<Utc>) -> AppResult<()> {
    let claims = state.tokens.decode(&request.refresh, TokenType::Refresh)?;
    if claims.sub != user.id {
        return Err(AppError::forbidden("This token belongs to another user"));
    }
    state.tokens.revoke(&claims, now);
    Ok(())
}

pub async fn update_profile(
    state: &AppState,
    mut user: User,
    update: ProfileUpdate,
    now: DateTime<Utc>,
) -> AppResult<User> {
    if let Some(first_name) = update.first_name {
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = update.last_name {
        user.last_name = last_name.trim().to_string();
    }
    check_names(&user.first_name, &user.last_name)?;
    if let Some(phone) = update.phone_number {
        user.phone_number = check_phone(Some(&phone))?;
    }
    if let Some(language) = update.preferred_language {
        user.preferred_language = language;
    }
    if let Some(flag) = update.push_notifications_enabled {
        user.push_notifications_enabled = flag;
    }
    if let Some(flag) = update.email_notifications_enabled {
        user.email_notifications_enabled = flag;
    }
    if let Some(flag) = update.sms_notifications_enabled {
        user.sms_notifications_enabled = flag;
    }
    user.updated_at = now;
    state.store.users.update(&user).await?;
    Ok(user)
}

pub async fn change_password(
    state: &AppState,
    mut user: User,
    request: ChangePasswordRequest,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if !verify_password(&request.old_password, &user.password_hash) {
        return Err(AppError::validation("Current password is incorrect"));
    }
    validation::password(&request.new_password)?;
    if request.new_password != request.new_password_confirm {
        return Err(AppError::validation("Passwords do not match"));
    }
    user.password_hash = hash_password(&request.new_password)?;
    user.updated_at = now;
    state.store.users.update(&user).await?;

    state
        .notifier
        .notify(&user, NotificationCategory::PasswordReset, &context([]), None, now)
        .await;
    Ok(())
}

pub async fn deactivate_self(state: &AppState, mut user: User, now: DateTime<Utc>) -> AppResult<()> {
    user.deactivate(now);
    state.store.users.update(&user).await?;
    info!(user_id = %user.id, "Account deactivated by its owner");
    Ok(())
}

/// Admins only see their own organization's users.
pub async fn list_users(
    state: &AppState,
    actor: &User,
    mut filter: UserFilter,
    page: PageRequest,
) -> AppResult<Listing<User>> {
    require_admin(actor)?;
    if actor.role != UserRole::SuperAdmin {
        filter.organization_id = Some(own_organization(actor)?);
    }
    Ok(state.store.users.list(&filter, page).await?)
}

fn own_organization(actor: &User) -> AppResult<Uuid> {
    actor
        .organization_id
        .ok_or_else(|| AppError::forbidden("Your account is not attached to an organization"))
}

/// Staff and admin accounts are always attached to an organization.
pub async fn create_staff(
    state: &AppState,
    actor: &User,
    request: CreateStaffRequest,
    now: DateTime<Utc>,
) -> AppResult<User> {
    require_admin(actor)?;
    let organization_id = match actor.role {
        UserRole::SuperAdmin => request.organization_id,
        _ => {
            if request.role == UserRole::SuperAdmin {
                return Err(AppError::forbidden(
                    "Only a super administrator can create super administrators",
                ));
            }
            let own = own_organization(actor)?;
            if request.organization_id.is_some_and(|org| org != own) {
                return Err(AppError::forbidden(
                    "You can only create users for your own organization",
                ));
            }
            Some(own)
        }
    };
    match request.role {
        UserRole::Customer => {
            return Err(AppError::validation(
                "Customers register themselves; choose staff or admin",
            ))
        }
        UserRole::Staff | UserRole::Admin if organization_id.is_none() => {
            return Err(AppError::validation("organization_id is required"))
        }
        _ => {}
    }
    if let Some(org) = organization_id {
        state
            .store
            .organizations
            .get(org)
            .await?
            .ok_or_else(|| AppError::not_found("Organization", org))?;
    }

    let email = validation::email(&request.email)?;
    validation::password(&request.password)?;
    check_names(&request.first_name, &request.last_name)?;

    let mut user = User::new(
        email,
        hash_password(&request.password)?,
        request.first_name.trim().to_string(),
        request.last_name.trim().to_string(),
        request.role,
        now,
    );
    user.phone_number = check_phone(request.phone_number.as_deref())?;
    user.organization_id = organization_id;
    user.preferred_language = request.preferred_language;
    state.store.users.insert(&user).await?;
    info!(user_id = %user.id, role = %user.role, created_by = %actor.id, "Staff account created");
    Ok(user)
}

async fn managed_user(state: &AppState, actor: &User, id: Uuid) -> AppResult<User> {
    require_admin(actor)?;
    let user = state
        .store
        .users
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))?;
    if actor.role != UserRole::SuperAdmin
        && (user.role == UserRole::SuperAdmin || user.organization_id != actor.organization_id)
    {
        return Err(AppError::forbidden("You cannot manage this user"));
    }
    Ok(user)
}

pub async fn get_user(state: &AppState, actor: &User, id: Uuid) -> AppResult<User> {
    managed_user(state, actor, id).await
}

pub async fn set_user_active(
    state: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let mut user = managed_user(state, actor, id).await?;
    if user.id == actor.id {
        return Err(AppError::validation("Use the profile endpoint for your own account"));
    }
    if active {
        user.reactivate(now);
    } else {
        user.deactivate(now);
    }
    state.store.users.update(&user).await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;

    fn state() -> AppState {
        AppState::new(Config::for_tests(), Store::in_memory())
    }

    fn registration(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "motdepasse1".into(),
            password_confirm: "motdepasse1".into(),
            first_name: "Aminata".into(),
            last_name: "Ba".into(),
            phone_number: Some("+221771112233".into()),
            preferred_language: Language::Wo,
            terms_accepted: true,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let state = state();
        let now = Utc::now();
        let registered = register(&state, registration("Aminata@Example.SN"), now)
            .await
            .unwrap();
        assert_eq!(registered.user.email, "aminata@example.sn");
        assert_eq!(registered.user.role, UserRole::Customer);

        let logged_in = login(
            &state,
            LoginRequest {
                email: "aminata@example.sn".into(),
                password: "motdepasse1".into(),
            },
            now,
        )
        .await
        .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
        assert_eq!(logged_in.user.last_login_at, Some(now));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let state = state();
        let now = Utc::now();

        let mut request = registration("a@example.sn");
        request.terms_accepted = false;
        assert!(matches!(
            register(&state, request, now).await,
            Err(AppError::ValidationError(_))
        ));

        let mut request = registration("a@example.sn");
        request.password_confirm = "different1".into();
        assert!(register(&state, request, now).await.is_err());

        register(&state, registration("a@example.sn"), now).await.unwrap();
        let mut request = registration("a@example.sn");
        request.phone_number = None;
        assert!(matches!(
            register(&state, request, now).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_share_one_message() {
        let state = state();
        let now = Utc::now();
        register(&state, registration("a@example.sn"), now).await.unwrap();

        let wrong_password = login(
            &state,
            LoginRequest {
                email: "a@example.sn".into(),
                password: "nope-nope".into(),
            },
            now,
        )
        .await
        .unwrap_err();
        let unknown = login(
            &state,
            LoginRequest {
                email: "ghost@example.sn".into(),
                password: "motdepasse1".into(),
            },
            now,
        )
        .await
        .unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let state = state();
        let now = Utc::now();
        let registered = register(&state, registration("a@example.sn"), now).await.unwrap();
        let token = registered.tokens.refresh.clone();

        refresh(&state, RefreshRequest { refresh: token.clone() }, now)
            .await
            .unwrap();
        logout(&state, &registered.user, RefreshRequest { refresh: token.clone() }, now).unwrap();
        assert!(refresh(&state, RefreshRequest { refresh: token }, now).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_cannot_create_super_admin() {
        let state = state();
        let now = Utc::now();
        let mut admin = User::new(
            "admin@bank.sn".into(),
            String::new(),
            "Ibrahima".into(),
            "Sarr".into(),
            UserRole::Admin,
            now,
        );
        admin.organization_id = Some(Uuid::new_v4());

        let request = CreateStaffRequest {
            email: "boss@bank.sn".into(),
            password: "motdepasse1".into(),
            first_name: "Big".into(),
            last_name: "Boss".into(),
            phone_number: None,
            role: UserRole::SuperAdmin,
            organization_id: None,
            preferred_language: Language::Fr,
        };
        assert!(matches!(
            create_staff(&state, &admin, request, now).await,
            Err(AppError::Forbidden(_))
        ));
    }
}

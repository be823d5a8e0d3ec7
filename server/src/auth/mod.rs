//! Bearer-token authentication and the role checks shared by every handler.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::models::{User, UserRole};
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

pub mod jwt;
pub mod password;

pub use jwt::{Claims, JwtKeys, TokenPair, TokenType};
pub use password::{hash_password, verify_password};

/// The authenticated, active user behind an access token.
pub struct CurrentUser(pub User);

/// Like `CurrentUser`, but a missing or unusable token yields `None`.
pub struct OptionalUser(pub Option<User>);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves an access token to its active user.
pub async fn authenticate(state: &AppState, token: &str) -> AppResult<User> {
    let claims = state.tokens.decode(token, TokenType::Access)?;
    state
        .store
        .users
        .get(claims.sub)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::AuthError("User not found or inactive".into()))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            AppError::AuthError("Authentication credentials were not provided".into())
        })?;
        authenticate(state, token).await.map(CurrentUser)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(OptionalUser(None));
        };
        match authenticate(state, token).await {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(AppError::AuthError(_)) => Ok(OptionalUser(None)),
            Err(other) => Err(other),
        }
    }
}

pub fn require_staff(user: &User) -> AppResult<()> {
    if user.role.is_staff() {
        Ok(())
    } else {
        Err(AppError::forbidden("Staff access required"))
    }
}

pub fn require_admin(user: &User) -> AppResult<()> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Administrator access required"))
    }
}

pub fn require_super_admin(user: &User) -> AppResult<()> {
    if user.role == UserRole::SuperAdmin {
        Ok(())
    } else {
        Err(AppError::forbidden("Super administrator access required"))
    }
}

/// Super admins manage every organization; staff and admins only their own.
pub fn can_manage_organization(user: &User, organization_id: Uuid) -> bool {
    match user.role {
        UserRole::SuperAdmin => true,
        UserRole::Staff | UserRole::Admin => user.organization_id == Some(organization_id),
        UserRole::Customer => false,
    }
}

pub fn ensure_manages(user: &User, organization_id: Uuid) -> AppResult<()> {
    if can_manage_organization(user, organization_id) {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "You do not have permission to manage this organization",
        ))
    }
}

/// The organization a staff member is scoped to; `None` for super admins,
/// who see everything.
pub fn staff_scope(user: &User) -> AppResult<Option<Uuid>> {
    require_staff(user)?;
    if user.role == UserRole::SuperAdmin {
        return Ok(None);
    }
    user.organization_id
        .map(Some)
        .ok_or_else(|| AppError::forbidden("Your account is not attached to an organization"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn user(role: UserRole, org: Option<Uuid>) -> User {
        let mut user = User::new(
            "staff@example.sn".into(),
            String::new(),
            "Moussa".into(),
            "Ndiaye".into(),
            role,
            Utc::now(),
        );
        user.organization_id = org;
        user
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_organization_scope() {
        let org = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(can_manage_organization(&user(UserRole::SuperAdmin, None), other));
        assert!(can_manage_organization(&user(UserRole::Staff, Some(org)), org));
        assert!(!can_manage_organization(&user(UserRole::Admin, Some(org)), other));
        assert!(!can_manage_organization(&user(UserRole::Customer, Some(org)), org));
    }

    #[test]
    fn test_staff_scope() {
        let org = Uuid::new_v4();
        assert_eq!(staff_scope(&user(UserRole::Staff, Some(org))).unwrap(), Some(org));
        assert_eq!(staff_scope(&user(UserRole::SuperAdmin, None)).unwrap(), None);
        assert!(staff_scope(&user(UserRole::Staff, None)).is_err());
        assert!(staff_scope(&user(UserRole::Customer, Some(org))).is_err());
    }

    #[test]
    fn test_role_guards() {
        assert!(require_staff(&user(UserRole::Customer, None)).is_err());
        assert!(require_admin(&user(UserRole::Staff, None)).is_err());
        assert!(require_admin(&user(UserRole::Admin, None)).is_ok());
        assert!(require_super_admin(&user(UserRole::Admin, None)).is_err());
    }
}

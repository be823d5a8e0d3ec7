use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{User, UserRole};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<Uuid>,
    pub typ: TokenType,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Signs and checks HS256 tokens and remembers revoked refresh tokens.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    /// Revoked token ids with their expiry; entries are dropped once expired.
    revoked: DashMap<Uuid, i64>,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl_minutes: i64, refresh_ttl_days: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::days(refresh_ttl_days),
            revoked: DashMap::new(),
        }
    }

    pub fn issue(&self, user: &User, typ: TokenType, now: DateTime<Utc>) -> AppResult<String> {
        let ttl = match typ {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user.id,
            role: user.role,
            org: user.organization_id,
            typ,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("token signing failed: {e}")))
    }

    pub fn issue_pair(&self, user: &User, now: DateTime<Utc>) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user, TokenType::Access, now)?,
            refresh: self.issue(user, TokenType::Refresh, now)?,
        })
    }

    /// Checks signature, expiry, type and revocation.
    pub fn decode(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected token");
                AppError::AuthError("Token is invalid or expired".into())
            })?
            .claims;
        if claims.typ != expected {
            return Err(AppError::AuthError(format!(
                "Expected an {} token",
                match expected {
                    TokenType::Access => "access",
                    TokenType::Refresh => "refresh",
                }
            )));
        }
        if self.revoked.contains_key(&claims.jti) {
            return Err(AppError::AuthError("Token has been revoked".into()));
        }
        Ok(claims)
    }

    pub fn revoke(&self, claims: &Claims, now: DateTime<Utc>) {
        let now = now.timestamp();
        self.revoked.retain(|_, exp| *exp > now);
        self.revoked.insert(claims.jti, claims.exp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new("test-secret", 60, 7)
    }

    fn user() -> User {
        User::new(
            "awa@example.sn".into(),
            String::new(),
            "Awa".into(),
            "Diop".into(),
            UserRole::Staff,
            Utc::now(),
        )
    }

    #[test]
    fn test_pair_round_trip() {
        let keys = keys();
        let user = user();
        let pair = keys.issue_pair(&user, Utc::now()).unwrap();

        let access = keys.decode(&pair.access, TokenType::Access).unwrap();
        assert_eq!(access.sub, user.id);
        assert_eq!(access.role, UserRole::Staff);

        let refresh = keys.decode(&pair.refresh, TokenType::Refresh).unwrap();
        assert_ne!(refresh.jti, access.jti);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let keys = keys();
        let pair = keys.issue_pair(&user(), Utc::now()).unwrap();
        assert!(keys.decode(&pair.access, TokenType::Refresh).is_err());
        assert!(keys.decode(&pair.refresh, TokenType::Access).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = keys();
        let issued = Utc::now() - Duration::hours(2);
        let token = keys.issue(&user(), TokenType::Access, issued).unwrap();
        assert!(keys.decode(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let token = keys()
            .issue(&user(), TokenType::Access, Utc::now())
            .unwrap();
        let other = JwtKeys::new("another-secret", 60, 7);
        assert!(other.decode(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_revoked_refresh_token() {
        let keys = keys();
        let now = Utc::now();
        let token = keys.issue(&user(), TokenType::Refresh, now).unwrap();
        let claims = keys.decode(&token, TokenType::Refresh).unwrap();
        keys.revoke(&claims, now);
        assert!(keys.decode(&token, TokenType::Refresh).is_err());
    }
}

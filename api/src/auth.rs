use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::AppState;

// ── JWT Claims ──

/// Identity token claims. Tokens are minted by the sign-in provider, which
/// shares `JWT_SECRET` with this service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // user uid
    pub email: String,
    pub exp: usize,    // expiry (unix timestamp)
}

impl Claims {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            sub: uid.into(),
            email: email.into(),
            exp: expiry_in_days(30),
        }
    }

    pub fn sign(&self, secret: &str) -> jsonwebtoken::errors::Result<String> {
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }
}

fn expiry_in_days(days: u64) -> usize {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    (now + days * 24 * 60 * 60) as usize
}

// ── Authenticated caller ──

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub is_admin: bool,
}

impl AuthUser {
    /// Make sure a profile row exists and record the visit.
    pub fn touch(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "INSERT INTO users (uid, email) VALUES (?1, ?2)
             ON CONFLICT(uid) DO UPDATE SET email = ?2, last_login_at = datetime('now')",
            rusqlite::params![self.uid, self.email],
        )?;
        Ok(())
    }

    pub fn can_manage(&self, owner_uid: &str) -> bool {
        self.is_admin || self.uid == owner_uid
    }
}

// ── Extract caller from Authorization header ──

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn decode_user(token: &str, state: &AppState) -> AppResult<AuthUser> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let claims = data.claims;
    if claims.sub.trim().is_empty() {
        return Err(AppError::Unauthorized("Token has no subject".into()));
    }

    Ok(AuthUser {
        is_admin: state.config.is_admin_email(&claims.email),
        uid: claims.sub,
        email: claims.email,
    })
}

pub fn require_user(headers: &HeaderMap, state: &AppState) -> AppResult<AuthUser> {
    let token = bearer(headers).ok_or_else(|| AppError::Unauthorized("Sign-in required".into()))?;
    decode_user(token, state)
}

/// Anonymous when the header is missing or the token does not verify.
pub fn optional_user(headers: &HeaderMap, state: &AppState) -> Option<AuthUser> {
    bearer(headers).and_then(|token| decode_user(token, state).ok())
}

pub fn require_admin(headers: &HeaderMap, state: &AppState) -> AppResult<AuthUser> {
    let user = require_user(headers, state)?;
    if !user.is_admin {
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, db};
    use axum::http::HeaderValue;

    fn state() -> AppState {
        let pool = db::connect_in_memory().unwrap();
        AppState::new(
            pool,
            Config {
                database_url: ":memory:".into(),
                bind_addr: "127.0.0.1:0".into(),
                jwt_secret: "test-secret".into(),
                admin_email: "admin@myvote.dev".into(),
                cors_origin: "http://localhost:3000".into(),
            },
        )
    }

    fn headers(token: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        h
    }

    #[test]
    fn valid_token_yields_user() {
        let state = state();
        let token = Claims::new("u1", "alice@myvote.dev").sign("test-secret").unwrap();

        let user = require_user(&headers(&token), &state).unwrap();
        assert_eq!(user.uid, "u1");
        assert!(!user.is_admin);
        assert!(matches!(
            require_admin(&headers(&token), &state),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_email_grants_admin() {
        let state = state();
        let token = Claims::new("root", "ADMIN@myvote.dev").sign("test-secret").unwrap();
        assert!(require_admin(&headers(&token), &state).unwrap().is_admin);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let state = state();
        let token = Claims::new("u1", "alice@myvote.dev").sign("other").unwrap();

        assert!(matches!(
            require_user(&headers(&token), &state),
            Err(AppError::Unauthorized(_))
        ));
        assert!(optional_user(&headers(&token), &state).is_none());
        assert!(optional_user(&HeaderMap::new(), &state).is_none());
    }
}

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::config::Settings;
use crate::error::AppError;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtPayload {
    pub sub: String,
    pub iss: String,
    pub exp: u64,
    pub iat: Option<u64>,
}

/// A member authenticated by a session JWT; `user_id` is the owner id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Who may trigger a user-directed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendAuthority {
    Admin,
    User(String),
}

impl SendAuthority {
    pub fn may_send_to(&self, owner_id: &str) -> bool {
        match self {
            Self::Admin => true,
            Self::User(user_id) => user_id == owner_id,
        }
    }
}

/// Caller presented the configured admin key.
#[derive(Debug, Clone)]
pub struct AdminAccess;

pub fn decode_jwt(token: &str, settings: &Settings) -> Result<JwtPayload, AppError> {
    let algorithm = Algorithm::from_str(&settings.jwt_algorithm)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("unsupported JWT algorithm")))?;

    let mut validation = Validation::new(algorithm);
    validation.set_issuer(&[settings.jwt_issuer.as_str()]);
    validation.set_required_spec_claims(&["exp", "sub", "iss"]);
    validation.validate_aud = false;

    let token_data = decode::<JwtPayload>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret_key.as_bytes()),
        &validation,
    )
    .map_err(|e| AppError::unauthorized(format!("Invalid token: {e}")))?;

    let payload = token_data.claims;

    if payload.sub.is_empty() {
        return Err(AppError::unauthorized("Invalid token: missing sub"));
    }

    Ok(payload)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or_else(|| {
            AppError::unauthorized("Invalid authorization header format. Expected: Bearer <token>")
        })
}

/// Compare the presented admin key without short-circuiting on the first mismatch.
fn admin_key_matches(headers: &HeaderMap, settings: &Settings) -> bool {
    let (Some(expected), Some(presented)) = (
        settings.admin_api_key.as_deref(),
        headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok()),
    ) else {
        return false;
    };

    expected.len() == presented.len()
        && expected
            .bytes()
            .zip(presented.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let claims = decode_jwt(token, &state.settings)?;

        Ok(Self {
            user_id: claims.sub,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for SendAuthority {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if admin_key_matches(&parts.headers, &state.settings) {
            return Ok(Self::Admin);
        }
        if parts.headers.contains_key(ADMIN_KEY_HEADER) {
            return Err(AppError::forbidden("Invalid admin key"));
        }

        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        Ok(Self::User(user.user_id))
    }
}

impl FromRequestParts<Arc<AppState>> for AdminAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.settings.admin_api_key.is_none() {
            return Err(AppError::forbidden("Admin access is not configured"));
        }
        if !parts.headers.contains_key(ADMIN_KEY_HEADER) {
            return Err(AppError::unauthorized("Missing admin key"));
        }
        if !admin_key_matches(&parts.headers, &state.settings) {
            return Err(AppError::forbidden("Invalid admin key"));
        }
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(settings: &Settings, sub: &str, iss: &str, exp_offset: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as u64;
        let claims = JwtPayload {
            sub: sub.into(),
            iss: iss.into(),
            exp,
            iat: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(settings.jwt_secret_key.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_session_token_decodes() {
        let settings = Settings::default();
        let jwt = token(&settings, "member-1", &settings.jwt_issuer, 600);
        assert_eq!(decode_jwt(&jwt, &settings).unwrap().sub, "member-1");
    }

    #[test]
    fn wrong_issuer_and_expired_tokens_are_rejected() {
        let settings = Settings::default();
        let foreign = token(&settings, "member-1", "someone-else", 600);
        assert!(decode_jwt(&foreign, &settings).is_err());

        let expired = token(&settings, "member-1", &settings.jwt_issuer, -3600);
        assert!(decode_jwt(&expired, &settings).is_err());
    }

    #[test]
    fn admin_key_must_match_exactly() {
        let settings = Settings {
            admin_api_key: Some("sekret".into()),
            ..Settings::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_KEY_HEADER, "sekret".parse().unwrap());
        assert!(admin_key_matches(&headers, &settings));

        headers.insert(ADMIN_KEY_HEADER, "sekreT".parse().unwrap());
        assert!(!admin_key_matches(&headers, &settings));
    }

    #[test]
    fn users_may_only_send_to_themselves() {
        assert!(SendAuthority::Admin.may_send_to("anyone"));
        let user = SendAuthority::User("member-1".into());
        assert!(user.may_send_to("member-1"));
        assert!(!user.may_send_to("member-2"));
    }
}

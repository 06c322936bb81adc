//! Signed token claims and transport. The token embeds the acting user id
//! and a jti naming one session row; it travels in the Authorization header
//! or, for browser deployments, in an HttpOnly cookie.

use crate::errors::CadreError;
use crate::jwks::JwksManager;
use crate::settings::Settings;
use axum::http::HeaderMap;
use base64ct::Encoding;
use josekit::jwt::JwtPayload;
use rand::RngCore;
use serde_json::json;
use std::time::{Duration, SystemTime};

pub const TOKEN_COOKIE_NAME: &str = "cadre_token";

/// Claims carried by every access token.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub user_id: i64,
    pub jti: String,
}

/// Generate a fresh opaque session id for the jti claim.
pub fn generate_jti() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

/// Sign a token for the given user/session pair.
pub fn issue(
    jwks: &JwksManager,
    settings: &Settings,
    user_id: i64,
    jti: &str,
) -> Result<String, CadreError> {
    let mut payload = JwtPayload::new();
    payload
        .set_claim("user", Some(json!(user_id)))
        .map_err(|e| CadreError::Jose(e.to_string()))?;
    payload.set_jwt_id(jti);
    payload.set_issued_at(&SystemTime::now());
    payload.set_expires_at(
        &(SystemTime::now() + Duration::from_secs(settings.auth.token_ttl_secs.max(0) as u64)),
    );
    jwks.sign_jwt_rs256(&payload)
}

/// Verify signature and expiry, then project out the claims the session
/// layer needs. Any defect maps to `InvalidSession`; callers treat it as an
/// authentication failure, not a 500.
pub fn verify(jwks: &JwksManager, token: &str) -> Result<TokenClaims, CadreError> {
    let payload = jwks
        .verify_jwt_rs256(token)
        .map_err(|_| CadreError::InvalidSession)?;

    if let Some(exp) = payload.expires_at() {
        if exp < SystemTime::now() {
            return Err(CadreError::InvalidSession);
        }
    }

    let user_id = payload
        .claim("user")
        .and_then(|v| v.as_i64())
        .ok_or(CadreError::InvalidSession)?;
    let jti = payload
        .jwt_id()
        .ok_or(CadreError::InvalidSession)?
        .to_string();

    Ok(TokenClaims { user_id, jti })
}

/// Pull the raw token from the Authorization header, falling back to the
/// token cookie. Returns None when neither is present.
pub fn from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(bearer) = auth.strip_prefix("Bearer ") {
            return Some(bearer.trim().to_string());
        }
    }

    let cookie_header = headers
        .get(axum::http::header::COOKIE)?
        .to_str()
        .ok()?;
    for cookie in cookie_header.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie
            .strip_prefix(TOKEN_COOKIE_NAME)
            .and_then(|s| s.strip_prefix('='))
        {
            return Some(value.to_string());
        }
    }
    None
}

pub fn to_cookie_header(settings: &Settings, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; {}SameSite=Lax; Path=/; Max-Age={}",
        TOKEN_COOKIE_NAME,
        token,
        if settings.auth.secure_cookies {
            "Secure; "
        } else {
            ""
        },
        settings.auth.token_ttl_secs
    )
}

pub fn delete_cookie_header() -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        TOKEN_COOKIE_NAME
    )
}

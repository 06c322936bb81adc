//! Identity lifecycle hooks: login, per-request authentication, logout.
//! Authentication produces an explicit `RequestContext` that handlers thread
//! through to the gate; there is no ambient identity state.

use axum::http::HeaderMap;

use crate::entities;
use crate::errors::CadreError;
use crate::principal::{resolver, CapabilitySet};
use crate::storage::{self, ClientMeta};
use crate::token;
use crate::web::AppState;

/// Everything the rest of a request needs to know about its caller.
pub struct RequestContext {
    pub user: entities::user::Model,
    pub session: entities::session::Model,
    pub capabilities: CapabilitySet,
}

/// Verify credentials, mint a token with a fresh jti, and record the session.
/// Wrong username and wrong password fail identically so callers cannot
/// enumerate accounts.
pub async fn on_login(
    state: &AppState,
    login: &str,
    password: &str,
    meta: ClientMeta,
) -> Result<(entities::user::Model, entities::session::Model, String), CadreError> {
    let user = match storage::get_user_by_login(&state.db, login).await? {
        Some(user) if user.active != 0 => user,
        _ => return Err(CadreError::InvalidCredentials),
    };

    if !crate::credentials::verify_password(password, &user.password_hash)? {
        return Err(CadreError::InvalidCredentials);
    }

    let jti = token::generate_jti();
    let signed = token::issue(&state.jwks, &state.settings, user.id, &jti)?;
    let session = storage::create_session(&state.db, user.id, &jti, meta).await?;

    tracing::info!(user_id = user.id, jti = %session.jti, "user logged in");
    Ok((user, session, signed))
}

/// Token verification hook: session must exist and be active, the account
/// must be enabled, and the capability set is resolved fresh from the store.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<RequestContext, CadreError> {
    let raw = token::from_headers(headers).ok_or(CadreError::InvalidSession)?;
    let claims = token::verify(&state.jwks, &raw)?;

    let session = storage::get_session(&state.db, &claims.jti, claims.user_id)
        .await?
        .ok_or(CadreError::InvalidSession)?;
    if session.active == 0 {
        return Err(CadreError::InvalidSession);
    }

    let user = storage::get_user(&state.db, claims.user_id)
        .await?
        .ok_or(CadreError::AccountInactive)?;
    if user.active == 0 {
        return Err(CadreError::AccountInactive);
    }

    let capabilities = resolver::resolve(&state.db, &user).await?;

    Ok(RequestContext {
        user,
        session,
        capabilities,
    })
}

/// Best-effort logout. An unparseable or already-dead token still counts as
/// a successful logout from the client's point of view.
pub async fn on_logout(state: &AppState, headers: &HeaderMap) {
    if let Some(raw) = token::from_headers(headers) {
        if let Ok(claims) = token::verify(&state.jwks, &raw) {
            if let Err(e) = storage::revoke_session(&state.db, &claims.jti).await {
                tracing::warn!(error = %e, jti = %claims.jti, "failed to revoke session on logout");
            }
        }
    }
}

/// Client metadata recorded on each session row, extracted from the request
/// headers. Parsing is deliberately loose; these fields are informational.
pub fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok());

    let platform = user_agent.and_then(|ua| {
        let start = ua.find('(')? + 1;
        let end = ua[start..].find(')')? + start;
        ua[start..end].split(';').next().map(|s| s.trim().to_string())
    });

    let browser = user_agent.and_then(|ua| ua.split_whitespace().next().map(String::from));

    ClientMeta {
        ip_address,
        platform,
        browser,
    }
}

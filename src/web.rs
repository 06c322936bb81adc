//! HTTP endpoints. Handlers authenticate through `auth::authenticate`, gate
//! with `principal::gate`, and push all persistence through `storage`.

use crate::auth;
use crate::credentials::{self, PasswordPolicy};
use crate::entities;
use crate::errors::CadreError;
use crate::jwks::JwksManager;
use crate::principal::gate;
use crate::settings::Settings;
use crate::storage;
use crate::token;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub jwks: JwksManager,
    pub policy: PasswordPolicy,
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

/// Build the full application router for the given state.
pub fn router(state: AppState) -> Router {
    // Rate limiting belongs at the reverse proxy; nothing here throttles.
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/password", put(set_password))
        .route("/users/{id}/photo", put(set_photo))
        .route("/users/{id}/active", put(set_active))
        .route(
            "/users/{id}/sessions",
            get(list_sessions).delete(revoke_other_sessions),
        )
        .route(
            "/users/{id}/sessions/{jti}",
            get(get_session).delete(revoke_session),
        )
        .route("/users/{id}/roles", post(add_role))
        .route("/users/{id}/roles/{role_id}", axum::routing::delete(remove_role))
        .route("/users/{id}/permissions", post(grant_user_permission))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}/permissions", post(grant_role_permission))
        .route("/entities", get(list_entities).post(create_entity))
        .route("/organizations/{id}", get(get_organization));

    if state.settings.server.allow_public_registration {
        tracing::info!("Public signup is ENABLED");
        router = router.route("/signup", post(signup));
    } else {
        tracing::info!("Public signup is DISABLED - accounts are admin-created");
    }

    router
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn serve(
    settings: Settings,
    db: DatabaseConnection,
    jwks: JwksManager,
) -> miette::Result<()> {
    let policy = PasswordPolicy::new(&settings.auth.password_rule)
        .map_err(|e| miette::miette!("bad password rule: {e}"))?;
    let state = AppState {
        settings: Arc::new(settings),
        db,
        jwks,
        policy,
    };

    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    tracing::info!(%addr, "API listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, router(state)).await.into_diagnostic()?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn jwks_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.jwks.jwks_json())
}

// Login / logout / signup

#[derive(Debug, Deserialize)]
struct LoginRequest {
    login: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, CadreError> {
    let meta = auth::client_meta(&headers);
    let (user, session, signed) = auth::on_login(&state, &req.login, &req.password, meta).await?;

    let body = Json(json!({
        "token": signed,
        "user": user,
        "session": { "jti": session.jti, "created_at": session.created_at },
    }));

    if state.settings.auth.token_in_cookie {
        let cookie = token::to_cookie_header(&state.settings, &signed);
        Ok(([(header::SET_COOKIE, cookie)], body).into_response())
    } else {
        Ok(body.into_response())
    }
}

/// Logout never fails: the session is revoked if the token still resolves,
/// and the cookie is cleared either way.
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    auth::on_logout(&state, &headers).await;
    (
        [(header::SET_COOKIE, token::delete_cookie_header())],
        Json(json!({"status": "logged out"})),
    )
}

#[derive(Debug, Deserialize)]
struct SignupOrganization {
    name: String,
    email: Option<String>,
    phone: Option<String>,
    department: Option<String>,
    position: String,
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    username: String,
    password: String,
    password_confirm: String,
    email: Option<String>,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    organization: Option<SignupOrganization>,
}

/// Self-service signup. The user, their default role, and any organization
/// they register all land in one transaction.
async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<entities::user::Model>, CadreError> {
    use entities::affiliation::Position;

    if req.password != req.password_confirm {
        return Err(CadreError::Validation(
            "Passwords do not match".to_string(),
        ));
    }

    let txn = state.db.begin().await?;

    let user = storage::create_user(
        &txn,
        &state.policy,
        storage::NewUser {
            username: req.username,
            password: req.password,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
        },
    )
    .await?;

    if let Some(role) = storage::get_role_by_name(&txn, "user").await? {
        storage::add_user_role(&txn, user.id, role.id).await?;
    }

    if let Some(org) = req.organization {
        let position: Position = org
            .position
            .parse()
            .map_err(|_| CadreError::Validation(format!("Unknown position '{}'", org.position)))?;
        // The CEO sits above departments and cannot belong to one
        if position == Position::Ceo && org.department.is_some() {
            return Err(CadreError::Validation(
                "A CEO cannot be assigned to a department".to_string(),
            ));
        }

        let organization =
            storage::create_organization(&txn, &org.name, org.email, org.phone, user.id).await?;
        let department_id = match org.department {
            Some(name) => Some(
                storage::create_department(&txn, organization.id, &name)
                    .await?
                    .id,
            ),
            None => None,
        };
        storage::create_affiliation(&txn, user.id, organization.id, department_id, position)
            .await?;
    }

    txn.commit().await?;
    tracing::info!(user_id = user.id, username = %user.username, "user signed up");
    Ok(Json(user))
}

// Users

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    let roles = storage::get_user_roles(&state.db, ctx.user.id).await?;
    Ok(Json(json!({
        "user": ctx.user,
        "roles": roles.into_iter().map(|r| r.name).collect::<Vec<_>>(),
        "session": { "jti": ctx.session.jti, "created_at": ctx.session.created_at },
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct ListUsersQuery {
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListUsersQuery>,
) -> Result<Json<Vec<entities::user::Model>>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    Ok(Json(storage::list_users(&state.db, q.active).await?))
}

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<entities::user::Model>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    let user = storage::get_user(&state.db, id)
        .await?
        .ok_or_else(|| CadreError::NotFound("User".to_string()))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<entities::user::Model>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    let updated = storage::update_user(
        &state.db,
        id,
        storage::UserUpdate {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
        },
    )
    .await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
struct DeleteAccountRequest {
    username: String,
    password: String,
    #[serde(default)]
    confirm: bool,
}

/// Account removal. Deleting your own account requires re-confirming the
/// credentials in the request body; admins can delete other accounts
/// without it.
async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<DeleteAccountRequest>>,
) -> Result<Response, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;

    if ctx.user.id == id {
        let Some(Json(req)) = body else {
            return Err(CadreError::InvalidCredentials);
        };
        if !req.confirm
            || req.username.to_lowercase() != ctx.user.username
            || !credentials::verify_password(&req.password, &ctx.user.password_hash)?
        {
            return Err(CadreError::InvalidCredentials);
        }

        storage::delete_user(&state.db, id).await?;
        tracing::info!(user_id = id, "user deleted their own account");
        return Ok((
            [(header::SET_COOKIE, token::delete_cookie_header())],
            Json(json!({"status": "deleted"})),
        )
            .into_response());
    }

    gate::require(&ctx.capabilities, &[gate::role("admin")])?;
    if storage::get_user(&state.db, id).await?.is_none() {
        return Err(CadreError::NotFound("User".to_string()));
    }
    storage::delete_user(&state.db, id).await?;
    tracing::info!(user_id = id, deleted_by = ctx.user.id, "user deleted");
    Ok(Json(json!({"status": "deleted"})).into_response())
}

#[derive(Debug, Deserialize)]
struct SetPasswordRequest {
    password: String,
    password_confirm: String,
}

async fn set_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<SetPasswordRequest>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    if req.password != req.password_confirm {
        return Err(CadreError::Validation(
            "Passwords do not match".to_string(),
        ));
    }
    storage::set_user_password(&state.db, &state.policy, id, &req.password).await?;
    Ok(Json(json!({"status": "password updated"})))
}

#[derive(Debug, Deserialize)]
struct SetPhotoRequest {
    photo_url: Option<String>,
}

async fn set_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<SetPhotoRequest>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    storage::set_user_photo(&state.db, id, req.photo_url).await?;
    Ok(Json(json!({"status": "photo updated"})))
}

#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    active: bool,
}

async fn set_active(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    storage::set_user_active(&state.db, id, req.active).await?;
    Ok(Json(json!({"status": "updated", "active": req.active})))
}

// Sessions

#[derive(Debug, Deserialize)]
struct SessionPage {
    #[serde(default)]
    offset: u64,
    #[serde(default = "default_session_limit")]
    limit: u64,
}

fn default_session_limit() -> u64 {
    10
}

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(page): Query<SessionPage>,
) -> Result<Json<Vec<entities::session::Model>>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    Ok(Json(
        storage::list_sessions(&state.db, id, page.offset, page.limit).await?,
    ))
}

/// "Log out everywhere else": revokes every active session for the user
/// except the one the caller is using right now.
async fn revoke_other_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    let revoked = storage::revoke_all_except(&state.db, id, &ctx.session.jti).await?;
    Ok(Json(json!({"revoked": revoked.len()})))
}

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, jti)): Path<(i64, String)>,
) -> Result<Json<entities::session::Model>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    let session = storage::get_session(&state.db, &jti, id)
        .await?
        .ok_or_else(|| CadreError::NotFound("Session".to_string()))?;
    Ok(Json(session))
}

async fn revoke_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, jti)): Path<(i64, String)>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![gate::user(id), gate::role("admin")])],
    )?;

    if storage::get_session(&state.db, &jti, id).await?.is_none() {
        return Err(CadreError::NotFound("Session".to_string()));
    }
    storage::revoke_session(&state.db, &jti).await?;
    Ok(Json(json!({"status": "revoked"})))
}

// Roles and grants

#[derive(Debug, Deserialize)]
struct CreateRoleRequest {
    name: String,
    #[serde(default)]
    description: String,
}

async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRoleRequest>,
) -> Result<Json<entities::role::Model>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    Ok(Json(
        storage::create_role(&state.db, &req.name, &req.description).await?,
    ))
}

async fn list_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<entities::role::Model>>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    Ok(Json(storage::list_roles(&state.db).await?))
}

#[derive(Debug, Deserialize)]
struct AddRoleRequest {
    role_id: i64,
}

async fn add_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AddRoleRequest>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    storage::add_user_role(&state.db, id, req.role_id).await?;
    Ok(Json(json!({"status": "role added"})))
}

async fn remove_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, role_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    storage::remove_user_role(&state.db, id, role_id).await?;
    Ok(Json(json!({"status": "role removed"})))
}

#[derive(Debug, Deserialize)]
struct GrantRequest {
    entity_id: i64,
    #[serde(default)]
    can_create: bool,
    #[serde(default)]
    can_edit: bool,
}

async fn grant_user_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<GrantRequest>,
) -> Result<Json<entities::user_entity_permission::Model>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    Ok(Json(
        storage::grant_user_permission(&state.db, id, req.entity_id, req.can_create, req.can_edit)
            .await?,
    ))
}

async fn grant_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<GrantRequest>,
) -> Result<Json<entities::role_entity_permission::Model>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    Ok(Json(
        storage::grant_role_permission(&state.db, id, req.entity_id, req.can_create, req.can_edit)
            .await?,
    ))
}

// Entity registry

#[derive(Debug, Deserialize)]
struct CreateEntityRequest {
    name: String,
}

async fn create_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateEntityRequest>,
) -> Result<Json<entities::entity::Model>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    Ok(Json(storage::create_entity(&state.db, &req.name).await?))
}

async fn list_entities(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<entities::entity::Model>>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;
    gate::require(&ctx.capabilities, &[gate::role("admin")])?;

    Ok(Json(storage::list_entities(&state.db).await?))
}

// Organizations

async fn get_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, CadreError> {
    let ctx = auth::authenticate(&state, &headers).await?;

    let org = storage::get_organization(&state.db, id)
        .await?
        .ok_or_else(|| CadreError::NotFound("Organization".to_string()))?;

    // Members of the organization or admins
    gate::require(
        &ctx.capabilities,
        &[gate::any_of(vec![
            gate::organization(&org.name),
            gate::role("admin"),
        ])],
    )?;

    let departments = storage::list_departments(&state.db, org.id).await?;
    Ok(Json(json!({
        "organization": org,
        "departments": departments,
    })))
}

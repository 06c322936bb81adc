use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::token;

#[derive(Debug, Error, Diagnostic)]
pub enum CadreError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(cadre::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(cadre::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(cadre::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(cadre::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(cadre::jose))]
    Jose(String),

    #[error("{0}")]
    #[diagnostic(code(cadre::validation))]
    Validation(String),

    #[error("{0} not found")]
    #[diagnostic(code(cadre::not_found))]
    NotFound(String),

    #[error("Wrong username or password")]
    #[diagnostic(code(cadre::invalid_credentials))]
    InvalidCredentials,

    #[error("Invalid session")]
    #[diagnostic(code(cadre::invalid_session))]
    InvalidSession,

    #[error("Account is inactive")]
    #[diagnostic(code(cadre::account_inactive))]
    AccountInactive,

    #[error("Not authorized")]
    #[diagnostic(code(cadre::authorization))]
    Authorization,

    #[error("{0}")]
    #[diagnostic(code(cadre::other))]
    Other(String),
}

impl From<josekit::JoseError> for CadreError {
    fn from(value: josekit::JoseError) -> Self {
        CadreError::Jose(value.to_string())
    }
}

impl IntoResponse for CadreError {
    fn into_response(self) -> Response {
        match &self {
            CadreError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            CadreError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            CadreError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            // Authentication failures clear the token cookie so clients drop
            // their stale session.
            CadreError::InvalidSession | CadreError::AccountInactive => (
                StatusCode::UNAUTHORIZED,
                [(header::SET_COOKIE, token::delete_cookie_header())],
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            // Authorization failures leave the session intact and never say
            // which capability was missing.
            CadreError::Authorization => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Not authorized" })),
            )
                .into_response(),
            _ => {
                tracing::error!(error = %self, "unhandled error at request boundary");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

//! Identity and authorization core for a multi-tenant organization backend:
//! credential storage, token-backed sessions, per-request capability
//! resolution, and declarative gating over HTTP.

pub mod auth;
pub mod credentials;
pub mod entities;
pub mod errors;
pub mod jwks;
pub mod principal;
pub mod settings;
pub mod storage;
pub mod token;
pub mod web;

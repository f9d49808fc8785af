mod auth;
mod error;
mod pkce;
mod session;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::SessionManager;
use crate::db::Database;
use crate::identity::IdentityFields;
use crate::pkce::PkceGate;
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    sessions: Arc<SessionManager>,
    identity_fields: IdentityFields,
    password_cost: u32,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        sessions: sessions.clone(),
        gate: PkceGate::new(db.pkce()),
    };

    let pkce_state = pkce::PkceState {
        db: db.clone(),
        sessions: sessions.clone(),
    };

    let session_state = session::SessionState {
        db: db.clone(),
        sessions: sessions.clone(),
        identity_fields: identity_fields.clone(),
        password_cost,
        rate_limit_config,
    };

    let users_state = users::UsersState {
        db,
        sessions,
        identity_fields,
        password_cost,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/pkce", pkce::router(pkce_state))
        .nest("/user", users::router(users_state))
        .merge(session::router(session_state))
}

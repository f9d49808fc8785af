//! Registration, login and logout.
//!
//! Both credential routes short-circuit when the request already carries a
//! valid session, returning that user without touching the body.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use crate::auth::{MaybeAuth, SessionManager, discard_renewed_cookie};
use crate::db::{Database, User, is_unique_violation};
use crate::identity::{IdentityField, IdentityFields, UserIdentity, validate_password};
use crate::impl_has_session_backend;
use crate::password::{hash_password, verify_password};
use crate::rate_limit::{RateLimitConfig, rate_limit_credentials};

#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub sessions: Arc<SessionManager>,
    pub identity_fields: IdentityFields,
    pub password_cost: u32,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_session_backend!(SessionState);

pub fn router(state: SessionState) -> Router {
    let credential_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_credentials,
        ));

    Router::new()
        .route("/logout", post(logout))
        .with_state(state)
        .merge(credential_routes)
}

/// One identifying field plus a password.
#[derive(Deserialize)]
pub(super) struct CredentialsRequest {
    #[serde(flatten)]
    pub identity: UserIdentity,
    pub password: String,
}

#[derive(Serialize)]
struct LogoutResponse {
    success: bool,
}

/// Why a credential check failed.
enum LoginFailure {
    UnknownUser,
    WrongPassword,
}

/// The user behind an already valid session, if it still exists.
async fn current_user(
    state: &SessionState,
    session: Option<&str>,
) -> Result<Option<User>, ApiError> {
    let Some(subject) = session else {
        return Ok(None);
    };
    let user = state
        .db
        .users()
        .get_by_id(subject)
        .await
        .db_err("Failed to get user")?;
    if user.is_none() {
        // The session outlived its user. Its renewed cookie must not be sent.
        discard_renewed_cookie();
    }
    Ok(user)
}

/// Look up a user by one identifying field and check the password.
async fn check_credentials(
    state: &SessionState,
    field: IdentityField,
    value: &str,
    password: &str,
) -> Result<Result<User, LoginFailure>, ApiError> {
    let Some((user, hash)) = state
        .db
        .users()
        .get_credentials(field, value)
        .await
        .db_err("Failed to get user")?
    else {
        return Ok(Err(LoginFailure::UnknownUser));
    };

    let valid = verify_password(password.to_string(), hash)
        .await
        .internal_err("Failed to verify password")?;
    if valid {
        Ok(Ok(user))
    } else {
        Ok(Err(LoginFailure::WrongPassword))
    }
}

/// Respond with the user and a fresh token pair.
fn start_session(state: &SessionState, user: User) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    state
        .sessions
        .set_session_cookies(&mut headers, &user.id)
        .internal_err("Failed to mint session tokens")?;
    Ok((headers, Json(user)).into_response())
}

async fn register(
    State(state): State<SessionState>,
    MaybeAuth(session): MaybeAuth,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    if let Some(user) = current_user(&state, session.as_ref().map(|s| s.subject.as_str())).await? {
        return Ok(Json(user).into_response());
    }

    let Json(payload) = body?;
    let (field, value) = payload
        .identity
        .single(&state.identity_fields)
        .map_err(ApiError::bad_request)?;
    validate_password(&payload.password).map_err(ApiError::bad_request)?;

    let hash = hash_password(payload.password.clone(), state.password_cost)
        .await
        .internal_err("Failed to hash password")?;

    let identity = UserIdentity::only(field, value.clone());
    let user = match state.db.users().create(&identity, &hash).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            // Registering twice with the same credentials logs in.
            match check_credentials(&state, field, &value, &payload.password).await? {
                Ok(user) => user,
                Err(_) => return Err(ApiError::bad_request("User could not be registered.")),
            }
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    info!(user_id = %user.id, "User registered");
    start_session(&state, user)
}

async fn login(
    State(state): State<SessionState>,
    MaybeAuth(session): MaybeAuth,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    if let Some(user) = current_user(&state, session.as_ref().map(|s| s.subject.as_str())).await? {
        return Ok(Json(user).into_response());
    }

    let Json(payload) = body?;
    let (field, value) = payload
        .identity
        .single(&state.identity_fields)
        .map_err(ApiError::bad_request)?;

    match check_credentials(&state, field, &value, &payload.password).await? {
        Ok(user) => {
            info!(user_id = %user.id, "User logged in");
            start_session(&state, user)
        }
        Err(LoginFailure::UnknownUser) => Err(ApiError::not_found("User not found.")),
        Err(LoginFailure::WrongPassword) => {
            warn!(field = field.column(), "Login with incorrect password");
            Err(ApiError::forbidden("User provided incorrect data."))
        }
    }
}

/// Clear both session cookies.
///
/// Tokens are not revoked server-side; see `SessionManager::clear_session_cookies`.
async fn logout(State(state): State<SessionState>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    state.sessions.clear_session_cookies(&mut headers);
    (headers, Json(LogoutResponse { success: true }))
}

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use super::session::CredentialsRequest;
use crate::auth::{Auth, SessionManager, discard_renewed_cookie};
use crate::db::{Database, UserUpdate, is_unique_violation};
use crate::identity::{IdentityFields, UserIdentity, validate_password};
use crate::impl_has_session_backend;
use crate::password::hash_password;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub sessions: Arc<SessionManager>,
    pub identity_fields: IdentityFields,
    pub password_cost: u32,
}

impl_has_session_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(get_me))
        .route("/search", post(search_users))
        .route(
            "/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    #[serde(flatten)]
    identity: UserIdentity,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Serialize)]
struct DeleteUserResponse {
    success: bool,
}

async fn list_users(
    State(state): State<UsersState>,
    Auth(_session): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(Json(users))
}

async fn get_me(
    State(state): State<UsersState>,
    Auth(session): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(&session.subject)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    Ok(Json(user))
}

async fn get_user(
    State(state): State<UsersState>,
    Auth(_session): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(&id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    Ok(Json(user))
}

/// Create a user on behalf of an authenticated caller. No cookies are set.
async fn create_user(
    State(state): State<UsersState>,
    Auth(session): Auth,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = body?;
    let (field, value) = payload
        .identity
        .single(&state.identity_fields)
        .map_err(ApiError::bad_request)?;
    validate_password(&payload.password).map_err(ApiError::bad_request)?;

    let hash = hash_password(payload.password, state.password_cost)
        .await
        .internal_err("Failed to hash password")?;

    let user = state
        .db
        .users()
        .create(&UserIdentity::only(field, value), &hash)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::bad_request("User could not be created.")
            } else {
                ApiError::db_error("Failed to create user", e)
            }
        })?;

    info!(user_id = %user.id, created_by = %session.subject, "User created");
    Ok(Json(user))
}

async fn search_users(
    State(state): State<UsersState>,
    Auth(_session): Auth,
    body: Result<Json<UserIdentity>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(query) = body?;
    let (field, text) = query
        .single_raw(&state.identity_fields)
        .map_err(ApiError::bad_request)?;

    let users = state
        .db
        .users()
        .search(field, text)
        .await
        .db_err("Failed to search users")?;
    Ok(Json(users))
}

async fn update_user(
    State(state): State<UsersState>,
    Auth(session): Auth,
    Path(id): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    if id != session.subject {
        return Err(ApiError::forbidden("You can only modify your own account."));
    }

    let Json(payload) = body?;
    let identity = payload
        .identity
        .normalized(&state.identity_fields)
        .map_err(ApiError::bad_request)?;

    let password_hash = match payload.password.filter(|p| !p.is_empty()) {
        Some(password) => {
            validate_password(&password).map_err(ApiError::bad_request)?;
            Some(
                hash_password(password, state.password_cost)
                    .await
                    .internal_err("Failed to hash password")?,
            )
        }
        None => None,
    };

    if identity.is_empty() && password_hash.is_none() {
        return Err(ApiError::bad_request("Nothing to update."));
    }

    let update = UserUpdate {
        identity,
        password_hash,
    };
    let user = state
        .db
        .users()
        .update(&id, &update)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::bad_request("User could not be updated.")
            } else {
                ApiError::db_error("Failed to update user", e)
            }
        })?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    info!(user_id = %user.id, "User updated");
    Ok(Json(user))
}

/// Delete the caller's own account and end the session.
async fn delete_user(
    State(state): State<UsersState>,
    Auth(session): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if id != session.subject {
        return Err(ApiError::forbidden("You can only delete your own account."));
    }

    let deleted = state
        .db
        .users()
        .delete(&id)
        .await
        .db_err("Failed to delete user")?;
    if !deleted {
        return Err(ApiError::not_found("User not found."));
    }

    info!(user_id = %id, "User deleted");
    discard_renewed_cookie();
    let mut headers = HeaderMap::new();
    state.sessions.clear_session_cookies(&mut headers);
    Ok((headers, Json(DeleteUserResponse { success: true })))
}

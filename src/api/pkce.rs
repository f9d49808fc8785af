use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, Uri},
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, request_host};
use crate::auth::{Auth, SessionManager};
use crate::db::Database;
use crate::impl_has_session_backend;
use crate::pkce::{PkceEnvelope, PkceRequest};

#[derive(Clone)]
pub struct PkceState {
    pub db: Database,
    pub sessions: Arc<SessionManager>,
}

impl_has_session_backend!(PkceState);

pub fn router(state: PkceState) -> Router {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/{id}", get(get_record).delete(delete_record))
        .route("/host/{host}", get(get_record_by_host))
        .with_state(state)
}

/// Store a challenge for the requesting host. Open to unauthenticated
/// clients: this is the first contact.
async fn create_record(
    State(state): State<PkceState>,
    headers: HeaderMap,
    uri: Uri,
    body: Result<Json<PkceEnvelope>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(envelope) = body?;
    let (code_challenge, code_challenge_method) =
        match PkceRequest::try_from(envelope).map_err(ApiError::unprocessable)? {
            PkceRequest::Store {
                code_challenge,
                code_challenge_method,
            } => (code_challenge, code_challenge_method),
            PkceRequest::Check { .. } => {
                return Err(ApiError::unprocessable(
                    "code_challenge and code_challenge_method are required",
                ));
            }
        };
    let host = request_host(&headers, &uri)?;

    let created = state
        .db
        .pkce()
        .insert_if_absent(&host, &code_challenge, &code_challenge_method)
        .await
        .db_err("Failed to store PKCE challenge")?;
    if !created {
        return Err(ApiError::bad_request("PKCE could not be created."));
    }
    info!(origin = %host, "Stored PKCE challenge");

    let record = state
        .db
        .pkce()
        .get_by_host(&host)
        .await
        .db_err("Failed to get PKCE challenge")?
        .ok_or_else(|| ApiError::bad_request("PKCE could not be created."))?;

    Ok(Json(record))
}

async fn list_records(
    State(state): State<PkceState>,
    Auth(_session): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .db
        .pkce()
        .list()
        .await
        .db_err("Failed to list PKCE challenges")?;
    Ok(Json(records))
}

async fn get_record(
    State(state): State<PkceState>,
    Auth(_session): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .pkce()
        .get_by_id(&id)
        .await
        .db_err("Failed to get PKCE challenge")?
        .ok_or_else(|| ApiError::not_found("PKCE not found."))?;
    Ok(Json(record))
}

async fn get_record_by_host(
    State(state): State<PkceState>,
    Auth(_session): Auth,
    Path(host): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .pkce()
        .get_by_host(&host)
        .await
        .db_err("Failed to get PKCE challenge")?
        .ok_or_else(|| ApiError::not_found("PKCE not found."))?;
    Ok(Json(record))
}

async fn delete_record(
    State(state): State<PkceState>,
    Auth(session): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .pkce()
        .delete(&id)
        .await
        .db_err("Failed to delete PKCE challenge")?
        .ok_or_else(|| ApiError::not_found("PKCE not found."))?;
    info!(origin = %record.host, subject = %session.subject, "Deleted PKCE challenge");
    Ok(Json(record))
}

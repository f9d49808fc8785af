//! The PKCE-gated authenticate endpoint.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    routing::post,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{ApiError, request_host};
use crate::auth::{ApiAuthError, SessionManager, append_cookie};
use crate::pkce::{PkceEnvelope, PkceError, PkceGate, PkceRequest};

#[derive(Clone)]
pub struct AuthState {
    pub sessions: Arc<SessionManager>,
    pub gate: PkceGate,
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/", post(authenticate))
        .with_state(state)
}

/// Run the PKCE gate, then resolve the session from cookies.
///
/// A PKCE failure short-circuits before any token is looked at, so a
/// captured request cannot be used to renew a session.
async fn authenticate(
    State(state): State<AuthState>,
    headers: HeaderMap,
    uri: Uri,
    body: Result<Json<PkceEnvelope>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(envelope) = body?;
    let request = PkceRequest::try_from(envelope).map_err(ApiError::unprocessable)?;
    let host = request_host(&headers, &uri)?;

    match state.gate.check_or_store(&host, &request).await {
        Ok(()) => {}
        Err(PkceError::Mismatch) => {
            warn!(origin = %host, "PKCE verification failed");
            return Err(ApiError::forbidden("Send true code_verifier"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to run PKCE gate", e)),
    }

    let session = state.sessions.resolve(&headers).map_err(|e| {
        debug!(origin = %host, error = %e, "Authentication failed");
        ApiAuthError::from(e)
    })?;

    let mut response = Json(session.subject).into_response();
    if let Some(cookie) = session.renewed_access_cookie {
        append_cookie(response.headers_mut(), cookie);
    }
    Ok(response)
}

//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::session::SessionError;

/// Rejection of the authentication extractors.
///
/// Every token failure looks the same to the client. Cookies are left alone:
/// a failed request never sets or clears them.
#[derive(Debug)]
pub enum ApiAuthError {
    NotAuthenticated,
    RenewalFailed,
}

impl ApiAuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiAuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ApiAuthError::RenewalFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiAuthError::NotAuthenticated => "Not authenticated",
            ApiAuthError::RenewalFailed => "Could not renew session",
        }
    }
}

impl From<SessionError> for ApiAuthError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotAuthenticated => ApiAuthError::NotAuthenticated,
            SessionError::Mint(_) => ApiAuthError::RenewalFailed,
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            detail: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                detail: self.message(),
            }),
        )
            .into_response()
    }
}

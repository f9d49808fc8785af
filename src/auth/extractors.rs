//! Axum extractors for authentication.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use super::errors::ApiAuthError;
use super::session::{Session, append_cookie};
use super::state::HasSessionBackend;

tokio::task_local! {
    /// Task-local storage for the renewed access token cookie.
    /// Used to pass the cookie from the auth extractor to the response middleware.
    pub static NEW_ACCESS_TOKEN_COOKIE: RefCell<Option<String>>;
}

/// Hand a renewed access cookie to `add_access_token_cookie`.
fn stash_renewed_cookie(session: &Session) {
    if let Some(cookie) = &session.renewed_access_cookie {
        let _ = NEW_ACCESS_TOKEN_COOKIE.try_with(|cell| {
            cell.borrow_mut().replace(cookie.clone());
        });
    }
}

/// Drop a renewed access cookie that has not been written yet.
/// Used by handlers that end the session themselves.
pub fn discard_renewed_cookie() {
    let _ = NEW_ACCESS_TOKEN_COOKIE.try_with(|cell| cell.borrow_mut().take());
}

/// Extractor for endpoints that require authentication.
/// Tries the access token, then renews through the refresh token.
/// Returns JSON errors.
pub struct Auth(pub Session);

impl<S> FromRequestParts<S> for Auth
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = state.sessions().resolve(&parts.headers)?;
        stash_renewed_cookie(&session);
        Ok(Auth(session))
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints that work both authenticated and unauthenticated.
pub struct MaybeAuth(pub Option<Session>);

impl<S> FromRequestParts<S> for MaybeAuth
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = state.sessions().resolve(&parts.headers).ok();
        if let Some(session) = &session {
            stash_renewed_cookie(session);
        }
        Ok(MaybeAuth(session))
    }
}

/// Middleware that writes a renewed access cookie onto the response.
pub async fn add_access_token_cookie(request: Request, next: Next) -> Response {
    NEW_ACCESS_TOKEN_COOKIE
        .scope(RefCell::new(None), async move {
            let mut response = next.run(request).await;
            let cookie = NEW_ACCESS_TOKEN_COOKIE.with(|cell| cell.borrow_mut().take());
            if let Some(cookie) = cookie {
                append_cookie(response.headers_mut(), cookie);
            }
            response
        })
        .await
}

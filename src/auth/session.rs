//! Session resolution from request cookies.
//!
//! A session is never stored. It is recomputed on every request from the two
//! token cookies: the access token is tried first, then the refresh token,
//! which silently mints a replacement access token. The refresh cookie itself
//! is never rewritten during renewal.

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, header};
use tracing::{debug, error};

use super::cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, expired_cookie, get_cookie, session_cookie,
};
use crate::jwt::{JwtError, TokenCodec, TokenVerdict};

/// An authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Subject id asserted by the token that authenticated the request.
    pub subject: String,
    /// Set-Cookie value for a freshly minted access token, when the request
    /// was authenticated through the refresh token.
    pub renewed_access_cookie: Option<String>,
}

impl Session {
    pub fn was_renewed(&self) -> bool {
        self.renewed_access_cookie.is_some()
    }
}

#[derive(Debug)]
pub enum SessionError {
    /// Neither token is present and valid.
    NotAuthenticated,
    /// The refresh token was valid but a new access token could not be minted.
    Mint(JwtError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotAuthenticated => write!(f, "Not authenticated"),
            SessionError::Mint(e) => write!(f, "Failed to renew access token: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// Mints, verifies and renews the access/refresh token pair.
pub struct SessionManager {
    access: TokenCodec,
    refresh: TokenCodec,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(
        access: TokenCodec,
        refresh: TokenCodec,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
        secure_cookies: bool,
    ) -> Self {
        Self {
            access,
            refresh,
            access_lifetime,
            refresh_lifetime,
            secure_cookies,
        }
    }

    pub fn access_codec(&self) -> &TokenCodec {
        &self.access
    }

    pub fn refresh_codec(&self) -> &TokenCodec {
        &self.refresh
    }

    /// Resolve the session carried by a request's cookies.
    ///
    /// Never touches cookies on failure. A dead refresh token is final for
    /// the request.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        if let Some(token) = get_cookie(headers, ACCESS_COOKIE_NAME) {
            if let TokenVerdict::Valid(claims) = self.access.verify(token) {
                return Ok(Session {
                    subject: claims.id,
                    renewed_access_cookie: None,
                });
            }
        }

        let token = get_cookie(headers, REFRESH_COOKIE_NAME).ok_or(SessionError::NotAuthenticated)?;
        let claims = self
            .refresh
            .verify(token)
            .into_claims()
            .ok_or(SessionError::NotAuthenticated)?;

        let access_token = self
            .access
            .mint(claims.payload(), self.access_lifetime)
            .map_err(|e| {
                error!(error = %e, "Failed to mint access token during renewal");
                SessionError::Mint(e)
            })?;
        debug!(subject = %claims.id, "Renewed access token");

        Ok(Session {
            subject: claims.id,
            renewed_access_cookie: Some(session_cookie(
                ACCESS_COOKIE_NAME,
                &access_token,
                self.access_lifetime,
                self.secure_cookies,
            )),
        })
    }

    /// Mint a fresh token pair for `subject` and attach both cookies.
    pub fn set_session_cookies(
        &self,
        headers: &mut HeaderMap,
        subject: &str,
    ) -> Result<(), JwtError> {
        let access_token = self.access.mint_subject(subject, self.access_lifetime)?;
        let refresh_token = self.refresh.mint_subject(subject, self.refresh_lifetime)?;

        append_cookie(
            headers,
            session_cookie(
                ACCESS_COOKIE_NAME,
                &access_token,
                self.access_lifetime,
                self.secure_cookies,
            ),
        );
        append_cookie(
            headers,
            session_cookie(
                REFRESH_COOKIE_NAME,
                &refresh_token,
                self.refresh_lifetime,
                self.secure_cookies,
            ),
        );
        Ok(())
    }

    /// Instruct the client to drop both cookies.
    ///
    /// Tokens are stateless: a refresh token copied before this call stays
    /// valid until its own `exp`. There is no server-side revocation list.
    pub fn clear_session_cookies(&self, headers: &mut HeaderMap) {
        append_cookie(headers, expired_cookie(ACCESS_COOKIE_NAME, self.secure_cookies));
        append_cookie(headers, expired_cookie(REFRESH_COOKIE_NAME, self.secure_cookies));
    }
}

/// Append a Set-Cookie header. Values built from token strings are always
/// valid header values; anything else is dropped.
pub fn append_cookie(headers: &mut HeaderMap, cookie: String) {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.append(header::SET_COOKIE, value);
    }
}

pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod db;
pub mod identity;
pub mod jwt;
pub mod password;
pub mod pkce;
pub mod rate_limit;

use api::create_api_router;
use auth::{SessionManager, add_access_token_cookie};
use axum::{Router, middleware};
use clock::Clock;
use db::Database;
use identity::IdentityFields;
use jsonwebtoken::Algorithm;
use jwt::{TokenCodec, TokenKind};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Base path for the service (e.g., "/auth-service")
    pub base: Option<String>,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from `access_secret`
    pub refresh_secret: Vec<u8>,
    /// HMAC algorithm used for both token kinds
    pub algorithm: Algorithm,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Identifying fields accepted for users
    pub identity_fields: IdentityFields,
    /// bcrypt cost for new password hashes
    pub password_cost: u32,
    /// Login and register attempts allowed per client IP per minute
    pub login_rate_per_minute: u32,
    /// Take the client IP from X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    /// Time source for minting and verifying tokens
    pub clock: Arc<dyn Clock>,
}

/// Build the session manager described by `config`.
pub fn session_manager(config: &ServerConfig) -> SessionManager {
    let access = TokenCodec::new(
        TokenKind::Access,
        &config.access_secret,
        config.algorithm,
        config.clock.clone(),
    );
    let refresh = TokenCodec::new(
        TokenKind::Refresh,
        &config.refresh_secret,
        config.algorithm,
        config.clock.clone(),
    );
    SessionManager::new(
        access,
        refresh,
        config.access_lifetime,
        config.refresh_lifetime,
        config.secure_cookies,
    )
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let sessions = Arc::new(session_manager(config));
    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.login_rate_per_minute,
        config.trust_forwarded_for,
    ));

    let api_router = create_api_router(
        config.db.clone(),
        sessions,
        config.identity_fields.clone(),
        config.password_cost,
        rate_limit_config,
    )
    .layer(middleware::from_fn(add_access_token_cookie));

    match config.base.as_deref() {
        Some(base) if !base.is_empty() && base != "/" => Router::new().nest(base, api_router),
        _ => api_router,
    }
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

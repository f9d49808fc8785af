#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use authsvc::auth::{SessionManager, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};
use authsvc::clock::ManualClock;
use authsvc::db::Database;
use authsvc::identity::IdentityFields;
use authsvc::{ServerConfig, create_app, session_manager};
use axum::{
    Router,
    body::Body,
    Extension,
    extract::ConnectInfo,
    http::{Request, Response, header, request::Builder},
};
use jsonwebtoken::Algorithm;
use serde_json::Value;
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";
pub const ACCESS_LIFETIME: Duration = Duration::from_secs(15 * 60);
pub const REFRESH_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const TEST_HOST: &str = "client.example";
pub const PASSWORD: &str = "Password1";

// RFC 7636, Appendix B.
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub sessions: SessionManager,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build the app on an in-memory database, letting the caller adjust the config.
    pub async fn with_config(adjust: impl FnOnce(&mut ServerConfig)) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let mut config = ServerConfig {
            base: None,
            db: db.clone(),
            access_secret: ACCESS_SECRET.to_vec(),
            refresh_secret: REFRESH_SECRET.to_vec(),
            algorithm: Algorithm::HS256,
            access_lifetime: ACCESS_LIFETIME,
            refresh_lifetime: REFRESH_LIFETIME,
            secure_cookies: false,
            identity_fields: IdentityFields::default(),
            password_cost: 4,
            login_rate_per_minute: 1000,
            trust_forwarded_for: false,
            clock: clock.clone(),
        };
        adjust(&mut config);

        let sessions = session_manager(&config);
        let app = create_app(&config).layer(Extension(ConnectInfo(SocketAddr::from((
            [127, 0, 0, 1],
            40_000,
        )))));

        Self {
            app,
            db,
            clock,
            sessions,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    pub fn access_token(&self, subject: &str) -> String {
        self.sessions
            .access_codec()
            .mint_subject(subject, ACCESS_LIFETIME)
            .unwrap()
    }

    pub fn refresh_token(&self, subject: &str) -> String {
        self.sessions
            .refresh_codec()
            .mint_subject(subject, REFRESH_LIFETIME)
            .unwrap()
    }

    /// Store the RFC 7636 challenge for the test host.
    pub async fn seed_pkce(&self) {
        self.db
            .pkce()
            .insert_if_absent(TEST_HOST, CHALLENGE, "S256")
            .await
            .unwrap();
    }

    /// Register a user and return its id and a Cookie header for its session.
    pub async fn register(&self, username: &str) -> (String, String) {
        let response = self
            .send(json(
                request("POST", "/register"),
                serde_json::json!({ "username": username, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), 200);
        let cookies = session_cookie_header(&response);
        let body = body_json(response).await;
        (body["id"].as_str().unwrap().to_string(), cookies)
    }
}

/// Request builder with the test Host header set.
pub fn request(method: &str, uri: &str) -> Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, TEST_HOST)
}

pub fn json(builder: Builder, body: Value) -> Request<Body> {
    builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty(builder: Builder) -> Request<Body> {
    builder.body(Body::empty()).unwrap()
}

pub fn cookie_header(access: Option<&str>, refresh: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(token) = access {
        parts.push(format!("{}={}", ACCESS_COOKIE_NAME, token));
    }
    if let Some(token) = refresh {
        parts.push(format!("{}={}", REFRESH_COOKIE_NAME, token));
    }
    parts.join("; ")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the named cookie in the response's Set-Cookie headers.
pub fn set_cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?.to_string();
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Cookie header replaying the session cookies a response set.
pub fn session_cookie_header(response: &Response<Body>) -> String {
    cookie_header(
        set_cookie_value(response, ACCESS_COOKIE_NAME).as_deref(),
        set_cookie_value(response, REFRESH_COOKIE_NAME).as_deref(),
    )
}

//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;
use std::time::Duration;

use crate::ServerConfig;
use crate::clock::SystemClock;
use crate::db::Database;
use crate::identity::{IdentityField, IdentityFields};
use clap::Parser;
use jsonwebtoken::Algorithm;
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;

pub const ACCESS_SECRET_ENV: &str = "ACCESS_SECRET_KEY";
pub const REFRESH_SECRET_ENV: &str = "REFRESH_SECRET_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "authsvc",
    about = "Session token service with PKCE-gated authentication"
)]
pub struct Args {
    /// Base path prefix for every route (e.g. "/auth-service")
    #[arg(short, long, value_parser = validate_base_path)]
    pub base: Option<String>,

    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "authsvc.db")]
    pub database: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXP", default_value = "15",
        value_parser = clap::value_parser!(u64).range(1..))]
    pub access_token_exp: u64,

    /// Refresh token lifetime in days
    #[arg(long, env = "REFRESH_TOKEN_EXP", default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_token_exp: u64,

    /// Token signing algorithm (HS256, HS384 or HS512)
    #[arg(long, env = "ALGORITHM", default_value = "HS256", value_parser = parse_algorithm)]
    pub algorithm: Algorithm,

    /// Path to file containing the access token secret. Prefer the ACCESS_SECRET_KEY env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the REFRESH_SECRET_KEY env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Identifying fields users may register and log in with
    #[arg(long, value_enum, value_delimiter = ',', default_value = "username")]
    pub identity_fields: Vec<IdentityField>,

    /// bcrypt cost for password hashes
    #[arg(long, default_value = "12",
        value_parser = clap::value_parser!(u32).range(4..=31))]
    pub password_cost: u32,

    /// Login and register attempts allowed per client IP per minute
    #[arg(long, default_value = "10",
        value_parser = clap::value_parser!(u32).range(1..))]
    pub login_rate_per_minute: u32,

    /// Take the client IP from the last X-Forwarded-For entry (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Set the Secure flag on session cookies (use with HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_base_path(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Ok(String::new());
    }

    if !s.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Base path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Base path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Accept only HMAC algorithms: both secrets are shared symmetric keys.
pub fn parse_algorithm(s: &str) -> Result<Algorithm, String> {
    match s.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(format!(
            "Unsupported algorithm '{}'. Use HS256, HS384 or HS512",
            s
        )),
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<Vec<u8>> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            env = %env_var,
            "Secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            env = %env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret.into_bytes())
}

/// Load both secrets and check they differ.
pub fn load_secrets(args: &Args) -> Option<(Vec<u8>, Vec<u8>)> {
    load_secret_pair(ACCESS_SECRET_ENV, REFRESH_SECRET_ENV, args)
}

fn load_secret_pair(
    access_env: &str,
    refresh_env: &str,
    args: &Args,
) -> Option<(Vec<u8>, Vec<u8>)> {
    let access = load_secret(access_env, args.access_secret_file.as_deref())?;
    let refresh = load_secret(refresh_env, args.refresh_secret_file.as_deref())?;
    if access == refresh {
        error!("Access and refresh secrets must be different");
        return None;
    }
    Some((access, refresh))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
) -> ServerConfig {
    ServerConfig {
        base: args.base.clone().filter(|b| !b.is_empty()),
        db,
        access_secret,
        refresh_secret,
        algorithm: args.algorithm,
        access_lifetime: Duration::from_secs(args.access_token_exp * 60),
        refresh_lifetime: Duration::from_secs(args.refresh_token_exp * 24 * 60 * 60),
        secure_cookies: args.secure_cookies,
        identity_fields: IdentityFields::new(&args.identity_fields),
        password_cost: args.password_cost,
        login_rate_per_minute: args.login_rate_per_minute,
        trust_forwarded_for: args.trust_forwarded_for,
        clock: Arc::new(SystemClock),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

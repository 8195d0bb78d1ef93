//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::lifecycle::TokenPolicy;
use crate::mailer::LogMailer;
use crate::password::DEFAULT_BCRYPT_COST;
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Environment variable holding the access token secret.
pub const ACCESS_SECRET_ENV: &str = "JWT_SECRET_KEY";

/// Environment variable holding the refresh token secret.
pub const REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokenward",
    about = "Email and password sign-in with rotating refresh sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "tokenward.db")]
    pub database: String,

    /// Deployment environment. Cookies get the Secure flag in production
    #[arg(long, env = "ENVIRONMENT", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Access token lifetime (bare number = hours, or e.g. 90s, 15m, 2h, 7d)
    #[arg(long, env = "JWT_TOKEN_DURATION", default_value = "15m", value_parser = parse_duration)]
    pub access_token_ttl: Duration,

    /// Refresh token and session lifetime (same syntax as --access-token-ttl)
    #[arg(long, env = "JWT_REFRESH_TOKEN_DURATION", default_value = "168h", value_parser = parse_duration)]
    pub refresh_token_ttl: Duration,

    /// Path to file containing the access token secret. Prefer JWT_SECRET_KEY
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer JWT_REFRESH_SECRET_KEY
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Block a session when an already-rotated refresh token is presented
    #[arg(long)]
    pub revoke_on_reuse: bool,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// bcrypt cost factor for new password hashes
    #[arg(long, default_value_t = DEFAULT_BCRYPT_COST, value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Longest accepted token lifetime (10 years).
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Parse a lifetime such as `15m`, `168h`, `30s` or `7d`.
/// A bare number is taken as hours.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit_secs) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 60 * 60),
        Some((i, 'd')) => (&s[..i], 24 * 60 * 60),
        Some(_) => (s, 60 * 60),
        None => return Err("Duration cannot be empty".to_string()),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;
    if value == 0 {
        return Err(format!("Duration must be positive: {}", s));
    }

    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .filter(|d| *d <= MAX_TOKEN_TTL)
        .ok_or_else(|| format!("Duration is too large: {}", s))
}

/// Check that the refresh lifetime outlasts the access lifetime; otherwise
/// an expired access token could never be silently refreshed.
pub fn validate_token_ttls(access: Duration, refresh: Duration) -> Result<(), String> {
    if refresh <= access {
        return Err(format!(
            "Refresh token lifetime ({}s) must be longer than access token lifetime ({}s)",
            refresh.as_secs(),
            access.as_secs()
        ));
    }
    Ok(())
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
    if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        return Some(secret.into_bytes());
    }

    if let Some(path) = secret_file {
        return match std::fs::read_to_string(path) {
            Ok(content) => Some(content.trim().as_bytes().to_vec()),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                None
            }
        };
    }

    error!(
        env_var = %env_var,
        "Signing secret is required. Set the environment variable (recommended) or use the matching --*-secret-file flag"
    );
    None
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret,
        refresh_secret,
        policy: TokenPolicy {
            access_ttl: args.access_token_ttl,
            refresh_ttl: args.refresh_token_ttl,
            revoke_on_reuse: args.revoke_on_reuse,
        },
        secure_cookies: args.environment == Environment::Production,
        trust_forwarded_for: args.trust_forwarded_for,
        rate_limits: RateLimitConfig::new(args.trust_forwarded_for),
        mailer: Arc::new(LogMailer),
        bcrypt_cost: args.bcrypt_cost,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(15 * 60)));
        assert_eq!(parse_duration("168h"), Ok(Duration::from_secs(168 * 3600)));
        assert_eq!(parse_duration("7d"), Ok(Duration::from_secs(7 * 86400)));
    }

    #[test]
    fn test_parse_duration_bare_number_is_hours() {
        assert_eq!(parse_duration("24"), Ok(Duration::from_secs(24 * 3600)));
    }

    #[test]
    fn test_parse_duration_rejects_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0m").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("-5m").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("99999999999999999999d").is_err());
        assert!(parse_duration("18446744073709551615s").is_err());
    }

    #[test]
    fn test_parse_duration_caps_lifetime() {
        assert_eq!(parse_duration("3650d"), Ok(MAX_TOKEN_TTL));
        assert!(parse_duration("3651d").is_err());
    }

    #[test]
    fn test_refresh_must_outlast_access() {
        let minute = Duration::from_secs(60);
        assert!(validate_token_ttls(minute, minute * 60).is_ok());
        assert!(validate_token_ttls(minute, minute).is_err());
        assert!(validate_token_ttls(minute * 60, minute).is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["tokenward"]).unwrap();
        assert_eq!(args.access_token_ttl, Duration::from_secs(15 * 60));
        assert_eq!(args.refresh_token_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(args.environment, Environment::Development);
        assert!(!args.revoke_on_reuse);
        assert_eq!(args.bcrypt_cost, DEFAULT_BCRYPT_COST);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "tokenward",
            "--access-token-ttl",
            "5m",
            "--refresh-token-ttl",
            "2",
            "--environment",
            "production",
            "--revoke-on-reuse",
        ])
        .unwrap();
        assert_eq!(args.access_token_ttl, Duration::from_secs(300));
        assert_eq!(args.refresh_token_ttl, Duration::from_secs(7200));
        assert_eq!(args.environment, Environment::Production);
        assert!(args.revoke_on_reuse);
    }
}

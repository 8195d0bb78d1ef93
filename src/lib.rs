pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod lifecycle;
pub mod mailer;
pub mod password;
pub mod rate_limit;
pub mod registration;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::{KeyError, TokenCodec};
use lifecycle::{AuthService, TokenPolicy};
use mailer::VerificationMailer;
use password::{BcryptHasher, PasswordHasher};
use rate_limit::RateLimitConfig;
use registration::Registration;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens; must differ from the access secret
    pub refresh_secret: Vec<u8>,
    /// Token lifetimes and reuse handling
    pub policy: TokenPolicy,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Take the client IP from X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    pub rate_limits: RateLimitConfig,
    /// Delivery of email verification codes
    pub mailer: Arc<dyn VerificationMailer>,
    pub bcrypt_cost: u32,
}

/// Build the lifecycle service backed by the configured database.
pub fn create_auth_service(config: &ServerConfig) -> Result<AuthService, KeyError> {
    let codec = Arc::new(TokenCodec::new(
        &config.access_secret,
        &config.refresh_secret,
    )?);
    let passwords: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(config.bcrypt_cost));

    Ok(AuthService::new(
        codec,
        Arc::new(config.db.sessions()),
        Arc::new(config.db.accounts()),
        passwords,
        config.policy,
    ))
}

/// Create the application router with the given configuration.
///
/// Fails when the signing secrets are unusable.
pub fn create_app(config: &ServerConfig) -> Result<Router, KeyError> {
    let auth = create_auth_service(config)?;

    let registration = Registration::new(
        config.db.clone(),
        Arc::new(BcryptHasher::new(config.bcrypt_cost)),
        config.mailer.clone(),
    );

    let api_router = create_api_router(
        auth,
        registration,
        config.secure_cookies,
        config.trust_forwarded_for,
        Arc::new(config.rate_limits.clone()),
    );

    Ok(Router::new().nest("/api", api_router))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(app: Router, listener: TcpListener) -> Result<(), std::io::Error> {
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Error starting a background server.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to bind: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), StartError> {
    let app = create_app(&config)?;

    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(app, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}

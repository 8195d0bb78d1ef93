//! Scheduled cleanup of expired sessions, verification codes and reset tokens.

use crate::db::Database;
use crate::jwt::unix_now;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    let now = unix_now();

    // Sessions past their refresh token expiry can never be refreshed again
    match db.sessions().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }

    match db.email_otps().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired verification codes", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up verification codes: {}", e),
    }

    match db.password_resets().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired password resets", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up password resets: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}

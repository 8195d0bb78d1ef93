//! Account email delivery seam.
//!
//! Actual delivery (SMTP, templates) lives outside this crate. The bundled
//! [`LogMailer`] only records the send in the log.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
#[error("failed to send email to {to}: {reason}")]
pub struct MailError {
    pub to: String,
    pub reason: String,
}

#[async_trait]
pub trait VerificationMailer: Send + Sync {
    /// Deliver a one-time verification code.
    async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        expires_in_minutes: u64,
    ) -> Result<(), MailError>;

    /// Deliver a password reset token.
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_in_minutes: u64,
    ) -> Result<(), MailError>;
}

/// Mailer that notes each send in the log instead of delivering it.
///
/// Secrets are only written at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl VerificationMailer for LogMailer {
    async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        expires_in_minutes: u64,
    ) -> Result<(), MailError> {
        info!(to = %to, expires_in_minutes, "Verification code issued");
        debug!(to = %to, code = %code, "Verification code");
        Ok(())
    }

    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_in_minutes: u64,
    ) -> Result<(), MailError> {
        info!(to = %to, expires_in_minutes, "Password reset issued");
        debug!(to = %to, token = %token, "Password reset token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_mailer_keeps_secrets_out_of_info_logs() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(async {
                LogMailer
                    .send_verification_code("ivy@example.com", "482913", 15)
                    .await
                    .unwrap();
                LogMailer
                    .send_password_reset("ivy@example.com", "reset-secret-value", 60)
                    .await
                    .unwrap();
            });
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Verification code issued"));
        assert!(output.contains("Password reset issued"));
        assert!(!output.contains("482913"));
        assert!(!output.contains("reset-secret-value"));
    }
}

use async_trait::async_trait;
use tracing::info;

/// Everything needed to tell an account holder how to reset their password.
#[derive(Debug, Clone)]
pub struct ResetEmail {
    pub recipient: String,
    pub token: String,
    pub reset_url: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, email: ResetEmail) -> anyhow::Result<()>;
}

/// Writes outgoing mail to the log instead of a mail server.
#[derive(Debug, Clone, Default)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_password_reset(&self, email: ResetEmail) -> anyhow::Result<()> {
        info!(
            recipient = %email.recipient,
            reset_url = %email.reset_url,
            subject = "Password Reset",
            "password reset email"
        );
        Ok(())
    }
}

//! Password reset token lifecycle: issue, validate, consume.
//!
//! A token is 20 bytes from a secure source, hex encoded. It lives on the
//! account record next to its expiry and is cleared once used.

use std::sync::Arc;

use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::repo_types::{Account, ResetToken};
use crate::clock::Clock;

pub const RESET_TOKEN_BYTES: usize = 20;
pub const RESET_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("no account with that identity")]
    NotFound,
    #[error("password reset is invalid or has expired")]
    InvalidOrExpired,
    #[error("account store failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// Persistence the reset flow needs from the account table.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_identity(&self, email: &str) -> anyhow::Result<Option<Account>>;

    /// Account holding `token` whose expiry is strictly after `now`.
    async fn find_by_token_not_expired(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Account>>;

    /// Stores `reset` on the account, replacing any earlier token. Only the
    /// reset fields are written.
    async fn set_reset(&self, account_id: Uuid, reset: &ResetToken) -> anyhow::Result<()>;

    /// Writes `account`'s credentials and clears its reset token, but only if
    /// the stored token still equals `token` and is unexpired at `now`.
    /// Returns `None` when the condition no longer holds.
    async fn consume_token(
        &self,
        account: &Account,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Account>>;
}

/// Secure random bytes.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

#[derive(Clone)]
pub struct TokenLifecycle {
    store: Arc<dyn AccountStore>,
    entropy: Arc<dyn EntropySource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TokenLifecycle {
    pub fn new(
        store: Arc<dyn AccountStore>,
        entropy: Arc<dyn EntropySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            entropy,
            clock,
            ttl: Duration::seconds(RESET_TOKEN_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn generate_token(&self) -> String {
        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        self.entropy.fill(&mut bytes);
        hex::encode(bytes)
    }

    /// Issues a fresh token for the account identified by `email`, replacing
    /// any earlier one. Returns the account and the raw token for delivery.
    pub async fn issue(&self, email: &str) -> Result<(Account, String), ResetError> {
        let account = self
            .store
            .find_by_identity(email)
            .await
            .map_err(ResetError::Persistence)?
            .ok_or(ResetError::NotFound)?;

        let token = self.generate_token();
        let reset = ResetToken {
            token: token.clone(),
            expires_at: self.clock.now() + self.ttl,
        };
        self.store
            .set_reset(account.id, &reset)
            .await
            .map_err(ResetError::Persistence)?;
        let updated = account.with_reset(reset);

        info!(account_id = %updated.id, "password reset token issued");
        Ok((updated, token))
    }

    /// Checks a presented token without using it up.
    pub async fn validate(&self, token: &str) -> Result<Account, ResetError> {
        let account = self
            .store
            .find_by_token_not_expired(token, self.clock.now())
            .await
            .map_err(ResetError::Persistence)?
            .ok_or(ResetError::InvalidOrExpired)?;
        debug!(account_id = %account.id, "password reset token valid");
        Ok(account)
    }

    /// Sets new credentials and clears the token. A token can be consumed once.
    pub async fn consume(&self, token: &str, password_hash: String) -> Result<Account, ResetError> {
        let now = self.clock.now();
        let account = self
            .store
            .find_by_token_not_expired(token, now)
            .await
            .map_err(ResetError::Persistence)?
            .ok_or(ResetError::InvalidOrExpired)?;

        let updated = account.with_new_password(password_hash);
        match self
            .store
            .consume_token(&updated, token, now)
            .await
            .map_err(ResetError::Persistence)?
        {
            Some(saved) => {
                info!(account_id = %saved.id, "password reset completed");
                Ok(saved)
            }
            None => {
                warn!(account_id = %account.id, "reset token consumed concurrently");
                Err(ResetError::InvalidOrExpired)
            }
        }
    }
}

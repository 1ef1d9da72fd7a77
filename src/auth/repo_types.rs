use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Outstanding password reset credential. Token and expiry only ever exist together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Account record as the rest of the app sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,                   // unique account ID
    pub email: String,              // login identity
    #[serde(skip_serializing)]
    pub password_hash: String,      // Argon2 hash, not exposed in JSON
    #[serde(skip_serializing)]
    pub reset: Option<ResetToken>,  // zero-or-one live reset token
    pub created_at: OffsetDateTime, // creation timestamp
}

impl Account {
    /// Copy of this account carrying a freshly issued reset token.
    pub fn with_reset(&self, reset: ResetToken) -> Self {
        Self {
            reset: Some(reset),
            ..self.clone()
        }
    }

    /// Copy of this account with new credentials and no reset token.
    pub fn with_new_password(&self, password_hash: String) -> Self {
        Self {
            password_hash,
            reset: None,
            ..self.clone()
        }
    }
}

/// Flat row of the `users` table.
#[derive(Debug, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub reset_token: Option<String>,
    pub reset_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        let reset = match (r.reset_token, r.reset_expires) {
            (Some(token), Some(expires_at)) => Some(ResetToken { token, expires_at }),
            _ => None,
        };
        Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            reset,
            created_at: r.created_at,
        }
    }
}

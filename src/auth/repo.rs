use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{Account, AccountRow, ResetToken};
use crate::auth::reset::AccountStore;

const ACCOUNT_COLUMNS: &str =
    "id, email, password_hash, reset_token, reset_expires, created_at";

/// `users` table access.
#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Find an account by id.
    pub async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find account by id")?;
        Ok(row.map(Account::from))
    }

    /// Create a new account with hashed password.
    pub async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .context("insert account")?;
        Ok(row.into())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_identity(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find account by email")?;
        Ok(row.map(Account::from))
    }

    async fn find_by_token_not_expired(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
              FROM users
             WHERE reset_token = $1
               AND reset_expires > $2
            "#
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("find account by reset token")?;
        Ok(row.map(Account::from))
    }

    async fn set_reset(&self, account_id: Uuid, reset: &ResetToken) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET reset_token = $2,
                   reset_expires = $3
             WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(&reset.token)
        .bind(reset.expires_at)
        .execute(&self.db)
        .await
        .context("store reset token")?;
        Ok(())
    }

    async fn consume_token(
        &self,
        account: &Account,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Account>> {
        // Clearing and checking happen in one statement, so only one caller wins.
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE users
               SET password_hash = $2,
                   reset_token = NULL,
                   reset_expires = NULL
             WHERE id = $1
               AND reset_token = $3
               AND reset_expires > $4
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.id)
        .bind(&account.password_hash)
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("consume reset token")?;
        Ok(row.map(Account::from))
    }
}

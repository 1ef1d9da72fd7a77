//! In-memory `AccountStore` for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{Account, ResetToken};
use crate::auth::reset::AccountStore;

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
    fail_save: AtomicBool,
    fail_lookup: AtomicBool,
}

impl MemoryAccountStore {
    pub fn insert(&self, email: &str, password_hash: &str) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            reset: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(account.id, account.clone());
        account
    }

    pub fn get(&self, id: Uuid) -> Option<Account> {
        self.accounts.lock().unwrap().get(&id).cloned()
    }

    pub fn by_email(&self, email: &str) -> Option<Account> {
        self.accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.email == email)
            .cloned()
    }

    pub fn fail_next_save(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_lookup(&self) {
        self.fail_lookup.store(true, Ordering::SeqCst);
    }

    fn check_fail(&self) -> anyhow::Result<()> {
        if self.fail_save.swap(false, Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        Ok(())
    }

    fn check_lookup(&self) -> anyhow::Result<()> {
        if self.fail_lookup.swap(false, Ordering::SeqCst) {
            anyhow::bail!("lookup timed out");
        }
        Ok(())
    }
}

fn holds_live_token(account: &Account, token: &str, now: OffsetDateTime) -> bool {
    account
        .reset
        .as_ref()
        .is_some_and(|r| r.token == token && r.expires_at > now)
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_identity(&self, email: &str) -> anyhow::Result<Option<Account>> {
        self.check_lookup()?;
        Ok(self.by_email(email))
    }

    async fn find_by_token_not_expired(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Account>> {
        self.check_lookup()?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| holds_live_token(a, token, now))
            .cloned())
    }

    async fn set_reset(&self, account_id: Uuid, reset: &ResetToken) -> anyhow::Result<()> {
        self.check_fail()?;
        if let Some(stored) = self.accounts.lock().unwrap().get_mut(&account_id) {
            stored.reset = Some(reset.clone());
        }
        Ok(())
    }

    async fn consume_token(
        &self,
        account: &Account,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Account>> {
        self.check_fail()?;
        let mut accounts = self.accounts.lock().unwrap();
        let Some(stored) = accounts.get_mut(&account.id) else {
            return Ok(None);
        };
        if !holds_live_token(stored, token, now) {
            return Ok(None);
        }
        stored.password_hash = account.password_hash.clone();
        stored.reset = None;
        Ok(Some(stored.clone()))
    }
}

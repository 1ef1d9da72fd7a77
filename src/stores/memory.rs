//! In-memory `StoreRepo` with a unique slug rule, for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::stores::repo::{StoreRepo, WriteError};
use crate::stores::repo_types::Store;
use crate::stores::slug::SlugIndex;

#[derive(Default)]
pub struct MemoryStoreRepo {
    stores: Mutex<HashMap<Uuid, Store>>,
    /// Number of upcoming writes that lose their slug to a simulated concurrent writer.
    races: AtomicUsize,
}

impl MemoryStoreRepo {
    /// Adds a bare record holding `slug`, returning its id.
    pub fn insert_slug(&self, slug: &str) -> Uuid {
        let store = Store {
            id: Uuid::new_v4(),
            name: slug.to_string(),
            slug: slug.to_string(),
            description: None,
            tags: Vec::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let id = store.id;
        self.stores.lock().unwrap().insert(id, store);
        id
    }

    pub fn lose_next_writes(&self, n: usize) {
        self.races.store(n, Ordering::SeqCst);
    }

    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self
            .stores
            .lock()
            .unwrap()
            .values()
            .map(|s| s.slug.clone())
            .collect();
        slugs.sort();
        slugs
    }

    fn write(&self, store: &Store) -> Result<Store, WriteError> {
        let raced = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if raced {
            self.insert_slug(&store.slug);
            return Err(WriteError::SlugTaken);
        }

        let mut stores = self.stores.lock().unwrap();
        if stores
            .values()
            .any(|s| s.id != store.id && s.slug == store.slug)
        {
            return Err(WriteError::SlugTaken);
        }
        stores.insert(store.id, store.clone());
        Ok(store.clone())
    }
}

#[async_trait]
impl SlugIndex for MemoryStoreRepo {
    async fn find_slugs_matching(
        &self,
        pattern: &str,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<Vec<String>> {
        let re = Regex::new(&format!("(?i){pattern}"))?;
        Ok(self
            .stores
            .lock()
            .unwrap()
            .values()
            .filter(|s| Some(s.id) != exclude && re.is_match(&s.slug))
            .map(|s| s.slug.clone())
            .collect())
    }
}

#[async_trait]
impl StoreRepo for MemoryStoreRepo {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Store>> {
        Ok(self.stores.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Store>> {
        Ok(self
            .stores
            .lock()
            .unwrap()
            .values()
            .find(|s| s.slug == slug)
            .cloned())
    }

    async fn insert(&self, store: &Store) -> Result<Store, WriteError> {
        self.write(store)
    }

    async fn update(&self, store: &Store) -> Result<Store, WriteError> {
        if !self.stores.lock().unwrap().contains_key(&store.id) {
            return Err(WriteError::Other(anyhow::anyhow!("no such store")));
        }
        self.write(store)
    }
}

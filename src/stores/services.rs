use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::stores::repo::{StoreRepo, WriteError};
use crate::stores::repo_types::Store;
use crate::stores::slug::{SlugError, SlugResolver};

/// Attempts before a slug collision is reported to the caller.
pub const MAX_SLUG_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store name is required")]
    EmptyName,
    #[error("store name cannot be turned into a slug")]
    MalformedName,
    #[error("store not found")]
    NotFound,
    #[error("could not find a free slug")]
    SlugConflict,
    #[error("store persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl From<SlugError> for StoreError {
    fn from(e: SlugError) -> Self {
        match e {
            SlugError::MalformedName => StoreError::MalformedName,
            SlugError::Persistence(e) => StoreError::Persistence(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Copy)]
enum Write {
    Insert,
    Update,
}

fn clean_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::EmptyName);
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct StoreService {
    repo: Arc<dyn StoreRepo>,
    slugs: SlugResolver,
    clock: Arc<dyn Clock>,
}

impl StoreService {
    pub fn new<R: StoreRepo + 'static>(repo: Arc<R>) -> Self {
        Self {
            slugs: SlugResolver::new(repo.clone()),
            repo,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Store, StoreError> {
        self.repo
            .find_by_slug(slug)
            .await
            .map_err(StoreError::Persistence)?
            .ok_or(StoreError::NotFound)
    }

    pub async fn create(&self, new: NewStore) -> Result<Store, StoreError> {
        let store = Store {
            id: Uuid::new_v4(),
            name: clean_name(&new.name)?,
            slug: String::new(),
            description: new.description,
            tags: new.tags,
            created_at: self.clock.now(),
        };
        let saved = self.save(store, true, Write::Insert).await?;
        info!(store_id = %saved.id, slug = %saved.slug, "store created");
        Ok(saved)
    }

    pub async fn update(&self, id: Uuid, changes: StoreChanges) -> Result<Store, StoreError> {
        let mut store = self
            .repo
            .find_by_id(id)
            .await
            .map_err(StoreError::Persistence)?
            .ok_or(StoreError::NotFound)?;

        let mut name_changed = false;
        if let Some(name) = changes.name {
            let name = clean_name(&name)?;
            name_changed = name != store.name;
            store.name = name;
        }
        if let Some(description) = changes.description {
            store.description = Some(description);
        }
        if let Some(tags) = changes.tags {
            store.tags = tags;
        }

        let saved = self.save(store, name_changed, Write::Update).await?;
        info!(store_id = %saved.id, slug = %saved.slug, name_changed, "store updated");
        Ok(saved)
    }

    /// Resolves the slug when the name changed and writes the record. A slug
    /// lost to a concurrent writer is re-resolved one suffix further along.
    async fn save(
        &self,
        mut store: Store,
        name_changed: bool,
        write: Write,
    ) -> Result<Store, StoreError> {
        let mut attempt = 0;
        loop {
            let slug = if attempt == 0 {
                self.slugs
                    .resolve(&store.name, Some(store.id), name_changed)
                    .await?
            } else {
                Some(
                    self.slugs
                        .resolve_attempt(&store.name, Some(store.id), attempt)
                        .await?,
                )
            };
            if let Some(slug) = slug {
                store.slug = slug;
            }

            let result = match write {
                Write::Insert => self.repo.insert(&store).await,
                Write::Update => self.repo.update(&store).await,
            };
            match result {
                Ok(saved) => return Ok(saved),
                Err(WriteError::SlugTaken) if name_changed && attempt + 1 < MAX_SLUG_ATTEMPTS => {
                    warn!(slug = %store.slug, attempt, "slug taken, retrying");
                    attempt += 1;
                }
                Err(WriteError::SlugTaken) => return Err(StoreError::SlugConflict),
                Err(WriteError::Other(e)) => return Err(StoreError::Persistence(e)),
            }
        }
    }
}

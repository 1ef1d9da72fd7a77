use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::stores::repo_types::Store;
use crate::stores::slug::SlugIndex;

const STORE_COLUMNS: &str = "id, name, slug, description, tags, created_at";
const SLUG_UNIQUE_CONSTRAINT: &str = "stores_slug_key";
const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("slug already taken")]
    SlugTaken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Store persistence. Writes fail with `SlugTaken` when another record holds the slug.
#[async_trait]
pub trait StoreRepo: SlugIndex {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Store>>;
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Store>>;
    async fn insert(&self, store: &Store) -> Result<Store, WriteError>;
    async fn update(&self, store: &Store) -> Result<Store, WriteError>;
}

#[derive(Clone)]
pub struct PgStoreRepo {
    db: PgPool,
}

impl PgStoreRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn write_error(e: sqlx::Error, what: &'static str) -> WriteError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
            && db_err.constraint() == Some(SLUG_UNIQUE_CONSTRAINT)
        {
            return WriteError::SlugTaken;
        }
    }
    WriteError::Other(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl SlugIndex for PgStoreRepo {
    async fn find_slugs_matching(
        &self,
        pattern: &str,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT slug
              FROM stores
             WHERE slug ~* $1
               AND ($2::uuid IS NULL OR id <> $2)
             ORDER BY slug
            "#,
        )
        .bind(pattern)
        .bind(exclude)
        .fetch_all(&self.db)
        .await
        .context("find slugs matching")?;
        Ok(rows.into_iter().map(|(slug,)| slug).collect())
    }
}

#[async_trait]
impl StoreRepo for PgStoreRepo {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find store by id")?;
        Ok(store)
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.db)
        .await
        .context("find store by slug")?;
        Ok(store)
    }

    async fn insert(&self, store: &Store) -> Result<Store, WriteError> {
        let saved = sqlx::query_as::<_, Store>(&format!(
            r#"
            INSERT INTO stores (id, name, slug, description, tags, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {STORE_COLUMNS}
            "#
        ))
        .bind(store.id)
        .bind(&store.name)
        .bind(&store.slug)
        .bind(&store.description)
        .bind(&store.tags)
        .bind(store.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| write_error(e, "insert store"))?;
        Ok(saved)
    }

    async fn update(&self, store: &Store) -> Result<Store, WriteError> {
        let saved = sqlx::query_as::<_, Store>(&format!(
            r#"
            UPDATE stores
               SET name = $2,
                   slug = $3,
                   description = $4,
                   tags = $5
             WHERE id = $1
            RETURNING {STORE_COLUMNS}
            "#
        ))
        .bind(store.id)
        .bind(&store.name)
        .bind(&store.slug)
        .bind(&store.description)
        .bind(&store.tags)
        .fetch_one(&self.db)
        .await
        .map_err(|e| write_error(e, "update store"))?;
        Ok(saved)
    }
}

use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    state::AppState,
    stores::{
        dto::{CreateStoreRequest, UpdateStoreRequest},
        repo::PgStoreRepo,
        repo_types::Store,
        services::{StoreError, StoreService},
    },
};

impl FromRef<AppState> for StoreService {
    fn from_ref(state: &AppState) -> Self {
        StoreService::new(Arc::new(PgStoreRepo::new(state.db.clone())))
    }
}

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/store/:slug", get(get_store))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/stores", post(create_store))
        .route("/stores/:id", put(update_store))
}

fn store_rejection(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::EmptyName => (StatusCode::BAD_REQUEST, "Please enter a store name!".into()),
        StoreError::MalformedName => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Store name must contain letters or digits".into(),
        ),
        StoreError::NotFound => (StatusCode::NOT_FOUND, "Store not found".into()),
        StoreError::SlugConflict => (
            StatusCode::CONFLICT,
            "Could not assign a unique address, try again".into(),
        ),
        StoreError::Persistence(e) => {
            error!(error = %e, "store persistence failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
        }
    }
}

#[instrument(skip(stores))]
pub async fn get_store(
    State(stores): State<StoreService>,
    Path(slug): Path<String>,
) -> Result<Json<Store>, (StatusCode, String)> {
    stores
        .get_by_slug(&slug)
        .await
        .map(Json)
        .map_err(store_rejection)
}

#[instrument(skip(stores, body))]
pub async fn create_store(
    State(stores): State<StoreService>,
    AuthUser(account_id): AuthUser,
    Json(body): Json<CreateStoreRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Store>), (StatusCode, String)> {
    let store = stores.create(body.into()).await.map_err(store_rejection)?;

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/api/v1/store/{}", store.slug))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    headers.insert(header::LOCATION, location);

    Ok((StatusCode::CREATED, headers, Json(store)))
}

#[instrument(skip(stores, body))]
pub async fn update_store(
    State(stores): State<StoreService>,
    AuthUser(account_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStoreRequest>,
) -> Result<Json<Store>, (StatusCode, String)> {
    stores
        .update(id, body.into())
        .await
        .map(Json)
        .map_err(store_rejection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_statuses() {
        assert_eq!(store_rejection(StoreError::EmptyName).0, StatusCode::BAD_REQUEST);
        assert_eq!(
            store_rejection(StoreError::MalformedName).0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(store_rejection(StoreError::NotFound).0, StatusCode::NOT_FOUND);
        assert_eq!(store_rejection(StoreError::SlugConflict).0, StatusCode::CONFLICT);
        let (status, body) =
            store_rejection(StoreError::Persistence(anyhow::anyhow!("disk on fire")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("disk"));
    }

    #[test]
    fn store_serializes_slug() {
        let store = Store {
            id: Uuid::new_v4(),
            name: "Bob's Cafe".into(),
            slug: "bobs-cafe".into(),
            description: None,
            tags: vec!["coffee".into()],
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["slug"], "bobs-cafe");
        assert_eq!(json["tags"][0], "coffee");
    }
}

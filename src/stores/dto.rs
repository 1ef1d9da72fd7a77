use serde::Deserialize;

use crate::stores::services::{NewStore, StoreChanges};

#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStoreRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl From<CreateStoreRequest> for NewStore {
    fn from(r: CreateStoreRequest) -> Self {
        Self {
            name: r.name,
            description: r.description,
            tags: r.tags,
        }
    }
}

impl From<UpdateStoreRequest> for StoreChanges {
    fn from(r: UpdateStoreRequest) -> Self {
        Self {
            name: r.name,
            description: r.description,
            tags: r.tags,
        }
    }
}

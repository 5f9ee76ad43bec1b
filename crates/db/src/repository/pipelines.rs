//! Pipeline definition repository functions.
//!
//! Pipelines are keyed by name; the file name is the [`slug`] of the name.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::store::{self, slug, DocumentStore};
use crate::DbError;

fn path_for(store: &DocumentStore, name: &str) -> std::path::PathBuf {
    store.workflows_dir().join(format!("{}.json", slug(name)))
}

/// Insert or replace the pipeline document stored under `name`.
pub async fn save_pipeline<T: Serialize>(
    store: &DocumentStore,
    name: &str,
    pipeline: &T,
) -> Result<(), DbError> {
    let path = path_for(store, name);
    debug!("saving pipeline '{}' to {}", name, path.display());
    store::write_json(&path, pipeline).await
}

/// Load the pipeline document stored under `name`.
pub async fn load_pipeline<T: DeserializeOwned>(
    store: &DocumentStore,
    name: &str,
) -> Result<T, DbError> {
    store::read_json(&path_for(store, name)).await
}

/// Load every pipeline document in the store, sorted by file name.
///
/// Documents that cannot be read or parsed are logged and skipped.
pub async fn load_all_pipelines<T: DeserializeOwned>(
    store: &DocumentStore,
) -> Result<Vec<T>, DbError> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(store.workflows_dir()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut pipelines = Vec::with_capacity(paths.len());
    for path in paths {
        match store::read_json::<T>(&path).await {
            Ok(p) => pipelines.push(p),
            Err(e) => warn!("skipping unreadable pipeline {}: {}", path.display(), e),
        }
    }
    Ok(pipelines)
}

/// Delete the pipeline document stored under `name`.
///
/// Returns `false` if there was nothing to delete.
pub async fn delete_pipeline(store: &DocumentStore, name: &str) -> Result<bool, DbError> {
    store::remove(&path_for(store, name)).await
}

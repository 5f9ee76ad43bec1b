//! Execution record repository functions.
//!
//! Records are written once, when a run finishes, and never rewritten.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::store::{self, DocumentStore};
use crate::DbError;

fn path_for(store: &DocumentStore, execution_id: &str) -> std::path::PathBuf {
    store
        .executions_dir()
        .join(format!("execution_{}.json", store::slug(execution_id)))
}

/// Persist a finished execution record.
pub async fn save_execution<T: Serialize>(
    store: &DocumentStore,
    execution_id: &str,
    record: &T,
) -> Result<(), DbError> {
    let path = path_for(store, execution_id);
    debug!("saving execution record {} to {}", execution_id, path.display());
    store::write_json(&path, record).await
}

/// Load the execution record with the given ID.
pub async fn load_execution<T: DeserializeOwned>(
    store: &DocumentStore,
    execution_id: &str,
) -> Result<T, DbError> {
    store::read_json(&path_for(store, execution_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn record_is_stored_under_its_execution_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let id = "0b6f1c3e-1111-4222-8333-944455556666";

        save_execution(&store, id, &json!({ "execution_id": id, "status": "completed" }))
            .await
            .unwrap();

        assert!(store.executions_dir().join(format!("execution_{id}.json")).exists());
        let back: Value = load_execution(&store, id).await.unwrap();
        assert_eq!(back["status"], "completed");
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            load_execution::<Value>(&store, "missing").await,
            Err(DbError::NotFound)
        ));
    }
}

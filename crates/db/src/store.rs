//! On-disk document store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/workflows/<slug>.json                    pipeline definitions
//! <root>/workflow_executions/execution_<id>.json  execution records
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::DbError;

const WORKFLOWS_DIR: &str = "workflows";
const EXECUTIONS_DIR: &str = "workflow_executions";

/// Handle to the directory tree holding every persisted document.
///
/// Cheap to clone; it only carries the root path.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, DbError> {
        let store = Self { root: root.into() };
        tokio::fs::create_dir_all(store.workflows_dir()).await?;
        tokio::fs::create_dir_all(store.executions_dir()).await?;
        info!("Opened document store at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join(WORKFLOWS_DIR)
    }

    pub fn executions_dir(&self) -> PathBuf {
        self.root.join(EXECUTIONS_DIR)
    }
}

/// File-name stem for a pipeline name: lowercase, with anything outside
/// `[a-z0-9_-]` replaced by `_`.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Serialise `doc` as pretty JSON and atomically replace `path` with it.
///
/// The bytes go to a temp file in the same directory first, so readers never
/// observe a half-written document.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, doc: &T) -> Result<(), DbError> {
    let mut data = serde_json::to_vec_pretty(doc)?;
    data.push(b'\n');
    let path = path.to_owned();

    tokio::task::spawn_blocking(move || -> Result<(), DbError> {
        let dir = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await?
}

/// Read and deserialise the document at `path`.
///
/// # Errors
/// [`DbError::NotFound`] when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DbError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(DbError::NotFound),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

/// Remove the file at `path`. Returns `false` when it was already gone.
pub async fn remove(path: &Path) -> Result<bool, DbError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_lowercases_and_replaces_spaces() {
        assert_eq!(slug("DevOps Pipeline 42"), "devops_pipeline_42");
        assert_eq!(slug("../etc/passwd"), "___etc_passwd");
        assert_eq!(slug("already-ok_1"), "already-ok_1");
    }

    #[tokio::test]
    async fn open_creates_both_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("data")).await.unwrap();
        assert!(store.workflows_dir().is_dir());
        assert!(store.executions_dir().is_dir());
    }

    #[tokio::test]
    async fn write_then_read_returns_same_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = json!({ "name": "demo", "steps": [1, 2, 3] });

        write_json(&path, &doc).await.unwrap();
        let back: serde_json::Value = read_json(&path).await.unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn reading_a_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let res = read_json::<serde_json::Value>(&dir.path().join("nope.json")).await;
        assert!(matches!(res, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn remove_reports_whether_anything_was_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json(&path, &json!({})).await.unwrap();
        assert!(remove(&path).await.unwrap());
        assert!(!remove(&path).await.unwrap());
    }
}

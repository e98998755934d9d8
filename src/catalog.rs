//! JSON flat-file catalog of uploaded documents.
//!
//! The whole catalog is rewritten on every mutation. Writes go to a sibling
//! `*.tmp` file which is then renamed over the target, so a reader never
//! observes a partially written catalog.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{RagError, RagResult};
use crate::models::DocumentRecord;

pub struct DocumentStore {
    path: PathBuf,
    records: Vec<DocumentRecord>,
}

impl DocumentStore {
    /// Read the catalog at `path`. A missing file is an empty catalog;
    /// unparseable content is [`RagError::CorruptCatalog`].
    pub fn load(path: &Path) -> RagResult<Self> {
        let records = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| RagError::CorruptCatalog {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(RagError::Io(e)),
        };

        tracing::info!(
            path = %path.display(),
            documents = records.len(),
            "loaded document catalog"
        );

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn list(&self) -> &[DocumentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record and persist. On failure the record is not kept.
    pub async fn append(&mut self, record: DocumentRecord) -> RagResult<()> {
        self.records.push(record);
        if let Err(e) = self.persist().await {
            self.records.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Delete the backing file, then empty the catalog. If the file cannot
    /// be removed the in-memory records are left untouched.
    pub async fn clear(&mut self) -> RagResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(RagError::Io(e)),
        }
        self.records.clear();
        Ok(())
    }

    async fn persist(&self) -> RagResult<()> {
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| RagError::Internal(e.into()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_replacing(&path, json.as_bytes()))
            .await
            .map_err(|e| RagError::Internal(e.into()))?
    }
}

/// Write `bytes` to a `*.tmp` sibling and rename it over `path`. The sibling
/// is removed if any step fails.
fn write_replacing(path: &Path, bytes: &[u8]) -> RagResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(RagError::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_catalog() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::load(&tmp.path().join("docs.json")).unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn append_persists_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/docs.json");

        let mut store = DocumentStore::load(&path).unwrap();
        let first = DocumentRecord::new("a.pdf", 100, 2);
        let second = DocumentRecord::new("b.pdf", 200, 5);
        store.append(first.clone()).await.unwrap();
        store.append(second.clone()).await.unwrap();

        let reloaded = DocumentStore::load(&path).unwrap();
        assert_eq!(reloaded.list(), &[first, second]);
        assert!(!tmp.path().join("nested/docs.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docs.json");
        std::fs::write(&path, "{ not json").unwrap();

        match DocumentStore::load(&path) {
            Err(RagError::CorruptCatalog { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected CorruptCatalog, got {:?}", other.map(|s| s.len())),
        }
    }

    #[tokio::test]
    async fn clear_removes_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docs.json");
        let mut store = DocumentStore::load(&path).unwrap();
        store.append(DocumentRecord::new("a.pdf", 1, 1)).await.unwrap();
        assert!(path.exists());

        store.clear().await.unwrap();
        assert!(store.is_empty());
        assert!(!path.exists());
        // clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn failed_clear_keeps_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docs.json");
        let mut store = DocumentStore::load(&path).unwrap();
        store.append(DocumentRecord::new("a.pdf", 1, 1)).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("child")).unwrap();

        assert!(store.clear().await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_persist_rolls_back_and_removes_tmp() {
        let tmp = TempDir::new().unwrap();
        // The catalog path is an existing directory, so the rename fails.
        let path = tmp.path().join("occupied");
        std::fs::create_dir_all(path.join("child")).unwrap();
        let mut store = DocumentStore {
            path,
            records: Vec::new(),
        };
        assert!(store.append(DocumentRecord::new("a.pdf", 1, 1)).await.is_err());
        assert!(store.is_empty());
        assert!(!tmp.path().join("occupied.tmp").exists());
    }
}

use crate::domain::ports::Storage;
use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        tokio::fs::read(&full_path).await.map_err(|e| {
            EtlError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", full_path.display(), e),
            ))
        })
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(full_path, data).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.full_path(path))
            .await
            .unwrap_or(false)
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.full_path(dir)).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Storage kept in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.lock().await.insert(path.to_string(), data.into());
    }

    pub async fn get_string(&self, path: &str) -> Option<String> {
        let files = self.files.lock().await;
        files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl Storage for MemoryStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let files = self.files.lock().await;
        files.get(path).cloned().ok_or_else(|| {
            EtlError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path),
            ))
        })
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.files
            .lock()
            .await
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.files.lock().await.contains_key(path)
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let files = self.files.lock().await;
        let mut names: Vec<String> = files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Joins path segments with `/`, skipping empty ones.
pub fn join_path(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_round_trip_and_listing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage
            .write_file("input/media/media_manifest_2.csv", b"a,b\n")
            .await
            .unwrap();
        storage
            .write_file("input/media/media_manifest_1.csv", b"1,2\n")
            .await
            .unwrap();

        assert!(storage.exists("input/media/media_manifest_1.csv").await);
        assert!(!storage.exists("input/media/missing.csv").await);
        assert_eq!(
            storage.list_files("input/media").await.unwrap(),
            vec!["media_manifest_1.csv", "media_manifest_2.csv"]
        );
        assert_eq!(
            storage.read_file("input/media/media_manifest_2.csv").await.unwrap(),
            b"a,b\n"
        );
        assert!(storage.read_file("input/nope.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_storage_lists_direct_children_only() {
        let storage = MemoryStorage::new();
        storage.insert("media/b.csv", "x").await;
        storage.insert("media/a.csv", "x").await;
        storage.insert("media/nested/c.csv", "x").await;
        storage.insert("other.csv", "x").await;

        assert_eq!(storage.list_files("media").await.unwrap(), vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["processed", "Animal species.csv"]), "processed/Animal species.csv");
        assert_eq!(join_path(&["", "output/", "deck.csv"]), "output/deck.csv");
    }
}

//! Temporary file storage for uploads and their compressed output.
//!
//! Files live in one directory as `<id>_original.pdf` and
//! `<id>_compressed.pdf`. Writes go through a temp file in the same
//! directory and are renamed into place.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Original,
    Compressed,
}

impl FileKind {
    fn suffix(self) -> &'static str {
        match self {
            FileKind::Original => "original",
            FileKind::Compressed => "compressed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self, id: Uuid, kind: FileKind) -> PathBuf {
        self.dir.join(format!("{}_{}.pdf", id, kind.suffix()))
    }

    pub async fn write(&self, id: Uuid, kind: FileKind, data: Vec<u8>) -> std::io::Result<()> {
        let dir = self.dir.clone();
        let target = self.path(id, kind);
        tokio::task::spawn_blocking(move || {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok::<(), std::io::Error>(())
        })
        .await
        .map_err(std::io::Error::other)?
    }

    pub async fn read(&self, id: Uuid, kind: FileKind) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.path(id, kind)).await
    }

    pub async fn exists(&self, id: Uuid, kind: FileKind) -> bool {
        tokio::fs::try_exists(self.path(id, kind))
            .await
            .unwrap_or(false)
    }

    /// Deletes files last modified more than `max_age` ago. Returns how many
    /// were removed.
    pub async fn cleanup_older_than(&self, max_age: Duration) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Error cleaning up temp files: {}", e);
                return 0;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if modified < cutoff {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!("Removed old temp file: {}", path.display());
                        removed += 1;
                    }
                    Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();
        let id = Uuid::new_v4();

        store.write(id, FileKind::Original, b"%PDF-1.5".to_vec()).await.unwrap();
        assert!(store.exists(id, FileKind::Original).await);
        assert!(!store.exists(id, FileKind::Compressed).await);
        assert_eq!(store.read(id, FileKind::Original).await.unwrap(), b"%PDF-1.5");
        assert!(store
            .path(id, FileKind::Compressed)
            .to_string_lossy()
            .ends_with("_compressed.pdf"));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();
        let id = Uuid::new_v4();
        store.write(id, FileKind::Original, vec![1, 2, 3]).await.unwrap();

        assert_eq!(store.cleanup_older_than(Duration::from_secs(3600)).await, 0);
        assert!(store.exists(id, FileKind::Original).await);

        assert_eq!(store.cleanup_older_than(Duration::ZERO).await, 1);
        assert!(!store.exists(id, FileKind::Original).await);
    }
}

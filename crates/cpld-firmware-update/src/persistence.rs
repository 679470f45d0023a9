//! Priority persistence
//!
//! One small JSON document per version id under the state directory, with a
//! mirrored copy inside the image's own media directory while it exists.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::UpdaterConfig;
use crate::error::UpdaterResult;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedPriority {
    priority: u8,
}

/// File-backed store of version priorities
#[derive(Debug, Clone)]
pub struct PriorityStore {
    persist_dir: PathBuf,
    media_dir: PathBuf,
    image_prefix: String,
}

impl PriorityStore {
    /// Create a store using the directories in `config`.
    pub fn new(config: &UpdaterConfig) -> Self {
        Self {
            persist_dir: config.persist_dir.clone(),
            media_dir: config.media_dir.clone(),
            image_prefix: config.image_prefix.clone(),
        }
    }

    fn state_path(&self, id: &str) -> PathBuf {
        self.persist_dir.join(id)
    }

    fn mirror_dir(&self, id: &str) -> PathBuf {
        self.media_dir.join(format!("{}{id}", self.image_prefix))
    }

    fn write(path: &Path, priority: u8) -> UpdaterResult<()> {
        let content = serde_json::to_string_pretty(&PersistedPriority { priority })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Persist `priority` for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory or either copy cannot be written.
    pub fn store(&self, id: &str, priority: u8) -> UpdaterResult<()> {
        fs::create_dir_all(&self.persist_dir)?;
        Self::write(&self.state_path(id), priority)?;

        let mirror_dir = self.mirror_dir(id);
        if mirror_dir.is_dir() {
            Self::write(&mirror_dir.join(id), priority)?;
        }

        debug!(version_id = %id, priority, "Stored priority");
        Ok(())
    }

    /// Read the persisted priority for `id`.
    ///
    /// A file that cannot be parsed is deleted and reported as absent.
    pub fn restore(&self, id: &str) -> Option<u8> {
        let path = self.state_path(id);
        let content = fs::read_to_string(&path).ok()?;

        match serde_json::from_str::<PersistedPriority>(&content) {
            Ok(persisted) => Some(persisted.priority),
            Err(e) => {
                warn!(version_id = %id, error = %e, "Discarding unreadable priority file");
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = ?path, error = %e, "Failed to remove priority file");
                }
                None
            }
        }
    }

    /// Remove the persisted priority for `id`.
    ///
    /// The mirrored copy goes away together with the image directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn remove(&self, id: &str) -> UpdaterResult<()> {
        let path = self.state_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> UpdaterResult<PriorityStore> {
        let config = UpdaterConfig::builder()
            .media_dir(dir.path().join("media"))
            .persist_dir(dir.path().join("state"))
            .build()?;
        Ok(PriorityStore::new(&config))
    }

    #[test]
    fn test_store_and_restore() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir)?;

        assert_eq!(store.restore("aaaaaaaa"), None);
        store.store("aaaaaaaa", 3)?;
        assert_eq!(store.restore("aaaaaaaa"), Some(3));

        store.store("aaaaaaaa", 1)?;
        assert_eq!(store.restore("aaaaaaaa"), Some(1));
        Ok(())
    }

    #[test]
    fn test_store_mirrors_into_image_dir() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir)?;
        let image_dir = dir.path().join("media").join("cpld-aaaaaaaa");
        fs::create_dir_all(&image_dir)?;

        store.store("aaaaaaaa", 2)?;

        let mirrored = fs::read_to_string(image_dir.join("aaaaaaaa"))?;
        let persisted: PersistedPriority = serde_json::from_str(&mirrored)?;
        assert_eq!(persisted.priority, 2);
        assert!(!dir.path().join("media").join("cpld-bbbbbbbb").exists());
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_removed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir)?;
        fs::create_dir_all(dir.path().join("state"))?;
        let path = dir.path().join("state").join("aaaaaaaa");
        fs::write(&path, "{ not json")?;

        assert_eq!(store.restore("aaaaaaaa"), None);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_remove() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = store_in(&dir)?;

        store.remove("aaaaaaaa")?;
        store.store("aaaaaaaa", 0)?;
        store.remove("aaaaaaaa")?;
        assert_eq!(store.restore("aaaaaaaa"), None);
        Ok(())
    }
}

//! File-backed registry for local development
//!
//! A single JSON document on disk, rewritten on every mutation. Serialized
//! through one async mutex; adequate for the single-instance development
//! setup it exists for.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{error, info};

use super::{LocationEntry, LocationStore};
use crate::types::{Result, SgError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileDoc {
    /// Argon2 PHC hash for the admin surface, if configured
    admin_hash: Option<String>,
    locations: Vec<LocationEntry>,
}

struct FileState {
    entries: HashMap<(u64, u8), LocationEntry>,
    admin_hash: Option<String>,
}

/// Location registry backed by a JSON file
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileStore {
    /// Load the store, creating an empty one when the file does not exist.
    pub async fn open(path: &str) -> Result<Self> {
        let path = PathBuf::from(path);

        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<FileDoc>(&bytes)
                .map_err(|e| SgError::Database(format!("Corrupt registry file: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileDoc::default(),
            Err(e) => return Err(SgError::Io(e)),
        };

        let entries = doc
            .locations
            .into_iter()
            .map(|entry| ((entry.location_id, entry.galaxy_id), entry))
            .collect::<HashMap<_, _>>();

        info!("Loaded {} locations from {}", entries.len(), path.display());

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                entries,
                admin_hash: doc.admin_hash,
            }),
        })
    }

    async fn persist(&self, state: &FileState) -> Result<()> {
        let doc = FileDoc {
            admin_hash: state.admin_hash.clone(),
            locations: state.entries.values().cloned().collect(),
        };

        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| SgError::Database(format!("Serialize failed: {}", e)))?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LocationStore for FileStore {
    async fn get(&self, location_id: u64, galaxy_id: u8) -> Result<LocationEntry> {
        let state = self.state.lock().await;
        state
            .entries
            .get(&(location_id, galaxy_id))
            .cloned()
            .ok_or(SgError::NotFound)
    }

    async fn touch(&self, location_id: u64, galaxy_id: u8) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get_mut(&(location_id, galaxy_id)) {
            entry.last_seen_ms = chrono::Utc::now().timestamp_millis();
            if let Err(e) = self.persist(&state).await {
                error!("Failed to persist registry after touch: {}", e);
            }
        }
    }

    async fn register(&self, location_id: u64, galaxy_id: u8, location: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.entries.contains_key(&(location_id, galaxy_id)) {
            // Duplicate insert is a no-op
            return Ok(());
        }

        state.entries.insert(
            (location_id, galaxy_id),
            LocationEntry {
                location_id,
                galaxy_id,
                location: location.to_string(),
                last_seen_ms: chrono::Utc::now().timestamp_millis(),
            },
        );
        self.persist(&state).await
    }

    async fn delete(&self, galaxy_id: u8, location: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .entries
            .retain(|_, entry| !(entry.galaxy_id == galaxy_id && entry.location == location));
        self.persist(&state).await
    }

    async fn list(&self) -> Result<Vec<LocationEntry>> {
        let state = self.state.lock().await;
        Ok(state.entries.values().cloned().collect())
    }

    async fn admin_hash(&self) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.admin_hash.clone())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::location_id_of;

    fn temp_store_path() -> String {
        std::env::temp_dir()
            .join(format!("sgnetwork-test-{}.json", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn test_register_and_get_round_trip() {
        let path = temp_store_path();
        let store = FileStore::open(&path).await.unwrap();

        let id = location_id_of("space/alpha");
        store.register(id, 1, "space/alpha").await.unwrap();

        let entry = store.get(id, 1).await.unwrap();
        assert_eq!(entry.location, "space/alpha");
        assert_eq!(entry.galaxy_id, 1);

        // Other galaxy is a distinct key
        assert!(matches!(store.get(id, 2).await, Err(SgError::NotFound)));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let path = temp_store_path();
        let store = FileStore::open(&path).await.unwrap();

        let id = location_id_of("space/alpha");
        store.register(id, 1, "space/alpha").await.unwrap();
        store.register(id, 1, "space/alpha").await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_delete_and_touch() {
        let path = temp_store_path();
        let store = FileStore::open(&path).await.unwrap();

        let id = location_id_of("event/42");
        store.register(id, 1, "event/42").await.unwrap();

        let before = store.get(id, 1).await.unwrap().last_seen_ms;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.touch(id, 1).await;
        let after = store.get(id, 1).await.unwrap().last_seen_ms;
        assert!(after >= before);

        store.delete(1, "event/42").await.unwrap();
        assert!(matches!(store.get(id, 1).await, Err(SgError::NotFound)));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_reload_from_disk() {
        let path = temp_store_path();
        {
            let store = FileStore::open(&path).await.unwrap();
            store
                .register(location_id_of("space/persist"), 2, "space/persist")
                .await
                .unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        let entry = reopened.get(location_id_of("space/persist"), 2).await.unwrap();
        assert_eq!(entry.location, "space/persist");

        let _ = tokio::fs::remove_file(&path).await;
    }
}

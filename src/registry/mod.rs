//! Persistent location registry
//!
//! Key-value store of `(location_id, galaxy_id) -> (location, last_seen)`
//! behind the swappable [`LocationStore`] interface. Backend selection tries
//! each candidate in order and keeps the first that initializes; when none
//! succeed the gate network cannot come online.

mod file;
mod mongo;

pub use file::FileStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::addressing::{location_id_of, number_of, to_numbers, NUMBERING_BASE};
use crate::config::Args;
use crate::types::{Result, SgError};

/// One registered gate location.
///
/// Primary key is `(location_id, galaxy_id)`; `last_seen_ms` is refreshed on
/// each successful connect from that endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationEntry {
    pub location_id: u64,
    pub galaxy_id: u8,
    pub location: String,
    pub last_seen_ms: i64,
}

/// Swappable persistence backend for the location registry
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Fetch an entry; `SgError::NotFound` on miss
    async fn get(&self, location_id: u64, galaxy_id: u8) -> Result<LocationEntry>;

    /// Refresh `last_seen_ms`. Fire-and-forget: failures are logged, never
    /// propagated.
    async fn touch(&self, location_id: u64, galaxy_id: u8);

    /// Idempotent upsert: inserting an existing key is a no-op, not an error
    async fn register(&self, location_id: u64, galaxy_id: u8, location: &str) -> Result<()>;

    /// Remove an entry by its galaxy and location string
    async fn delete(&self, galaxy_id: u8, location: &str) -> Result<()>;

    /// All registered locations (admin surface)
    async fn list(&self) -> Result<Vec<LocationEntry>>;

    /// Argon2 PHC hash gating destructive admin operations, if configured
    async fn admin_hash(&self) -> Result<Option<String>>;

    fn name(&self) -> &'static str;
}

/// Open the location registry.
///
/// Candidates are tried in order: MongoDB (only when a URI is configured),
/// then the file-backed local store. First success wins; total failure is
/// fatal for the gate network subsystem.
pub async fn open_location_store(args: &Args) -> Result<Arc<dyn LocationStore>> {
    if let Some(uri) = &args.mongodb_uri {
        match MongoStore::open(uri, &args.mongodb_db).await {
            Ok(store) => {
                info!("Location registry backed by MongoDB ({})", args.mongodb_db);
                return Ok(Arc::new(store));
            }
            Err(e) => {
                warn!("MongoDB registry backend unavailable: {e}");
            }
        }
    }

    match FileStore::open(&args.data_file).await {
        Ok(store) => {
            info!("Location registry backed by file store ({})", args.data_file);
            Ok(Arc::new(store))
        }
        Err(e) => {
            error!("File registry backend unavailable: {e}");
            Err(SgError::BackendUnavailable)
        }
    }
}

/// Pick the numeric ID for a legacy-schema row.
///
/// Legacy rows stored the ID as a letter-encoded sequence. The stored value
/// is trusted only when it carries the canonical trailing terminator letter
/// (`a`); otherwise the ID is recomputed from the location string. A
/// disagreement between the two is logged and does not abort migration.
pub(crate) fn migrated_location_id(stored_id: Option<&str>, location: &str) -> u64 {
    let recomputed = location_id_of(location);

    if let Some(stored) = stored_id {
        if stored.len() > 1 && stored.ends_with('a') {
            let decoded = number_of(&to_numbers(stored), NUMBERING_BASE);
            if decoded != recomputed {
                warn!(
                    "Legacy row '{}': stored id {} disagrees with recomputed {} - keeping stored",
                    location, decoded, recomputed
                );
            }
            return decoded;
        }
    }

    recomputed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{sequence_of, to_letters};

    #[test]
    fn test_migration_prefers_marked_stored_id() {
        let location = "space/ancient";
        let id = location_id_of(location);
        let mut letters = to_letters(&sequence_of(id, NUMBERING_BASE));
        letters.push('a'); // canonical terminator marker

        assert_eq!(migrated_location_id(Some(&letters), location), id);
    }

    #[test]
    fn test_migration_keeps_marked_id_on_mismatch() {
        // Stored under a different (pre-rename) location string
        let stored_id = location_id_of("space/old-name");
        let mut letters = to_letters(&sequence_of(stored_id, NUMBERING_BASE));
        letters.push('a');

        assert_eq!(migrated_location_id(Some(&letters), "space/new-name"), stored_id);
    }

    #[test]
    fn test_migration_recomputes_unmarked_id() {
        let location = "space/ancient";
        let id = location_id_of(location);
        // No trailing terminator letter: the stored value is not trusted
        let letters = to_letters(&sequence_of(42, NUMBERING_BASE));

        assert_eq!(migrated_location_id(Some(&letters), location), id);
        assert_eq!(migrated_location_id(None, location), id);
    }
}

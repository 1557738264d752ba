//! MongoDB registry backend

use bson::{doc, Document};
use futures_util::StreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::{error, info, warn};

use super::{migrated_location_id, LocationEntry, LocationStore};
use crate::types::{Result, SgError};

const LOCATION_COLLECTION: &str = "known_locations";
const LEGACY_COLLECTION: &str = "gate_locations";
const ADMIN_COLLECTION: &str = "admin_access";

/// Location registry backed by MongoDB
pub struct MongoStore {
    locations: Collection<LocationEntry>,
    admin: Collection<Document>,
}

impl MongoStore {
    /// Connect, ensure indexes, and run the one-time legacy migration.
    pub async fn open(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS so an unreachable MongoDB fails fast
        // instead of hanging the backend probe.
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| SgError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| SgError::Database(format!("MongoDB ping failed: {}", e)))?;

        let locations = db.collection::<LocationEntry>(LOCATION_COLLECTION);
        let admin = db.collection::<Document>(ADMIN_COLLECTION);

        locations
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "location_id": 1, "galaxy_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| SgError::Database(format!("Failed to create index: {}", e)))?;

        let store = Self { locations, admin };
        store.migrate_legacy(&db).await?;

        Ok(store)
    }

    /// One-time migration from the legacy `gate_locations(id, location,
    /// locked)` schema, run only while `known_locations` is still empty.
    async fn migrate_legacy(&self, db: &mongodb::Database) -> Result<()> {
        let populated = self
            .locations
            .count_documents(doc! {})
            .await
            .map_err(|e| SgError::Database(format!("Count failed: {}", e)))?;
        if populated > 0 {
            return Ok(());
        }

        let legacy = db.collection::<Document>(LEGACY_COLLECTION);
        let mut cursor = match legacy.find(doc! {}).await {
            Ok(cursor) => cursor,
            // No legacy collection to migrate from
            Err(_) => return Ok(()),
        };

        let mut migrated = 0usize;
        while let Some(row) = cursor.next().await {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping unreadable legacy row: {}", e);
                    continue;
                }
            };

            let Ok(location) = row.get_str("location") else {
                warn!("Skipping legacy row without a location string");
                continue;
            };

            let stored_id = row.get_str("id").ok();
            let location_id = migrated_location_id(stored_id, location);

            // Legacy rows predate multi-realm support
            let galaxy_id = crate::addressing::Galaxy::Altspace.digit();
            self.register(location_id, galaxy_id, location).await?;
            migrated += 1;
        }

        if migrated > 0 {
            info!("Migrated {} legacy gate locations", migrated);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LocationStore for MongoStore {
    async fn get(&self, location_id: u64, galaxy_id: u8) -> Result<LocationEntry> {
        self.locations
            .find_one(doc! {
                "location_id": location_id as i64,
                "galaxy_id": galaxy_id as i32,
            })
            .await
            .map_err(|e| SgError::Database(format!("Find failed: {}", e)))?
            .ok_or(SgError::NotFound)
    }

    async fn touch(&self, location_id: u64, galaxy_id: u8) {
        let result = self
            .locations
            .update_one(
                doc! {
                    "location_id": location_id as i64,
                    "galaxy_id": galaxy_id as i32,
                },
                doc! { "$set": { "last_seen_ms": chrono::Utc::now().timestamp_millis() } },
            )
            .await;

        if let Err(e) = result {
            error!("Failed to touch location {}/{}: {}", galaxy_id, location_id, e);
        }
    }

    async fn register(&self, location_id: u64, galaxy_id: u8, location: &str) -> Result<()> {
        self.locations
            .update_one(
                doc! {
                    "location_id": location_id as i64,
                    "galaxy_id": galaxy_id as i32,
                },
                doc! { "$setOnInsert": {
                    "location_id": location_id as i64,
                    "galaxy_id": galaxy_id as i32,
                    "location": location,
                    "last_seen_ms": chrono::Utc::now().timestamp_millis(),
                } },
            )
            .upsert(true)
            .await
            .map_err(|e| SgError::Database(format!("Upsert failed: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, galaxy_id: u8, location: &str) -> Result<()> {
        self.locations
            .delete_one(doc! {
                "galaxy_id": galaxy_id as i32,
                "location": location,
            })
            .await
            .map_err(|e| SgError::Database(format!("Delete failed: {}", e)))?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<LocationEntry>> {
        let mut cursor = self
            .locations
            .find(doc! {})
            .await
            .map_err(|e| SgError::Database(format!("Find failed: {}", e)))?;

        let mut entries = Vec::new();
        while let Some(entry) = cursor.next().await {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => error!("Error reading location entry: {}", e),
            }
        }
        Ok(entries)
    }

    async fn admin_hash(&self) -> Result<Option<String>> {
        let row = self
            .admin
            .find_one(doc! {})
            .await
            .map_err(|e| SgError::Database(format!("Find failed: {}", e)))?;

        Ok(row.and_then(|doc| doc.get_str("password_hash").ok().map(str::to_string)))
    }

    fn name(&self) -> &'static str {
        "mongodb"
    }
}

//! Caller location resolution
//!
//! Resolves a joining client's ambient realm identity into a registered
//! location. The direct path hashes the raw location string against the
//! registry; when that misses, a legacy-ID translation service is consulted
//! (best effort, cached) and the direct path is retried with the translated
//! ID. Total failure keeps the originally attempted location string so the
//! caller can still render a registration hint.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::addressing::{location_id_of, Galaxy, ResolvedAddress};
use crate::registry::LocationStore;
use crate::types::SgError;

/// Ambient identity of a connecting client, as reported by its realm
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    /// Realm event the session is attached to, if any
    pub event_id: Option<String>,
    /// Realm space hosting the session
    pub space_id: Option<String>,
    pub user_name: Option<String>,
    pub galaxy: Galaxy,
}

/// Resolution failure carrying the originally attempted location string
#[derive(Debug)]
pub struct LocateError {
    /// Location string of the first (pre-fallback) attempt
    pub attempted: String,
    pub source: SgError,
}

impl fmt::Display for LocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not resolve '{}': {}", self.attempted, self.source)
    }
}

impl std::error::Error for LocateError {}

/// Resolves caller identities against the registry with a legacy fallback
pub struct Locator {
    store: Arc<dyn LocationStore>,
    http: reqwest::Client,
    legacy_lookup_url: Option<String>,
    /// Raw location string -> translated legacy ID; empty string means the
    /// service answered "no such location".
    legacy_cache: DashMap<String, String>,
}

impl Locator {
    pub fn new(store: Arc<dyn LocationStore>, legacy_lookup_url: Option<String>) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            legacy_lookup_url,
            legacy_cache: DashMap::new(),
        }
    }

    /// Resolve a caller into its registered location.
    ///
    /// The event ID takes priority over the space ID when both are present.
    pub async fn resolve_caller_location(
        &self,
        caller: &CallerIdentity,
    ) -> Result<ResolvedAddress, LocateError> {
        let attempted = if let Some(event) = &caller.event_id {
            format!("event/{}", event)
        } else if let Some(space) = &caller.space_id {
            format!("space/{}", space)
        } else {
            return Err(LocateError {
                attempted: String::new(),
                source: SgError::InvalidInput("caller reported no realm identity".into()),
            });
        };

        let first_error = match self.resolve(&attempted, caller.galaxy).await {
            Ok(resolved) => return Ok(resolved),
            Err(e) => e,
        };

        // Legacy fallback: translate the raw identity and retry
        if let Some(translated) = self.legacy_lookup(&attempted).await {
            if !translated.is_empty() {
                debug!("Legacy lookup translated '{}' -> '{}'", attempted, translated);
                if let Ok(resolved) = self.resolve(&translated, caller.galaxy).await {
                    return Ok(resolved);
                }
            }
        }

        Err(LocateError {
            attempted,
            source: first_error,
        })
    }

    async fn resolve(&self, location: &str, galaxy: Galaxy) -> Result<ResolvedAddress, SgError> {
        let location_id = location_id_of(location);
        let entry = self.store.get(location_id, galaxy.digit()).await?;
        Ok(ResolvedAddress {
            location_id,
            galaxy,
            location: entry.location,
            last_seen_ms: entry.last_seen_ms,
        })
    }

    /// Consult the legacy translation service, caching per raw location
    /// string. Returns `None` when no service is configured or the request
    /// itself failed (so a later call may retry).
    async fn legacy_lookup(&self, raw: &str) -> Option<String> {
        if let Some(hit) = self.legacy_cache.get(raw) {
            return Some(hit.clone());
        }

        let base_url = self.legacy_lookup_url.as_ref()?;
        let url = format!("{}/{}", base_url.trim_end_matches('/'), urlencoding::encode(raw));

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Legacy lookup request failed for '{}': {}", raw, e);
                return None;
            }
        };

        let translated = if response.status().is_success() {
            response.text().await.ok()?.trim().to_string()
        } else {
            // Definitive miss: cache as known-missing
            String::new()
        };

        self.legacy_cache.insert(raw.to_string(), translated.clone());
        Some(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FileStore;

    async fn store_with(location: &str, galaxy: Galaxy) -> Arc<dyn LocationStore> {
        let path = std::env::temp_dir()
            .join(format!("sgnetwork-locator-{}.json", uuid::Uuid::new_v4()));
        let store = FileStore::open(path.to_str().unwrap()).await.unwrap();
        store
            .register(location_id_of(location), galaxy.digit(), location)
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_event_id_takes_priority() {
        let store = store_with("event/111", Galaxy::Altspace).await;
        let locator = Locator::new(store, None);

        let caller = CallerIdentity {
            event_id: Some("111".into()),
            space_id: Some("222".into()),
            galaxy: Galaxy::Altspace,
            ..Default::default()
        };

        let resolved = locator.resolve_caller_location(&caller).await.unwrap();
        assert_eq!(resolved.location, "event/111");
    }

    #[tokio::test]
    async fn test_failure_carries_attempted_location() {
        let store = store_with("event/111", Galaxy::Altspace).await;
        let locator = Locator::new(store, None);

        let caller = CallerIdentity {
            space_id: Some("999".into()),
            galaxy: Galaxy::Altspace,
            ..Default::default()
        };

        let err = locator.resolve_caller_location(&caller).await.unwrap_err();
        assert_eq!(err.attempted, "space/999");
        assert!(matches!(err.source, SgError::NotFound));
    }

    #[tokio::test]
    async fn test_no_identity_is_invalid_input() {
        let store = store_with("event/111", Galaxy::Altspace).await;
        let locator = Locator::new(store, None);

        let err = locator
            .resolve_caller_location(&CallerIdentity::default())
            .await
            .unwrap_err();
        assert!(matches!(err.source, SgError::InvalidInput(_)));
    }
}

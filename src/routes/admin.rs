//! Registry query and admin surface
//!
//! Read access is open; destructive operations require the shared admin
//! password, verified against the Argon2 hash from configuration or, when
//! unset, the one stored in the registry backend. Dev mode skips the check.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{error_response, json_response};
use crate::addressing::{location_id_of, Galaxy};
use crate::auth::verify_password;
use crate::locator::CallerIdentity;
use crate::server::AppState;

#[derive(Deserialize, Default)]
pub struct AdminQuery {
    pub pw: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub galaxy: String,
    pub location: String,
    pub pw: Option<String>,
}

#[derive(Deserialize)]
pub struct LookupQuery {
    pub location: String,
    pub galaxy: String,
}

#[derive(Deserialize, Default)]
pub struct LocateQuery {
    pub event_id: Option<String>,
    pub space_id: Option<String>,
    pub user_name: Option<String>,
    pub galaxy: Option<String>,
}

/// Check the admin password against the configured hash, falling back to
/// the hash stored in the registry backend.
async fn is_admin(state: &AppState, password: Option<&str>) -> bool {
    if state.args.dev_mode {
        return true;
    }

    let Some(password) = password else {
        return false;
    };

    let hash = match &state.args.admin_password_hash {
        Some(hash) => Some(hash.clone()),
        None => state.store.admin_hash().await.unwrap_or(None),
    };

    match hash {
        Some(hash) => verify_password(password, &hash).unwrap_or_else(|e| {
            warn!("Admin hash verification failed: {e}");
            false
        }),
        None => false,
    }
}

/// GET /api/locations - list all registered locations.
///
/// `isAdmin` in the response tells the caller whether destructive actions
/// will be accepted with the supplied password.
pub async fn handle_list_locations(
    state: Arc<AppState>,
    query: AdminQuery,
) -> Response<Full<Bytes>> {
    let locations = match state.store.list().await {
        Ok(locations) => locations,
        Err(e) => {
            warn!("Location listing failed: {e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let is_admin = is_admin(&state, query.pw.as_deref()).await;
    json_response(
        StatusCode::OK,
        &json!({
            "isAdmin": is_admin,
            "locations": locations,
        }),
    )
}

/// DELETE /api/location - remove one registry entry (admin only)
pub async fn handle_delete_location(
    state: Arc<AppState>,
    query: DeleteQuery,
) -> Response<Full<Bytes>> {
    if !is_admin(&state, query.pw.as_deref()).await {
        return error_response(StatusCode::UNAUTHORIZED, "Admin password required");
    }

    let galaxy = Galaxy::from_name(&query.galaxy);
    match state.store.delete(galaxy.digit(), &query.location).await {
        Ok(()) => {
            info!("Admin deleted location {}/{}", galaxy, query.location);
            json_response(StatusCode::OK, &json!({ "deleted": true }))
        }
        Err(e) => {
            warn!("Location deletion failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// GET /api/lookup - single-entry registry lookup, 404 on miss
pub async fn handle_lookup(state: Arc<AppState>, query: LookupQuery) -> Response<Full<Bytes>> {
    let galaxy = Galaxy::from_name(&query.galaxy);
    let location_id = location_id_of(&query.location);

    match state.store.get(location_id, galaxy.digit()).await {
        Ok(entry) => json_response(
            StatusCode::OK,
            &serde_json::to_value(&entry).unwrap_or_default(),
        ),
        Err(crate::types::SgError::NotFound) => {
            error_response(StatusCode::NOT_FOUND, "Location is not registered")
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// GET /api/locate - resolve a caller's realm identity to a registered
/// location. A failure carries the attempted location string so the client
/// can render a registration hint.
pub async fn handle_locate(state: Arc<AppState>, query: LocateQuery) -> Response<Full<Bytes>> {
    let caller = CallerIdentity {
        event_id: query.event_id,
        space_id: query.space_id,
        user_name: query.user_name,
        galaxy: query.galaxy.as_deref().map(Galaxy::from_name).unwrap_or_default(),
    };

    match state.locator.resolve_caller_location(&caller).await {
        Ok(resolved) => json_response(
            StatusCode::OK,
            &json!({
                "locationId": resolved.location_id,
                "galaxy": resolved.galaxy.name(),
                "location": resolved.location,
                "lastSeenMs": resolved.last_seen_ms,
            }),
        ),
        Err(e) => json_response(
            StatusCode::NOT_FOUND,
            &json!({
                "error": e.to_string(),
                "attempted": e.attempted,
            }),
        ),
    }
}

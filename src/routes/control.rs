//! Gate control surface for HTTP-polling clients
//!
//! A hosted session that cannot keep a socket open registers its gate here,
//! drives it with dial/connect/disconnect/key commands, and long-polls the
//! events endpoint for the effects it must render locally.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{error_response, json_response};
use crate::addressing::{fqlid, Galaxy};
use crate::dialer::{DialerUser, PolledPanel, SgDialComputer};
use crate::gate::{GateEndpoint, PolledHardware, Stargate};
use crate::server::AppState;
use crate::types::SgError;

/// Split `/api/gate/{galaxy}/{location}/{command}` into its parts.
///
/// Location strings contain slashes (`space/...`), so the command is taken
/// from the end and the galaxy from the front.
pub fn parse_gate_path<'a>(path: &'a str, prefix: &str) -> Option<(Galaxy, &'a str, &'a str)> {
    let remainder = path.strip_prefix(prefix)?;
    let (remainder, command) = remainder.rsplit_once('/')?;
    let (galaxy, location) = remainder.split_once('/')?;
    if location.is_empty() || command.is_empty() {
        return None;
    }
    Some((Galaxy::from_name(galaxy), location, command))
}

#[derive(Deserialize)]
struct DialRequest {
    sequence: Vec<u8>,
    timestamp: i64,
}

#[derive(Deserialize)]
struct DisconnectRequest {
    timestamp: i64,
}

#[derive(Deserialize)]
struct KeyRequest {
    user_id: String,
    user_name: String,
    #[serde(default)]
    moderator: bool,
    key: u8,
}

#[derive(Deserialize, Default)]
pub struct EventsQuery {
    pub timeout: Option<u64>,
}

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<Full<Bytes>>> {
    let body = req
        .collect()
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Body read failed: {e}")))?
        .to_bytes();

    serde_json::from_slice(&body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")))
}

fn gate_or_404(
    state: &AppState,
    fqlid: &str,
) -> Result<Arc<dyn GateEndpoint>, Response<Full<Bytes>>> {
    state
        .network
        .get_gate(fqlid)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "No such gate"))
}

/// POST /api/gate/{galaxy}/{location}/register
///
/// Announce a polled gate and its dial computer. Re-registering replaces the
/// previous instances, which covers a session that restarted without
/// deannouncing.
pub async fn handle_register_gate(
    state: Arc<AppState>,
    galaxy: Galaxy,
    location: &str,
) -> Response<Full<Bytes>> {
    let gate_fqlid = fqlid(location, galaxy);
    info!("Registering polled gate {}", gate_fqlid);

    let gate = Arc::new(Stargate::new(
        Arc::clone(&state.network),
        Arc::clone(&state.store),
        Box::new(PolledHardware::new(
            Arc::clone(&state.network),
            gate_fqlid.clone(),
        )),
        galaxy,
        location,
        state.args.wormhole_open_ms(),
    ));
    gate.announce();

    let dial_comp = Arc::new(SgDialComputer::new(
        Arc::clone(&state.network),
        Arc::clone(&state.store),
        Box::new(PolledPanel::new(
            Arc::clone(&state.network),
            gate_fqlid.clone(),
        )),
        galaxy,
        location,
    ));
    dial_comp.register();

    json_response(
        StatusCode::OK,
        &json!({ "registered": true, "fqlid": gate_fqlid }),
    )
}

/// POST /api/gate/{galaxy}/{location}/dial
///
/// The dial runs in the background; the response only acknowledges that it
/// started. Progress reaches the client through the events endpoint.
pub async fn handle_dial(
    state: Arc<AppState>,
    galaxy: Galaxy,
    location: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let request: DialRequest = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let gate = match gate_or_404(&state, &fqlid(location, galaxy)) {
        Ok(gate) => gate,
        Err(resp) => return resp,
    };

    tokio::spawn(async move {
        gate.start_dialing(&request.sequence, request.timestamp).await;
    });

    json_response(StatusCode::OK, &json!({ "accepted": true }))
}

/// POST /api/gate/{galaxy}/{location}/connect
pub async fn handle_connect(
    state: Arc<AppState>,
    galaxy: Galaxy,
    location: &str,
) -> Response<Full<Bytes>> {
    let gate = match gate_or_404(&state, &fqlid(location, galaxy)) {
        Ok(gate) => gate,
        Err(resp) => return resp,
    };

    gate.connect().await;
    json_response(StatusCode::OK, &json!({ "status": gate.status().await }))
}

/// POST /api/gate/{galaxy}/{location}/disconnect
pub async fn handle_disconnect(
    state: Arc<AppState>,
    galaxy: Galaxy,
    location: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let request: DisconnectRequest = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let gate = match gate_or_404(&state, &fqlid(location, galaxy)) {
        Ok(gate) => gate,
        Err(resp) => return resp,
    };

    gate.disconnect(request.timestamp).await;
    json_response(StatusCode::OK, &json!({ "status": gate.status().await }))
}

/// POST /api/gate/{galaxy}/{location}/key - one dial computer key press
pub async fn handle_key(
    state: Arc<AppState>,
    galaxy: Galaxy,
    location: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let request: KeyRequest = match read_json(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let Some(dial_comp) = state.network.get_dial_computer(&fqlid(location, galaxy)) else {
        return error_response(StatusCode::NOT_FOUND, "No such dial computer");
    };

    let user = DialerUser {
        id: request.user_id,
        name: request.user_name,
        moderator: request.moderator,
    };
    dial_comp
        .key_press(&user, request.key, chrono::Utc::now().timestamp_millis())
        .await;

    json_response(
        StatusCode::OK,
        &json!({ "sequence": dial_comp.sequence_letters().await }),
    )
}

/// GET /api/events/{galaxy}/{location} - long-poll the endpoint's mailbox.
///
/// A second concurrent poller for the same endpoint is a client bug and gets
/// 409 instead of silently splitting the event stream.
pub async fn handle_events(
    state: Arc<AppState>,
    galaxy: Galaxy,
    location: &str,
    query: EventsQuery,
) -> Response<Full<Bytes>> {
    let timeout = Duration::from_millis(query.timeout.unwrap_or(state.args.event_poll_timeout_ms));

    match state
        .network
        .wait_event(&fqlid(location, galaxy), timeout)
        .await
    {
        Ok(events) => json_response(StatusCode::OK, &json!({ "events": events })),
        Err(SgError::WaiterConflict(fqlid)) => {
            warn!("Second event poller rejected for {}", fqlid);
            error_response(
                StatusCode::CONFLICT,
                "Another poller is already waiting on this endpoint",
            )
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gate_path_with_slashed_location() {
        let (galaxy, location, command) =
            parse_gate_path("/api/gate/altspace/space/base-camp/dial", "/api/gate/").unwrap();
        assert_eq!(galaxy, Galaxy::Altspace);
        assert_eq!(location, "space/base-camp");
        assert_eq!(command, "dial");
    }

    #[test]
    fn test_parse_gate_path_rejects_short_paths() {
        assert!(parse_gate_path("/api/gate/altspace", "/api/gate/").is_none());
        assert!(parse_gate_path("/api/gate/altspace/dial", "/api/gate/").is_none());
        assert!(parse_gate_path("/other/x/y/z", "/api/gate/").is_none());
    }

    #[test]
    fn test_parse_gate_path_unknown_galaxy() {
        let (galaxy, _, _) =
            parse_gate_path("/api/gate/orion/space/x/dial", "/api/gate/").unwrap();
        assert_eq!(galaxy, Galaxy::Unknown);
    }
}

//! HTTP routes for the gate network service

pub mod admin;
pub mod control;
pub mod health;

pub use admin::{handle_delete_location, handle_list_locations, handle_locate, handle_lookup};
pub use control::{
    handle_connect, handle_dial, handle_disconnect, handle_events, handle_key,
    handle_register_gate, parse_gate_path,
};
pub use health::{health_check, version_info};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// JSON response with the shared CORS header
pub(crate) fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(value.to_string())))
        .unwrap()
}

/// JSON error body in the shared `{"error": ...}` shape
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one spawned task per connection, and a single
//! method/path match for dispatch.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::locator::Locator;
use crate::network::SgNetwork;
use crate::registry::LocationStore;
use crate::routes;
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn LocationStore>,
    pub network: Arc<SgNetwork>,
    pub locator: Locator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, store: Arc<dyn LocationStore>, network: Arc<SgNetwork>) -> Self {
        let locator = Locator::new(Arc::clone(&store), args.legacy_lookup_url.clone());
        Self {
            args,
            store,
            network,
            locator,
            started_at: Instant::now(),
        }
    }
}

pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "sgnetwork listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - admin authentication disabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    debug!("{} {}", method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // Registry listing with admin flag
        (Method::GET, "/api/locations") => {
            routes::handle_list_locations(Arc::clone(&state), parse_query(query.as_deref())).await
        }

        // Admin-gated deletion
        (Method::DELETE, "/api/location") => {
            match serde_urlencoded::from_str(query.as_deref().unwrap_or("")) {
                Ok(q) => routes::handle_delete_location(Arc::clone(&state), q).await,
                Err(e) => bad_query_response(&e),
            }
        }

        // Single-entry lookup
        (Method::GET, "/api/lookup") => {
            match serde_urlencoded::from_str(query.as_deref().unwrap_or("")) {
                Ok(q) => routes::handle_lookup(Arc::clone(&state), q).await,
                Err(e) => bad_query_response(&e),
            }
        }

        // Caller realm-identity resolution
        (Method::GET, "/api/locate") => {
            routes::handle_locate(Arc::clone(&state), parse_query(query.as_deref())).await
        }

        // Gate control: /api/gate/{galaxy}/{location}/{command}
        (Method::POST, p) if p.starts_with("/api/gate/") => {
            match routes::parse_gate_path(p, "/api/gate/") {
                Some((galaxy, location, command)) => match command {
                    "register" => {
                        routes::handle_register_gate(Arc::clone(&state), galaxy, location).await
                    }
                    "dial" => routes::handle_dial(Arc::clone(&state), galaxy, location, req).await,
                    "connect" => {
                        routes::handle_connect(Arc::clone(&state), galaxy, location).await
                    }
                    "disconnect" => {
                        routes::handle_disconnect(Arc::clone(&state), galaxy, location, req).await
                    }
                    "key" => routes::handle_key(Arc::clone(&state), galaxy, location, req).await,
                    _ => not_found_response(p),
                },
                None => not_found_response(p),
            }
        }

        // Event mailbox long-poll: /api/events/{galaxy}/{location}
        (Method::GET, p) if p.starts_with("/api/events/") => {
            let remainder = p.strip_prefix("/api/events/").unwrap_or("");
            match remainder.split_once('/') {
                Some((galaxy, location)) if !location.is_empty() => {
                    routes::handle_events(
                        Arc::clone(&state),
                        crate::addressing::Galaxy::from_name(galaxy),
                        location,
                        parse_query(query.as_deref()),
                    )
                    .await
                }
                _ => not_found_response(p),
            }
        }

        // Not found
        _ => not_found_response(&path),
    };

    Ok(response)
}

/// Parse a query string into a defaultable struct; malformed input falls
/// back to the defaults rather than failing the request
fn parse_query<T: serde::de::DeserializeOwned + Default>(query: Option<&str>) -> T {
    serde_urlencoded::from_str(query.unwrap_or("")).unwrap_or_default()
}

fn bad_query_response(err: &serde_urlencoded::de::Error) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Bad Request",
        "message": err.to_string(),
    });

    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

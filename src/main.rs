//! sgnetwork - gate network coordination service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sgnetwork::{config::Args, network::SgNetwork, registry, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sgnetwork={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Utility mode: emit an admin password hash and exit
    if let Some(password) = &args.hash_admin_password {
        match sgnetwork::auth::hash_password(password) {
            Ok(hash) => {
                println!("{hash}");
                return Ok(());
            }
            Err(e) => {
                error!("Failed to hash password: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Print startup banner
    info!("======================================");
    info!("  sgnetwork - Gate Network Service");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    match &args.mongodb_uri {
        Some(_) => info!("Registry: MongoDB ({})", args.mongodb_db),
        None => info!("Registry: file store ({})", args.data_file),
    }
    info!("Wormhole open window: {}s", args.wormhole_open_secs);
    info!("======================================");

    // Open the location registry; no backend at all is fatal
    let store = match registry::open_location_store(&args).await {
        Ok(store) => store,
        Err(e) => {
            error!("No registry backend available: {}", e);
            std::process::exit(1);
        }
    };

    let network = Arc::new(SgNetwork::new());
    let state = Arc::new(AppState::new(args, store, network));

    server::run(state).await?;

    Ok(())
}

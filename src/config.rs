//! Configuration for sgnetwork
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// sgnetwork - gate network coordination service
///
/// Coordinates paired portal endpoints ("gates") across independently
/// hosted mixed-reality sessions: address resolution, the persistent
/// location registry, and the cross-session dial/connect/disconnect
/// protocol.
#[derive(Parser, Debug, Clone)]
#[command(name = "sgnetwork")]
#[command(about = "Gate network coordination service")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8096")]
    pub listen: SocketAddr,

    /// MongoDB connection URI for the location registry.
    /// When unset, the file-backed local development store is used instead.
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "sgnetwork")]
    pub mongodb_db: String,

    /// Path of the file-backed registry used when MongoDB is not available
    #[arg(long, env = "DATA_FILE", default_value = "sgnetwork-locations.json")]
    pub data_file: String,

    /// Base URL of the legacy location-ID translation service.
    /// Queried as a fallback when a caller's raw realm identity does not
    /// resolve directly against the registry.
    #[arg(long, env = "LEGACY_LOOKUP_URL")]
    pub legacy_lookup_url: Option<String>,

    /// Argon2 PHC hash gating destructive admin operations.
    /// Falls back to the hash stored in the registry's admin_access table.
    #[arg(long, env = "ADMIN_PASSWORD_HASH")]
    pub admin_password_hash: Option<String>,

    /// Print the Argon2 PHC hash for the given admin password and exit.
    /// Use the output as ADMIN_PASSWORD_HASH.
    #[arg(long, value_name = "PASSWORD")]
    pub hash_admin_password: Option<String>,

    /// Enable development mode (louder logging defaults, file store expected)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seconds an unattended wormhole stays open before auto-disconnect
    #[arg(long, env = "WORMHOLE_OPEN_SECS", default_value = "120")]
    pub wormhole_open_secs: u64,

    /// Default long-poll timeout for the event mailbox endpoint, in milliseconds
    #[arg(long, env = "EVENT_POLL_TIMEOUT_MS", default_value = "20000")]
    pub event_poll_timeout_ms: u64,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.wormhole_open_secs == 0 {
            return Err("WORMHOLE_OPEN_SECS must be greater than zero".to_string());
        }

        if self.event_poll_timeout_ms == 0 {
            return Err("EVENT_POLL_TIMEOUT_MS must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Wormhole auto-close duration in milliseconds
    pub fn wormhole_open_ms(&self) -> u64 {
        self.wormhole_open_secs * 1000
    }
}

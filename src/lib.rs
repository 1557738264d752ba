//! sgnetwork - gate network coordination service
//!
//! Coordinates paired portal endpoints ("gates") hosted in independent
//! mixed-reality sessions: resolving dialed addresses against a persistent
//! location registry and driving the cross-session dial, connect, and
//! disconnect protocol.
//!
//! ## Subsystems
//!
//! - **Addressing**: base-38 address math and FQLID handling
//! - **Registry**: persistent location store (MongoDB or file-backed)
//! - **Locator**: caller realm-identity resolution with a legacy fallback
//! - **Network**: process-wide gate directory, fan-out, and event mailboxes
//! - **Gate / Dialer**: the two endpoint state machines
//! - **Server**: hyper HTTP surface for polled clients and admin queries

pub mod addressing;
pub mod auth;
pub mod config;
pub mod dialer;
pub mod gate;
pub mod locator;
pub mod network;
pub mod registry;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, SgError};

//! Gate endpoints
//!
//! The [`GateEndpoint`] trait is the protocol surface one side of a
//! connection exposes to the network directory; [`Stargate`] is the real
//! state machine and [`Despawned`] the terminal stand-in substituted for
//! endpoints that are not currently hosted.

mod hardware;
mod stargate;

pub use hardware::{GateHardware, NullHardware, PolledHardware};
pub use stargate::Stargate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one gate endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Idle,
    Dialing,
    Engaged,
    /// Terminal; substitutes for any endpoint that is not currently hosted
    Despawned,
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateStatus::Idle => "idle",
            GateStatus::Dialing => "dialing",
            GateStatus::Engaged => "engaged",
            GateStatus::Despawned => "despawned",
        };
        f.write_str(name)
    }
}

/// One side of a gate connection, as seen by the network directory.
///
/// All operations are side-effecting and absorb their own failures: an
/// endpoint method never panics the hosting session and never propagates an
/// error through the directory's fan-out.
#[async_trait]
pub trait GateEndpoint: Send + Sync {
    fn fqlid(&self) -> String;

    async fn status(&self) -> GateStatus;

    /// Begin an outgoing dial: resolve the target, set both ends dialing,
    /// then drive the chevron sequence and engage.
    async fn start_dialing(&self, sequence: &[u8], timestamp_ms: i64);

    /// Enter the dialing state. `target_sequence` is `None` on the incoming
    /// side; direction is inferred from it.
    async fn start_sequence(
        &self,
        target_fqlid: &str,
        target_sequence: Option<&[u8]>,
        timestamp_ms: i64,
    );

    /// One chevron has locked; silent slots produce no status text
    async fn light_chevron(&self, index: usize, silent: bool);

    /// Dialing finished; engage the wormhole
    async fn connect(&self);

    /// Close or abort. A timestamp that does not match the current
    /// connection is stale and ignored.
    async fn disconnect(&self, timestamp_ms: i64);

    /// Hosting session is shutting down
    async fn stopped(&self);
}

/// Terminal stand-in for an endpoint that is not hosted.
///
/// The directory substitutes this for missing or deannounced gates so
/// fan-out calls never dereference a dangling entry.
pub struct Despawned;

#[async_trait]
impl GateEndpoint for Despawned {
    fn fqlid(&self) -> String {
        String::new()
    }

    async fn status(&self) -> GateStatus {
        GateStatus::Despawned
    }

    async fn start_dialing(&self, _sequence: &[u8], _timestamp_ms: i64) {}

    async fn start_sequence(
        &self,
        _target_fqlid: &str,
        _target_sequence: Option<&[u8]>,
        _timestamp_ms: i64,
    ) {
    }

    async fn light_chevron(&self, _index: usize, _silent: bool) {}

    async fn connect(&self) {}

    async fn disconnect(&self, _timestamp_ms: i64) {}

    async fn stopped(&self) {}
}

//! Hardware seam between the gate state machine and the scene layer
//!
//! The rendering/sound side of a gate lives in the hosting session and is an
//! external collaborator; the state machine only drives it through this
//! trait. [`PolledHardware`] bridges clients that cannot be pushed to by
//! posting the same calls as events into the network mailbox.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::network::SgNetwork;

/// Scene-side effects of one gate
#[async_trait]
pub trait GateHardware: Send + Sync {
    /// Rotate the ring to a symbol and lock a chevron. Runs to completion;
    /// aborts take effect only between steps.
    async fn dial_animation(&self, chevron: usize, symbol: u8, counterclockwise: bool);

    /// Light a chevron (both ends of the connection see this)
    async fn light_chevron(&self, chevron: usize, silent: bool);

    /// Open or close the wormhole visuals; destination is the portal URL
    /// on the outgoing side
    async fn set_wormhole(&self, active: bool, destination: Option<&str>);

    /// Status text for the session (forwarded to the paired dial computer
    /// by the state machine)
    fn report(&self, message: &str);
}

/// Hardware that does nothing; used by tests and headless endpoints
pub struct NullHardware;

#[async_trait]
impl GateHardware for NullHardware {
    async fn dial_animation(&self, _chevron: usize, _symbol: u8, _counterclockwise: bool) {}

    async fn light_chevron(&self, _chevron: usize, _silent: bool) {}

    async fn set_wormhole(&self, _active: bool, _destination: Option<&str>) {}

    fn report(&self, message: &str) {
        info!("gate: {}", message);
    }
}

/// Hardware for HTTP-polling clients.
///
/// Every call is posted as a JSON event into the gate's mailbox; the remote
/// client drains the mailbox via the events endpoint and performs the
/// visuals on its side.
pub struct PolledHardware {
    network: Arc<SgNetwork>,
    fqlid: String,
}

impl PolledHardware {
    pub fn new(network: Arc<SgNetwork>, fqlid: String) -> Self {
        Self { network, fqlid }
    }

    fn post(&self, payload: serde_json::Value) {
        let network = Arc::clone(&self.network);
        let fqlid = self.fqlid.clone();
        tokio::spawn(async move {
            network.post_event(&fqlid, payload).await;
        });
    }
}

#[async_trait]
impl GateHardware for PolledHardware {
    async fn dial_animation(&self, chevron: usize, symbol: u8, counterclockwise: bool) {
        self.network
            .post_event(
                &self.fqlid,
                json!({
                    "command": "dialAnimation",
                    "chevron": chevron,
                    "symbol": symbol,
                    "counterclockwise": counterclockwise,
                }),
            )
            .await;
    }

    async fn light_chevron(&self, chevron: usize, silent: bool) {
        self.network
            .post_event(
                &self.fqlid,
                json!({
                    "command": "lightChevron",
                    "chevron": chevron,
                    "silent": silent,
                }),
            )
            .await;
    }

    async fn set_wormhole(&self, active: bool, destination: Option<&str>) {
        self.network
            .post_event(
                &self.fqlid,
                json!({
                    "command": "wormhole",
                    "active": active,
                    "destination": destination,
                }),
            )
            .await;
    }

    fn report(&self, message: &str) {
        self.post(json!({
            "command": "status",
            "message": message,
        }));
    }
}

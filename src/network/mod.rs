//! Process-wide gate network directory and event bus
//!
//! Maps FQLID to the gate and dial-computer instances hosted in this
//! process, and fans protocol operations out to both endpoints of a
//! connection. Explicitly constructed with application scope and injected
//! into session objects; one instance per hosting process.
//!
//! Directory entries are created lazily and never removed: a despawned gate
//! is replaced by the terminal [`Despawned`] stand-in so a concurrent
//! fan-out call never dereferences a dangling entry.

mod mailbox;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::dialer::SgDialComputer;
use crate::gate::{Despawned, GateEndpoint};

#[derive(Default)]
struct DirectoryEntry {
    gate: Option<Arc<dyn GateEndpoint>>,
    dial_comp: Option<Arc<SgDialComputer>>,
}

/// The shared gate network directory
pub struct SgNetwork {
    directory: DashMap<String, DirectoryEntry>,
    mailboxes: mailbox::MailboxTable,
}

impl SgNetwork {
    pub fn new() -> Self {
        Self {
            directory: DashMap::new(),
            mailboxes: mailbox::MailboxTable::new(),
        }
    }

    /// Register a gate under its FQLID
    pub fn announce_gate(&self, gate: Arc<dyn GateEndpoint>) {
        let fqlid = gate.fqlid();
        info!("Gate announced: {}", fqlid);
        self.directory.entry(fqlid).or_default().gate = Some(gate);
    }

    /// Replace a gate with the terminal stand-in. The entry itself stays.
    pub fn deannounce_gate(&self, fqlid: &str) {
        if let Some(mut entry) = self.directory.get_mut(fqlid) {
            info!("Gate deannounced: {}", fqlid);
            entry.gate = Some(Arc::new(Despawned));
        }
    }

    pub fn register_dial_computer(&self, dial_comp: Arc<SgDialComputer>) {
        let fqlid = dial_comp.fqlid().to_string();
        debug!("Dial computer registered: {}", fqlid);
        self.directory.entry(fqlid).or_default().dial_comp = Some(dial_comp);
    }

    pub fn get_gate(&self, fqlid: &str) -> Option<Arc<dyn GateEndpoint>> {
        self.directory.get(fqlid).and_then(|entry| entry.gate.clone())
    }

    pub fn get_dial_computer(&self, fqlid: &str) -> Option<Arc<SgDialComputer>> {
        self.directory
            .get(fqlid)
            .and_then(|entry| entry.dial_comp.clone())
    }

    /// Endpoint for fan-out: a missing or deannounced gate resolves to the
    /// terminal stand-in, never to a dangling reference.
    fn endpoint(&self, fqlid: &str) -> Arc<dyn GateEndpoint> {
        self.get_gate(fqlid).unwrap_or_else(|| Arc::new(Despawned))
    }

    /// Put both ends of a connection into the dialing state. The source is
    /// always invoked before the target; the target side sees no sequence
    /// and infers the incoming direction from that.
    pub async fn start_sequence_both(
        &self,
        source: &str,
        target: &str,
        sequence: Option<&[u8]>,
        timestamp_ms: i64,
    ) {
        self.endpoint(source)
            .start_sequence(target, sequence, timestamp_ms)
            .await;
        self.endpoint(target)
            .start_sequence(source, None, timestamp_ms)
            .await;
    }

    /// Notify both ends that a chevron has locked
    pub async fn light_chevron_both(&self, source: &str, target: &str, index: usize, silent: bool) {
        self.endpoint(source).light_chevron(index, silent).await;
        self.endpoint(target).light_chevron(index, silent).await;
    }

    /// Engage the wormhole on both ends
    pub async fn connect_both(&self, source: &str, target: &str) {
        self.endpoint(source).connect().await;
        self.endpoint(target).connect().await;
    }

    /// Close or abort on both ends. Stale timestamps no-op per endpoint.
    pub async fn disconnect_both(&self, source: &str, target: &str, timestamp_ms: i64) {
        self.endpoint(source).disconnect(timestamp_ms).await;
        self.endpoint(target).disconnect(timestamp_ms).await;
    }

    /// Queue an event for an HTTP-polling client
    pub async fn post_event(&self, fqlid: &str, payload: serde_json::Value) {
        self.mailboxes.post(fqlid, payload).await;
    }

    /// Wait for queued events, up to `timeout`.
    ///
    /// Resolves immediately when events are already queued; a timeout
    /// resolves with whatever arrived in the meantime (possibly nothing).
    /// Every call drains and deletes the mailbox. A second concurrent waiter
    /// on the same FQLID gets `SgError::WaiterConflict`.
    pub async fn wait_event(
        &self,
        fqlid: &str,
        timeout: std::time::Duration,
    ) -> crate::types::Result<Vec<serde_json::Value>> {
        self.mailboxes.wait(fqlid, timeout).await
    }
}

impl Default for SgNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateStatus;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_endpoint_resolves_to_despawned() {
        let network = SgNetwork::new();
        assert!(network.get_gate("altspace/space/nowhere").is_none());

        // Fan-out against entirely unknown FQLIDs must not panic
        network
            .start_sequence_both("altspace/space/a", "altspace/space/b", Some(&[1, 2]), 1)
            .await;
        network
            .light_chevron_both("altspace/space/a", "altspace/space/b", 0, false)
            .await;
        network.connect_both("altspace/space/a", "altspace/space/b").await;
        network
            .disconnect_both("altspace/space/a", "altspace/space/b", 1)
            .await;
    }

    #[tokio::test]
    async fn test_deannounce_substitutes_stand_in() {
        let network = SgNetwork::new();
        network.announce_gate(Arc::new(Despawned)); // fqlid "" for the stand-in itself

        network.deannounce_gate("");
        let gate = network.get_gate("").expect("entry must survive deannounce");
        assert_eq!(gate.status().await, GateStatus::Despawned);
    }

    #[tokio::test]
    async fn test_wait_event_immediate() {
        let network = SgNetwork::new();
        network.post_event("g/x", json!({"n": 1})).await;
        network.post_event("g/x", json!({"n": 2})).await;

        let events = network
            .wait_event("g/x", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);

        // The mailbox was drained and deleted
        let events = network
            .wait_event("g/x", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_wait_event_wakes_on_post() {
        let network = Arc::new(SgNetwork::new());

        let waiter = {
            let network = Arc::clone(&network);
            tokio::spawn(async move {
                network.wait_event("g/y", Duration::from_secs(5)).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        network.post_event("g/y", json!({"n": 1})).await;

        let events = waiter.await.unwrap().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_second_waiter_is_a_defined_error() {
        let network = Arc::new(SgNetwork::new());

        let first = {
            let network = Arc::clone(&network);
            tokio::spawn(async move {
                network.wait_event("g/z", Duration::from_millis(200)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = network.wait_event("g/z", Duration::from_millis(10)).await;
        assert!(matches!(
            second,
            Err(crate::types::SgError::WaiterConflict(_))
        ));

        // The first waiter still completes normally on timeout
        assert!(first.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_frees_the_mailbox() {
        let network = Arc::new(SgNetwork::new());

        let first = {
            let network = Arc::clone(&network);
            tokio::spawn(async move {
                network.wait_event("g/w", Duration::from_secs(5)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The client's connection drops mid-poll
        first.abort();
        let _ = first.await;

        // A reconnecting poller attaches instead of getting a conflict
        let events = network
            .wait_event("g/w", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(events.is_empty());
    }
}

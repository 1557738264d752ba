//! The gate state machine
//!
//! Normal outgoing cycle: idle -> dialing -> engaged -> idle. An incoming
//! reset or an aborted outgoing dial returns to idle from dialing. All
//! transitions are guarded by the current state so that one endpoint
//! observing the other mid-transition is absorbed instead of escalated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{GateEndpoint, GateHardware, GateStatus};
use crate::addressing::{
    fqlid, location_id_of, lookup_dialed_target, parse_fqlid, to_letters, translate_to_url,
    AddressError, Galaxy, NUMBERING_BASE, TERMINATOR, TOTAL_CHEVRONS,
};
use crate::network::SgNetwork;
use crate::registry::LocationStore;

struct GateInner {
    status: GateStatus,
    target_fqlid: Option<String>,
    /// Timestamp of the connection this gate is part of; the identity check
    /// that makes stale disconnects no-ops.
    connection_ts: i64,
    incoming: bool,
}

/// One hosted gate endpoint
pub struct Stargate {
    fqlid: String,
    galaxy: Galaxy,
    location: String,
    network: Arc<SgNetwork>,
    store: Arc<dyn LocationStore>,
    hardware: Box<dyn GateHardware>,
    inner: Mutex<GateInner>,
    /// Cooperative abort for the dial loop; checked between steps, never
    /// interrupts an animation in flight.
    abort_requested: AtomicBool,
    wormhole_open_ms: u64,
}

impl Stargate {
    pub fn new(
        network: Arc<SgNetwork>,
        store: Arc<dyn LocationStore>,
        hardware: Box<dyn GateHardware>,
        galaxy: Galaxy,
        location: impl Into<String>,
        wormhole_open_ms: u64,
    ) -> Self {
        let location = location.into();
        Self {
            fqlid: fqlid(&location, galaxy),
            galaxy,
            location,
            network,
            store,
            hardware,
            inner: Mutex::new(GateInner {
                status: GateStatus::Idle,
                target_fqlid: None,
                connection_ts: 0,
                incoming: false,
            }),
            abort_requested: AtomicBool::new(false),
            wormhole_open_ms,
        }
    }

    /// Register this gate in the network directory
    pub fn announce(self: &Arc<Self>) {
        self.network.announce_gate(Arc::clone(self) as Arc<dyn GateEndpoint>);
    }

    /// Status text to the hosting session and the paired dial computer
    fn report(&self, message: &str) {
        self.hardware.report(message);
        if let Some(dial_comp) = self.network.get_dial_computer(&self.fqlid) {
            dial_comp.report(message);
        }
    }

    async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.status = GateStatus::Idle;
        inner.target_fqlid = None;
        inner.incoming = false;
        self.abort_requested.store(false, Ordering::SeqCst);
    }

    /// Drive the chevron sequence: per dialed symbol, the lock animation
    /// then a fan-out notification, alternating rotation direction; after
    /// the real symbols the remaining slots are lit silently. The abort
    /// flag is consulted between steps only.
    async fn run_dial_sequence(&self, sequence: &[u8], target: &str) -> Result<(), String> {
        let symbols: Vec<u8> = sequence
            .iter()
            .copied()
            .take_while(|&digit| digit != TERMINATOR)
            .collect();

        for (index, &symbol) in symbols.iter().enumerate() {
            if self.abort_requested.swap(false, Ordering::SeqCst) {
                return Err("Dialing aborted".to_string());
            }
            self.hardware
                .dial_animation(index, symbol, index % 2 == 1)
                .await;
            self.network
                .light_chevron_both(&self.fqlid, target, index, false)
                .await;
        }

        for index in symbols.len()..TOTAL_CHEVRONS {
            if self.abort_requested.swap(false, Ordering::SeqCst) {
                return Err("Dialing aborted".to_string());
            }
            self.network
                .light_chevron_both(&self.fqlid, target, index, true)
                .await;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl GateEndpoint for Stargate {
    fn fqlid(&self) -> String {
        self.fqlid.clone()
    }

    async fn status(&self) -> GateStatus {
        self.inner.lock().await.status
    }

    async fn start_dialing(&self, sequence: &[u8], timestamp_ms: i64) {
        {
            let inner = self.inner.lock().await;
            if inner.status != GateStatus::Idle {
                self.report("Gate is busy");
                return;
            }
        }

        if self.network.get_gate(&self.fqlid).is_none() {
            self.report("Gate is not registered with the network");
            return;
        }

        let target = match lookup_dialed_target(
            sequence,
            NUMBERING_BASE,
            self.galaxy,
            self.store.as_ref(),
        )
        .await
        {
            Ok(target) => target,
            Err(AddressError::Unregistered(parsed)) => {
                self.report(&format!(
                    "Address {} is valid but not registered",
                    to_letters(&parsed.digits)
                ));
                return;
            }
            Err(e) => {
                // Malformed input keeps its @-prefixed marker
                self.report(&e.to_string());
                return;
            }
        };

        let target_fqlid = fqlid(&target.location, target.galaxy);
        if target_fqlid == self.fqlid {
            self.report("Cannot dial the local gate");
            return;
        }

        self.abort_requested.store(false, Ordering::SeqCst);
        self.network
            .start_sequence_both(&self.fqlid, &target_fqlid, Some(sequence), timestamp_ms)
            .await;

        match self.run_dial_sequence(sequence, &target_fqlid).await {
            Ok(()) => {
                self.network.connect_both(&self.fqlid, &target_fqlid).await;
            }
            Err(reason) => {
                self.reset().await;
                self.report(&reason);
            }
        }
    }

    async fn start_sequence(
        &self,
        target_fqlid: &str,
        target_sequence: Option<&[u8]>,
        timestamp_ms: i64,
    ) {
        let incoming = target_sequence.is_none();
        {
            let mut inner = self.inner.lock().await;
            if inner.status != GateStatus::Idle {
                warn!(
                    "Gate {}: start_sequence rejected in state {}",
                    self.fqlid, inner.status
                );
                return;
            }
            inner.status = GateStatus::Dialing;
            inner.target_fqlid = Some(target_fqlid.to_string());
            inner.connection_ts = timestamp_ms;
            inner.incoming = incoming;
        }

        self.report(if incoming {
            "Incoming wormhole"
        } else {
            "Dialing..."
        });
    }

    async fn light_chevron(&self, index: usize, silent: bool) {
        {
            let inner = self.inner.lock().await;
            if inner.status != GateStatus::Dialing {
                return;
            }
        }

        self.hardware.light_chevron(index, silent).await;
        if !silent {
            self.report(&format!("Chevron {} locked", index + 1));
        }
    }

    async fn connect(&self) {
        let (incoming, connection_ts, target_fqlid) = {
            let mut inner = self.inner.lock().await;
            if inner.status != GateStatus::Dialing {
                warn!("Gate {}: connect rejected in state {}", self.fqlid, inner.status);
                return;
            }
            inner.status = GateStatus::Engaged;
            (inner.incoming, inner.connection_ts, inner.target_fqlid.clone())
        };

        // Portal destination for travelers stepping through
        let destination = target_fqlid
            .as_deref()
            .and_then(parse_fqlid)
            .and_then(|(galaxy, location)| translate_to_url(location, galaxy));

        self.hardware
            .set_wormhole(true, destination.as_deref())
            .await;
        self.report("Wormhole engaged");

        // Each endpoint refreshes its own registry entry on connect
        self.store
            .touch(location_id_of(&self.location), self.galaxy.digit())
            .await;

        if !incoming {
            if let Some(target) = target_fqlid {
                let network = Arc::clone(&self.network);
                let source = self.fqlid.clone();
                let open_ms = self.wormhole_open_ms;
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(open_ms)).await;
                    // Stale if a manual disconnect already happened
                    network.disconnect_both(&source, &target, connection_ts).await;
                });
            }
        }
    }

    async fn disconnect(&self, timestamp_ms: i64) {
        let (status, incoming) = {
            let inner = self.inner.lock().await;
            if timestamp_ms != inner.connection_ts {
                debug!(
                    "Gate {}: ignoring stale disconnect ({} != {})",
                    self.fqlid, timestamp_ms, inner.connection_ts
                );
                return;
            }
            (inner.status, inner.incoming)
        };

        match status {
            GateStatus::Engaged => {
                self.hardware.set_wormhole(false, None).await;
                self.reset().await;
                self.report("Wormhole disengaged");
            }
            GateStatus::Dialing if incoming => {
                self.reset().await;
                self.report("Incoming connection aborted");
            }
            GateStatus::Dialing => {
                // Outgoing dial: the in-flight chevron step cannot be
                // interrupted; the dial loop picks the flag up between steps.
                self.abort_requested.store(true, Ordering::SeqCst);
            }
            GateStatus::Idle | GateStatus::Despawned => {}
        }
    }

    async fn stopped(&self) {
        let (status, incoming, connection_ts, target_fqlid) = {
            let inner = self.inner.lock().await;
            (
                inner.status,
                inner.incoming,
                inner.connection_ts,
                inner.target_fqlid.clone(),
            )
        };

        // The outgoing side forces the teardown; the incoming side leaves
        // cleanup to the outgoing side's own timeout so two independently
        // hosted sessions never race a double teardown.
        if !incoming && matches!(status, GateStatus::Dialing | GateStatus::Engaged) {
            if let Some(target) = target_fqlid {
                self.network
                    .disconnect_both(&self.fqlid, &target, connection_ts)
                    .await;
            }
        }

        self.network.deannounce_gate(&self.fqlid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::sequence_of;
    use crate::gate::NullHardware;
    use crate::registry::FileStore;
    use async_trait::async_trait;

    struct SlowHardware {
        step: Duration,
    }

    #[async_trait]
    impl GateHardware for SlowHardware {
        async fn dial_animation(&self, _chevron: usize, _symbol: u8, _counterclockwise: bool) {
            tokio::time::sleep(self.step).await;
        }

        async fn light_chevron(&self, _chevron: usize, _silent: bool) {}

        async fn set_wormhole(&self, _active: bool, _destination: Option<&str>) {}

        fn report(&self, _message: &str) {}
    }

    async fn test_store() -> Arc<dyn LocationStore> {
        let path = std::env::temp_dir()
            .join(format!("sgnetwork-gate-{}.json", uuid::Uuid::new_v4()));
        Arc::new(FileStore::open(path.to_str().unwrap()).await.unwrap())
    }

    async fn gate_pair(
        wormhole_open_ms: u64,
        a_hardware: Box<dyn GateHardware>,
    ) -> (Arc<SgNetwork>, Arc<Stargate>, Arc<Stargate>) {
        let network = Arc::new(SgNetwork::new());
        let store = test_store().await;

        for location in ["space/alpha", "space/beta"] {
            store
                .register(location_id_of(location), Galaxy::Altspace.digit(), location)
                .await
                .unwrap();
        }

        let a = Arc::new(Stargate::new(
            Arc::clone(&network),
            Arc::clone(&store),
            a_hardware,
            Galaxy::Altspace,
            "space/alpha",
            wormhole_open_ms,
        ));
        let b = Arc::new(Stargate::new(
            Arc::clone(&network),
            Arc::clone(&store),
            Box::new(NullHardware),
            Galaxy::Altspace,
            "space/beta",
            wormhole_open_ms,
        ));
        a.announce();
        b.announce();

        (network, a, b)
    }

    fn dial_sequence_for(location: &str) -> Vec<u8> {
        let mut seq = sequence_of(location_id_of(location), NUMBERING_BASE);
        seq.push(TERMINATOR);
        seq
    }

    #[tokio::test]
    async fn test_full_dial_cycle() {
        let (network, a, b) = gate_pair(120_000, Box::new(NullHardware)).await;

        a.start_dialing(&dial_sequence_for("space/beta"), 1000).await;
        assert_eq!(a.status().await, GateStatus::Engaged);
        assert_eq!(b.status().await, GateStatus::Engaged);

        // A stale timestamp is a silent no-op
        network
            .disconnect_both(&a.fqlid(), &b.fqlid(), 999)
            .await;
        assert_eq!(a.status().await, GateStatus::Engaged);
        assert_eq!(b.status().await, GateStatus::Engaged);

        network
            .disconnect_both(&a.fqlid(), &b.fqlid(), 1000)
            .await;
        assert_eq!(a.status().await, GateStatus::Idle);
        assert_eq!(b.status().await, GateStatus::Idle);
    }

    #[tokio::test]
    async fn test_dialing_unregistered_address_resets() {
        let (_network, a, _b) = gate_pair(120_000, Box::new(NullHardware)).await;

        a.start_dialing(&dial_sequence_for("space/nowhere"), 1000).await;
        assert_eq!(a.status().await, GateStatus::Idle);
    }

    #[tokio::test]
    async fn test_malformed_sequence_resets() {
        let (_network, a, _b) = gate_pair(120_000, Box::new(NullHardware)).await;

        a.start_dialing(&[1, 2, 3], 1000).await;
        assert_eq!(a.status().await, GateStatus::Idle);

        a.start_dialing(&[], 1000).await;
        assert_eq!(a.status().await, GateStatus::Idle);
    }

    #[tokio::test]
    async fn test_busy_gate_rejects_second_dial() {
        let (_network, a, b) = gate_pair(120_000, Box::new(NullHardware)).await;

        a.start_dialing(&dial_sequence_for("space/beta"), 1000).await;
        assert_eq!(a.status().await, GateStatus::Engaged);

        // Engaged gate stays engaged
        a.start_dialing(&dial_sequence_for("space/beta"), 2000).await;
        assert_eq!(a.status().await, GateStatus::Engaged);
        assert_eq!(b.status().await, GateStatus::Engaged);
    }

    #[tokio::test]
    async fn test_abort_mid_dial_resets_both_sides() {
        let (network, a, b) = gate_pair(
            120_000,
            Box::new(SlowHardware {
                step: Duration::from_millis(25),
            }),
        )
        .await;

        let dialing = {
            let a = Arc::clone(&a);
            tokio::spawn(async move {
                a.start_dialing(&dial_sequence_for("space/beta"), 1000).await;
            })
        };

        // Let the loop get past the first chevron, then request disconnect
        tokio::time::sleep(Duration::from_millis(40)).await;
        network
            .disconnect_both(&a.fqlid(), &b.fqlid(), 1000)
            .await;

        dialing.await.unwrap();
        assert_eq!(a.status().await, GateStatus::Idle);
        assert_eq!(b.status().await, GateStatus::Idle);
    }

    #[tokio::test]
    async fn test_wormhole_auto_closes() {
        let (_network, a, b) = gate_pair(50, Box::new(NullHardware)).await;

        a.start_dialing(&dial_sequence_for("space/beta"), 1000).await;
        assert_eq!(a.status().await, GateStatus::Engaged);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(a.status().await, GateStatus::Idle);
        assert_eq!(b.status().await, GateStatus::Idle);
    }

    #[tokio::test]
    async fn test_outgoing_stop_forces_teardown() {
        let (network, a, b) = gate_pair(120_000, Box::new(NullHardware)).await;

        a.start_dialing(&dial_sequence_for("space/beta"), 1000).await;
        a.stopped().await;

        // The outgoing side tore the connection down before deannouncing
        assert_eq!(b.status().await, GateStatus::Idle);
        let stand_in = network.get_gate(&a.fqlid()).unwrap();
        assert_eq!(stand_in.status().await, GateStatus::Despawned);
    }

    #[tokio::test]
    async fn test_incoming_stop_leaves_connection() {
        let (network, a, b) = gate_pair(120_000, Box::new(NullHardware)).await;

        a.start_dialing(&dial_sequence_for("space/beta"), 1000).await;
        b.stopped().await;

        // The incoming side deannounces without forcing a disconnect;
        // the outgoing side's own timeout handles cleanup.
        assert_eq!(a.status().await, GateStatus::Engaged);
        let stand_in = network.get_gate(&b.fqlid()).unwrap();
        assert_eq!(stand_in.status().await, GateStatus::Despawned);
    }
}

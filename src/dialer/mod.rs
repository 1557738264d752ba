//! Dial computer state machine
//!
//! The keypad endpoint paired with a gate. Accumulates a symbol buffer,
//! enforces per-user typing cooldowns, and on a complete sequence hands the
//! dial over to the paired gate. Special letter sequences drive gate
//! registration and deregistration through the registry.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::addressing::{
    location_id_of, required_digits, sequence_of, to_letters, to_numbers, Galaxy, NUMBERING_BASE,
    TERMINATOR,
};
use crate::gate::GateStatus;
use crate::network::SgNetwork;
use crate::registry::LocationStore;

/// A different user may take over the keypad after this much silence
pub const CROSS_TALK_WINDOW_MS: i64 = 30_000;

/// Takeover window while the paired gate is dialing or engaged
pub const BUSY_CROSS_TALK_WINDOW_MS: i64 = 180_000;

/// Typed letter sequence that registers the local gate
pub const REGISTER_SEQUENCE: &str = "register";

/// Typed letter sequence that deregisters the local gate
pub const DEREGISTER_SEQUENCE: &str = "deregister";

/// Magic sequence substituted with the well-known hub address.
///
/// Special sequences must avoid the letter `a`: it encodes the terminator
/// digit, which ends the buffer instead of entering it.
pub const MAGIC_SEQUENCE: &str = "celestis";

/// Address the magic sequence dials
pub const WELL_KNOWN_TARGET: &str = "erebus";

/// Operator name that bypasses the realm role check
pub const SUPERUSER_NAME: &str = "Gate Builder";

/// Keypad user as reported by the hosting realm
#[derive(Debug, Clone)]
pub struct DialerUser {
    pub id: String,
    pub name: String,
    /// Realm presenter/helper role
    pub moderator: bool,
}

/// Display side of the dial computer (keypad screen, status line)
pub trait DialerPanel: Send + Sync {
    fn report(&self, message: &str);
    fn sequence_changed(&self, letters: &str);
}

/// Panel that only logs; used by tests and headless endpoints
pub struct NullPanel;

impl DialerPanel for NullPanel {
    fn report(&self, message: &str) {
        info!("dial computer: {}", message);
    }

    fn sequence_changed(&self, _letters: &str) {}
}

/// Panel for HTTP-polling clients.
///
/// Every call is posted as a JSON event into the endpoint's mailbox, the
/// same bridge [`crate::gate::PolledHardware`] uses for the gate side.
pub struct PolledPanel {
    network: Arc<SgNetwork>,
    fqlid: String,
}

impl PolledPanel {
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

impl DialerPanel for PolledPanel {
    fn report(&self, message: &str) {
        self.post(serde_json::json!({
            "command": "status",
            "message": message,
        }));
    }

    fn sequence_changed(&self, letters: &str) {
        self.post(serde_json::json!({
            "command": "sequence",
            "letters": letters,
        }));
    }
}

struct DialerInner {
    buffer: Vec<u8>,
    last_user: Option<String>,
    last_typed_ms: i64,
}

/// One hosted dial computer endpoint
pub struct SgDialComputer {
    fqlid: String,
    galaxy: Galaxy,
    location: String,
    network: Arc<SgNetwork>,
    store: Arc<dyn LocationStore>,
    panel: Box<dyn DialerPanel>,
    inner: Mutex<DialerInner>,
}

impl SgDialComputer {
    pub fn new(
        network: Arc<SgNetwork>,
        store: Arc<dyn LocationStore>,
        panel: Box<dyn DialerPanel>,
        galaxy: Galaxy,
        location: impl Into<String>,
    ) -> Self {
        let location = location.into();
        Self {
            fqlid: crate::addressing::fqlid(&location, galaxy),
            galaxy,
            location,
            network,
            store,
            panel,
            inner: Mutex::new(DialerInner {
                buffer: Vec::new(),
                last_user: None,
                last_typed_ms: 0,
            }),
        }
    }

    /// Register this dial computer in the network directory
    pub fn register(self: &Arc<Self>) {
        self.network.register_dial_computer(Arc::clone(self));
    }

    pub fn fqlid(&self) -> &str {
        &self.fqlid
    }

    /// Status text forwarded from the paired gate
    pub fn report(&self, message: &str) {
        self.panel.report(message);
    }

    /// Current buffer in letter form (keypad display)
    pub async fn sequence_letters(&self) -> String {
        to_letters(&self.inner.lock().await.buffer)
    }

    /// Handle one keypad press.
    ///
    /// `now_ms` is the press timestamp; the caller supplies it so cooldown
    /// windows stay testable.
    pub async fn key_press(&self, user: &DialerUser, key: u8, now_ms: i64) {
        let gate_busy = match self.network.get_gate(&self.fqlid) {
            Some(gate) => matches!(
                gate.status().await,
                GateStatus::Dialing | GateStatus::Engaged
            ),
            None => false,
        };

        let buffer = {
            let mut inner = self.inner.lock().await;

            if let Some(last_user) = &inner.last_user {
                if last_user != &user.id {
                    let elapsed = now_ms - inner.last_typed_ms;
                    if elapsed < CROSS_TALK_WINDOW_MS
                        || (gate_busy && elapsed < BUSY_CROSS_TALK_WINDOW_MS)
                    {
                        drop(inner);
                        self.panel.report("Another user is working the dial computer");
                        return;
                    }
                }
            }

            inner.last_user = Some(user.id.clone());
            inner.last_typed_ms = now_ms;

            if key != TERMINATOR {
                inner.buffer.push(key);
                let letters = to_letters(&inner.buffer);
                drop(inner);
                self.panel.sequence_changed(&letters);
                return;
            }

            std::mem::take(&mut inner.buffer)
        };

        // Terminator pressed: the buffer is consumed either way
        self.panel.sequence_changed("");
        let letters = to_letters(&buffer);

        match letters.as_str() {
            REGISTER_SEQUENCE => self.register_location(user, false).await,
            DEREGISTER_SEQUENCE => self.deregister_location(user, false).await,
            _ if buffer.len() >= required_digits(NUMBERING_BASE) => {
                let mut sequence = if letters == MAGIC_SEQUENCE {
                    to_numbers(WELL_KNOWN_TARGET)
                } else {
                    buffer
                };
                sequence.push(TERMINATOR);

                match self.network.get_gate(&self.fqlid) {
                    Some(gate) => gate.start_dialing(&sequence, now_ms).await,
                    None => self.panel.report("No gate is paired with this dial computer"),
                }
            }
            _ => self.panel.report("Sequence deleted"),
        }
    }

    fn may_administer(user: &DialerUser) -> bool {
        user.moderator || user.name == SUPERUSER_NAME
    }

    /// Register the local gate's resolved location. At-most-once: failures
    /// are reported, never retried.
    pub async fn register_location(&self, user: &DialerUser, silent: bool) {
        if !Self::may_administer(user) {
            if !silent {
                self.panel.report("Insufficient privileges to register this gate");
            }
            return;
        }

        let location_id = location_id_of(&self.location);
        match self
            .store
            .register(location_id, self.galaxy.digit(), &self.location)
            .await
        {
            Ok(()) => self.panel.report(&format!(
                "Gate registered as {}",
                to_letters(&sequence_of(location_id, NUMBERING_BASE))
            )),
            Err(e) => self.panel.report(&format!("Registration failed: {e}")),
        }
    }

    /// Remove the local gate's registration
    pub async fn deregister_location(&self, user: &DialerUser, silent: bool) {
        if !Self::may_administer(user) {
            if !silent {
                self.panel.report("Insufficient privileges to deregister this gate");
            }
            return;
        }

        match self.store.delete(self.galaxy.digit(), &self.location).await {
            Ok(()) => self.panel.report("Gate deregistered"),
            Err(e) => self.panel.report(&format!("Deregistration failed: {e}")),
        }
    }
}

//! Single-waiter event mailboxes
//!
//! One mailbox per FQLID bridges HTTP-polling clients: writers post
//! payloads, a single long-poll waiter drains them. The whole table sits
//! behind one async mutex; mailbox operations never hold it across an
//! await.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

use crate::types::{Result, SgError};

#[derive(Default)]
struct Mailbox {
    queue: Vec<Value>,
    waiter: Option<oneshot::Sender<()>>,
}

pub(super) struct MailboxTable {
    boxes: Mutex<HashMap<String, Mailbox>>,
}

impl MailboxTable {
    pub fn new() -> Self {
        Self {
            boxes: Mutex::new(HashMap::new()),
        }
    }

    pub async fn post(&self, fqlid: &str, payload: Value) {
        let mut boxes = self.boxes.lock().await;
        let mailbox = boxes.entry(fqlid.to_string()).or_default();
        mailbox.queue.push(payload);
        if let Some(waiter) = mailbox.waiter.take() {
            let _ = waiter.send(());
        }
    }

    pub async fn wait(&self, fqlid: &str, timeout: Duration) -> Result<Vec<Value>> {
        let wakeup = {
            let mut boxes = self.boxes.lock().await;
            let mailbox = boxes.entry(fqlid.to_string()).or_default();

            if !mailbox.queue.is_empty() {
                // Drain immediately; the mailbox entry is deleted with it
                let mailbox = boxes.remove(fqlid).unwrap_or_default();
                return Ok(mailbox.queue);
            }

            // A sender whose receiver is gone belongs to a wait that was
            // cancelled (dropped connection); its slot is free again.
            if let Some(waiter) = &mailbox.waiter {
                if !waiter.is_closed() {
                    return Err(SgError::WaiterConflict(fqlid.to_string()));
                }
            }

            let (tx, rx) = oneshot::channel();
            mailbox.waiter = Some(tx);
            rx
        };

        // Either an event arrives or the timeout elapses; both paths drain
        // whatever is queued by then.
        let _ = tokio::time::timeout(timeout, wakeup).await;

        let mut boxes = self.boxes.lock().await;
        Ok(boxes.remove(fqlid).map(|mailbox| mailbox.queue).unwrap_or_default())
    }
}

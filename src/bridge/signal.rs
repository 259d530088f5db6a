//! Set-once signals shared between the orchestrator and the worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::session::PairingStatus;

/// Worker side of the pairing signal.
#[derive(Debug)]
pub struct PairingLatch {
    sender: watch::Sender<Option<PairingStatus>>,
}

/// Orchestrator side of the pairing signal.
#[derive(Debug, Clone)]
pub struct PairingWatch {
    receiver: watch::Receiver<Option<PairingStatus>>,
}

pub fn pairing_latch() -> (PairingLatch, PairingWatch) {
    let (sender, receiver) = watch::channel(None);
    (PairingLatch { sender }, PairingWatch { receiver })
}

impl PairingLatch {
    /// Sets the status. Only the first call has an effect; returns whether it did.
    pub fn conclude(&self, status: PairingStatus) -> bool {
        let set = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(status);
            true
        });
        if set {
            debug!("Pairing latch set: {}", status);
        }
        set
    }
}

impl PairingWatch {
    /// `None` while the worker's pairing wait is still running.
    pub fn status(&self) -> Option<PairingStatus> {
        *self.receiver.borrow()
    }

    /// True once the latch was dropped, i.e. the worker is gone.
    pub fn is_closed(&self) -> bool {
        self.receiver.has_changed().is_err()
    }
}

/// Marks that the worker started closing its session.
///
/// A worker dying while this is open died inside the link's teardown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownWindow {
    open: Arc<AtomicBool>,
}

impl ShutdownWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

//! Bridging worker and its orchestrator
//!
//! The worker runs on a blocking thread of its own and is the only code touching the
//! link. The orchestrator talks to it through two signals and the join handle.
//!
//! ```text
//!            ┌──────────── paired (set once) ◄────────────┐
//!            ▼                                            │
//! Guard: Starting ─► WaitingForPairing ─► Running ─► Cancelling ─► Done
//!                                                      │
//!                              cancel (set once) ──────┘
//!                                                      ▼
//! ByteSource ──► BridgingWorker ──► Adapter ──► Session ──► ControllerLink
//! ```

pub mod guard;
pub mod signal;
pub mod source;
pub mod worker;

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

use crate::link::LinkError;

pub use guard::{run_guarded, Guard, GuardSettings, PairingWait, WorkerExit};
pub use signal::{pairing_latch, PairingLatch, PairingWatch, ShutdownWindow};
pub use source::{channel_source, ByteSource, ChannelSource, ReaderSource, SerialSource};
pub use worker::{run_worker, BridgingWorker, WorkerReport, WorkerSettings, WorkerSignals};

/// Fatal worker failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Link failure: {0}")]
    Link(#[from] LinkError),

    #[error("Failed to read from byte source: {0}")]
    Source(#[from] io::Error),
}

/// Failures reported by [`run_guarded`].
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Host action failed: {0}")]
    HostAction(#[source] Box<dyn StdError + Send + Sync>),

    #[error("Host stopped before the action could run")]
    HostStopped,

    #[error("Bridging worker failed: {0}")]
    Worker(#[from] BridgeError),

    #[error("Bridging worker terminated abnormally: {0}")]
    WorkerCrashed(String),
}

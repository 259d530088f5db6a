//! Serial line protocol to gamepad link bridge
//!
//! ```text
//! serial port ──► BridgingWorker ──► Adapter ──► decode ──► Session ──► ControllerLink
//!                      ▲
//!                 run_guarded (pairing wait, host action, cancel + join)
//! ```

pub mod bridge;
pub mod config;
pub mod controller;
pub mod link;
pub mod session;

pub use bridge::{run_guarded, BridgeError, GuardError, GuardSettings};
pub use config::{BridgeConfig, ControllerColor, SerialConfig};
pub use controller::{ButtonFlags, ControllerState, ProtocolError, StickPosition};
pub use link::{ControllerLink, LinkError, RecordingLink};
pub use session::{Adapter, PairingStatus, Session, SessionSettings};

//! Controller Link capability
//!
//! The link is the paired wireless gamepad connection. The bridge never talks to a
//! radio stack directly; it drives whatever implements [`ControllerLink`].
//!
//! Native stacks tend to crash when torn down while a report is in flight, so
//! [`ControllerLink::shutdown`] is allowed to return before the teardown actually
//! happens. [`deferred::DeferredTeardown`] is the helper implementations use for that.

pub mod deferred;
pub mod recording;

use thiserror::Error;

use crate::config::ControllerColor;
use crate::controller::{ButtonFlags, StickPosition};

pub use deferred::{DeferredTeardown, DEFAULT_SHUTDOWN_GRACE};
pub use recording::{LinkCommand, LinkLog, RecordingLink};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to start pairing: {0}")]
    PairingStart(String),

    #[error("Failed to send {command}: {reason}")]
    Send {
        command: &'static str,
        reason: String,
    },

    #[error("Failed to shut down link: {0}")]
    Shutdown(String),

    #[error("Link already closed")]
    Closed,
}

/// Capability surface of a paired gamepad link.
///
/// A link is owned by exactly one [`crate::session::Session`]; calls never overlap.
pub trait ControllerLink: Send + 'static {
    /// Starts advertising with the given color scheme. Returns once advertising runs,
    /// not once paired.
    fn begin_pairing(&mut self, colors: &ControllerColor) -> Result<(), LinkError>;

    fn is_paired(&self) -> bool;

    /// Replaces the full button set.
    fn send_buttons(&mut self, buttons: ButtonFlags) -> Result<(), LinkError>;

    fn send_left_stick(&mut self, position: StickPosition) -> Result<(), LinkError>;

    fn send_right_stick(&mut self, position: StickPosition) -> Result<(), LinkError>;

    /// Releases the link. May defer the native teardown by a grace period and return
    /// before it ran.
    fn shutdown(&mut self) -> Result<(), LinkError>;
}

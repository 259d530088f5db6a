use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use super::{ControllerLink, DeferredTeardown, LinkError};
use crate::config::ControllerColor;
use crate::controller::{ButtonFlags, StickPosition};

/// Command as seen by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    BeginPairing(ControllerColor),
    Buttons(ButtonFlags),
    LeftStick(StickPosition),
    RightStick(StickPosition),
    Shutdown,
}

/// Shared view on what a [`RecordingLink`] received. Stays readable after the link
/// moved into a worker.
#[derive(Debug, Clone, Default)]
pub struct LinkLog {
    commands: Arc<Mutex<Vec<LinkCommand>>>,
    paired: Arc<AtomicBool>,
    torn_down: Arc<AtomicUsize>,
}

impl LinkLog {
    pub fn commands(&self) -> Vec<LinkCommand> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Flips the pairing status, as a remote device connecting would.
    pub fn set_paired(&self, paired: bool) {
        self.paired.store(paired, Ordering::SeqCst);
    }

    pub fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    /// Number of completed native teardowns.
    pub fn teardowns(&self) -> usize {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn push(&self, command: LinkCommand) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }
}

/// Link that records every command instead of driving a radio.
///
/// Used as dry-run link by the binary and as the link double in tests.
#[derive(Debug)]
pub struct RecordingLink {
    log: LinkLog,
    pair_on_begin: bool,
    fail_sends: bool,
    shutdown_grace: Option<Duration>,
    teardown: Option<DeferredTeardown>,
}

impl RecordingLink {
    /// Link that reports paired as soon as pairing starts.
    pub fn new() -> Self {
        Self {
            log: LinkLog::default(),
            pair_on_begin: true,
            fail_sends: false,
            shutdown_grace: None,
            teardown: None,
        }
    }

    /// Link that stays unpaired until [`LinkLog::set_paired`] is called.
    pub fn unpaired() -> Self {
        Self {
            pair_on_begin: false,
            ..Self::new()
        }
    }

    /// Defers the teardown by `grace` on a background thread.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Every send fails with [`LinkError::Send`].
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn log(&self) -> LinkLog {
        self.log.clone()
    }

    fn record_send(&mut self, command: &'static str, entry: LinkCommand) -> Result<(), LinkError> {
        if self.fail_sends {
            return Err(LinkError::Send {
                command,
                reason: "link rejected report".into(),
            });
        }
        debug!(paired = self.log.is_paired(), "Link <- {:?}", entry);
        self.log.push(entry);
        Ok(())
    }
}

impl Default for RecordingLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerLink for RecordingLink {
    fn begin_pairing(&mut self, colors: &ControllerColor) -> Result<(), LinkError> {
        info!(
            "Advertising controller (pad {:#08x}, buttons {:#08x})",
            colors.pad, colors.button
        );
        self.log.push(LinkCommand::BeginPairing(*colors));
        if self.pair_on_begin {
            self.log.set_paired(true);
        }
        Ok(())
    }

    fn is_paired(&self) -> bool {
        self.log.is_paired()
    }

    fn send_buttons(&mut self, buttons: ButtonFlags) -> Result<(), LinkError> {
        self.record_send("buttons", LinkCommand::Buttons(buttons))
    }

    fn send_left_stick(&mut self, position: StickPosition) -> Result<(), LinkError> {
        self.record_send("left stick", LinkCommand::LeftStick(position))
    }

    fn send_right_stick(&mut self, position: StickPosition) -> Result<(), LinkError> {
        self.record_send("right stick", LinkCommand::RightStick(position))
    }

    fn shutdown(&mut self) -> Result<(), LinkError> {
        self.log.push(LinkCommand::Shutdown);
        let log = self.log.clone();
        let teardown = move || {
            log.set_paired(false);
            log.torn_down.fetch_add(1, Ordering::SeqCst);
        };

        match self.shutdown_grace {
            Some(grace) => self.teardown = Some(DeferredTeardown::schedule(grace, teardown)),
            None => teardown(),
        }
        info!("Recording link shut down");
        Ok(())
    }
}

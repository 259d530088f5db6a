//! Session: lifecycle owner of one [`ControllerLink`]
//!
//! ```text
//! Initializing ──► Paired ─────────┐
//!      │                           ├──► Active ──► Closed
//!      └─────────► PairingTimedOut ┘
//! ```
//!
//! A pairing timeout is not an error. The session proceeds unpaired and sends
//! simply go nowhere until a device connects. `Closed` is reached exactly once,
//! by [`Session::close`] or by drop.

pub mod adapter;

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ControllerColor;
use crate::controller::ControllerState;
use crate::link::{ControllerLink, LinkError};

pub use adapter::Adapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Paired,
    PairingTimedOut,
    Active,
    Closed,
}

/// How the pairing wait of a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    Paired,
    TimedOut,
}

impl fmt::Display for PairingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingStatus::Paired => write!(f, "paired"),
            PairingStatus::TimedOut => write!(f, "pairing timed out"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub pairing_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pairing_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub struct Session<L: ControllerLink> {
    link: L,
    state: SessionState,
    pairing: PairingStatus,
}

impl<L: ControllerLink> Session<L> {
    /// Starts pairing and blocks until the link reports paired or the timeout elapsed.
    ///
    /// Only a failure to start advertising is an error.
    pub fn open(
        link: L,
        colors: &ControllerColor,
        settings: &SessionSettings,
    ) -> Result<Self, LinkError> {
        Self::open_until(link, colors, settings, &CancellationToken::new())
    }

    /// Like [`Session::open`], but a cancelled `cancel` ends the pairing wait early
    /// with [`PairingStatus::TimedOut`].
    pub fn open_until(
        mut link: L,
        colors: &ControllerColor,
        settings: &SessionSettings,
        cancel: &CancellationToken,
    ) -> Result<Self, LinkError> {
        debug!("Session {:?}", SessionState::Initializing);
        if let Err(e) = link.begin_pairing(colors) {
            error!("Failed to start pairing: {}", e);
            if let Err(e) = link.shutdown() {
                warn!("Link shutdown after failed pairing start failed: {}", e);
            }
            return Err(e);
        }

        info!(
            "Waiting up to {:?} for a device to pair",
            settings.pairing_timeout
        );
        let started = Instant::now();
        let pairing = loop {
            if link.is_paired() {
                info!("Controller paired after {:?}", started.elapsed());
                break PairingStatus::Paired;
            }
            let elapsed = started.elapsed();
            if elapsed >= settings.pairing_timeout {
                warn!(
                    "Pairing timed out after {:?}, continuing unpaired",
                    settings.pairing_timeout
                );
                break PairingStatus::TimedOut;
            }
            if cancel.is_cancelled() {
                info!("Pairing wait cancelled after {:?}", elapsed);
                break PairingStatus::TimedOut;
            }
            let nap = settings.poll_interval.min(settings.pairing_timeout - elapsed);
            if nap.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(nap);
            }
        };

        let state = match pairing {
            PairingStatus::Paired => SessionState::Paired,
            PairingStatus::TimedOut => SessionState::PairingTimedOut,
        };
        Ok(Self {
            link,
            state,
            pairing,
        })
    }

    /// Live pairing state of the link.
    pub fn is_paired(&self) -> bool {
        self.state != SessionState::Closed && self.link.is_paired()
    }

    /// Outcome of the pairing wait in [`Session::open`].
    pub fn pairing_status(&self) -> PairingStatus {
        self.pairing
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sends the full button set, then each stick that is present.
    pub fn send(&mut self, state: &ControllerState) -> Result<(), LinkError> {
        if self.state == SessionState::Closed {
            return Err(LinkError::Closed);
        }
        self.state = SessionState::Active;

        self.link.send_buttons(state.buttons)?;
        if let Some(stick) = state.left_stick {
            self.link.send_left_stick(stick)?;
        }
        if let Some(stick) = state.right_stick {
            self.link.send_right_stick(stick)?;
        }
        Ok(())
    }

    /// Shuts the link down. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), LinkError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        info!("Closing session");
        self.link.shutdown()
    }
}

impl<L: ControllerLink> Drop for Session<L> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!("Session dropped without close, shutting link down");
            if let Err(e) = self.close() {
                error!("Link shutdown on drop failed: {}", e);
            }
        }
    }
}

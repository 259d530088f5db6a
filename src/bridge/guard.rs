//! Orchestrator running a host action under a live bridge
//!
//! The worker is started on a blocking thread, the host action is released once the
//! worker's pairing wait ended (or the orchestrator's own deadline passed), and the
//! worker is cancelled and joined afterwards, whatever the host action returned.
//!
//! # State Machine
//!
//! ```text
//! Starting ──► WaitingForPairing ──► Running ──► Cancelling ──► Done
//!                     │                              ▲
//!                     └──────── (host stopped) ──────┘
//! ```
//!
//! A worker that panics after it opened its [`ShutdownWindow`] died inside the link's
//! deferred teardown. That exit is logged and treated as a clean one.

use statum::{machine, state};
use std::any::Any;
use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::signal::{pairing_latch, PairingWatch, ShutdownWindow};
use super::source::ByteSource;
use super::worker::{run_worker, WorkerReport, WorkerSettings, WorkerSignals};
use super::{BridgeError, GuardError};
use crate::config::ControllerColor;
use crate::link::ControllerLink;
use crate::session::{PairingStatus, SessionSettings};

#[derive(Clone, Debug)]
pub struct GuardSettings {
    /// Bounds both the session's pairing wait and the orchestrator's.
    pub pairing_timeout: Duration,
    pub pairing_poll: Duration,
    /// Extra wait between the end of pairing and the host action.
    pub settle_delay: Duration,
    pub colors: ControllerColor,
    pub worker: WorkerSettings,
}

impl Default for GuardSettings {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            pairing_timeout: session.pairing_timeout,
            pairing_poll: session.poll_interval,
            settle_delay: Duration::from_secs(1),
            colors: ControllerColor::default(),
            worker: WorkerSettings::default(),
        }
    }
}

impl GuardSettings {
    /// Pairing settings handed to the worker's session.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            pairing_timeout: self.pairing_timeout,
            poll_interval: self.pairing_poll,
        }
    }
}

/// How the pairing wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingWait {
    /// The worker finished its pairing wait.
    Concluded(PairingStatus),
    /// The orchestrator's own deadline passed first.
    Deadline,
    /// The worker ended before reporting.
    WorkerExited,
    HostStopped,
}

/// How the worker thread ended.
#[derive(Debug)]
pub enum WorkerExit {
    Completed(WorkerReport),
    /// Panic inside the link teardown window.
    DeferredShutdownRace(String),
    Failed(BridgeError),
    Crashed(String),
}

impl WorkerExit {
    pub fn classify(
        joined: Result<Result<WorkerReport, BridgeError>, JoinError>,
        window_open: bool,
    ) -> Self {
        match joined {
            Ok(Ok(report)) => WorkerExit::Completed(report),
            Ok(Err(e)) => WorkerExit::Failed(e),
            Err(e) if e.is_panic() && window_open => {
                let message = panic_message(e.into_panic());
                warn!(
                    "Worker died during link teardown, treating as clean exit: {}",
                    message
                );
                WorkerExit::DeferredShutdownRace(message)
            }
            Err(e) if e.is_panic() => WorkerExit::Crashed(panic_message(e.into_panic())),
            Err(e) => WorkerExit::Crashed(e.to_string()),
        }
    }

    /// Absorbed exits map to `Ok`, the report is only there for completed runs.
    pub fn into_result(self) -> Result<Option<WorkerReport>, GuardError> {
        match self {
            WorkerExit::Completed(report) => Ok(Some(report)),
            WorkerExit::DeferredShutdownRace(_) => Ok(None),
            WorkerExit::Failed(e) => Err(GuardError::Worker(e)),
            WorkerExit::Crashed(message) => Err(GuardError::WorkerCrashed(message)),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum GuardState {
    Starting,          // Worker being spawned
    WaitingForPairing, // Host action held back
    Running,           // Host action may run
    Cancelling,        // Worker told to stop
    Done,              // Worker joined
}

#[machine]
pub struct Guard<S: GuardState> {
    settings: GuardSettings,
    host_stop: CancellationToken,
    cancel: CancellationToken,
    window: ShutdownWindow,
    pairing: PairingWatch,
    worker: JoinHandle<Result<WorkerReport, BridgeError>>,
}

impl<S: GuardState> Guard<S> {
    /// Token cancelling the worker.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Guard<Starting> {
    /// Spawns the worker on a blocking thread. Must run inside a tokio runtime.
    pub fn start<B: ByteSource, L: ControllerLink>(
        settings: GuardSettings,
        host_stop: CancellationToken,
        source: B,
        link: L,
    ) -> Guard<WaitingForPairing> {
        let (paired, pairing) = pairing_latch();
        let cancel = CancellationToken::new();
        let window = ShutdownWindow::new();
        let signals = WorkerSignals {
            paired,
            cancel: cancel.clone(),
            window: window.clone(),
        };

        let colors = settings.colors;
        let session_settings = settings.session_settings();
        let worker_settings = settings.worker.clone();
        let worker = tokio::task::spawn_blocking(move || {
            info!("Spawning bridging worker");
            run_worker(
                source,
                link,
                colors,
                session_settings,
                worker_settings,
                signals,
            )
        });

        Self::new(settings, host_stop, cancel, window, pairing, worker).transition()
    }
}

impl Guard<WaitingForPairing> {
    /// Waits for the worker's pairing outcome, bounded by the pairing timeout.
    ///
    /// Proceeds to [`Running`] in every case; the caller decides what a
    /// [`PairingWait::HostStopped`] means.
    pub async fn wait_for_pairing(self) -> (Guard<Running>, PairingWait) {
        let timeout = self.settings.pairing_timeout;
        let started = Instant::now();
        info!("Waiting up to {:?} for the controller to pair", timeout);

        let outcome = loop {
            if let Some(status) = self.pairing.status() {
                info!("Worker reports {}", status);
                break PairingWait::Concluded(status);
            }
            if self.worker.is_finished() || self.pairing.is_closed() {
                warn!("Bridging worker exited before pairing concluded");
                break PairingWait::WorkerExited;
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!("No pairing after {:?}, releasing host action anyway", timeout);
                break PairingWait::Deadline;
            }

            let nap = self.settings.pairing_poll.min(timeout - elapsed);
            if self.stopped_during(nap).await {
                break PairingWait::HostStopped;
            }
        };

        let outcome = match outcome {
            PairingWait::Concluded(_) | PairingWait::Deadline => {
                debug!("Settling for {:?}", self.settings.settle_delay);
                if self.stopped_during(self.settings.settle_delay).await {
                    PairingWait::HostStopped
                } else {
                    outcome
                }
            }
            other => other,
        };
        if outcome == PairingWait::HostStopped {
            warn!("Host stopped while waiting for pairing");
        }

        (self.transition(), outcome)
    }

    async fn stopped_during(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.host_stop.cancelled() => true,
            _ = sleep(delay) => false,
        }
    }
}

impl Guard<Running> {
    /// Runs the host action exactly once. Its result is handed back untouched.
    pub async fn run_host<F, Fut, T, E>(self, action: F) -> (Guard<Cancelling>, Result<T, E>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        debug!("Running host action");
        let result = action().await;
        if result.is_err() {
            warn!("Host action failed, cleaning up before reporting");
        }
        (self.transition(), result)
    }

    pub fn skip_host(self) -> Guard<Cancelling> {
        info!("Skipping host action");
        self.transition()
    }
}

impl Guard<Cancelling> {
    /// Cancels the worker and waits for its thread to end.
    pub async fn cancel_and_join(mut self) -> (Guard<Done>, WorkerExit) {
        debug!("Sending cancellation to bridging worker");
        self.cancel.cancel();

        let joined = (&mut self.worker).await;
        let exit = WorkerExit::classify(joined, self.window.is_open());
        match &exit {
            WorkerExit::Completed(report) => debug!("Bridging worker joined: {:?}", report),
            WorkerExit::DeferredShutdownRace(_) => {}
            WorkerExit::Failed(e) => error!("Bridging worker failed: {}", e),
            WorkerExit::Crashed(message) => error!("Bridging worker panicked: {}", message),
        }
        (self.transition(), exit)
    }
}

/// Bridges `source` to `link` for the duration of `host_action`.
///
/// The host action runs once pairing concluded or timed out, unless `host_stop` fires
/// first. The worker is always cancelled and joined before returning. A host error
/// wins over a worker error.
pub async fn run_guarded<B, L, F, Fut, T, E>(
    source: B,
    link: L,
    settings: GuardSettings,
    host_stop: CancellationToken,
    host_action: F,
) -> Result<T, GuardError>
where
    B: ByteSource,
    L: ControllerLink,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    let guard = Guard::start(settings, host_stop, source, link);
    let _cancel_on_drop = guard.cancel_token().drop_guard();

    let (guard, wait) = guard.wait_for_pairing().await;
    let (guard, host_result) = match wait {
        PairingWait::HostStopped => (guard.skip_host(), None),
        _ => {
            let (guard, result) = guard.run_host(host_action).await;
            (guard, Some(result))
        }
    };

    let (_done, exit) = guard.cancel_and_join().await;
    let worker_result = exit.into_result();

    match host_result {
        Some(Err(e)) => {
            if let Err(worker_error) = worker_result {
                warn!("Worker failure superseded by host error: {}", worker_error);
            }
            Err(GuardError::HostAction(e.into()))
        }
        Some(Ok(value)) => {
            if let Some(report) = worker_result? {
                info!(
                    "Bridge session complete: {} lines forwarded, {} dropped",
                    report.lines_forwarded, report.lines_dropped
                );
            }
            Ok(value)
        }
        None => {
            worker_result?;
            Err(GuardError::HostStopped)
        }
    }
}

use chrono::{DateTime, Local};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::signal::{PairingLatch, ShutdownWindow};
use super::source::ByteSource;
use super::BridgeError;
use crate::config::ControllerColor;
use crate::link::ControllerLink;
use crate::session::{Adapter, PairingStatus, Session, SessionSettings};

#[derive(Clone, Debug)]
pub struct WorkerSettings {
    /// Sleep after an empty read. Zero only yields the thread.
    pub read_poll: Duration,
    /// Zero disables the stats log.
    pub stats_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            read_poll: Duration::from_millis(1),
            stats_interval: Duration::from_secs(10),
        }
    }
}

/// Summary of one worker run.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub lines_forwarded: u64,
    pub lines_dropped: u64,
    pub pairing: PairingStatus,
}

/// Worker ends of the signals shared with the orchestrator.
#[derive(Debug)]
pub struct WorkerSignals {
    pub paired: PairingLatch,
    pub cancel: CancellationToken,
    pub window: ShutdownWindow,
}

#[derive(Default)]
struct LineCounts {
    forwarded: u64,
    dropped: u64,
}

/// Pumps lines from a byte source into a session until cancelled.
///
/// Blocking; meant for a dedicated thread.
pub struct BridgingWorker<S: ByteSource, L: ControllerLink> {
    source: S,
    session: Session<L>,
    cancel: CancellationToken,
    window: ShutdownWindow,
    settings: WorkerSettings,
}

impl<S: ByteSource, L: ControllerLink> BridgingWorker<S, L> {
    pub fn new(
        source: S,
        session: Session<L>,
        cancel: CancellationToken,
        window: ShutdownWindow,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            source,
            session,
            cancel,
            window,
            settings,
        }
    }

    /// Runs until cancelled or a fatal error. The session is closed either way.
    pub fn run(mut self) -> Result<WorkerReport, BridgeError> {
        let started_at = Local::now();
        info!("Bridging worker running ({})", self.session.pairing_status());

        let mut counts = LineCounts::default();
        let pumped = self.pump(&mut counts);

        self.window.open();
        let closed = self.session.close();

        match (pumped, closed) {
            (Ok(()), Ok(())) => {
                let report = WorkerReport {
                    started_at,
                    finished_at: Local::now(),
                    lines_forwarded: counts.forwarded,
                    lines_dropped: counts.dropped,
                    pairing: self.session.pairing_status(),
                };
                info!(
                    "Bridging worker finished: {} lines forwarded, {} dropped",
                    report.lines_forwarded, report.lines_dropped
                );
                Ok(report)
            }
            (Ok(()), Err(e)) => {
                error!("Failed to close session: {}", e);
                Err(e.into())
            }
            (Err(e), closed) => {
                error!("Bridging worker failed: {}", e);
                if let Err(close_error) = closed {
                    error!("Failed to close session after failure: {}", close_error);
                }
                Err(e)
            }
        }
    }

    fn pump(&mut self, counts: &mut LineCounts) -> Result<(), BridgeError> {
        let mut interval_lines = 0u64;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::from_std(self.settings.stats_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));

        loop {
            if self.cancel.is_cancelled() {
                debug!("Cancellation observed by bridging worker");
                return Ok(());
            }

            match self.source.read_line()? {
                Some(line) if !line.iter().all(u8::is_ascii_whitespace) => {
                    let mut adapter = Adapter::new(&mut self.session);
                    if adapter.write(&line)? == 0 {
                        counts.dropped += 1;
                    } else {
                        counts.forwarded += 1;
                        interval_lines += 1;
                    }
                }
                _ if self.settings.read_poll.is_zero() => thread::yield_now(),
                _ => thread::sleep(self.settings.read_poll),
            }

            if self.settings.stats_interval.is_zero() {
                continue;
            }
            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Bridge stats: forwarded {} lines in last {} seconds (avg {:.2}/sec), {} dropped in total",
                    interval_lines,
                    log_interval.num_seconds(),
                    interval_lines as f64 / log_interval.num_seconds().max(1) as f64,
                    counts.dropped
                );
                interval_lines = 0;
                last_log_time = now;
            }
        }
    }
}

/// Worker entry point: opens the session, reports the pairing outcome, bridges.
pub fn run_worker<S: ByteSource, L: ControllerLink>(
    source: S,
    link: L,
    colors: ControllerColor,
    session_settings: SessionSettings,
    worker_settings: WorkerSettings,
    signals: WorkerSignals,
) -> Result<WorkerReport, BridgeError> {
    let WorkerSignals {
        paired,
        cancel,
        window,
    } = signals;

    let session = Session::open_until(link, &colors, &session_settings, &cancel)?;
    paired.conclude(session.pairing_status());

    BridgingWorker::new(source, session, cancel, window, worker_settings).run()
}

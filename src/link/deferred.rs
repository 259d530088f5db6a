use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Delay between a shutdown request and the native teardown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Native teardown scheduled on a detached thread after a grace period.
///
/// The owner may drop this without waiting; the teardown still runs.
#[derive(Debug)]
pub struct DeferredTeardown {
    grace: Duration,
    handle: Option<JoinHandle<()>>,
}

impl DeferredTeardown {
    pub fn schedule<F>(grace: Duration, teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        debug!("Scheduling link teardown in {:?}", grace);
        let spawned = thread::Builder::new()
            .name("link-teardown".into())
            .spawn(move || {
                thread::sleep(grace);
                teardown();
                debug!("Link teardown finished");
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to spawn teardown thread: {}", e);
                None
            }
        };

        Self { grace, handle }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Blocks until the teardown ran. Returns false if it panicked or never started.
    pub fn wait(mut self) -> bool {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(()) => true,
                Err(_) => {
                    warn!("Link teardown panicked");
                    false
                }
            },
            None => false,
        }
    }
}

use tracing::{debug, warn};

use super::Session;
use crate::controller::ControllerState;
use crate::link::{ControllerLink, LinkError};

/// Write-only byte sink in front of a [`Session`].
///
/// Each write is one protocol line. Malformed lines are logged and dropped; only link
/// failures reach the caller.
pub struct Adapter<'a, L: ControllerLink> {
    session: &'a mut Session<L>,
}

impl<'a, L: ControllerLink> Adapter<'a, L> {
    pub fn new(session: &'a mut Session<L>) -> Self {
        Self { session }
    }

    /// Decodes `line` and forwards it. Returns the number of bytes consumed, 0 if the
    /// line was dropped.
    pub fn write(&mut self, line: &[u8]) -> Result<usize, LinkError> {
        let state = match ControllerState::decode(line) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Dropping line {:?}: {}",
                    String::from_utf8_lossy(line).trim_end(),
                    e
                );
                return Ok(0);
            }
        };
        debug!("Forwarding {}", state);
        self.session.send(&state)?;
        Ok(line.len())
    }

    /// Writes every non-empty line of a newline separated batch.
    pub fn write_lines(&mut self, batch: &[u8]) -> Result<usize, LinkError> {
        let mut written = 0;
        for line in batch.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            written += self.write(line)?;
        }
        Ok(written)
    }

    pub fn is_open(&self) -> bool {
        self.session.is_paired()
    }
}

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Lines longer than this are discarded unread.
pub const MAX_LINE_LENGTH: usize = 64;

/// Non-blocking line reader.
///
/// `Ok(None)` means "nothing ready yet" and is not an error.
pub trait ByteSource: Send + 'static {
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Assembles lines from arbitrary chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte. Returns a line (with its `\n`) when one completed.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == b'\n' {
            if std::mem::take(&mut self.discarding) {
                self.pending.clear();
                return None;
            }
            self.pending.push(byte);
            return Some(std::mem::take(&mut self.pending));
        }
        if self.discarding {
            return None;
        }
        if self.pending.len() >= MAX_LINE_LENGTH {
            warn!("Discarding line longer than {} bytes", MAX_LINE_LENGTH);
            self.pending.clear();
            self.discarding = true;
            return None;
        }
        self.pending.push(byte);
        None
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Line source over any reader. Timeouts and empty reads count as "no data".
pub struct ReaderSource<R> {
    reader: R,
    buffer: LineBuffer,
    chunk: [u8; MAX_LINE_LENGTH],
    ready: VecDeque<Vec<u8>>,
}

impl<R: Read + Send + 'static> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: LineBuffer::new(),
            chunk: [0; MAX_LINE_LENGTH],
            ready: VecDeque::new(),
        }
    }
}

impl<R: Read + Send + 'static> ByteSource for ReaderSource<R> {
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.ready.pop_front() {
            return Ok(Some(line));
        }
        let read = match self.reader.read(&mut self.chunk) {
            Ok(read) => read,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        for byte in &self.chunk[..read] {
            if let Some(line) = self.buffer.push(*byte) {
                self.ready.push_back(line);
            }
        }
        Ok(self.ready.pop_front())
    }
}

/// Serial port line source.
pub type SerialSource = ReaderSource<Box<dyn serialport::SerialPort>>;

impl SerialSource {
    /// Opens the port with a zero read timeout, so reads never block.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let serial = serialport::new(port, baud_rate)
            .timeout(Duration::ZERO)
            .open()?;
        info!("Opened serial port {} at {} baud", port, baud_rate);
        Ok(Self::new(serial))
    }
}

/// In-process line source fed through a channel.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
}

pub fn channel_source() -> (mpsc::UnboundedSender<Vec<u8>>, ChannelSource) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (sender, ChannelSource { receiver })
}

impl ByteSource for ChannelSource {
    /// A disconnected sender reads as "no data"; the worker stops on cancel only.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.receiver.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader returning scripted chunks, then timeouts.
    struct ScriptedReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(ErrorKind::TimedOut, "no data")),
            }
        }
    }

    #[test]
    fn test_line_buffer_splits_lines() {
        let mut buffer = LineBuffer::new();
        let lines: Vec<Vec<u8>> = b"end\n0x0010 8\r\n"
            .iter()
            .filter_map(|b| buffer.push(*b))
            .collect();
        assert_eq!(lines, vec![b"end\n".to_vec(), b"0x0010 8\r\n".to_vec()]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_line_buffer_discards_overlong_lines() {
        let mut buffer = LineBuffer::new();
        for _ in 0..(MAX_LINE_LENGTH + 10) {
            assert_eq!(buffer.push(b'f'), None);
        }
        assert_eq!(buffer.push(b'\n'), None);
        assert_eq!(buffer.push(b'\n'), Some(b"\n".to_vec()));
    }

    #[test]
    fn test_reader_source_partial_lines() {
        let reader = ScriptedReader {
            chunks: VecDeque::from(vec![
                Ok(b"0x00".to_vec()),
                Err(io::Error::new(ErrorKind::WouldBlock, "later")),
                Ok(b"10 8\nend\n".to_vec()),
            ]),
        };
        let mut source = ReaderSource::new(reader);

        assert_eq!(source.read_line().unwrap(), None);
        assert_eq!(source.read_line().unwrap(), None);
        assert_eq!(source.read_line().unwrap(), Some(b"0x0010 8\n".to_vec()));
        assert_eq!(source.read_line().unwrap(), Some(b"end\n".to_vec()));
        assert_eq!(source.read_line().unwrap(), None);
    }

    #[test]
    fn test_reader_source_eof_is_no_data() {
        let mut source = ReaderSource::new(Cursor::new(Vec::new()));
        assert_eq!(source.read_line().unwrap(), None);
    }

    #[test]
    fn test_reader_source_propagates_hard_errors() {
        let reader = ScriptedReader {
            chunks: VecDeque::from(vec![Err(io::Error::new(
                ErrorKind::BrokenPipe,
                "unplugged",
            ))]),
        };
        let mut source = ReaderSource::new(reader);
        assert_eq!(
            source.read_line().unwrap_err().kind(),
            ErrorKind::BrokenPipe
        );
    }

    #[test]
    fn test_channel_source() {
        let (sender, mut source) = channel_source();
        assert_eq!(source.read_line().unwrap(), None);
        sender.send(b"end".to_vec()).unwrap();
        assert_eq!(source.read_line().unwrap(), Some(b"end".to_vec()));
        drop(sender);
        assert_eq!(source.read_line().unwrap(), None);
    }
}

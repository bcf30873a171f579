//! An in-memory `embedded-io` device for unit tests, standing in for a UART or a config store.

use heapless::{Deque, Vec};
use thiserror::Error;

const MOCK_CAPACITY: usize = 512;

/// Scripted input, recorded output, switchable faults.
pub struct MockSerial {
    /// Bytes still to be handed out by `read`.
    pending: Deque<u8, MOCK_CAPACITY>,
    /// Everything accepted by `write`.
    sent: Vec<u8, MOCK_CAPACITY>,
    /// Largest chunk one `read` returns, to emulate a slow line.
    read_chunk: usize,
    fail_reads: bool,
    fail_writes: bool,
}

#[derive(Debug, PartialEq, Error)]
pub enum MockSerialError {
    /// The recording or scripting buffer is full.
    #[error("mock buffer full")]
    Full,
    /// Injected device fault.
    #[error("simulated device error")]
    SimulatedError,
    /// Nothing scripted is left, reported like a read time-out.
    #[error("no scripted data left")]
    Drained,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Full => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::BrokenPipe,
            MockSerialError::Drained => embedded_io::ErrorKind::TimedOut,
        }
    }
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            pending: Deque::new(),
            sent: Vec::new(),
            read_chunk: usize::MAX,
            fail_reads: false,
            fail_writes: false,
        }
    }

    /// Replace whatever is still unread with `data`.
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.pending.clear();
        data.iter()
            .try_for_each(|&b| self.pending.push_back(b))
            .map_err(|_| MockSerialError::Full)
    }

    /// Cap the number of bytes a single `read` returns.
    pub fn set_read_chunk(&mut self, chunk: usize) {
        self.read_chunk = chunk.max(1);
    }

    pub fn written_data(&self) -> &[u8] {
        &self.sent
    }

    pub fn clear_written_data(&mut self) {
        self.sent.clear();
    }

    pub fn set_write_error(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn set_read_error(&mut self, fail: bool) {
        self.fail_reads = fail;
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.fail_reads {
            return Err(MockSerialError::SimulatedError);
        }
        if self.pending.is_empty() {
            return Err(MockSerialError::Drained);
        }

        let mut count = 0;
        for slot in buf.iter_mut().take(self.read_chunk) {
            let Some(byte) = self.pending.pop_front() else {
                break;
            };
            *slot = byte;
            count += 1;
        }
        Ok(count)
    }
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(MockSerialError::SimulatedError);
        }
        // All or nothing, so a failed write leaves no partial record.
        self.sent
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::Full)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        match self.fail_writes {
            true => Err(MockSerialError::SimulatedError),
            false => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn records_writes() {
        let mut mock = MockSerial::new();
        assert_eq!(mock.write(b"$$$id\n"), Ok(6));
        assert_eq!(mock.written_data(), b"$$$id\n");

        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }

    #[test]
    fn reads_in_chunks_then_times_out() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Hello World").unwrap();
        mock.set_read_chunk(4);

        let mut buffer = [0u8; 16];
        assert_eq!(mock.read(&mut buffer), Ok(4));
        assert_eq!(&buffer[..4], b"Hell");
        assert_eq!(mock.read(&mut buffer), Ok(4));
        assert_eq!(mock.read(&mut buffer), Ok(3));
        assert_eq!(&buffer[..3], b"rld");

        let err = mock.read(&mut buffer).unwrap_err();
        assert_eq!(err, MockSerialError::Drained);
        assert_eq!(err.kind(), embedded_io::ErrorKind::TimedOut);
    }

    #[test]
    fn injected_faults() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert_eq!(mock.write(b"test"), Err(MockSerialError::SimulatedError));
        assert_eq!(mock.flush(), Err(MockSerialError::SimulatedError));
        assert!(mock.written_data().is_empty());

        mock.set_read_data(b"data").unwrap();
        mock.set_read_error(true);
        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::SimulatedError));
    }

    #[test]
    fn overflow_is_reported() {
        let mut mock = MockSerial::new();
        assert_eq!(mock.set_read_data(&[0; MOCK_CAPACITY + 1]), Err(MockSerialError::Full));
        assert_eq!(mock.write(&[0; MOCK_CAPACITY + 1]), Err(MockSerialError::Full));
        assert!(mock.written_data().is_empty());
        assert_eq!(MockSerialError::Full.kind(), embedded_io::ErrorKind::OutOfMemory);
    }
}

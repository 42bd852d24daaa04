//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Mock transport for unit testing
///
/// Clones share one buffer pair, so a test can keep a handle while the
/// driver owns another. With a responder installed, every write is answered
/// immediately by appending the responder's output to the read buffer.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    responder: Option<Responder>,
    writes: usize,
    closed: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                responder: None,
                writes: 0,
                closed: false,
            })),
        }
    }

    /// Create a mock that answers each write with `responder(request)`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let mock = Self::new();
        mock.inner.lock().responder = Some(Box::new(responder));
        mock
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Number of write calls so far
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    /// Simulate the peer going away: reads return 0, writes fail
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut n = 0;
        while n < buffer.len() {
            match inner.read_buffer.pop_front() {
                Some(b) => {
                    buffer[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock transport closed",
            )));
        }
        inner.writes += 1;
        inner.write_buffer.extend_from_slice(data);
        if let Some(responder) = inner.responder.as_mut() {
            let reply = responder(data);
            inner.read_buffer.extend(reply);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_and_read() {
        let mut mock = MockTransport::new();
        mock.inject_read(&[9, 8, 7]);
        assert_eq!(mock.available().unwrap(), 3);
        let mut buf = [0u8; 2];
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [9, 8]);
    }

    #[test]
    fn test_responder_answers_each_write() {
        let mut mock = MockTransport::with_responder(|req| vec![req.len() as u8]);
        mock.write(&[1, 2, 3]).unwrap();
        mock.write(&[4]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[3, 1]);
        assert_eq!(mock.write_count(), 2);
    }

    #[test]
    fn test_closed_mock_rejects_writes() {
        let mut mock = MockTransport::new();
        mock.close();
        assert!(matches!(mock.write(&[1]), Err(Error::Io(_))));
    }
}

//! Transport layer for I/O abstraction
//!
//! Every wire variant talks through [`Transport`]: TCP for the socket and
//! compressed protocols, a serial port for the direct link, and
//! [`MockTransport`] for tests. A shared-memory backend would be one more
//! implementation of the same trait.

use crate::error::{Error, Result};
use std::io;

mod mock;
mod serial;
mod tcp;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Opens (or reopens) a transport; sessions call it again on restart
pub type Connector = Box<dyn FnMut() -> Result<Box<dyn Transport>> + Send>;

/// Transport trait for device communication
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read.
    ///
    /// Returns 0 when nothing arrived within the transport's timeout or the
    /// peer closed the connection.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }
}

impl Transport for Box<dyn Transport> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn available(&mut self) -> Result<usize> {
        (**self).available()
    }
}

/// Write the whole buffer and flush
pub fn write_all<T: Transport + ?Sized>(transport: &mut T, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        let n = transport.write(data)?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "transport accepted no bytes",
            )));
        }
        data = &data[n..];
    }
    transport.flush()
}

/// Read up to `len` bytes, stopping early when a read returns nothing.
///
/// The result may be shorter than `len`; frame size checks belong to the
/// codecs.
pub fn read_frame<T: Transport + ?Sized>(transport: &mut T, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = transport.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Send a request and collect a response of up to `response_len` bytes
pub fn transact<T: Transport + ?Sized>(
    transport: &mut T,
    request: &[u8],
    response_len: usize,
) -> Result<Vec<u8>> {
    write_all(transport, request)?;
    read_frame(transport, response_len)
}

//! TCP transport implementation

use super::Transport;
use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP connection to the controller
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `addr` (e.g. "192.168.7.2:65000")
    ///
    /// `timeout` bounds the connect as well as every read and write.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for sock_addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&sock_addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    log::info!("Connected to {}", sock_addr);
                    return Ok(Self { stream });
                }
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", sock_addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(match last_err {
            Some(e) => Error::Io(e),
            None => Error::Config(format!("address {} did not resolve", addr)),
        })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.stream.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::transact;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_loopback_transact() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut req = [0u8; 4];
            conn.read_exact(&mut req).unwrap();
            req.reverse();
            conn.write_all(&req).unwrap();
        });

        let mut t = TcpTransport::connect(&addr.to_string(), Duration::from_secs(2)).unwrap();
        let resp = transact(&mut t, &[1, 2, 3, 4], 4).unwrap();
        assert_eq!(resp, vec![4, 3, 2, 1]);
        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = TcpTransport::connect(&addr.to_string(), Duration::from_millis(200));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

//! Keep-alive task
//!
//! The device drops an online session that sees no traffic. While the
//! exchange loop runs it keeps the link busy on its own; this task covers
//! the gaps (loop stalled behind a long synchronized update or a slow
//! callback) by sending a status query once the link has been idle for the
//! configured time. It ends together with the session: when the exchange
//! loop stops, on request or after an error, no further queries are sent.

use super::Session;
use crate::constants::STATUS_RESPONSE_SIZE;
use crate::error::{Error, Result};
use crate::protocol::socket;
use crate::transport::transact;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest single sleep, bounds how long `stop` waits
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Handle to the keep-alive thread
pub struct KeepAlive {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Spawn the keep-alive thread for `session`
    pub fn spawn(session: Session, idle: Duration) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("txt-keep-alive".to_string())
            .spawn(move || keep_alive_loop(&session, &thread_shutdown, idle))
            .map_err(|e| Error::Other(format!("Failed to spawn keep-alive thread: {}", e)))?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        Ok(())
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Keep-alive did not stop cleanly: {}", e);
        }
    }
}

fn keep_alive_loop(session: &Session, shutdown: &AtomicBool, idle: Duration) {
    log::debug!("Keep-alive started ({:?} idle limit)", idle);
    let ended = || shutdown.load(Ordering::Relaxed) || session.stop_requested();
    while !ended() {
        thread::sleep(idle.min(POLL_SLICE));
        // The session ends with the exchange loop, even on its error path
        if ended() {
            break;
        }
        if session.last_io.lock().elapsed() <= idle {
            continue;
        }

        if let Err(e) = ping(session) {
            session.report("Keep-alive status query failed", Some(&e));
            // Ends the exchange loop as well: the session is gone
            session.stop.store(true, Ordering::Relaxed);
            shutdown.store(true, Ordering::Relaxed);
        }
    }
    shutdown.store(true, Ordering::Relaxed);
    log::debug!("Keep-alive stopped");
}

fn ping(session: &Session) -> Result<()> {
    let response = {
        let mut io = session.transport.lock();
        let data = transact(&mut **io, &socket::encode_status_request(), STATUS_RESPONSE_SIZE)?;
        session.touch();
        socket::decode_status(&data)?
    };
    if !response.id_matches() {
        return Err(Error::ResponseMismatch {
            command: "keep-alive status",
            expected: crate::constants::ID_QUERY_STATUS_ACK,
            actual: response.id,
        });
    }
    log::trace!("Keep-alive status ok ({})", response.name);
    Ok(())
}

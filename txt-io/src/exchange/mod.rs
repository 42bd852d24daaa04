//! Exchange loop
//!
//! One background thread per session cycles outputs to the device and
//! inputs back into [`SharedState`]:
//!
//! ```text
//!          ┌──────────────────────────────────────────────────────┐
//!          │ sleep(interval)                                      │
//!          │ config generation changed? ── push_config ── ack ok? │
//!          │ snapshot outputs            (state lock)             │
//!          │ encode + send + receive     (transport lock)         │
//!          │ decode, merge               (state lock)             │
//!          │ on_data, mark_cycle_complete                         │
//!          └──────────────┬───────────────────────────────────────┘
//!                         │ stop flag, or any error
//!                         ▼
//!                      STOPPED
//! ```
//!
//! There are no retries. The first transport or protocol error is reported
//! once through the error callback and ends the loop; a new session must be
//! started to recover.

mod codec;
mod keep_alive;

pub use codec::{CompressedCodec, CycleCodec, SerialCodec, SocketCodec, Update};
pub use keep_alive::KeepAlive;

use crate::core::SharedState;
use crate::error::{Error, Result};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Error hook: `(message, error) -> keep going`
///
/// The return value matters only where an error is recoverable (session
/// start/stop acknowledgements). Errors inside the exchange loop always end
/// it.
pub type ErrorCallback = Arc<dyn Fn(&str, Option<&Error>) -> bool + Send + Sync>;

/// Called after every merged cycle
pub type DataCallback = Arc<dyn Fn(&SharedState) + Send + Sync>;

/// Transport shared between the loop, the keep-alive task and session commands
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Logs the message at error level and asks to stop
pub fn default_error_handler() -> ErrorCallback {
    Arc::new(|message: &str, error: Option<&Error>| {
        match error {
            Some(e) => log::error!("{}: {}", message, e),
            None => log::error!("{}", message),
        }
        false
    })
}

/// Lifecycle of an exchange loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    /// Terminal: stopped on request or by an error
    Stopped = 2,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            _ => LoopState::Stopped,
        }
    }
}

/// Everything a session's background tasks share
#[derive(Clone)]
pub struct Session {
    pub shared: Arc<SharedState>,
    pub transport: SharedTransport,
    /// Set to end every task of the session
    pub stop: Arc<AtomicBool>,
    /// Time of the last completed request/response on the transport
    pub last_io: Arc<Mutex<Instant>>,
    /// Set by the first task-side error report of the session
    reported: Arc<AtomicBool>,
    pub on_error: ErrorCallback,
    pub on_data: Option<DataCallback>,
}

impl Session {
    pub fn new(shared: Arc<SharedState>, transport: SharedTransport) -> Self {
        Self {
            shared,
            transport,
            stop: Arc::new(AtomicBool::new(false)),
            last_io: Arc::new(Mutex::new(Instant::now())),
            reported: Arc::new(AtomicBool::new(false)),
            on_error: default_error_handler(),
            on_data: None,
        }
    }

    /// Report an error through the callback; returns the callback's verdict
    ///
    /// Only the first report of a session reaches the callback. Later ones
    /// (the other task noticing the same dead link) are logged and answer
    /// `false`.
    pub fn report(&self, message: &str, error: Option<&Error>) -> bool {
        if self
            .reported
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Session error already reported, dropping: {}", message);
            return false;
        }
        (self.on_error)(message, error)
    }

    pub fn touch(&self) {
        *self.last_io.lock() = Instant::now();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Handle to a running exchange thread
pub struct ExchangeLoop {
    session: Session,
    state: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl ExchangeLoop {
    /// Spawn the exchange thread
    pub fn spawn(
        session: Session,
        mut codec: Box<dyn CycleCodec>,
        interval: Duration,
    ) -> Result<Self> {
        codec.reset();
        let state = Arc::new(AtomicU8::new(LoopState::Running as u8));
        // Waiters that arrive before the first cycle must not see "stopped"
        session.shared.set_running(true);

        let thread_session = session.clone();
        let thread_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name("txt-exchange".to_string())
            .spawn(move || {
                exchange_loop(&thread_session, &mut *codec, interval);
                thread_state.store(LoopState::Stopped as u8, Ordering::Release);
                thread_session.stop.store(true, Ordering::Relaxed);
                thread_session.shared.set_running(false);
            })
            .map_err(|e| {
                session.shared.set_running(false);
                Error::Other(format!("Failed to spawn exchange thread: {}", e))
            })?;

        Ok(Self {
            session,
            state,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Signal the loop to stop and wait for it
    pub fn stop(&mut self) -> Result<()> {
        self.session.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        Ok(())
    }
}

impl Drop for ExchangeLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Exchange loop did not stop cleanly: {}", e);
        }
    }
}

fn exchange_loop(session: &Session, codec: &mut dyn CycleCodec, interval: Duration) {
    log::info!("Exchange loop started ({}, {:?} interval)", codec.name(), interval);
    let mut pushed_generation: Option<u32> = None;

    while !session.stop_requested() {
        thread::sleep(interval);
        if session.stop_requested() {
            break;
        }

        if let Err(e) = push_config_if_changed(session, codec, &mut pushed_generation) {
            session.report("I/O configuration was not acknowledged", Some(&e));
            break;
        }
        if let Err(e) = run_cycle(session, codec) {
            session.report("Data exchange failed", Some(&e));
            break;
        }
    }

    log::info!("Exchange loop stopped ({})", codec.name());
}

fn push_config_if_changed(
    session: &Session,
    codec: &mut dyn CycleCodec,
    pushed: &mut Option<u32>,
) -> Result<()> {
    let generation = session.shared.read(|s| s.config_generation);
    if *pushed == Some(generation) {
        return Ok(());
    }
    let snapshot = session.shared.snapshot();
    {
        let mut io = session.transport.lock();
        codec.push_config(&mut **io, &snapshot)?;
    }
    session.touch();
    *pushed = Some(snapshot.config_generation);
    log::info!("I/O configuration {} pushed", snapshot.config_generation);
    Ok(())
}

fn run_cycle(session: &Session, codec: &mut dyn CycleCodec) -> Result<()> {
    let snapshot = session.shared.snapshot();

    let update = {
        let mut io = session.transport.lock();
        codec.exchange(&mut **io, &snapshot)?
    };
    session.touch();

    session.shared.write(|s| update.merge(s))?;
    if let Some(on_data) = &session.on_data {
        on_data(&session.shared);
    }
    session.shared.mark_cycle_complete();
    log::trace!("Exchange cycle {} complete", session.shared.cycle_count());
    Ok(())
}

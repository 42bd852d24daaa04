//! Lock-protected device state shared by the exchange loop and the application
//!
//! # Locking
//!
//! ```text
//! application threads            exchange loop
//!   write(|s| ...)  ─┐             ┌─ snapshot()   (outputs, under lock)
//!   begin_sync()    ─┼─ Reentrant ─┤     I/O       (no lock held)
//!     write ...      │   Mutex     └─ merge(|s| ...) then mark_cycle_complete()
//!   end of scope    ─┘
//! ```
//!
//! Single accessors lock for the duration of one closure. A [`SyncScope`]
//! keeps the lock across several accessors so the loop never sees a half
//! applied group of writes. The mutex is reentrant, so accessors called from
//! the thread owning the scope still work.

use super::state::{DeviceState, UnitState};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::time::Duration;

/// Progress of the exchange loop as seen by waiters
#[derive(Debug, Default)]
struct CycleStatus {
    completed: u64,
    running: bool,
}

/// Shared device state
pub struct SharedState {
    state: ReentrantMutex<RefCell<DeviceState>>,
    cycle: Mutex<CycleStatus>,
    cycle_done: Condvar,
}

/// Holds the state lock until dropped
///
/// Created by [`SharedState::begin_sync`]. Must not be held across
/// [`SharedState::wait_for_next_cycle`]: the loop could never take its snapshot.
pub struct SyncScope<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<DeviceState>>,
}

impl SyncScope<'_> {
    /// Release the lock (same as dropping the scope)
    pub fn end(self) {}
}

impl SharedState {
    pub fn new(unit_count: usize) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(DeviceState::new(unit_count))),
            cycle: Mutex::new(CycleStatus::default()),
            cycle_done: Condvar::new(),
        }
    }

    /// Number of units on the bus
    pub fn unit_count(&self) -> usize {
        self.read(|s| s.units.len())
    }

    /// Run `f` with shared access to the whole state
    pub fn read<R>(&self, f: impl FnOnce(&DeviceState) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    /// Run `f` with exclusive access to the whole state
    pub fn write<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Run `f` on one unit, validating the unit index
    pub fn read_unit<R>(&self, unit: usize, f: impl FnOnce(&UnitState) -> R) -> Result<R> {
        self.read(|s| {
            let count = s.units.len();
            s.units
                .get(unit)
                .map(f)
                .ok_or_else(|| Error::out_of_range("unit", unit, count))
        })
    }

    /// Mutate one unit, validating the unit index
    pub fn write_unit<R>(&self, unit: usize, f: impl FnOnce(&mut UnitState) -> R) -> Result<R> {
        self.write(|s| {
            let count = s.units.len();
            s.units
                .get_mut(unit)
                .map(f)
                .ok_or_else(|| Error::out_of_range("unit", unit, count))
        })
    }

    /// Start a synchronized update; the scope ends when the guard drops
    pub fn begin_sync(&self) -> SyncScope<'_> {
        SyncScope {
            _guard: self.state.lock(),
        }
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> DeviceState {
        self.read(|s| s.clone())
    }

    /// Request a configuration push on the next cycle
    pub fn bump_config_generation(&self) -> u32 {
        self.write(|s| {
            s.config_generation = s.config_generation.wrapping_add(1);
            s.config_generation
        })
    }

    // ---- cycle signalling (exchange loop side) ----

    /// Mark the loop running (or stopped) and wake waiters
    pub fn set_running(&self, running: bool) {
        let mut status = self.cycle.lock();
        status.running = running;
        self.cycle_done.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.cycle.lock().running
    }

    /// One exchange finished and merged
    pub fn mark_cycle_complete(&self) {
        let mut status = self.cycle.lock();
        status.completed = status.completed.wrapping_add(1);
        self.cycle_done.notify_all();
    }

    /// Completed cycles since creation
    pub fn cycle_count(&self) -> u64 {
        self.cycle.lock().completed
    }

    /// Block until one full exchange completes after this call.
    ///
    /// Wakes at least every `min_poll` to re-check. Returns
    /// [`Error::Stopped`] if the loop is not (or no longer) running.
    pub fn wait_for_next_cycle(&self, min_poll: Duration) -> Result<()> {
        let mut status = self.cycle.lock();
        let start = status.completed;
        loop {
            if status.completed != start {
                return Ok(());
            }
            if !status.running {
                return Err(Error::Stopped);
            }
            self.cycle_done.wait_for(&mut status, min_poll);
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(1)
    }
}

//! Memory-pressure hints for off-heap memory.
//!
//! Buffers report every change of their footprint here. The running total is
//! kept in [`stats::MEMORY_PRESSURE`]; an embedding runtime that wants to tune
//! its own collection cadence can install a [`PressureListener`] once.

use super::stats;
use crate::sync::OnceLock;

/// Receives footprint deltas, e.g. to forward them to a garbage collector.
///
/// Called synchronously on the allocating thread. Implementations must not
/// allocate or free buffers.
pub trait PressureListener: Send + Sync {
    fn add_pressure(&self, bytes: usize);

    fn remove_pressure(&self, bytes: usize);
}

static LISTENER: OnceLock<Box<dyn PressureListener>> = OnceLock::new();

/// Install the process-wide listener.
///
/// # Errors
///
/// Returns the listener back if one is already installed.
pub fn set_listener(
    listener: Box<dyn PressureListener>,
) -> Result<(), Box<dyn PressureListener>> {
    LISTENER.set(listener)
}

pub fn add_memory_pressure(bytes: usize) {
    if bytes == 0 {
        return;
    }
    stats::MEMORY_PRESSURE.add(bytes);
    if let Some(listener) = LISTENER.get() {
        listener.add_pressure(bytes);
    }
}

pub fn remove_memory_pressure(bytes: usize) {
    if bytes == 0 {
        return;
    }
    stats::sub_saturating(&stats::MEMORY_PRESSURE, bytes);
    if let Some(listener) = LISTENER.get() {
        listener.remove_pressure(bytes);
    }
}

/// Report the move from `old` to `new` reported bytes as a single delta.
pub fn adjust_memory_pressure(old: usize, new: usize) {
    if new > old {
        add_memory_pressure(new - old);
    } else {
        remove_memory_pressure(old - new);
    }
}

/// Bytes currently reported.
#[must_use]
pub fn current() -> usize {
    stats::MEMORY_PRESSURE.get()
}

//! Process-wide footprint counters for native buffers.
//!
//! All counters use `Relaxed` ordering. Individual counter values are
//! eventually consistent. Cross-counter snapshots may be transiently
//! inconsistent (e.g. the total may briefly disagree with the sum of the
//! per-backend counters). Use them for diagnostics and pressure hints, never
//! for allocation decisions.

use super::backend::BackendKind;
use crate::sync::atomic::{AtomicIsize, Ordering};

/// Diagnostic-only gauge counter.
///
/// Under contention, subtract-before-add races are tolerated and the raw value
/// may transiently dip below zero. Readers should always use `load()`/`get()`,
/// which clamp negative values to zero.
pub struct Counter(AtomicIsize);

impl Counter {
    #[cfg(not(loom))]
    pub const fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    #[cfg(loom)]
    pub fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    #[inline]
    fn delta(val: usize) -> isize {
        // Clamp absurd deltas instead of panicking.
        std::cmp::min(val, isize::MAX as usize).cast_signed()
    }

    #[inline]
    pub fn add(&self, val: usize) {
        self.0.fetch_add(Self::delta(val), Ordering::Relaxed);
    }

    #[inline]
    pub fn sub(&self, val: usize) {
        self.0.fetch_sub(Self::delta(val), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> usize {
        self.0.load(ordering).max(0).cast_unsigned()
    }

    #[inline]
    pub fn fetch_add(&self, val: usize, ordering: Ordering) -> usize {
        self.0.fetch_add(Self::delta(val), ordering).max(0).cast_unsigned()
    }

    #[inline]
    pub fn fetch_sub(&self, val: usize, ordering: Ordering) -> usize {
        self.0.fetch_sub(Self::delta(val), ordering).max(0).cast_unsigned()
    }
}

// Bytes currently held by live buffers, all backends.
crate::sync::static_atomic! {
    pub static TOTAL_LIVE: Counter = Counter::new();
}
// Number of live allocations, all backends.
crate::sync::static_atomic! {
    pub static LIVE_ALLOCATIONS: Counter = Counter::new();
}
// Bytes currently reported to the pressure listener.
crate::sync::static_atomic! {
    pub static MEMORY_PRESSURE: Counter = Counter::new();
}

// Breakdown by backend
crate::sync::static_atomic! {
    pub static HEAP_LIVE: Counter = Counter::new();
}
crate::sync::static_atomic! {
    pub static PRIVATE_HEAP_LIVE: Counter = Counter::new();
}
crate::sync::static_atomic! {
    pub static VIRTUAL_LIVE: Counter = Counter::new();
}
crate::sync::static_atomic! {
    pub static NETWORK_LIVE: Counter = Counter::new();
}
crate::sync::static_atomic! {
    pub static COM_LIVE: Counter = Counter::new();
}
crate::sync::static_atomic! {
    pub static ALIGNED_LIVE: Counter = Counter::new();
}

/// Per-backend live-bytes counter, `None` for `Invalid`.
pub fn backend_counter(kind: BackendKind) -> Option<&'static Counter> {
    match kind {
        BackendKind::Heap => Some(&HEAP_LIVE),
        BackendKind::PrivateHeap => Some(&PRIVATE_HEAP_LIVE),
        BackendKind::Virtual => Some(&VIRTUAL_LIVE),
        BackendKind::Network => Some(&NETWORK_LIVE),
        BackendKind::Com => Some(&COM_LIVE),
        BackendKind::Aligned => Some(&ALIGNED_LIVE),
        BackendKind::Invalid => None,
    }
}

/// Record a new live allocation of `size` bytes.
pub fn record_alloc(kind: BackendKind, size: usize) {
    if let Some(counter) = backend_counter(kind) {
        counter.add(size);
        TOTAL_LIVE.add(size);
        LIVE_ALLOCATIONS.add(1);
    }
}

/// Record that a live allocation of `size` bytes was released.
pub fn record_free(kind: BackendKind, size: usize) {
    if let Some(counter) = backend_counter(kind) {
        sub_saturating(counter, size);
        sub_saturating(&TOTAL_LIVE, size);
        sub_saturating(&LIVE_ALLOCATIONS, 1);
    }
}

/// Record an in-place size change of a live allocation.
pub fn record_resize(kind: BackendKind, old: usize, new: usize) {
    let Some(counter) = backend_counter(kind) else {
        return;
    };
    if new >= old {
        counter.add(new - old);
        TOTAL_LIVE.add(new - old);
    } else {
        sub_saturating(counter, old - new);
        sub_saturating(&TOTAL_LIVE, old - new);
    }
}

/// Best-effort subtract from a diagnostic atomic counter.
///
/// Uses a single atomic subtraction (no TOCTOU load-then-subtract race).
/// Readers clamp negative transients via `Counter::load`.
pub fn sub_saturating(counter: &Counter, val: usize) {
    counter.sub(val);
}

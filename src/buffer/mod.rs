//! The native buffer handle.
//!
//! [`Buffer`] owns at most one block of native memory together with the
//! backend that produced it. Two flavors share every operation:
//!
//! - [`MemPtr`] never frees on its own. Dropping an allocated `MemPtr` leaks
//!   the block; call [`Buffer::free`].
//! - [`SafePtr`] frees on drop. Drop is a backstop only: release failures
//!   there can only be logged, so prefer calling [`Buffer::free`].

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Bound, Index, IndexMut, RangeBounds};
use std::ptr::NonNull;

use crate::error::BufferError;
use crate::memory::backend::{Allocation, Backend, BackendKind};
use crate::memory::heap::PrivateHeap;
use crate::memory::{copy, pressure};

pub mod access;
pub mod resize;
pub mod strings;

#[cfg(all(test, not(loom)))]
mod properties;

pub use strings::Encoding;

mod sealed {
    pub trait Sealed {}
}

/// Release policy of a buffer flavor.
pub trait Release: sealed::Sealed + 'static {
    /// Free the allocation when the handle is dropped.
    const RELEASE_ON_DROP: bool;
    const NAME: &'static str;
}

/// Flavor marker: the caller frees explicitly.
pub enum Manual {}

/// Flavor marker: the handle frees on drop.
pub enum Owned {}

impl sealed::Sealed for Manual {}
impl sealed::Sealed for Owned {}

impl Release for Manual {
    const RELEASE_ON_DROP: bool = false;
    const NAME: &'static str = "MemPtr";
}

impl Release for Owned {
    const RELEASE_ON_DROP: bool = true;
    const NAME: &'static str = "SafePtr";
}

/// Handle that never frees on its own.
pub type MemPtr = Buffer<Manual>;

/// Handle that frees on drop.
pub type SafePtr = Buffer<Owned>;

/// A native memory buffer.
pub struct Buffer<R: Release = Owned> {
    block: Option<Allocation>,
    /// Bytes currently reported through `memory::pressure`.
    pressure: usize,
    _flavor: PhantomData<fn() -> R>,
}

// Safety: the buffer exclusively owns its block; every mutation takes
// `&mut self`, and private heaps are shared through `Arc`.
unsafe impl<R: Release> Send for Buffer<R> {}

impl<R: Release> Default for Buffer<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Release> Buffer<R> {
    /// An unallocated handle.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block: None,
            pressure: 0,
            _flavor: PhantomData,
        }
    }

    /// Allocate `size` bytes from `backend`.
    ///
    /// On an allocated handle this is [`realloc`](Self::realloc) and `backend`
    /// is ignored. `alloc(0)` on an unallocated handle does nothing.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::AllocationFailed` (or a backend-specific variant
    /// such as `SizeTooLarge`, or `Vm` carrying the OS error for virtual
    /// memory) and leaves the handle unchanged.
    pub fn alloc(&mut self, size: usize, backend: Backend) -> Result<(), BufferError> {
        if self.block.is_some() {
            return self.realloc(size);
        }
        if size == 0 {
            return Ok(());
        }
        let block = Allocation::allocate(backend, size, crate::config::get().zero_on_alloc)
            .inspect_err(|e| tracing::debug!(error = %e, size, "{} alloc failed", R::NAME))?;
        self.block = Some(block);
        self.update_pressure();
        Ok(())
    }

    /// Resize to `size` bytes, preserving the common prefix.
    ///
    /// An unallocated handle is allocated on the process heap; `realloc(0)`
    /// frees.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure and leaves the handle unchanged.
    pub fn realloc(&mut self, size: usize) -> Result<(), BufferError> {
        if size == 0 {
            return self.free();
        }
        let Some(block) = self.block.as_mut() else {
            return self.alloc(size, Backend::Heap);
        };
        if block.len() == size {
            return Ok(());
        }
        block
            .reallocate(size, crate::config::get().zero_on_alloc)
            .inspect_err(|e| tracing::debug!(error = %e, size, "{} realloc failed", R::NAME))?;
        self.update_pressure();
        Ok(())
    }

    /// Release the allocation. Succeeds on an unallocated handle.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::FreeFailed` if the backend refuses; the handle
    /// keeps its allocation.
    pub fn free(&mut self) -> Result<(), BufferError> {
        let Some(block) = self.block.take() else {
            return Ok(());
        };
        match block.release() {
            Ok(()) => {
                self.update_pressure();
                Ok(())
            }
            Err((block, err)) => {
                tracing::warn!(error = %err, "{} free failed", R::NAME);
                self.block = Some(block);
                Err(err)
            }
        }
    }

    /// Free through the `kind` backend's release path.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::BackendMismatch` without touching the
    /// allocation when `kind` did not produce it.
    pub fn free_as(&mut self, kind: BackendKind) -> Result<(), BufferError> {
        let actual = self.backend_kind();
        if actual == BackendKind::Invalid {
            return Ok(());
        }
        if actual != kind {
            tracing::warn!(expected = %kind, %actual, "{} free on the wrong backend", R::NAME);
            return Err(BufferError::BackendMismatch {
                expected: kind,
                actual,
            });
        }
        self.free()
    }

    /// Free through `heap`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::BackendMismatch` for blocks that are not
    /// heap-backed and `BufferError::HeapMismatch` for blocks of another heap.
    pub fn free_in_heap(&mut self, heap: &PrivateHeap) -> Result<(), BufferError> {
        let Some(block) = self.block.as_ref() else {
            return Ok(());
        };
        match block.kind() {
            BackendKind::Heap | BackendKind::PrivateHeap | BackendKind::Aligned => {}
            actual => {
                return Err(BufferError::BackendMismatch {
                    expected: BackendKind::PrivateHeap,
                    actual,
                })
            }
        }
        if !block.backend().same_heap(heap) {
            tracing::warn!("{} free on the wrong heap", R::NAME);
            return Err(BufferError::HeapMismatch);
        }
        self.free()
    }

    #[inline]
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.block.is_some()
    }

    /// Length in bytes, `0` when unallocated.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.block.as_ref().map_or(0, Allocation::len)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same as [`realloc`](Self::realloc).
    ///
    /// # Errors
    ///
    /// See [`realloc`](Self::realloc).
    pub fn set_len(&mut self, size: usize) -> Result<(), BufferError> {
        self.realloc(size)
    }

    /// Size as reported by the allocator itself, where it can tell.
    #[must_use]
    pub fn queried_len(&self) -> Option<usize> {
        self.block.as_ref().and_then(Allocation::queried_len)
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.block.as_ref().map_or(BackendKind::Invalid, Allocation::kind)
    }

    #[must_use]
    pub fn backend(&self) -> Option<&Backend> {
        self.block.as_ref().map(Allocation::backend)
    }

    /// Ask the allocator whether the block is intact. Only heap-backed
    /// buffers can fail.
    ///
    /// # Errors
    ///
    /// `NotAllocated` for an unallocated handle, `HeapCorruption` when the
    /// heap rejects the block.
    pub fn validate(&self) -> Result<(), BufferError> {
        let block = self.block.as_ref().ok_or(BufferError::NotAllocated)?;
        if block.validate() {
            Ok(())
        } else {
            Err(BufferError::HeapCorruption {
                backend: block.kind(),
            })
        }
    }

    /// Zero the bytes in `range`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if the range leaves the buffer.
    pub fn zero_memory(&mut self, range: impl RangeBounds<usize>) -> Result<(), BufferError> {
        let (start, len) = self.resolve("zero_memory", range)?;
        if len > 0 {
            // Safety: range validated above.
            unsafe { copy::zero_fill(self.raw_at(start), len) };
        }
        Ok(())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match &self.block {
            // Safety: ptr is live for len bytes and borrowed through &self.
            Some(block) => unsafe { std::slice::from_raw_parts(block.ptr().as_ptr(), block.len()) },
            None => &[],
        }
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &self.block {
            // Safety: ptr is live for len bytes and borrowed through &mut self.
            Some(block) => unsafe {
                std::slice::from_raw_parts_mut(block.ptr().as_ptr(), block.len())
            },
            None => &mut [],
        }
    }

    /// A new buffer on the same backend with the same bytes.
    ///
    /// # Errors
    ///
    /// Returns the backend's allocation failure.
    pub fn try_clone(&self) -> Result<Self, BufferError> {
        let mut copy = Self::new();
        if let Some(block) = &self.block {
            copy.alloc(block.len(), block.backend().clone())?;
            let len = block.len().min(copy.len());
            // Safety: two distinct live blocks of at least `len` bytes.
            unsafe { copy::copy_block(copy.raw_at(0), block.ptr().as_ptr(), len) };
        }
        Ok(copy)
    }

    /// Convert to the drop-releasing flavor.
    #[must_use]
    pub fn into_owned(self) -> SafePtr {
        self.into_flavor()
    }

    /// Convert to the explicit-release flavor.
    #[must_use]
    pub fn into_manual(self) -> MemPtr {
        self.into_flavor()
    }

    fn into_flavor<T: Release>(mut self) -> Buffer<T> {
        Buffer {
            block: self.block.take(),
            pressure: std::mem::take(&mut self.pressure),
            _flavor: PhantomData,
        }
    }

    /// Re-report the footprint after a size change.
    fn update_pressure(&mut self) {
        let now = if crate::config::get().report_pressure {
            self.len()
        } else {
            0
        };
        pressure::adjust_memory_pressure(self.pressure, now);
        self.pressure = now;
    }

    /// Check that `[offset, offset + length)` lies inside the buffer.
    pub(crate) fn check_range(
        &self,
        operation: &'static str,
        offset: usize,
        length: usize,
    ) -> Result<(), BufferError> {
        let capacity = self.len();
        match offset.checked_add(length) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(BufferError::out_of_range(
                operation,
                isize::try_from(offset).unwrap_or(isize::MAX),
                length,
                capacity,
            )),
        }
    }

    /// Turn a range into `(start, len)` inside the buffer.
    pub(crate) fn resolve(
        &self,
        operation: &'static str,
        range: impl RangeBounds<usize>,
    ) -> Result<(usize, usize), BufferError> {
        let capacity = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => capacity,
        };
        let length = end.saturating_sub(start);
        if start > end {
            return Err(BufferError::out_of_range(
                operation,
                isize::try_from(start).unwrap_or(isize::MAX),
                0,
                capacity,
            ));
        }
        self.check_range(operation, start, length)?;
        Ok((start, length))
    }

    /// Pointer `offset` bytes into the block.
    ///
    /// # Safety
    /// The buffer must be allocated and `offset <= len`.
    #[inline]
    pub(crate) unsafe fn raw_at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.len());
        let base = self.block.as_ref().map_or(NonNull::dangling(), Allocation::ptr);
        // Safety: upheld by caller.
        unsafe { base.as_ptr().add(offset) }
    }
}

impl<R: Release> Clone for Buffer<R> {
    /// # Panics
    ///
    /// Aborts through `handle_alloc_error` if the copy cannot be allocated;
    /// use [`Buffer::try_clone`] to handle the failure.
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "{} clone failed", R::NAME);
            let layout = std::alloc::Layout::array::<u8>(self.len().max(1))
                .unwrap_or_else(|_| std::alloc::Layout::new::<u8>());
            std::alloc::handle_alloc_error(layout)
        })
    }
}

impl<R: Release> Drop for Buffer<R> {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        if !R::RELEASE_ON_DROP {
            tracing::trace!(backend = %block.kind(), len = block.len(), "MemPtr dropped while allocated");
            return;
        }
        match block.release() {
            Ok(()) => self.update_pressure(),
            Err((block, err)) => {
                tracing::warn!(error = %err, backend = %block.kind(), len = block.len(), "SafePtr release on drop failed, leaking");
            }
        }
    }
}

impl<R: Release> Index<usize> for Buffer<R> {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.as_slice()[index]
    }
}

impl<R: Release> IndexMut<usize> for Buffer<R> {
    fn index_mut(&mut self, index: usize) -> &mut u8 {
        &mut self.as_mut_slice()[index]
    }
}

impl<R: Release> AsRef<[u8]> for Buffer<R> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<R: Release> AsMut<[u8]> for Buffer<R> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl<R: Release> fmt::Debug for Buffer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(R::NAME)
            .field("backend", &self.backend_kind())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::memory::stats;

    #[test]
    fn test_unallocated_state() {
        let buf = SafePtr::new();
        assert!(!buf.is_allocated());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.backend_kind(), BackendKind::Invalid);
        assert!(buf.as_slice().is_empty());
        assert!(matches!(buf.validate(), Err(BufferError::NotAllocated)));
    }

    #[test]
    fn test_alloc_free_roundtrip() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        crate::test_utils::init_test_logging();
        let mut buf = MemPtr::new();
        buf.alloc(64, Backend::Heap).unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(buf.backend_kind(), BackendKind::Heap);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
        assert!(buf.queried_len().is_some_and(|n| n >= 64));
        buf.validate().unwrap();
        buf.free().unwrap();
        assert!(!buf.is_allocated());
        assert_eq!(buf.backend_kind(), BackendKind::Invalid);
        // Freeing again is a no-op.
        buf.free().unwrap();
    }

    #[test]
    fn test_alloc_zero_is_noop_and_realloc_zero_frees() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::new();
        buf.alloc(0, Backend::Virtual).unwrap();
        assert!(!buf.is_allocated());

        buf.alloc(16, Backend::Com).unwrap();
        buf.realloc(0).unwrap();
        assert!(!buf.is_allocated());
    }

    #[test]
    fn test_alloc_on_allocated_reallocates() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::new();
        buf.alloc(4, Backend::Network).unwrap();
        buf.as_mut_slice().copy_from_slice(&[9, 8, 7, 6]);
        // Backend argument is ignored once allocated.
        buf.alloc(8, Backend::Heap).unwrap();
        assert_eq!(buf.backend_kind(), BackendKind::Network);
        assert_eq!(buf.as_slice(), &[9, 8, 7, 6, 0, 0, 0, 0]);
    }

    #[test]
    fn test_realloc_unallocated_uses_heap() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::new();
        buf.set_len(10).unwrap();
        assert_eq!(buf.backend_kind(), BackendKind::Heap);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_heap_then_virtual_free_is_rejected() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = MemPtr::new();
        buf.alloc(32, Backend::Heap).unwrap();
        buf[0] = 0xAB;
        let err = buf.free_as(BackendKind::Virtual).unwrap_err();
        assert!(matches!(
            err,
            BufferError::BackendMismatch {
                expected: BackendKind::Virtual,
                actual: BackendKind::Heap,
            }
        ));
        // The allocation is untouched.
        assert!(buf.is_allocated());
        assert_eq!(buf[0], 0xAB);
        buf.free_as(BackendKind::Heap).unwrap();
        assert!(!buf.is_allocated());
    }

    #[test]
    fn test_free_in_wrong_heap_is_rejected() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let ours = PrivateHeap::create(4096, 0).unwrap();
        let other = PrivateHeap::create(4096, 0).unwrap();
        let mut buf = SafePtr::new();
        buf.alloc(128, Backend::PrivateHeap(ours.clone())).unwrap();

        assert!(matches!(buf.free_in_heap(&other), Err(BufferError::HeapMismatch)));
        assert!(buf.is_allocated());
        buf.free_in_heap(&ours).unwrap();
        assert!(!buf.is_allocated());

        let mut virt = SafePtr::new();
        virt.alloc(10, Backend::Virtual).unwrap();
        assert!(matches!(
            virt.free_in_heap(&ours),
            Err(BufferError::BackendMismatch { .. })
        ));
    }

    #[test]
    fn test_private_heap_outlives_handle() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let heap = PrivateHeap::create(4096, 0).unwrap();
        let mut buf = SafePtr::new();
        buf.alloc(64, Backend::PrivateHeap(heap.clone())).unwrap();
        drop(heap);
        // The buffer keeps the heap alive.
        buf.realloc(4096).unwrap();
        buf.validate().unwrap();
        buf.free().unwrap();
    }

    #[test]
    fn test_zero_memory_ranges() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::from_bytes(&[1, 2, 3, 4, 5, 6], Backend::Heap).unwrap();
        buf.zero_memory(1..3).unwrap();
        assert_eq!(buf.as_slice(), &[1, 0, 0, 4, 5, 6]);
        buf.zero_memory(4..).unwrap();
        assert_eq!(buf.as_slice(), &[1, 0, 0, 4, 0, 0]);
        assert!(buf.zero_memory(5..9).is_err());
        buf.zero_memory(..).unwrap();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clone_is_independent() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut a = SafePtr::from_bytes(b"hello", Backend::aligned(64)).unwrap();
        let mut b = a.clone();
        assert_eq!(b.backend_kind(), BackendKind::Aligned);
        assert_eq!(a.as_slice(), b.as_slice());
        a[0] = b'j';
        b[4] = b'!';
        assert_eq!(a.as_slice(), b"jello");
        assert_eq!(b.as_slice(), b"hell!");
    }

    #[test]
    fn test_flavor_conversion_moves_ownership() {
        let _guard = crate::memory::TEST_MUTEX.write().unwrap();
        let before = stats::LIVE_ALLOCATIONS.get();
        let mut manual = MemPtr::new();
        manual.alloc(24, Backend::Heap).unwrap();
        let owned = manual.into_owned();
        assert_eq!(owned.len(), 24);
        assert_eq!(stats::LIVE_ALLOCATIONS.get(), before + 1);
        drop(owned);
        assert_eq!(stats::LIVE_ALLOCATIONS.get(), before);
    }

    #[test]
    fn test_pressure_tracks_footprint() {
        let _guard = crate::memory::TEST_MUTEX.write().unwrap();
        if !crate::config::get().report_pressure {
            return;
        }
        let before = pressure::current();
        let mut buf = SafePtr::new();
        buf.alloc(1000, Backend::Heap).unwrap();
        assert_eq!(pressure::current(), before + 1000);
        buf.realloc(400).unwrap();
        assert_eq!(pressure::current(), before + 400);
        buf.free().unwrap();
        assert_eq!(pressure::current(), before);
    }

    #[test]
    fn test_index_out_of_bounds_panics() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let buf = SafePtr::from_bytes(&[1, 2], Backend::Heap).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| buf[2]));
        assert!(result.is_err());
    }

    /// Size of the header the emulated heap puts before every block.
    #[cfg(not(windows))]
    const BLOCK_HEADER: usize = 16;

    /// Zero the emulated block header, returning the original bytes.
    #[cfg(not(windows))]
    fn smash_header(buf: &SafePtr) -> [u8; BLOCK_HEADER] {
        let mut saved = [0u8; BLOCK_HEADER];
        // Safety: Test code, the header precedes the user pointer.
        unsafe {
            let header = buf.raw_at(0).sub(BLOCK_HEADER);
            std::ptr::copy_nonoverlapping(header, saved.as_mut_ptr(), BLOCK_HEADER);
            std::ptr::write_bytes(header, 0, BLOCK_HEADER);
        }
        saved
    }

    #[cfg(not(windows))]
    fn restore_header(buf: &SafePtr, saved: &[u8; BLOCK_HEADER]) {
        // Safety: Test code, same header as `smash_header`.
        unsafe {
            std::ptr::copy_nonoverlapping(saved.as_ptr(), buf.raw_at(0).sub(BLOCK_HEADER), BLOCK_HEADER);
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn test_corrupt_block_fails_validation_and_free() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::from_bytes(b"payload!", Backend::Heap).unwrap();
        let saved = smash_header(&buf);

        assert!(matches!(
            buf.validate(),
            Err(BufferError::HeapCorruption {
                backend: BackendKind::Heap
            })
        ));
        assert!(matches!(
            buf.free(),
            Err(BufferError::FreeFailed {
                backend: BackendKind::Heap
            })
        ));
        assert!(buf.is_allocated());
        assert_eq!(buf.as_slice(), b"payload!");

        restore_header(&buf, &saved);
        buf.validate().unwrap();
        buf.free().unwrap();
        assert!(!buf.is_allocated());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_failed_shrink_restores_content() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let mut buf = SafePtr::from_bytes(b"ABCDEFGH", Backend::Heap).unwrap();
        let saved = smash_header(&buf);
        assert!(matches!(
            buf.pull_in(2, 3),
            Err(BufferError::AllocationFailed { .. })
        ));
        assert_eq!(buf.as_slice(), b"ABCDEFGH");
        restore_header(&buf, &saved);

        assert_eq!(buf.part(2, 2).unwrap(), 12);
        let parted = buf.as_slice().to_vec();
        let saved = smash_header(&buf);
        assert!(matches!(
            buf.consume(4, 2),
            Err(BufferError::AllocationFailed { .. })
        ));
        assert_eq!(buf.as_slice(), &parted[..]);
        restore_header(&buf, &saved);

        assert_eq!(buf.consume(4, 2).unwrap(), 8);
        assert_eq!(buf.as_slice(), b"ABCDEFGH");
        buf.free().unwrap();
    }

    #[test]
    fn test_debug_names_flavor() {
        let buf = MemPtr::new();
        assert_eq!(format!("{buf:?}"), "MemPtr { backend: Invalid, len: 0 }");
    }
}

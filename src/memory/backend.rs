//! Backend dispatch: one live allocation together with what produced it.

use std::fmt;
use std::ptr::NonNull;

use super::aligned;
use super::copy;
use super::foreign::{ForeignOps, NetworkPool, TaskAllocator};
use super::heap::{HeapOps, PlatformHeapOps, PrivateHeap, RawHeap};
use super::stats;
use super::vm;
use crate::error::BufferError;
use crate::sync::Arc;

/// Plain tag naming an allocation backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Heap,
    PrivateHeap,
    Virtual,
    Network,
    Com,
    Aligned,
    /// No allocation.
    Invalid,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Heap => "Heap",
            Self::PrivateHeap => "PrivateHeap",
            Self::Virtual => "Virtual",
            Self::Network => "Network",
            Self::Com => "Com",
            Self::Aligned => "Aligned",
            Self::Invalid => "Invalid",
        };
        f.write_str(name)
    }
}

/// Where a buffer's memory comes from, with whatever context is needed to
/// give it back.
#[derive(Clone, Debug, Default)]
pub enum Backend {
    /// The process heap.
    #[default]
    Heap,
    PrivateHeap(Arc<PrivateHeap>),
    /// Reserved and committed pages.
    Virtual,
    /// Network API buffer pool.
    Network,
    /// COM task allocator.
    Com,
    /// Over-allocated block on the process heap, or on `heap` when given.
    Aligned {
        alignment: usize,
        heap: Option<Arc<PrivateHeap>>,
    },
}

impl Backend {
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Heap => BackendKind::Heap,
            Self::PrivateHeap(_) => BackendKind::PrivateHeap,
            Self::Virtual => BackendKind::Virtual,
            Self::Network => BackendKind::Network,
            Self::Com => BackendKind::Com,
            Self::Aligned { .. } => BackendKind::Aligned,
        }
    }

    /// Aligned blocks on the process heap.
    #[must_use]
    pub fn aligned(alignment: usize) -> Self {
        Self::Aligned {
            alignment,
            heap: None,
        }
    }

    /// Aligned blocks using the configured default alignment.
    #[must_use]
    pub fn default_aligned() -> Self {
        Self::aligned(crate::config::get().default_alignment)
    }

    /// Heap identity for the heap-backed kinds.
    fn raw_heap(&self) -> Option<RawHeap> {
        match self {
            Self::Heap | Self::Aligned { heap: None, .. } => Some(PlatformHeapOps::process_heap()),
            Self::PrivateHeap(heap)
            | Self::Aligned {
                heap: Some(heap), ..
            } => Some(heap.raw()),
            Self::Virtual | Self::Network | Self::Com => None,
        }
    }

    /// Whether `self` and `other` would hand memory to the same allocator.
    pub(crate) fn same_heap(&self, other: &PrivateHeap) -> bool {
        self.raw_heap() == Some(other.raw())
    }

    fn foreign_size(&self, size: usize) -> Result<u32, BufferError> {
        u32::try_from(size).map_err(|_| BufferError::SizeTooLarge {
            backend: self.kind(),
            size,
        })
    }
}

/// A live block of native memory.
///
/// Owns the block: dropping an `Allocation` without calling [`release`]
/// leaks it. `Buffer` decides when that is acceptable.
///
/// [`release`]: Allocation::release
#[derive(Debug)]
pub(crate) struct Allocation {
    ptr: NonNull<u8>,
    /// Bytes the caller asked for.
    len: usize,
    /// Bytes the backend holds. Page-rounded for `Virtual`, else `len`.
    region: usize,
    backend: Backend,
}

impl Allocation {
    /// Allocate `size` bytes (`size > 0`) from `backend`.
    pub(crate) fn allocate(backend: Backend, size: usize, zero: bool) -> Result<Self, BufferError> {
        debug_assert!(size > 0);
        let kind = backend.kind();
        let failed = || BufferError::AllocationFailed {
            backend: kind,
            size,
        };

        let (ptr, region) = match &backend {
            Backend::Heap | Backend::PrivateHeap(_) => {
                let heap = backend.raw_heap().ok_or_else(failed)?;
                // Safety: heap is the process heap or a live private heap.
                let ptr = unsafe { PlatformHeapOps::alloc(heap, size, zero) }.ok_or_else(failed)?;
                (ptr, size)
            }
            Backend::Virtual => {
                // Fresh pages are always zeroed.
                vm::alloc_region(size)
                    .inspect_err(|e| tracing::debug!(error = %e, size, "virtual allocation failed"))?
            }
            Backend::Network | Backend::Com => {
                let bytes = backend.foreign_size(size)?;
                // Safety: FFI allocation of a non-zero size.
                let ptr = unsafe {
                    if kind == BackendKind::Network {
                        NetworkPool::alloc(bytes)
                    } else {
                        TaskAllocator::alloc(bytes)
                    }
                }
                .ok_or_else(failed)?;
                if zero {
                    // Safety: ptr is a fresh block of `size` bytes.
                    unsafe { copy::zero_fill(ptr.as_ptr(), size) };
                }
                (ptr, size)
            }
            Backend::Aligned { alignment, .. } => {
                if !alignment.is_power_of_two() {
                    return Err(BufferError::InvalidAlignment(*alignment));
                }
                let heap = backend.raw_heap().ok_or_else(failed)?;
                // Safety: alignment checked, heap is live.
                let ptr = unsafe { aligned::alloc(heap, size, *alignment, zero) }
                    .ok_or_else(failed)?;
                (ptr, size)
            }
        };

        stats::record_alloc(kind, region);
        tracing::trace!(backend = %kind, size, region, "allocated");
        Ok(Self {
            ptr,
            len: size,
            region,
            backend,
        })
    }

    /// Resize to `size` bytes (`size > 0`), preserving the common prefix.
    ///
    /// On failure `self` is unchanged.
    pub(crate) fn reallocate(&mut self, size: usize, zero: bool) -> Result<(), BufferError> {
        debug_assert!(size > 0);
        match &self.backend {
            Backend::Heap | Backend::PrivateHeap(_) => {
                let kind = self.backend.kind();
                let heap = self.backend.raw_heap().ok_or(BufferError::AllocationFailed {
                    backend: kind,
                    size,
                })?;
                // Safety: ptr belongs to heap.
                let ptr = unsafe { PlatformHeapOps::realloc(heap, self.ptr, size, zero) }.ok_or(
                    BufferError::AllocationFailed {
                        backend: kind,
                        size,
                    },
                )?;
                stats::record_resize(kind, self.region, size);
                self.ptr = ptr;
                self.len = size;
                self.region = size;
                Ok(())
            }
            Backend::Virtual if size <= self.region => {
                if zero && size > self.len {
                    // Safety: [len, size) lies inside the committed region.
                    unsafe { copy::zero_fill(self.ptr.as_ptr().add(self.len), size - self.len) };
                }
                tracing::trace!(len = self.len, size, region = self.region, "resized within region");
                self.len = size;
                Ok(())
            }
            Backend::Virtual | Backend::Network | Backend::Com | Backend::Aligned { .. } => {
                self.reallocate_by_copy(size, zero)
            }
        }
    }

    /// Allocate a replacement, copy the prefix, free the original.
    fn reallocate_by_copy(&mut self, size: usize, zero: bool) -> Result<(), BufferError> {
        let mut replacement = Self::allocate(self.backend.clone(), size, zero)?;
        // Safety: distinct live blocks, both at least `min(len)` long.
        unsafe {
            copy::copy_block(
                replacement.ptr.as_ptr(),
                self.ptr.as_ptr(),
                self.len.min(replacement.len),
            );
        }
        std::mem::swap(self, &mut replacement);
        let original = replacement;
        if let Err((original, err)) = original.release() {
            // Keep the block we could not free; drop the new one.
            let fresh = std::mem::replace(self, original);
            if let Err((leaked, _)) = fresh.release() {
                tracing::warn!(backend = %leaked.kind(), region = leaked.region, "leaked replacement block");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Return the block to its backend.
    ///
    /// On failure the allocation is handed back untouched.
    pub(crate) fn release(self) -> Result<(), (Self, BufferError)> {
        let kind = self.backend.kind();
        let ok = match &self.backend {
            Backend::Heap | Backend::PrivateHeap(_) => match self.backend.raw_heap() {
                // Safety: ptr belongs to heap.
                Some(heap) => unsafe { PlatformHeapOps::free(heap, self.ptr) },
                None => false,
            },
            // Safety: ptr/region describe the region from `alloc_region`.
            Backend::Virtual => match unsafe { vm::free_region(self.ptr, self.region) } {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "virtual release failed");
                    false
                }
            },
            // Safety: ptr came from the matching foreign allocator.
            Backend::Network => unsafe { NetworkPool::free(self.ptr) },
            // Safety: ptr came from the matching foreign allocator.
            Backend::Com => unsafe { TaskAllocator::free(self.ptr) },
            Backend::Aligned { alignment, .. } => match self.backend.raw_heap() {
                // Safety: ptr came from `aligned::alloc` on this heap.
                Some(heap) => unsafe { aligned::free(heap, self.ptr, *alignment) },
                None => false,
            },
        };

        if ok {
            stats::record_free(kind, self.region);
            tracing::trace!(backend = %kind, len = self.len, region = self.region, "released");
            Ok(())
        } else {
            Err((self, BufferError::FreeFailed { backend: kind }))
        }
    }

    /// Ask the backend whether the block is intact.
    pub(crate) fn validate(&self) -> bool {
        match &self.backend {
            Backend::Heap | Backend::PrivateHeap(_) => match self.backend.raw_heap() {
                // Safety: ptr belongs to heap.
                Some(heap) => unsafe { PlatformHeapOps::validate(heap, Some(self.ptr)) },
                None => false,
            },
            Backend::Aligned { alignment, .. } => match self.backend.raw_heap() {
                // Safety: ptr came from `aligned::alloc` on this heap.
                Some(heap) => unsafe { aligned::validate(heap, self.ptr, *alignment) },
                None => false,
            },
            Backend::Virtual | Backend::Network | Backend::Com => true,
        }
    }

    /// Block size as the allocator itself reports it.
    pub(crate) fn queried_len(&self) -> Option<usize> {
        match &self.backend {
            Backend::Heap | Backend::PrivateHeap(_) => {
                let heap = self.backend.raw_heap()?;
                // Safety: ptr belongs to heap.
                unsafe { PlatformHeapOps::size(heap, self.ptr) }
            }
            // Safety: ptr is the base of a committed region.
            Backend::Virtual => match unsafe { vm::region_size(self.ptr) } {
                Ok(Some(size)) => Some(size),
                Ok(None) | Err(_) => Some(self.region),
            },
            Backend::Network | Backend::Com | Backend::Aligned { .. } => None,
        }
    }

    #[inline]
    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn backend(&self) -> &Backend {
        &self.backend
    }

    #[inline]
    pub(crate) fn kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

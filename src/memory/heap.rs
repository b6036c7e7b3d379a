//! Process heap and private heap instances.
//!
//! On Windows this is a thin layer over `HeapAlloc` and friends. Elsewhere
//! the same contract is emulated on top of `malloc`: every block carries a
//! small header naming the heap that produced it, and private heaps keep a
//! registry of their live blocks so they can be validated and torn down.

use std::ptr::NonNull;

use crate::error::BufferError;
use crate::memory::backend::BackendKind;
use crate::sync::Arc;

/// Opaque heap identity. On Windows this is the heap `HANDLE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct RawHeap(usize);

/// Abstract interface over a heap allocator.
pub(crate) trait HeapOps {
    /// The heap every process starts with.
    fn process_heap() -> RawHeap;

    /// Create a private heap. `max == 0` means growable.
    unsafe fn create(initial: usize, max: usize) -> Option<RawHeap>;

    /// Destroy a private heap, releasing every block still allocated in it.
    unsafe fn destroy(heap: RawHeap) -> bool;

    unsafe fn alloc(heap: RawHeap, size: usize, zero: bool) -> Option<NonNull<u8>>;

    /// Resize in place or move. On failure the original block is untouched.
    unsafe fn realloc(
        heap: RawHeap,
        ptr: NonNull<u8>,
        size: usize,
        zero: bool,
    ) -> Option<NonNull<u8>>;

    /// Returns false if `heap` does not own `ptr`.
    unsafe fn free(heap: RawHeap, ptr: NonNull<u8>) -> bool;

    /// Usable size of the block as recorded by the allocator.
    unsafe fn size(heap: RawHeap, ptr: NonNull<u8>) -> Option<usize>;

    /// Check a single block, or the whole heap when `ptr` is `None`.
    unsafe fn validate(heap: RawHeap, ptr: Option<NonNull<u8>>) -> bool;
}

pub(crate) struct PlatformHeapOps;

#[cfg(windows)]
mod windows {
    use super::{HeapOps, NonNull, PlatformHeapOps, RawHeap};
    use std::ffi::c_void;

    const HEAP_ZERO_MEMORY: u32 = 0x0000_0008;

    #[link(name = "kernel32")]
    extern "system" {
        fn GetProcessHeap() -> *mut c_void;
        fn HeapCreate(options: u32, initial: usize, maximum: usize) -> *mut c_void;
        fn HeapDestroy(heap: *mut c_void) -> i32;
        fn HeapAlloc(heap: *mut c_void, flags: u32, bytes: usize) -> *mut c_void;
        fn HeapReAlloc(heap: *mut c_void, flags: u32, mem: *mut c_void, bytes: usize)
            -> *mut c_void;
        fn HeapFree(heap: *mut c_void, flags: u32, mem: *mut c_void) -> i32;
        fn HeapSize(heap: *mut c_void, flags: u32, mem: *const c_void) -> usize;
        fn HeapValidate(heap: *mut c_void, flags: u32, mem: *const c_void) -> i32;
    }

    fn handle(heap: RawHeap) -> *mut c_void {
        heap.0 as *mut c_void
    }

    fn flags(zero: bool) -> u32 {
        if zero {
            HEAP_ZERO_MEMORY
        } else {
            0
        }
    }

    impl HeapOps for PlatformHeapOps {
        fn process_heap() -> RawHeap {
            // Safety: FFI call without preconditions.
            RawHeap(unsafe { GetProcessHeap() } as usize)
        }

        unsafe fn create(initial: usize, max: usize) -> Option<RawHeap> {
            // Safety: FFI call to HeapCreate.
            let heap = unsafe { HeapCreate(0, initial, max) };
            (!heap.is_null()).then_some(RawHeap(heap as usize))
        }

        unsafe fn destroy(heap: RawHeap) -> bool {
            // Safety: caller passes a heap from `create`.
            unsafe { HeapDestroy(handle(heap)) != 0 }
        }

        unsafe fn alloc(heap: RawHeap, size: usize, zero: bool) -> Option<NonNull<u8>> {
            // Safety: FFI call to HeapAlloc.
            NonNull::new(unsafe { HeapAlloc(handle(heap), flags(zero), size) }.cast::<u8>())
        }

        unsafe fn realloc(
            heap: RawHeap,
            ptr: NonNull<u8>,
            size: usize,
            zero: bool,
        ) -> Option<NonNull<u8>> {
            // Safety: caller guarantees ptr belongs to heap.
            let moved = unsafe {
                HeapReAlloc(handle(heap), flags(zero), ptr.as_ptr().cast::<c_void>(), size)
            };
            NonNull::new(moved.cast::<u8>())
        }

        unsafe fn free(heap: RawHeap, ptr: NonNull<u8>) -> bool {
            // Safety: caller guarantees ptr belongs to heap.
            unsafe { HeapFree(handle(heap), 0, ptr.as_ptr().cast::<c_void>()) != 0 }
        }

        unsafe fn size(heap: RawHeap, ptr: NonNull<u8>) -> Option<usize> {
            // Safety: caller guarantees ptr belongs to heap.
            let size = unsafe { HeapSize(handle(heap), 0, ptr.as_ptr().cast::<c_void>()) };
            (size != usize::MAX).then_some(size)
        }

        unsafe fn validate(heap: RawHeap, ptr: Option<NonNull<u8>>) -> bool {
            let mem = ptr.map_or(std::ptr::null(), |p| p.as_ptr().cast::<c_void>().cast_const());
            // Safety: FFI call to HeapValidate.
            unsafe { HeapValidate(handle(heap), 0, mem) != 0 }
        }
    }
}

#[cfg(not(windows))]
mod emulated {
    use super::{HeapOps, NonNull, PlatformHeapOps, RawHeap};
    use crate::sync::atomic::{AtomicU32, Ordering};
    use crate::sync::OnceLock;
    // The registry outlives loom model runs, so it cannot hold a loom lock.
    use std::sync::Mutex;
    use std::collections::{HashMap, HashSet};

    const BLOCK_MAGIC: u32 = 0x4D45_4D50;
    const FREED_MAGIC: u32 = 0xDEAD_F00D;
    const PROCESS_HEAP: u32 = 0;

    /// Precedes every block. 16 bytes keeps the user pointer at malloc's
    /// alignment on every target.
    #[repr(C)]
    #[derive(Clone, Copy)]
    struct BlockHeader {
        magic: u32,
        heap: u32,
        size: u64,
    }

    const HEADER: usize = std::mem::size_of::<BlockHeader>();
    const _: () = assert!(HEADER == 16);

    type Registry = Mutex<HashMap<u32, HashSet<usize>>>;

    static REGISTRY: OnceLock<Registry> = OnceLock::new();

    crate::sync::static_atomic! {
        static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);
    }

    fn with_registry<R>(f: impl FnOnce(&mut HashMap<u32, HashSet<usize>>) -> R) -> R {
        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
        let mut guard = registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    fn heap_id(heap: RawHeap) -> u32 {
        u32::try_from(heap.0).unwrap_or(u32::MAX)
    }

    unsafe fn header_of(ptr: NonNull<u8>) -> (*mut u8, BlockHeader) {
        // Safety: caller guarantees ptr came from `alloc`, so HEADER bytes precede it.
        let base = unsafe { ptr.as_ptr().sub(HEADER) };
        // Safety: base is readable for HEADER bytes.
        let header = unsafe { base.cast::<BlockHeader>().read_unaligned() };
        (base, header)
    }

    /// Registry membership for private heaps; the process heap only has headers.
    fn owns(id: u32, ptr: NonNull<u8>) -> bool {
        id == PROCESS_HEAP
            || with_registry(|r| r.get(&id).is_some_and(|set| set.contains(&(ptr.as_ptr() as usize))))
    }

    impl HeapOps for PlatformHeapOps {
        fn process_heap() -> RawHeap {
            RawHeap(PROCESS_HEAP as usize)
        }

        unsafe fn create(_initial: usize, _max: usize) -> Option<RawHeap> {
            let id = NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed);
            if id == PROCESS_HEAP || id == u32::MAX {
                return None;
            }
            with_registry(|r| r.insert(id, HashSet::new()));
            Some(RawHeap(id as usize))
        }

        unsafe fn destroy(heap: RawHeap) -> bool {
            let id = heap_id(heap);
            if id == PROCESS_HEAP {
                return false;
            }
            let Some(blocks) = with_registry(|r| r.remove(&id)) else {
                return false;
            };
            for addr in blocks {
                let base = addr - HEADER;
                // Safety: every registered address is a live block of this heap.
                unsafe { libc::free(base as *mut libc::c_void) };
            }
            true
        }

        unsafe fn alloc(heap: RawHeap, size: usize, zero: bool) -> Option<NonNull<u8>> {
            let id = heap_id(heap);
            if id != PROCESS_HEAP && !with_registry(|r| r.contains_key(&id)) {
                return None;
            }
            let total = size.checked_add(HEADER)?;
            // Safety: FFI calls to calloc/malloc.
            let base = unsafe {
                if zero {
                    libc::calloc(1, total)
                } else {
                    libc::malloc(total)
                }
            }
            .cast::<u8>();
            if base.is_null() {
                return None;
            }
            let header = BlockHeader {
                magic: BLOCK_MAGIC,
                heap: id,
                size: size as u64,
            };
            // Safety: base is a fresh block of at least HEADER bytes.
            let user = unsafe {
                base.cast::<BlockHeader>().write_unaligned(header);
                NonNull::new_unchecked(base.add(HEADER))
            };
            if id != PROCESS_HEAP {
                with_registry(|r| {
                    if let Some(set) = r.get_mut(&id) {
                        set.insert(user.as_ptr() as usize);
                    }
                });
            }
            Some(user)
        }

        unsafe fn realloc(
            heap: RawHeap,
            ptr: NonNull<u8>,
            size: usize,
            zero: bool,
        ) -> Option<NonNull<u8>> {
            let id = heap_id(heap);
            if !owns(id, ptr) {
                return None;
            }
            // Safety: ownership checked above.
            let (base, header) = unsafe { header_of(ptr) };
            if header.magic != BLOCK_MAGIC || header.heap != id {
                return None;
            }
            let total = size.checked_add(HEADER)?;
            // Safety: base is the start of a live malloc block.
            let moved = unsafe { libc::realloc(base.cast::<libc::c_void>(), total) }.cast::<u8>();
            if moved.is_null() {
                return None;
            }
            let old = usize::try_from(header.size).unwrap_or(usize::MAX);
            // Safety: moved is a live block of `total` bytes.
            let user = unsafe {
                if zero && size > old {
                    std::ptr::write_bytes(moved.add(HEADER + old), 0, size - old);
                }
                moved.cast::<BlockHeader>().write_unaligned(BlockHeader {
                    size: size as u64,
                    ..header
                });
                NonNull::new_unchecked(moved.add(HEADER))
            };
            if id != PROCESS_HEAP {
                with_registry(|r| {
                    if let Some(set) = r.get_mut(&id) {
                        set.remove(&(ptr.as_ptr() as usize));
                        set.insert(user.as_ptr() as usize);
                    }
                });
            }
            Some(user)
        }

        unsafe fn free(heap: RawHeap, ptr: NonNull<u8>) -> bool {
            let id = heap_id(heap);
            if !owns(id, ptr) {
                return false;
            }
            // Safety: ownership checked above.
            let (base, header) = unsafe { header_of(ptr) };
            if header.magic != BLOCK_MAGIC || header.heap != id {
                return false;
            }
            if id != PROCESS_HEAP {
                with_registry(|r| {
                    if let Some(set) = r.get_mut(&id) {
                        set.remove(&(ptr.as_ptr() as usize));
                    }
                });
            }
            // Safety: base is the start of a live malloc block owned by this heap.
            unsafe {
                base.cast::<BlockHeader>().write_unaligned(BlockHeader {
                    magic: FREED_MAGIC,
                    ..header
                });
                libc::free(base.cast::<libc::c_void>());
            }
            true
        }

        unsafe fn size(heap: RawHeap, ptr: NonNull<u8>) -> Option<usize> {
            let id = heap_id(heap);
            if !owns(id, ptr) {
                return None;
            }
            // Safety: ownership checked above.
            let (_, header) = unsafe { header_of(ptr) };
            (header.magic == BLOCK_MAGIC && header.heap == id)
                .then(|| usize::try_from(header.size).ok())
                .flatten()
        }

        unsafe fn validate(heap: RawHeap, ptr: Option<NonNull<u8>>) -> bool {
            let id = heap_id(heap);
            match ptr {
                Some(ptr) => {
                    if !owns(id, ptr) {
                        return false;
                    }
                    // Safety: ownership checked above.
                    let (_, header) = unsafe { header_of(ptr) };
                    header.magic == BLOCK_MAGIC && header.heap == id
                }
                None if id == PROCESS_HEAP => true,
                None => with_registry(|r| {
                    r.get(&id).is_some_and(|blocks| {
                        blocks.iter().all(|&addr| {
                            // Safety: registered addresses are live blocks.
                            let header = unsafe {
                                ((addr - HEADER) as *const BlockHeader).read_unaligned()
                            };
                            header.magic == BLOCK_MAGIC && header.heap == id
                        })
                    })
                }),
            }
        }
    }
}

/// A private heap instance.
///
/// Shared through `Arc`: every buffer allocated from it holds a reference, so
/// the heap is destroyed only after its last buffer is gone.
#[derive(Debug)]
pub struct PrivateHeap {
    raw: RawHeap,
}

impl PrivateHeap {
    /// Create a private heap with `initial` bytes committed up front and a
    /// `max` size (`0` for growable).
    ///
    /// # Errors
    ///
    /// Returns `BufferError::AllocationFailed` if the OS refuses the heap.
    pub fn create(initial: usize, max: usize) -> Result<Arc<Self>, BufferError> {
        // Safety: FFI call to create a heap.
        match unsafe { PlatformHeapOps::create(initial, max) } {
            Some(raw) => {
                tracing::debug!(?raw, initial, max, "created private heap");
                Ok(Arc::new(Self { raw }))
            }
            None => Err(BufferError::AllocationFailed {
                backend: BackendKind::PrivateHeap,
                size: initial,
            }),
        }
    }

    /// Create a growable private heap sized from the process configuration.
    ///
    /// # Errors
    ///
    /// See [`PrivateHeap::create`].
    pub fn with_default_size() -> Result<Arc<Self>, BufferError> {
        Self::create(crate::config::get().private_heap_initial_size, 0)
    }

    /// Check the consistency of every block in the heap.
    #[must_use]
    pub fn validate(&self) -> bool {
        // Safety: raw is a live heap owned by self.
        unsafe { PlatformHeapOps::validate(self.raw, None) }
    }

    pub(crate) fn raw(&self) -> RawHeap {
        self.raw
    }
}

impl Drop for PrivateHeap {
    fn drop(&mut self) {
        // Safety: raw came from `create` and no buffer references it any more.
        if unsafe { PlatformHeapOps::destroy(self.raw) } {
            tracing::debug!(raw = ?self.raw, "destroyed private heap");
        } else {
            tracing::warn!(raw = ?self.raw, "failed to destroy private heap");
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_process_heap_alloc_free() {
        let heap = PlatformHeapOps::process_heap();
        // Safety: Test code.
        unsafe {
            let ptr = PlatformHeapOps::alloc(heap, 64, true).expect("alloc failed");
            let slice = std::slice::from_raw_parts(ptr.as_ptr(), 64);
            assert!(slice.iter().all(|&b| b == 0));
            assert!(PlatformHeapOps::size(heap, ptr).is_some_and(|s| s >= 64));
            assert!(PlatformHeapOps::validate(heap, Some(ptr)));
            assert!(PlatformHeapOps::free(heap, ptr));
        }
    }

    #[test]
    fn test_realloc_preserves_prefix_and_zeroes_tail() {
        let heap = PlatformHeapOps::process_heap();
        // Safety: Test code.
        unsafe {
            let ptr = PlatformHeapOps::alloc(heap, 4, true).unwrap();
            std::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), ptr.as_ptr(), 4);
            let grown = PlatformHeapOps::realloc(heap, ptr, 4096, true).unwrap();
            let slice = std::slice::from_raw_parts(grown.as_ptr(), 4096);
            assert_eq!(&slice[..4], &[1, 2, 3, 4]);
            assert!(slice[4..].iter().all(|&b| b == 0));
            assert!(PlatformHeapOps::free(heap, grown));
        }
    }

    #[test]
    fn test_private_heap_rejects_foreign_free() {
        let private = PrivateHeap::create(4096, 0).unwrap();
        let process = PlatformHeapOps::process_heap();
        // Safety: Test code.
        unsafe {
            let ptr = PlatformHeapOps::alloc(private.raw(), 32, false).unwrap();
            // Wrong heap: the block stays live.
            #[cfg(not(windows))]
            assert!(!PlatformHeapOps::free(process, ptr));
            let _ = process;
            assert!(PlatformHeapOps::validate(private.raw(), Some(ptr)));
            assert!(PlatformHeapOps::free(private.raw(), ptr));
        }
        assert!(private.validate());
    }

    #[test]
    fn test_private_heap_drop_releases_blocks() {
        let private = PrivateHeap::create(4096, 0).unwrap();
        // Safety: Test code.
        unsafe {
            PlatformHeapOps::alloc(private.raw(), 128, true).unwrap();
            PlatformHeapOps::alloc(private.raw(), 256, false).unwrap();
        }
        assert!(private.validate());
        drop(private);
    }

    #[test]
    fn test_distinct_private_heaps() {
        let a = PrivateHeap::create(4096, 0).unwrap();
        let b = PrivateHeap::create(4096, 0).unwrap();
        assert_ne!(a.raw(), b.raw());
        assert_ne!(a.raw(), PlatformHeapOps::process_heap());
    }
}

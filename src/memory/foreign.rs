//! Allocators owned by other subsystems: the network API buffer pool and the
//! COM task allocator. Neither can resize or report a block's size, and both
//! take 32-bit sizes.

use std::ptr::NonNull;

pub(crate) trait ForeignOps {
    unsafe fn alloc(size: u32) -> Option<NonNull<u8>>;

    unsafe fn free(ptr: NonNull<u8>) -> bool;
}

/// `NetApiBufferAllocate` / `NetApiBufferFree`.
pub(crate) struct NetworkPool;

/// `CoTaskMemAlloc` / `CoTaskMemFree`.
pub(crate) struct TaskAllocator;

#[cfg(windows)]
mod windows {
    use super::{ForeignOps, NetworkPool, NonNull, TaskAllocator};
    use std::ffi::c_void;

    const NERR_SUCCESS: u32 = 0;

    #[link(name = "netapi32")]
    extern "system" {
        fn NetApiBufferAllocate(byte_count: u32, buffer: *mut *mut c_void) -> u32;
        fn NetApiBufferFree(buffer: *mut c_void) -> u32;
    }

    #[link(name = "ole32")]
    extern "system" {
        fn CoTaskMemAlloc(size: usize) -> *mut c_void;
        fn CoTaskMemFree(ptr: *mut c_void);
    }

    impl ForeignOps for NetworkPool {
        unsafe fn alloc(size: u32) -> Option<NonNull<u8>> {
            let mut out: *mut c_void = std::ptr::null_mut();
            // Safety: FFI call with a valid out-pointer.
            if unsafe { NetApiBufferAllocate(size, &mut out) } != NERR_SUCCESS {
                return None;
            }
            NonNull::new(out.cast::<u8>())
        }

        unsafe fn free(ptr: NonNull<u8>) -> bool {
            // Safety: caller guarantees ptr came from NetApiBufferAllocate.
            unsafe { NetApiBufferFree(ptr.as_ptr().cast::<c_void>()) == NERR_SUCCESS }
        }
    }

    impl ForeignOps for TaskAllocator {
        unsafe fn alloc(size: u32) -> Option<NonNull<u8>> {
            // Safety: FFI call to CoTaskMemAlloc.
            NonNull::new(unsafe { CoTaskMemAlloc(size as usize) }.cast::<u8>())
        }

        unsafe fn free(ptr: NonNull<u8>) -> bool {
            // Safety: caller guarantees ptr came from CoTaskMemAlloc.
            unsafe { CoTaskMemFree(ptr.as_ptr().cast::<c_void>()) };
            true
        }
    }
}

#[cfg(not(windows))]
mod emulated {
    use super::{ForeignOps, NetworkPool, NonNull, TaskAllocator};

    unsafe fn malloc(size: u32) -> Option<NonNull<u8>> {
        // Safety: FFI call to malloc; a zero request still yields a unique block.
        NonNull::new(unsafe { libc::malloc((size as usize).max(1)) }.cast::<u8>())
    }

    unsafe fn free(ptr: NonNull<u8>) -> bool {
        // Safety: caller guarantees ptr came from `malloc` above.
        unsafe { libc::free(ptr.as_ptr().cast::<libc::c_void>()) };
        true
    }

    impl ForeignOps for NetworkPool {
        unsafe fn alloc(size: u32) -> Option<NonNull<u8>> {
            // Safety: forwarded.
            unsafe { malloc(size) }
        }

        unsafe fn free(ptr: NonNull<u8>) -> bool {
            // Safety: forwarded.
            unsafe { free(ptr) }
        }
    }

    impl ForeignOps for TaskAllocator {
        unsafe fn alloc(size: u32) -> Option<NonNull<u8>> {
            // Safety: forwarded.
            unsafe { malloc(size) }
        }

        unsafe fn free(ptr: NonNull<u8>) -> bool {
            // Safety: forwarded.
            unsafe { free(ptr) }
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    fn roundtrip<A: ForeignOps>() {
        // Safety: Test code.
        unsafe {
            let ptr = A::alloc(256).expect("alloc failed");
            std::ptr::write_bytes(ptr.as_ptr(), 0x5A, 256);
            assert_eq!(*ptr.as_ptr().add(255), 0x5A);
            assert!(A::free(ptr));
        }
    }

    #[test]
    fn test_network_pool_roundtrip() {
        roundtrip::<NetworkPool>();
    }

    #[test]
    fn test_task_allocator_roundtrip() {
        roundtrip::<TaskAllocator>();
    }
}

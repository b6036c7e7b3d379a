use std::ptr::NonNull;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("VM reservation failed: {0}")]
    ReservationFailed(#[source] std::io::Error),
    #[error("VM commit failed: {0}")]
    CommitFailed(#[source] std::io::Error),
    #[error("VM release failed: {0}")]
    ReleaseFailed(#[source] std::io::Error),
    #[error("VM region query failed: {0}")]
    QueryFailed(#[source] std::io::Error),
}

/// Abstract interface for virtual memory operations.
pub(crate) trait VmOps {
    /// Reserve address space without committing physical pages.
    /// Returns a pointer to the start of the reserved range.
    unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError>;

    /// Commit (back with physical pages, read/write) a range within a reservation.
    unsafe fn commit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError>;

    /// Release address space entirely (after which pointers are invalid).
    /// `size` must be the size passed to `reserve`.
    unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError>;

    /// Size of the region starting at `ptr`, as reported by the OS.
    ///
    /// Returns `Ok(None)` on platforms without region introspection; callers
    /// then fall back to the page-rounded size they reserved.
    unsafe fn region_size(ptr: NonNull<u8>) -> Result<Option<usize>, VmError>;

    /// OS page size (default/minimum).
    fn page_size() -> usize;
}

pub(crate) struct PlatformVmOps;

/// Reserve and commit a read/write region of at least `size` bytes.
///
/// Returns the base pointer and the page-granular region length.
pub(crate) fn alloc_region(size: usize) -> Result<(NonNull<u8>, usize), VmError> {
    let rounded = size
        .checked_next_multiple_of(PlatformVmOps::page_size())
        .ok_or_else(|| {
            VmError::ReservationFailed(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "size overflows a page-rounded region",
            ))
        })?;
    // Safety: FFI call to reserve memory.
    let ptr = unsafe { PlatformVmOps::reserve(rounded)? };
    // Safety: ptr/rounded describe the reservation made above.
    if let Err(e) = unsafe { PlatformVmOps::commit(ptr, rounded) } {
        // Safety: same reservation, never handed out.
        drop(unsafe { PlatformVmOps::release(ptr, rounded) });
        return Err(e);
    }
    // Safety: region was just committed.
    let len = match unsafe { PlatformVmOps::region_size(ptr) } {
        Ok(Some(reported)) => reported,
        Ok(None) | Err(_) => rounded,
    };
    Ok((ptr, len))
}

/// Release a region returned by [`alloc_region`].
///
/// # Safety
/// `ptr` and `len` must come from `alloc_region` and the region must not be
/// used afterwards.
pub(crate) unsafe fn free_region(ptr: NonNull<u8>, len: usize) -> Result<(), VmError> {
    // Safety: upheld by caller.
    unsafe { PlatformVmOps::release(ptr, len) }
}

/// OS-reported size of a region from [`alloc_region`], if the platform can tell.
///
/// # Safety
/// `ptr` must be the base of a live region.
pub(crate) unsafe fn region_size(ptr: NonNull<u8>) -> Result<Option<usize>, VmError> {
    // Safety: upheld by caller.
    unsafe { PlatformVmOps::region_size(ptr) }
}

#[cfg(all(unix, not(any(loom, miri))))]
mod unix {
    use super::{NonNull, PlatformVmOps, VmError, VmOps};
    use std::io;

    impl VmOps for PlatformVmOps {
        unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
            // Safety: FFI call to mmap.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_NONE,
                    libc::MAP_PRIVATE | libc::MAP_ANON,
                    -1,
                    0,
                )
            };

            if ptr == libc::MAP_FAILED {
                return Err(VmError::ReservationFailed(io::Error::last_os_error()));
            }

            match NonNull::new(ptr.cast::<u8>()) {
                Some(p) => Ok(p),
                None => Err(VmError::ReservationFailed(io::Error::other(
                    "mmap returned null",
                ))),
            }
        }

        unsafe fn commit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
            // Safety: FFI call to mprotect.
            if unsafe {
                libc::mprotect(
                    ptr.as_ptr().cast::<libc::c_void>(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                )
            } != 0
            {
                return Err(VmError::CommitFailed(io::Error::last_os_error()));
            }
            Ok(())
        }

        unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
            // Safety: FFI call to munmap.
            if unsafe { libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), size) } != 0 {
                return Err(VmError::ReleaseFailed(io::Error::last_os_error()));
            }
            Ok(())
        }

        unsafe fn region_size(_ptr: NonNull<u8>) -> Result<Option<usize>, VmError> {
            // Anonymous mappings with equal protections may be merged by the
            // kernel, so /proc/self/maps cannot tell us where ours ends.
            Ok(None)
        }

        fn page_size() -> usize {
            use crate::sync::OnceLock;
            static CACHED: OnceLock<usize> = OnceLock::new();
            *CACHED.get_or_init(|| {
                // Safety: FFI call to sysconf.
                let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
                if raw > 0 {
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    {
                        raw as usize
                    }
                } else {
                    4096
                }
            })
        }
    }
}

#[cfg(all(windows, not(any(loom, miri))))]
mod windows {
    use super::{NonNull, PlatformVmOps, VmError, VmOps};
    use std::ffi::c_void;
    use std::io;

    const MEM_COMMIT: u32 = 0x0000_1000;
    const MEM_RESERVE: u32 = 0x0000_2000;
    const MEM_RELEASE: u32 = 0x0000_8000;
    const PAGE_NOACCESS: u32 = 0x01;
    const PAGE_READWRITE: u32 = 0x04;

    #[repr(C)]
    struct MemoryBasicInformation {
        base_address: *mut c_void,
        allocation_base: *mut c_void,
        allocation_protect: u32,
        partition_id: u16,
        region_size: usize,
        state: u32,
        protect: u32,
        kind: u32,
    }

    #[repr(C)]
    struct SystemInfo {
        processor_architecture: u16,
        reserved: u16,
        page_size: u32,
        minimum_application_address: *mut c_void,
        maximum_application_address: *mut c_void,
        active_processor_mask: usize,
        number_of_processors: u32,
        processor_type: u32,
        allocation_granularity: u32,
        processor_level: u16,
        processor_revision: u16,
    }

    #[link(name = "kernel32")]
    extern "system" {
        fn VirtualAlloc(address: *mut c_void, size: usize, kind: u32, protect: u32) -> *mut c_void;
        fn VirtualFree(address: *mut c_void, size: usize, kind: u32) -> i32;
        fn VirtualQuery(
            address: *const c_void,
            buffer: *mut MemoryBasicInformation,
            length: usize,
        ) -> usize;
        fn GetSystemInfo(info: *mut SystemInfo);
    }

    impl VmOps for PlatformVmOps {
        unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
            // Safety: FFI call to VirtualAlloc.
            let ptr = unsafe { VirtualAlloc(std::ptr::null_mut(), size, MEM_RESERVE, PAGE_NOACCESS) };

            match NonNull::new(ptr.cast::<u8>()) {
                Some(p) => Ok(p),
                None => Err(VmError::ReservationFailed(io::Error::last_os_error())),
            }
        }

        unsafe fn commit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
            // Safety: FFI call to VirtualAlloc.
            let result = unsafe {
                VirtualAlloc(ptr.as_ptr().cast::<c_void>(), size, MEM_COMMIT, PAGE_READWRITE)
            };
            if result.is_null() {
                return Err(VmError::CommitFailed(io::Error::last_os_error()));
            }
            Ok(())
        }

        unsafe fn release(ptr: NonNull<u8>, _size: usize) -> Result<(), VmError> {
            // VirtualFree with MEM_RELEASE must have size 0 and the base address of the region.
            // Safety: FFI call to VirtualFree.
            if unsafe { VirtualFree(ptr.as_ptr().cast::<c_void>(), 0, MEM_RELEASE) } == 0 {
                return Err(VmError::ReleaseFailed(io::Error::last_os_error()));
            }
            Ok(())
        }

        unsafe fn region_size(ptr: NonNull<u8>) -> Result<Option<usize>, VmError> {
            // Safety: all-zero is a valid MEMORY_BASIC_INFORMATION.
            let mut info: MemoryBasicInformation = unsafe { std::mem::zeroed() };
            // Safety: FFI call to VirtualQuery with a correctly sized out-buffer.
            let written = unsafe {
                VirtualQuery(
                    ptr.as_ptr().cast::<c_void>(),
                    &mut info,
                    std::mem::size_of::<MemoryBasicInformation>(),
                )
            };
            if written == 0 {
                return Err(VmError::QueryFailed(io::Error::last_os_error()));
            }
            Ok(Some(info.region_size))
        }

        fn page_size() -> usize {
            use crate::sync::OnceLock;
            static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
            // Safety: FFI call to GetSystemInfo.
            *PAGE_SIZE.get_or_init(|| unsafe {
                let mut info: SystemInfo = std::mem::zeroed();
                GetSystemInfo(&mut info);
                info.page_size as usize
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Loom/Miri mock: heap-backed VmOps (no real mmap/VirtualAlloc)
//
// Under `cfg(loom)` or `cfg(miri)` we cannot issue real VM syscalls. Every
// "reservation" is a plain heap allocation (via `std::alloc`). `commit` is a
// no-op since the memory is always accessible once reserved; `release` frees
// the heap block.
// ---------------------------------------------------------------------------
#[cfg(any(loom, miri))]
impl VmOps for PlatformVmOps {
    unsafe fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
        if size == 0 {
            return Err(VmError::ReservationFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "zero-size reservation",
            )));
        }
        let layout = std::alloc::Layout::from_size_align(size, 4096)
            .map_err(|e| VmError::ReservationFailed(std::io::Error::other(e)))?;
        // Safety: layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| {
            VmError::ReservationFailed(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "alloc returned null",
            ))
        })
    }

    unsafe fn commit(_ptr: NonNull<u8>, _size: usize) -> Result<(), VmError> {
        Ok(())
    }

    unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
        let layout = std::alloc::Layout::from_size_align(size, 4096)
            .map_err(|e| VmError::ReleaseFailed(std::io::Error::other(e)))?;
        // Safety: ptr was allocated with the same layout via `reserve`.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        Ok(())
    }

    unsafe fn region_size(_ptr: NonNull<u8>) -> Result<Option<usize>, VmError> {
        Ok(None)
    }

    fn page_size() -> usize {
        4096
    }
}

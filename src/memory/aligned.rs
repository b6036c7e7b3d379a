//! Aligned blocks carved out of an over-sized heap block.
//!
//! Layout of the underlying heap block:
//!
//! ```text
//! raw                         aligned - 8      aligned
//!  |<-- padding (0..align-1) -->|<-- raw addr -->|<-- size bytes -->|
//! ```
//!
//! The 8 bytes before the aligned address always hold the original address
//! as a little-endian `u64`, independent of pointer width.

use std::ptr::NonNull;

use super::heap::{HeapOps, PlatformHeapOps, RawHeap};

pub(crate) const HEADER: usize = 8;

/// Bytes requested from the heap for an aligned block.
pub(crate) fn padded_size(size: usize, alignment: usize) -> Option<usize> {
    size.checked_add(alignment - 1)?.checked_add(HEADER)
}

/// Allocate `size` bytes aligned to `alignment` on `heap`.
///
/// # Safety
/// `alignment` must be a non-zero power of two and `heap` a live heap.
pub(crate) unsafe fn alloc(
    heap: RawHeap,
    size: usize,
    alignment: usize,
    zero: bool,
) -> Option<NonNull<u8>> {
    debug_assert!(alignment.is_power_of_two());
    let total = padded_size(size, alignment)?;
    // Safety: upheld by caller.
    let raw = unsafe { PlatformHeapOps::alloc(heap, total, zero)? };
    let raw_addr = raw.as_ptr() as usize;
    let aligned_addr = (raw_addr + HEADER + alignment - 1) & !(alignment - 1);
    // Safety: aligned_addr - raw_addr <= HEADER + alignment - 1, inside the block.
    unsafe {
        let aligned = raw.as_ptr().add(aligned_addr - raw_addr);
        aligned
            .sub(HEADER)
            .cast::<[u8; HEADER]>()
            .write_unaligned((raw_addr as u64).to_le_bytes());
        Some(NonNull::new_unchecked(aligned))
    }
}

/// Recover the start of the heap block behind an aligned pointer.
///
/// Returns `None` when the stored address cannot have produced `ptr` with
/// this alignment.
///
/// # Safety
/// `ptr` must come from [`alloc`].
pub(crate) unsafe fn original(ptr: NonNull<u8>, alignment: usize) -> Option<NonNull<u8>> {
    let aligned_addr = ptr.as_ptr() as usize;
    // Safety: HEADER bytes precede every aligned pointer.
    let stored = u64::from_le_bytes(unsafe {
        ptr.as_ptr()
            .sub(HEADER)
            .cast::<[u8; HEADER]>()
            .read_unaligned()
    });
    let raw_addr = usize::try_from(stored).ok()?;
    let distance = aligned_addr.checked_sub(raw_addr)?;
    if distance < HEADER || distance > HEADER + alignment - 1 {
        return None;
    }
    // Derive from ptr so the result keeps the block's provenance.
    NonNull::new(ptr.as_ptr().wrapping_sub(distance))
}

/// # Safety
/// `ptr` must come from [`alloc`] with the same `heap` and `alignment`.
pub(crate) unsafe fn free(heap: RawHeap, ptr: NonNull<u8>, alignment: usize) -> bool {
    // Safety: upheld by caller.
    match unsafe { original(ptr, alignment) } {
        // Safety: raw is the block returned by the heap.
        Some(raw) => unsafe { PlatformHeapOps::free(heap, raw) },
        None => false,
    }
}

/// # Safety
/// `ptr` must come from [`alloc`] with the same `heap` and `alignment`.
pub(crate) unsafe fn validate(heap: RawHeap, ptr: NonNull<u8>, alignment: usize) -> bool {
    // Safety: upheld by caller.
    match unsafe { original(ptr, alignment) } {
        // Safety: raw is the block returned by the heap.
        Some(raw) => unsafe { PlatformHeapOps::validate(heap, Some(raw)) },
        None => false,
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_honoured() {
        let heap = PlatformHeapOps::process_heap();
        for alignment in [1usize, 2, 8, 64, 512, 4096] {
            // Safety: Test code.
            unsafe {
                let ptr = alloc(heap, 100, alignment, true).expect("alloc failed");
                assert_eq!(ptr.as_ptr() as usize % alignment, 0, "alignment {alignment}");
                let slice = std::slice::from_raw_parts(ptr.as_ptr(), 100);
                assert!(slice.iter().all(|&b| b == 0));
                assert!(validate(heap, ptr, alignment));
                assert!(free(heap, ptr, alignment));
            }
        }
    }

    #[test]
    fn test_header_holds_original_address() {
        let heap = PlatformHeapOps::process_heap();
        // Safety: Test code.
        unsafe {
            let ptr = alloc(heap, 16, 256, false).unwrap();
            let raw = original(ptr, 256).unwrap();
            let distance = ptr.as_ptr() as usize - raw.as_ptr() as usize;
            assert!((HEADER..HEADER + 256).contains(&distance));
            assert!(free(heap, ptr, 256));
        }
    }

    #[test]
    fn test_corrupted_header_is_rejected() {
        let heap = PlatformHeapOps::process_heap();
        // Safety: Test code.
        unsafe {
            let ptr = alloc(heap, 16, 64, false).unwrap();
            let slot = ptr.as_ptr().sub(HEADER).cast::<[u8; HEADER]>();
            let saved = slot.read_unaligned();
            slot.write_unaligned(u64::MAX.to_le_bytes());
            assert!(original(ptr, 64).is_none());
            assert!(!free(heap, ptr, 64));
            slot.write_unaligned(saved);
            assert!(free(heap, ptr, 64));
        }
    }

    #[test]
    fn test_padded_size_overflow() {
        assert_eq!(padded_size(100, 64), Some(100 + 63 + 8));
        assert_eq!(padded_size(usize::MAX, 64), None);
    }
}

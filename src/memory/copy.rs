//! Raw transfer primitives shared by every buffer operation.
//!
//! Nothing here bounds-checks. Callers validate ranges first.

use super::scalar::Scalar;

/// Copy `len` bytes between non-overlapping regions.
///
/// # Safety
/// Both ranges must be valid for `len` bytes and must not overlap.
#[inline]
pub(crate) unsafe fn copy_block(dest: *mut u8, src: *const u8, len: usize) {
    if len == 0 {
        return;
    }
    // Safety: upheld by caller.
    unsafe { std::ptr::copy_nonoverlapping(src, dest, len) };
}

/// # Safety
/// `dest` must be valid for `len` bytes of writes.
#[inline]
pub(crate) unsafe fn zero_fill(dest: *mut u8, len: usize) {
    // Safety: upheld by caller.
    unsafe { std::ptr::write_bytes(dest, 0, len) };
}

/// Index, in units, of the first all-zero `unit`-byte unit at `ptr`.
///
/// # Safety
/// A zero unit must exist within readable memory starting at `ptr`.
pub(crate) unsafe fn scan_for_null_unit(ptr: *const u8, unit: usize) -> usize {
    debug_assert!(unit == 1 || unit == 2);
    let mut index = 0;
    loop {
        // Safety: upheld by caller, the terminator is reachable.
        let chunk = unsafe { std::slice::from_raw_parts(ptr.add(index * unit), unit) };
        if chunk.iter().all(|&b| b == 0) {
            return index;
        }
        index += 1;
    }
}

/// Bounded variant of [`scan_for_null_unit`]. A trailing partial unit is
/// never treated as a terminator.
#[must_use]
pub(crate) fn find_null_unit(bytes: &[u8], unit: usize) -> Option<usize> {
    debug_assert!(unit == 1 || unit == 2);
    bytes
        .chunks_exact(unit)
        .position(|chunk| chunk.iter().all(|&b| b == 0))
}

/// # Safety
/// `ptr` must be readable for `size_of::<T>()` bytes.
#[inline]
pub(crate) unsafe fn read_scalar<T: Scalar>(ptr: *const u8) -> T {
    // Safety: upheld by caller; Scalar admits every bit pattern.
    unsafe { ptr.cast::<T>().read_unaligned() }
}

/// # Safety
/// `ptr` must be writable for `size_of::<T>()` bytes.
#[inline]
pub(crate) unsafe fn write_scalar<T: Scalar>(ptr: *mut u8, value: T) {
    // Safety: upheld by caller.
    unsafe { ptr.cast::<T>().write_unaligned(value) };
}

/// Copy `count` elements of `width` bytes each. Returns the bytes copied.
///
/// # Safety
/// `count * width` must not overflow, and the ranges must satisfy
/// [`copy_block`] for that many bytes.
#[inline]
pub(crate) unsafe fn copy_elements(
    dest: *mut u8,
    src: *const u8,
    count: usize,
    width: usize,
) -> usize {
    let len = count * width;
    // Safety: upheld by caller.
    unsafe { copy_block(dest, src, len) };
    len
}

/// Exchange two `T`-sized regions in place.
///
/// # Safety
/// Both pointers must be valid for reads and writes of `size_of::<T>()`
/// bytes and the regions must not overlap.
#[inline]
pub(crate) unsafe fn swap_scalar<T: Scalar>(a: *mut u8, b: *mut u8) {
    // Safety: upheld by caller.
    unsafe {
        let left = read_scalar::<T>(a);
        let right = read_scalar::<T>(b);
        write_scalar(a, right);
        write_scalar(b, left);
    }
}

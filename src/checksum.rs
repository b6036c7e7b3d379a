//! ISO 3309 / IEEE 802.3 CRC-32 (reflected polynomial `0xEDB88320`).

use std::io::{self, Read};
use std::ops::RangeBounds;

use crate::buffer::{Buffer, Release};
use crate::error::BufferError;

const POLYNOMIAL: u32 = 0xEDB8_8320;
const INITIAL: u32 = 0xFFFF_FFFF;
const FINAL_XOR: u32 = 0xFFFF_FFFF;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental CRC-32 state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crc32 {
    state: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    #[must_use]
    pub const fn new() -> Self {
        Self { state: INITIAL }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let mut crc = self.state;
        for &b in bytes {
            crc = TABLE[((crc ^ u32::from(b)) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.state = crc;
    }

    /// Checksum of everything fed so far. The state stays usable.
    #[must_use]
    pub const fn finalize(&self) -> u32 {
        self.state ^ FINAL_XOR
    }

    /// One-shot checksum.
    #[must_use]
    pub fn checksum(bytes: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(bytes);
        crc.finalize()
    }

    #[must_use]
    pub fn validate(bytes: &[u8], expected: u32) -> bool {
        Self::checksum(bytes) == expected
    }

    /// Checksum of everything `reader` yields, read `chunk_len` bytes at a
    /// time (`0` selects the configured chunk length).
    ///
    /// # Errors
    ///
    /// Propagates read errors other than `Interrupted`.
    pub fn calculate_reader<R: Read>(mut reader: R, chunk_len: usize) -> io::Result<u32> {
        let chunk_len = if chunk_len == 0 {
            crate::config::get().crc_chunk_len
        } else {
            chunk_len
        };
        let mut chunk = vec![0u8; chunk_len];
        let mut crc = Self::new();
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => return Ok(crc.finalize()),
                Ok(n) => crc.update(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Release> Buffer<R> {
    /// CRC-32 of the whole buffer.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.crc32_chunked(.., crate::config::get().crc_chunk_len)
            .unwrap_or_else(|_| Crc32::checksum(&[]))
    }

    /// CRC-32 of `range`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `range` leaves the buffer.
    pub fn crc32_range(&self, range: impl RangeBounds<usize>) -> Result<u32, BufferError> {
        self.crc32_chunked(range, crate::config::get().crc_chunk_len)
    }

    /// CRC-32 of `range`, walking it `chunk_len` bytes at a time.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `range` leaves the buffer.
    pub fn crc32_chunked(
        &self,
        range: impl RangeBounds<usize>,
        chunk_len: usize,
    ) -> Result<u32, BufferError> {
        let (start, len) = self.resolve("crc32", range)?;
        let mut crc = Crc32::new();
        for chunk in self.as_slice()[start..start + len].chunks(chunk_len.max(1)) {
            crc.update(chunk);
        }
        Ok(crc.finalize())
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::memory::backend::Backend;
    use crate::SafePtr;

    #[test]
    fn test_reference_vectors() {
        assert_eq!(Crc32::checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(Crc32::checksum(b""), 0);
        assert_eq!(
            Crc32::checksum(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
        assert!(Crc32::validate(b"123456789", 0xCBF4_3926));
        assert!(!Crc32::validate(b"123456780", 0xCBF4_3926));
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(TABLE[0], 0);
        assert_eq!(TABLE[1], 0x7707_3096);
        assert_eq!(TABLE[255], 0x2D02_EF8D);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut crc = Crc32::new();
        crc.update(b"1234");
        assert_ne!(crc.finalize(), 0xCBF4_3926);
        crc.update(b"56789");
        assert_eq!(crc.finalize(), 0xCBF4_3926);
    }

    #[test]
    fn test_reader() {
        let data = b"123456789".repeat(300);
        let expected = Crc32::checksum(&data);
        assert_eq!(Crc32::calculate_reader(&data[..], 7).unwrap(), expected);
        assert_eq!(Crc32::calculate_reader(&data[..], 0).unwrap(), expected);
    }

    #[test]
    fn test_buffer_checksums() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let buf = SafePtr::from_bytes(b"xx123456789yy", Backend::Virtual).unwrap();
        let unpadded = SafePtr::from_bytes(b"123456789", Backend::Heap).unwrap();
        assert_eq!(unpadded.crc32(), 0xCBF4_3926);
        assert_eq!(buf.crc32_range(2..11).unwrap(), 0xCBF4_3926);
        assert_eq!(buf.crc32_chunked(2..11, 1).unwrap(), 0xCBF4_3926);
        assert_eq!(buf.crc32_chunked(2..=10, 4).unwrap(), 0xCBF4_3926);
        assert!(buf.crc32_range(0..buf.len() + 1).is_err());
        assert_eq!(SafePtr::new().crc32(), 0);
    }

    #[test]
    fn test_large_buffer_chunking_is_transparent() {
        let _guard = crate::memory::TEST_MUTEX.read().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let buf = SafePtr::from_bytes(&data, Backend::Heap).unwrap();
        let expected = Crc32::checksum(&data);
        assert_eq!(buf.crc32(), expected);
        for chunk in [1, 3, 1024, 4096, 20_000] {
            assert_eq!(buf.crc32_chunked(.., chunk).unwrap(), expected);
        }
    }
}

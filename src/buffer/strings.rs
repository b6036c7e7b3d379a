//! Text in native buffers.
//!
//! Strings are stored null-terminated. UTF-16 uses 2-byte little-endian
//! units and a 2-byte terminator; ASCII and UTF-8 use a 1-byte terminator.
//! Reads that find no terminator stop at the end of the buffer.

use super::{Buffer, Release};
use crate::error::BufferError;
use crate::memory::backend::Backend;
use crate::memory::copy;

/// Length-prefix width of a BSTR.
const BSTR_PREFIX: usize = 4;

/// Text encoding of a stored string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[default]
    Utf16,
    /// 7-bit ASCII; other characters are stored and read back as `?`.
    Ascii,
    Utf8,
}

impl Encoding {
    /// Bytes per code unit.
    #[must_use]
    pub const fn unit(self) -> usize {
        match self {
            Self::Utf16 => 2,
            Self::Ascii | Self::Utf8 => 1,
        }
    }

    /// Encode `s` followed by one terminator unit.
    fn encode_terminated(self, s: &str) -> Vec<u8> {
        let mut out = match self {
            Self::Utf16 => s.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Ascii => s
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Self::Utf8 => s.as_bytes().to_vec(),
        };
        out.extend(std::iter::repeat_n(0, self.unit()));
        out
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf16 => decode_utf16(bytes),
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
                .collect(),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Decode a BSTR at a raw COM address.
///
/// With `use_prefix`, the 4 bytes before `ptr` hold the string's byte length
/// (little-endian). Without it, the string runs to the first null unit.
///
/// # Safety
///
/// `ptr` must address a live BSTR: readable for its prefix and data, or
/// null-terminated when `use_prefix` is false.
#[must_use]
pub unsafe fn read_bstr(ptr: *const u16, use_prefix: bool) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let bytes = ptr.cast::<u8>();
    let len = if use_prefix {
        let mut prefix = [0u8; BSTR_PREFIX];
        // Safety: upheld by caller, the prefix precedes the data.
        unsafe { copy::copy_block(prefix.as_mut_ptr(), bytes.sub(BSTR_PREFIX), BSTR_PREFIX) };
        u32::from_le_bytes(prefix) as usize
    } else {
        // Safety: upheld by caller, a terminator follows.
        unsafe { copy::scan_for_null_unit(bytes, 2) * 2 }
    };
    // Safety: upheld by caller, `len` bytes of data are readable.
    decode_utf16(unsafe { std::slice::from_raw_parts(bytes, len) })
}

impl<R: Release> Buffer<R> {
    /// Units before the terminator (or the end of the buffer) at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `offset > len`.
    pub fn str_len(&self, offset: usize, encoding: Encoding) -> Result<usize, BufferError> {
        self.check_range("str_len", offset, 0)?;
        let tail = &self.as_slice()[offset..];
        let unit = encoding.unit();
        Ok(copy::find_null_unit(tail, unit).unwrap_or(tail.len() / unit))
    }

    /// Null-terminated UTF-16 string at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `offset > len`.
    pub fn grab_string(&self, offset: usize) -> Result<String, BufferError> {
        self.grab_terminated(offset, Encoding::Utf16)
    }

    /// Exactly `chars` UTF-16 units at byte `offset`, terminator or not.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn grab_string_len(&self, offset: usize, chars: usize) -> Result<String, BufferError> {
        self.grab_fixed(offset, chars, Encoding::Utf16)
    }

    /// Null-terminated ASCII string at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `offset > len`.
    pub fn grab_ascii_string(&self, offset: usize) -> Result<String, BufferError> {
        self.grab_terminated(offset, Encoding::Ascii)
    }

    /// Exactly `len` ASCII bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn grab_ascii_string_len(&self, offset: usize, len: usize) -> Result<String, BufferError> {
        self.grab_fixed(offset, len, Encoding::Ascii)
    }

    /// Null-terminated UTF-8 string at byte `offset`. Invalid sequences
    /// decode as U+FFFD.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `offset > len`.
    pub fn grab_utf8_string(&self, offset: usize) -> Result<String, BufferError> {
        self.grab_terminated(offset, Encoding::Utf8)
    }

    /// Exactly `len` UTF-8 bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn grab_utf8_string_len(&self, offset: usize, len: usize) -> Result<String, BufferError> {
        self.grab_fixed(offset, len, Encoding::Utf8)
    }

    /// Consecutive null-terminated UTF-16 strings starting at `offset`, up to
    /// the first empty one (double-null terminator) or the end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `offset > len`.
    pub fn grab_string_array(&self, mut offset: usize) -> Result<Vec<String>, BufferError> {
        self.check_range("grab_string_array", offset, 0)?;
        let mut strings = Vec::new();
        while offset < self.len() {
            let units = self.str_len(offset, Encoding::Utf16)?;
            if units == 0 {
                break;
            }
            strings.push(self.grab_string_len(offset, units)?);
            offset += (units + 1) * 2;
        }
        Ok(strings)
    }

    /// The buffer's content read as one null-terminated UTF-16 string.
    ///
    /// # Errors
    ///
    /// Never fails on an allocated or empty buffer; kept fallible for
    /// symmetry with the offset-taking readers.
    pub fn lpwstr(&self) -> Result<String, BufferError> {
        self.grab_string(0)
    }

    /// Write `s` and one terminator unit at `offset`, growing the buffer
    /// (on the process heap if unallocated) when it does not fit. Returns the
    /// number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns the allocation failure when growing.
    pub fn set_string(
        &mut self,
        offset: usize,
        s: &str,
        encoding: Encoding,
    ) -> Result<usize, BufferError> {
        let encoded = encoding.encode_terminated(s);
        self.write_growing(offset, &encoded)?;
        Ok(encoded.len())
    }

    /// Write each string null-terminated, then a final terminator. Returns
    /// the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns the allocation failure when growing.
    pub fn set_string_array<S: AsRef<str>>(
        &mut self,
        offset: usize,
        strings: &[S],
    ) -> Result<usize, BufferError> {
        let mut encoded = Vec::new();
        for s in strings {
            encoded.extend(Encoding::Utf16.encode_terminated(s.as_ref()));
        }
        encoded.extend([0, 0]);
        self.write_growing(offset, &encoded)?;
        Ok(encoded.len())
    }

    /// BSTR stored at the start of the buffer: a 4-byte little-endian byte
    /// count followed by the UTF-16 data.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if the prefix or the data it
    /// announces does not fit.
    pub fn bstr(&self) -> Result<String, BufferError> {
        self.bstr_at(BSTR_PREFIX)
    }

    /// BSTR whose data starts at byte `offset`, with its length prefix in the
    /// 4 bytes before it.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if the prefix or the data it
    /// announces does not fit.
    pub fn bstr_at(&self, offset: usize) -> Result<String, BufferError> {
        let prefix_at = offset.checked_sub(BSTR_PREFIX).ok_or_else(|| {
            BufferError::out_of_range(
                "bstr_at",
                isize::try_from(offset).unwrap_or(isize::MAX) - BSTR_PREFIX as isize,
                BSTR_PREFIX,
                self.len(),
            )
        })?;
        let len = self.get_at::<u32>(prefix_at)? as usize;
        self.check_range("bstr_at", offset, len)?;
        Ok(decode_utf16(&self.as_slice()[offset..offset + len]))
    }

    /// Store `s` as a BSTR at the start of the buffer: prefix, data and a
    /// terminator, growing the buffer as needed.
    ///
    /// # Errors
    ///
    /// `SizeTooLarge` if the data length does not fit the prefix, or the
    /// allocation failure.
    pub fn set_bstr(&mut self, s: &str) -> Result<(), BufferError> {
        let data = Encoding::Utf16.encode_terminated(s);
        let byte_len = data.len() - 2;
        let prefix = u32::try_from(byte_len).map_err(|_| BufferError::SizeTooLarge {
            backend: self.backend_kind(),
            size: byte_len,
        })?;
        let mut encoded = Vec::with_capacity(BSTR_PREFIX + data.len());
        encoded.extend(prefix.to_le_bytes());
        encoded.extend(data);
        self.write_growing(0, &encoded)
    }

    /// Heap buffer holding `s` as null-terminated UTF-16.
    ///
    /// # Errors
    ///
    /// Returns the heap's allocation failure.
    pub fn from_str_utf16(s: &str) -> Result<Self, BufferError> {
        let mut buf = Self::new();
        buf.set_string(0, s, Encoding::Utf16)?;
        Ok(buf)
    }

    fn grab_terminated(&self, offset: usize, encoding: Encoding) -> Result<String, BufferError> {
        let units = self.str_len(offset, encoding)?;
        self.grab_fixed(offset, units, encoding)
    }

    fn grab_fixed(
        &self,
        offset: usize,
        units: usize,
        encoding: Encoding,
    ) -> Result<String, BufferError> {
        let len = units.checked_mul(encoding.unit()).ok_or_else(|| {
            BufferError::out_of_range("grab_string", isize::MAX, units, self.len())
        })?;
        self.check_range("grab_string", offset, len)?;
        Ok(encoding.decode(&self.as_slice()[offset..offset + len]))
    }

    fn write_growing(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        let end = offset
            .checked_add(bytes.len())
            .ok_or_else(|| BufferError::out_of_range("set_string", isize::MAX, bytes.len(), self.len()))?;
        if end > self.len() {
            if self.is_allocated() {
                self.realloc(end)?;
            } else {
                self.alloc(end, Backend::Heap)?;
            }
        }
        self.set_bytes(offset, bytes)
    }
}

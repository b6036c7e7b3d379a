//! Typed reads and writes.
//!
//! Logical accessors (`get`/`set`) address element `i` of a `T` array at byte
//! `i * size_of::<T>()`. Absolute accessors (`get_at`/`set_at`) take a byte
//! offset. Nothing here requires alignment.

use super::{Buffer, Release};
use crate::error::BufferError;
use crate::memory::backend::Backend;
use crate::memory::copy;
use crate::memory::scalar::Scalar;
use crate::record::Record;

impl<R: Release> Buffer<R> {
    /// Read element `index` of the buffer viewed as a `T` array.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn get<T: Scalar>(&self, index: usize) -> Result<T, BufferError> {
        self.get_at(Self::element_offset::<T>("get", index)?)
    }

    /// Write element `index` of the buffer viewed as a `T` array.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn set<T: Scalar>(&mut self, index: usize, value: T) -> Result<(), BufferError> {
        self.set_at(Self::element_offset::<T>("set", index)?, value)
    }

    /// Read a `T` at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn get_at<T: Scalar>(&self, offset: usize) -> Result<T, BufferError> {
        self.check_range("get_at", offset, std::mem::size_of::<T>())?;
        // Safety: range checked above.
        Ok(unsafe { copy::read_scalar(self.raw_at(offset)) })
    }

    /// Write a `T` at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn set_at<T: Scalar>(&mut self, offset: usize, value: T) -> Result<(), BufferError> {
        self.check_range("set_at", offset, std::mem::size_of::<T>())?;
        // Safety: range checked above.
        unsafe { copy::write_scalar(self.raw_at(offset), value) };
        Ok(())
    }

    /// Copy `count` consecutive `T`s starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn read_array<T: Scalar>(&self, offset: usize, count: usize) -> Result<Vec<T>, BufferError> {
        let width = T::KIND.width();
        let bytes = count.checked_mul(width).ok_or_else(|| {
            BufferError::out_of_range(
                "read_array",
                offset.try_into().unwrap_or(isize::MAX),
                usize::MAX,
                self.len(),
            )
        })?;
        self.check_range("read_array", offset, bytes)?;
        let mut out = Vec::<T>::with_capacity(count);
        // Safety: range checked, `out` has room for `count` elements and
        // every bit pattern is a valid `T`.
        unsafe {
            copy::copy_elements(out.as_mut_ptr().cast::<u8>(), self.raw_at(offset), count, width);
            out.set_len(count);
        }
        Ok(out)
    }

    /// Write `values` consecutively starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn write_array<T: Scalar>(&mut self, offset: usize, values: &[T]) -> Result<(), BufferError> {
        let width = T::KIND.width();
        self.check_range("write_array", offset, std::mem::size_of_val(values))?;
        // Safety: range checked; a slice never overflows its byte size.
        unsafe {
            copy::copy_elements(
                self.raw_at(offset),
                values.as_ptr().cast::<u8>(),
                values.len(),
                width,
            );
        }
        Ok(())
    }

    /// Copy `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn grab_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, BufferError> {
        self.check_range("grab_bytes", offset, len)?;
        Ok(self.as_slice()[offset..offset + len].to_vec())
    }

    /// Overwrite bytes starting at `offset`. Does not grow the buffer.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        self.check_range("set_bytes", offset, bytes.len())?;
        // Safety: range checked; `bytes` cannot alias a block we hold `&mut` to.
        unsafe { copy::copy_block(self.raw_at(offset), bytes.as_ptr(), bytes.len()) };
        Ok(())
    }

    /// Decode a fixed-layout record at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn read_record<T: Record>(&self, offset: usize) -> Result<T, BufferError> {
        self.check_range("read_record", offset, T::SIZE)?;
        Ok(T::read_from(&self.as_slice()[offset..offset + T::SIZE]))
    }

    /// Encode a fixed-layout record at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` past the end.
    pub fn write_record<T: Record>(&mut self, offset: usize, record: &T) -> Result<(), BufferError> {
        self.check_range("write_record", offset, T::SIZE)?;
        record.write_to(&mut self.as_mut_slice()[offset..offset + T::SIZE]);
        Ok(())
    }

    /// A heap buffer holding exactly `value`.
    ///
    /// # Errors
    ///
    /// Returns the heap's allocation failure.
    pub fn from_scalar<T: Scalar>(value: T) -> Result<Self, BufferError> {
        let mut buf = Self::new();
        buf.alloc(std::mem::size_of::<T>(), Backend::Heap)?;
        buf.set_at(0, value)?;
        Ok(buf)
    }

    /// A buffer on `backend` holding a copy of `bytes`. Empty input yields an
    /// unallocated handle.
    ///
    /// # Errors
    ///
    /// Returns the backend's allocation failure.
    pub fn from_bytes(bytes: &[u8], backend: Backend) -> Result<Self, BufferError> {
        let mut buf = Self::new();
        buf.alloc(bytes.len(), backend)?;
        if !bytes.is_empty() {
            buf.set_bytes(0, bytes)?;
        }
        Ok(buf)
    }

    fn element_offset<T: Scalar>(operation: &'static str, index: usize) -> Result<usize, BufferError> {
        index
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| {
                BufferError::out_of_range(operation, isize::MAX, std::mem::size_of::<T>(), 0)
            })
    }
}

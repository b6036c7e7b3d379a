//! Fixed-layout records exchanged between worker processes.
//!
//! Field offsets are explicit and little-endian, so 32-bit and 64-bit peers
//! produce byte-identical records.

use crate::buffer::{Buffer, Release};
use crate::error::BufferError;
use crate::memory::backend::Backend;

/// A value with a fixed byte layout.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Encode into `out`, which is exactly `SIZE` bytes.
    fn write_to(&self, out: &mut [u8]);

    /// Decode from `bytes`, which is exactly `SIZE` bytes.
    fn read_from(bytes: &[u8]) -> Self;
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_i64(bytes: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_le_bytes(raw)
}

/// Message codes of the worker protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageKind {
    Created = 1,
    Activated = 2,
    Destroyed = 3,
    Terminate = 27,
    InformWorker = 124,
    HardwareChange = 129,
    StartMover = 204,
    StopMover = 206,
    QueryState = 411,
}

impl MessageKind {
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            1 => Self::Created,
            2 => Self::Activated,
            3 => Self::Destroyed,
            27 => Self::Terminate,
            124 => Self::InformWorker,
            129 => Self::HardwareChange,
            204 => Self::StartMover,
            206 => Self::StopMover,
            411 => Self::QueryState,
            _ => return None,
        })
    }
}

/// 24-byte worker message.
///
/// ```text
/// 0   cb          i32   (always 24)
/// 4   msg         i32
/// 8   int_data1   i32 \ long_data1  i64
/// 12  int_data2   i32 /
/// 16  long_data2  i64
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerMessage {
    pub cb: i32,
    pub msg: i32,
    pub long_data1: i64,
    pub long_data2: i64,
}

impl WorkerMessage {
    pub const CB: i32 = 24;

    const CB_OFFSET: usize = 0;
    const MSG_OFFSET: usize = 4;
    const INT_DATA1_OFFSET: usize = 8;
    const INT_DATA2_OFFSET: usize = 12;
    const LONG_DATA1_OFFSET: usize = 8;
    const LONG_DATA2_OFFSET: usize = 16;

    #[must_use]
    pub fn new(kind: MessageKind) -> Self {
        Self {
            cb: Self::CB,
            msg: kind as i32,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_raw(self.msg)
    }

    /// Low half of `long_data1`.
    #[must_use]
    pub fn int_data1(&self) -> i32 {
        self.long_data1 as i32
    }

    /// High half of `long_data1`.
    #[must_use]
    pub fn int_data2(&self) -> i32 {
        (self.long_data1 >> 32) as i32
    }

    pub fn set_int_data1(&mut self, value: i32) {
        self.long_data1 = (self.long_data1 & !0xFFFF_FFFF) | i64::from(value as u32);
    }

    pub fn set_int_data2(&mut self, value: i32) {
        self.long_data1 = (self.long_data1 & 0xFFFF_FFFF) | (i64::from(value) << 32);
    }

    /// Encode into a fresh heap buffer through its absolute accessors.
    ///
    /// # Errors
    ///
    /// Returns the heap's allocation failure.
    pub fn to_buffer<R: Release>(&self) -> Result<Buffer<R>, BufferError> {
        let mut buf = Buffer::new();
        buf.alloc(Self::SIZE, Backend::Heap)?;
        buf.set_at(Self::CB_OFFSET, self.cb)?;
        buf.set_at(Self::MSG_OFFSET, self.msg)?;
        buf.set_at(Self::INT_DATA1_OFFSET, self.int_data1())?;
        buf.set_at(Self::INT_DATA2_OFFSET, self.int_data2())?;
        buf.set_at(Self::LONG_DATA2_OFFSET, self.long_data2)?;
        Ok(buf)
    }

    /// Decode from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::IndexOutOfRange` if `buf` is shorter than 24
    /// bytes.
    pub fn from_buffer<R: Release>(buf: &Buffer<R>) -> Result<Self, BufferError> {
        buf.check_range("WorkerMessage::from_buffer", 0, Self::SIZE)?;
        Ok(Self {
            cb: buf.get_at(Self::CB_OFFSET)?,
            msg: buf.get_at(Self::MSG_OFFSET)?,
            long_data1: buf.get_at(Self::LONG_DATA1_OFFSET)?,
            long_data2: buf.get_at(Self::LONG_DATA2_OFFSET)?,
        })
    }
}

impl Record for WorkerMessage {
    const SIZE: usize = 24;

    fn write_to(&self, out: &mut [u8]) {
        out[Self::CB_OFFSET..4].copy_from_slice(&self.cb.to_le_bytes());
        out[Self::MSG_OFFSET..8].copy_from_slice(&self.msg.to_le_bytes());
        out[Self::LONG_DATA1_OFFSET..16].copy_from_slice(&self.long_data1.to_le_bytes());
        out[Self::LONG_DATA2_OFFSET..24].copy_from_slice(&self.long_data2.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self {
            cb: read_i32(bytes, Self::CB_OFFSET),
            msg: read_i32(bytes, Self::MSG_OFFSET),
            long_data1: read_i64(bytes, Self::LONG_DATA1_OFFSET),
            long_data2: read_i64(bytes, Self::LONG_DATA2_OFFSET),
        }
    }
}

/// 16-byte rectangle: `left`, `top`, `right`, `bottom` at 0/4/8/12.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    #[must_use]
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl Record for Rect {
    const SIZE: usize = 16;

    fn write_to(&self, out: &mut [u8]) {
        for (i, v) in [self.left, self.top, self.right, self.bottom].iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self {
            left: read_i32(bytes, 0),
            top: read_i32(bytes, 4),
            right: read_i32(bytes, 8),
            bottom: read_i32(bytes, 12),
        }
    }
}

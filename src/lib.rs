pub(crate) mod sync;

pub mod buffer;
pub mod checksum;
pub mod config;
pub mod error;
// public module: backends, heaps, scalars and pressure hints are public;
// accounting internals stay pub(crate). TEST_MUTEX is public for tests.
pub mod memory;
pub mod record;

#[cfg(test)]
pub(crate) mod test_utils;

// handles
pub use buffer::strings::read_bstr;
pub use buffer::{Buffer, Encoding, Manual, MemPtr, Owned, Release, SafePtr};

// backends and element types
pub use memory::backend::{Backend, BackendKind};
pub use memory::heap::PrivateHeap;
pub use memory::scalar::{DateTicks, Decimal128, Guid, Scalar, ScalarKind};

// mgmt/stats
pub use memory::manager::{MemoryManager, MemoryStats};
pub use memory::pressure::{
    add_memory_pressure, remove_memory_pressure, set_listener, PressureListener,
};

// codecs
pub use checksum::Crc32;
pub use record::{MessageKind, Record, Rect, WorkerMessage};

// config
pub use config::BufferConfig;

// errors
pub use error::BufferError;
pub use memory::vm::VmError;

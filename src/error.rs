use crate::memory::backend::BackendKind;
use crate::memory::vm::VmError;

/// Failure reasons reported by [`Buffer`](crate::Buffer) operations.
///
/// Every fallible operation leaves the handle in the state it had before the
/// call; no variant implies a partial mutation.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("{backend} backend failed to provide {size} bytes")]
    AllocationFailed { backend: BackendKind, size: usize },

    #[error(
        "{operation}: range at offset {offset} with length {length} is outside a buffer of {capacity} bytes"
    )]
    IndexOutOfRange {
        operation: &'static str,
        offset: isize,
        length: usize,
        capacity: usize,
    },

    #[error("allocation belongs to the {actual} backend, not {expected}")]
    BackendMismatch {
        expected: BackendKind,
        actual: BackendKind,
    },

    #[error("allocation belongs to a different heap instance")]
    HeapMismatch,

    #[error("{backend} heap failed validation")]
    HeapCorruption { backend: BackendKind },

    #[error("{backend} backend refused to release the allocation")]
    FreeFailed { backend: BackendKind },

    #[error("{size} bytes exceeds what the {backend} backend can address")]
    SizeTooLarge { backend: BackendKind, size: usize },

    #[error("alignment {0} is not a non-zero power of two")]
    InvalidAlignment(usize),

    #[error("buffer is not allocated")]
    NotAllocated,

    #[error(transparent)]
    Vm(#[from] VmError),
}

impl BufferError {
    pub(crate) fn out_of_range(
        operation: &'static str,
        offset: isize,
        length: usize,
        capacity: usize,
    ) -> Self {
        Self::IndexOutOfRange {
            operation,
            offset,
            length,
            capacity,
        }
    }
}

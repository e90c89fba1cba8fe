use thiserror::Error;

/// Errors reported by the heap
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum GcError {
    /// The memory region backing the heap could not be allocated
    #[error("failed to reserve a heap of {size} bytes")]
    HeapReservation { size: usize },

    /// The requested capacity cannot be rounded to a valid region size
    #[error("invalid heap capacity of {capacity} bytes")]
    InvalidCapacity { capacity: usize },

    /// Not enough free space even after a full collection
    #[error("out of memory: requested {requested} bytes, {available} bytes free after collection")]
    OutOfMemory { requested: usize, available: usize },
}

pub type GcResult<T> = Result<T, GcError>;

/// Result type for allocations
pub type AllocResult<T> = GcResult<T>;

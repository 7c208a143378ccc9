mod pointer;
mod manager;

pub use pointer::PointerHandle;
pub use manager::{HeapHandle, MemoryManager};

use thiserror::Error;
use crate::heap::HeapError;

/// Represents possible errors at the library boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Heap {0} does not exist")]
    UnknownHeap(HeapHandle),

    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl MemoryError {
    /// The underlying heap error, if this is one
    pub fn as_heap_error(&self) -> Option<&HeapError> {
        match self {
            MemoryError::Heap(err) => Some(err),
            MemoryError::UnknownHeap(_) => None,
        }
    }
}

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

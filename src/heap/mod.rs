mod address_space;
mod allocator;
mod config;
mod manager;

pub use address_space::AddressSpace;
pub use allocator::{Allocator, Region, RegionState};
pub use config::HeapConfig;
pub use manager::{HeapManager, HeapStats};

use thiserror::Error;

/// Bytes at the bottom of every address space that never belong to a region.
/// Address 0 is the null sentinel; the rest of the guard keeps every real
/// allocation away from it.
pub const NULL_GUARD: usize = 16;

/// Errors that can occur in heap operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("Out of memory: cannot allocate {requested} bytes (capacity {capacity})")]
    OutOfMemory { requested: usize, capacity: usize },

    #[error("Invalid free at {address:#x}: {reason}")]
    InvalidFree { address: usize, reason: &'static str },

    #[error("Dangling pointer to {address:#x} (epoch {epoch})")]
    DanglingPointer { address: usize, epoch: u64 },

    #[error("Out of bounds: {size} bytes at offset {offset} of a {extent}-byte block at {base:#x}")]
    OutOfBounds {
        base: usize,
        offset: i128,
        size: usize,
        extent: usize,
    },

    #[error("Null pointer dereference")]
    NullPointer,

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Type already registered: {0}")]
    DuplicateType(String),

    #[error("Type {ty} has no field named {field}")]
    UnknownField { ty: String, field: String },

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Invalid heap configuration: {0}")]
    InvalidConfig(String),

    #[error("Pointer belongs to heap {found}, not heap {expected}")]
    ForeignPointer { expected: u32, found: u32 },

    #[error("Pointers do not refer to the same allocation")]
    PointerMismatch,
}

/// Result type for heap operations
pub type HeapResult<T> = Result<T, HeapError>;

/// Round `value` up to the next multiple of `align` (a power of two).
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

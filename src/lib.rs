// hoap - A sandboxed C-style heap with epoch-checked pointer handles

pub mod heap;
pub mod memory;
pub mod types;

pub use heap::{HeapConfig, HeapError, HeapManager, HeapResult, HeapStats};
pub use memory::{HeapHandle, MemoryError, MemoryManager, MemoryResult, PointerHandle};
pub use types::{Scalar, StructLayout, TypeDescriptor, TypeRef, TypeRegistry, Value};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

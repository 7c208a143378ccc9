use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::Mutex;
use crate::heap::{HeapConfig, HeapManager, HeapResult, HeapStats};
use crate::memory::{MemoryError, MemoryResult, PointerHandle};
use crate::types::{StructLayout, TypeRef, Value};

/// Opaque identifier of a heap owned by a [`MemoryManager`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapHandle(u32);

impl HeapHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for HeapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The MemoryManager owns every live heap and is the entry point for the
/// binding layer. Each heap sits behind its own lock, so one heap is only ever
/// mutated by one caller at a time while separate heaps stay independent.
pub struct MemoryManager {
    heaps: DashMap<HeapHandle, Mutex<HeapManager>>,
    next_id: AtomicU32,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    pub fn new() -> Self {
        Self {
            heaps: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Generate the next heap ID
    fn next_heap_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Create a heap with `initial_capacity` allocatable bytes
    pub fn heap_create(&self, initial_capacity: usize) -> MemoryResult<HeapHandle> {
        self.heap_create_with_config(HeapConfig::default().with_initial_capacity(initial_capacity))
    }

    pub fn heap_create_with_config(&self, config: HeapConfig) -> MemoryResult<HeapHandle> {
        let handle = HeapHandle(self.next_heap_id());
        let heap = HeapManager::new(handle.id(), config)?;
        self.heaps.insert(handle, Mutex::new(heap));
        Ok(handle)
    }

    /// Tear a heap down and return its final usage. Every pointer into it
    /// becomes unusable.
    pub fn heap_destroy(&self, handle: HeapHandle) -> MemoryResult<HeapStats> {
        let (_, heap) = self
            .heaps
            .remove(&handle)
            .ok_or(MemoryError::UnknownHeap(handle))?;
        let heap = heap.into_inner();
        let stats = heap.stats();
        if stats.live_allocations > 0 {
            warn!(
                "heap {}: destroyed with {} live allocations ({} bytes)",
                handle, stats.live_allocations, stats.requested_bytes
            );
            for region in heap.live_allocations() {
                debug!(
                    "heap {}: leaked {} bytes at {:#x}{}",
                    handle,
                    region.requested(),
                    region.start(),
                    region.ty().map(|ty| format!(" ({})", ty.name())).unwrap_or_default()
                );
            }
        } else {
            debug!("heap {}: destroyed", handle);
        }
        Ok(stats)
    }

    pub fn heap_exists(&self, handle: HeapHandle) -> bool {
        self.heaps.contains_key(&handle)
    }

    pub fn heap_count(&self) -> usize {
        self.heaps.len()
    }

    /// Run `op` with exclusive access to one heap.
    ///
    /// The heap's lock and its table entry stay held while `op` runs, and the
    /// lock is not reentrant. `op` must not call back into this manager for
    /// the same heap, or it deadlocks.
    pub fn with_heap<R>(
        &self,
        handle: HeapHandle,
        op: impl FnOnce(&mut HeapManager) -> HeapResult<R>,
    ) -> MemoryResult<R> {
        let entry = self
            .heaps
            .get(&handle)
            .ok_or(MemoryError::UnknownHeap(handle))?;
        let mut heap = entry.lock();
        Ok(op(&mut *heap)?)
    }

    pub fn type_register(&self, handle: HeapHandle, name: &str, layout: StructLayout) -> MemoryResult<TypeRef> {
        self.with_heap(handle, |heap| heap.register_type(name, layout))
    }

    pub fn type_register_array(
        &self,
        handle: HeapHandle,
        name: &str,
        element: &TypeRef,
        len: usize,
    ) -> MemoryResult<TypeRef> {
        self.with_heap(handle, |heap| heap.register_array(name, element, len))
    }

    pub fn type_resolve(&self, handle: HeapHandle, name: &str) -> MemoryResult<TypeRef> {
        self.with_heap(handle, |heap| heap.resolve_type(name))
    }

    pub fn alloc(&self, handle: HeapHandle, ty: &TypeRef, count: usize) -> MemoryResult<PointerHandle> {
        self.with_heap(handle, |heap| heap.allocate(ty, count))
    }

    pub fn free(&self, handle: HeapHandle, ptr: &PointerHandle) -> MemoryResult<()> {
        self.with_heap(handle, |heap| heap.free(ptr))
    }

    pub fn realloc(&self, handle: HeapHandle, ptr: &PointerHandle, count: usize) -> MemoryResult<PointerHandle> {
        self.with_heap(handle, |heap| heap.reallocate(ptr, count))
    }

    pub fn read(&self, handle: HeapHandle, ptr: &PointerHandle) -> MemoryResult<Vec<u8>> {
        self.with_heap(handle, |heap| heap.read(ptr))
    }

    pub fn write(&self, handle: HeapHandle, ptr: &PointerHandle, bytes: &[u8]) -> MemoryResult<()> {
        self.with_heap(handle, |heap| heap.write(ptr, bytes))
    }

    pub fn read_value(&self, handle: HeapHandle, ptr: &PointerHandle) -> MemoryResult<Value> {
        self.with_heap(handle, |heap| heap.read_value(ptr))
    }

    pub fn write_value(&self, handle: HeapHandle, ptr: &PointerHandle, value: &Value) -> MemoryResult<()> {
        self.with_heap(handle, |heap| heap.write_value(ptr, value))
    }

    pub fn stats(&self, handle: HeapHandle) -> MemoryResult<HeapStats> {
        self.with_heap(handle, |heap| Ok(heap.stats()))
    }

    /// Pointer arithmetic; touches no heap
    pub fn add(ptr: &PointerHandle, delta: i64) -> PointerHandle {
        ptr.add(delta)
    }

    /// Reinterpret a pointer as another element type; touches no heap
    pub fn cast(ptr: &PointerHandle, ty: &TypeRef) -> PointerHandle {
        ptr.cast(ty)
    }

    pub fn field(ptr: &PointerHandle, name: &str) -> MemoryResult<PointerHandle> {
        Ok(ptr.field(name)?)
    }
}

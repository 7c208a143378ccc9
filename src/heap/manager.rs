use log::{debug, trace};
use crate::heap::{align_up, Allocator, HeapConfig, HeapError, HeapResult, Region, NULL_GUARD};
use crate::memory::PointerHandle;
use crate::types::{StructLayout, TypeRef, TypeRegistry, Value};

/// Usage figures for one heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Allocatable bytes, the null guard excluded
    pub capacity: usize,
    /// Bytes held by allocated regions, padding included
    pub used_bytes: usize,
    /// Bytes callers actually asked for
    pub requested_bytes: usize,
    pub free_bytes: usize,
    pub live_allocations: usize,
    pub free_regions: usize,
    pub largest_free_block: usize,
    pub grow_count: usize,
}

/// The HeapManager is the sole entry point to one simulated heap: it owns the
/// allocator and the type registry, issues pointer handles and validates every
/// access against the live-region table.
pub struct HeapManager {
    id: u32,
    config: HeapConfig,
    allocator: Allocator,
    types: TypeRegistry,
    grow_count: usize,
}

impl HeapManager {
    pub fn new(id: u32, config: HeapConfig) -> HeapResult<Self> {
        config.validate()?;
        let capacity = NULL_GUARD
            .checked_add(config.initial_capacity)
            .ok_or_else(|| HeapError::InvalidConfig("initial capacity overflows".to_string()))?;
        debug!("heap {}: created with {} allocatable bytes", id, config.initial_capacity);
        Ok(Self {
            id,
            allocator: Allocator::new(capacity, config.scrub_on_free),
            config,
            types: TypeRegistry::new(),
            grow_count: 0,
        })
    }

    /// Create a heap with default settings and `capacity` allocatable bytes
    pub fn with_capacity(id: u32, capacity: usize) -> HeapResult<Self> {
        Self::new(id, HeapConfig::default().with_initial_capacity(capacity))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn register_type(&mut self, name: &str, layout: StructLayout) -> HeapResult<TypeRef> {
        self.types.register(name, layout)
    }

    pub fn register_array(&mut self, name: &str, element: &TypeRef, len: usize) -> HeapResult<TypeRef> {
        self.types.register_array(name, element, len)
    }

    pub fn resolve_type(&self, name: &str) -> HeapResult<TypeRef> {
        self.types.resolve(name)
    }

    fn check_invariants(&self) {
        if self.config.debug_checks {
            self.allocator.assert_invariants();
        }
    }

    /// Allocatable bytes currently in the address space
    fn usable_capacity(&self) -> usize {
        self.allocator.capacity() - NULL_GUARD
    }

    /// Grow the address space so a `footprint`-byte block aligned to
    /// `alignment` can fit: at least double the space, capped by the
    /// configured maximum.
    fn grow_for(&mut self, footprint: usize, alignment: usize) -> bool {
        if !self.config.growable {
            return false;
        }
        let needed = footprint.saturating_add(alignment);
        let mut extra = needed.max(self.usable_capacity());
        if let Some(max) = self.config.max_capacity {
            extra = extra.min(max.saturating_sub(self.usable_capacity()));
        }
        if extra == 0 {
            return false;
        }
        let old = match self.allocator.grow(extra) {
            Ok(old) => old,
            Err(err) => {
                debug!("heap {}: cannot grow by {} bytes: {}", self.id, extra, err);
                return false;
            }
        };
        self.grow_count += 1;
        debug!(
            "heap {}: grew address space from {} to {} bytes",
            self.id,
            old,
            self.allocator.capacity()
        );
        self.check_invariants();
        true
    }

    fn allocate_region(&mut self, size: usize, ty: &TypeRef) -> HeapResult<Region> {
        let alignment = ty.alignment();
        match self.allocator.allocate(size, alignment, Some(ty.clone())) {
            Err(HeapError::OutOfMemory { .. }) => {
                let footprint = align_up(size.max(1), alignment).unwrap_or(usize::MAX);
                if !self.grow_for(footprint, alignment) {
                    return Err(HeapError::OutOfMemory {
                        requested: size,
                        capacity: self.usable_capacity(),
                    });
                }
                self.allocator
                    .allocate(size, alignment, Some(ty.clone()))
                    .map_err(|_| HeapError::OutOfMemory {
                        requested: size,
                        capacity: self.usable_capacity(),
                    })
            }
            other => other,
        }
    }

    /// Allocate `count` elements of `ty` and return a pointer to the first
    pub fn allocate(&mut self, ty: &TypeRef, count: usize) -> HeapResult<PointerHandle> {
        let size = ty.size().checked_mul(count).ok_or(HeapError::OutOfMemory {
            requested: usize::MAX,
            capacity: self.usable_capacity(),
        })?;
        let region = self.allocate_region(size, ty)?;
        trace!(
            "heap {}: allocated {} x {} at {:#x} (epoch {})",
            self.id,
            count,
            ty.name(),
            region.start(),
            region.epoch()
        );
        self.check_invariants();
        Ok(PointerHandle::new(self.id, region.start(), ty.clone(), region.epoch()))
    }

    /// Allocate `count` elements of the type registered as `name`
    pub fn allocate_named(&mut self, name: &str, count: usize) -> HeapResult<PointerHandle> {
        let ty = self.types.resolve(name)?;
        self.allocate(&ty, count)
    }

    fn ensure_owned(&self, ptr: &PointerHandle) -> HeapResult<()> {
        if ptr.heap_id() != self.id {
            return Err(HeapError::ForeignPointer {
                expected: self.id,
                found: ptr.heap_id(),
            });
        }
        Ok(())
    }

    /// The live allocation a handle refers to
    fn live_region(&self, ptr: &PointerHandle) -> HeapResult<&Region> {
        if ptr.is_null() {
            return Err(HeapError::NullPointer);
        }
        self.ensure_owned(ptr)?;
        match self.allocator.region_at(ptr.address()) {
            Some(region) if region.is_allocated() && region.epoch() == ptr.epoch() => Ok(region),
            _ => Err(HeapError::DanglingPointer {
                address: ptr.address(),
                epoch: ptr.epoch(),
            }),
        }
    }

    /// Validate a `len`-byte access at the handle's effective address and
    /// return that address.
    fn checked_range(&self, ptr: &PointerHandle, len: usize) -> HeapResult<usize> {
        let region = self.live_region(ptr)?;
        let offset = ptr.displacement();
        if offset < 0 || offset.saturating_add(len as i128) > region.requested() as i128 {
            return Err(HeapError::OutOfBounds {
                base: region.start(),
                offset,
                size: len,
                extent: region.requested(),
            });
        }
        Ok(region.start() + offset as usize)
    }

    /// Whether dereferencing `ptr` would succeed
    pub fn is_valid(&self, ptr: &PointerHandle) -> bool {
        self.checked_range(ptr, ptr.element_type().size()).is_ok()
    }

    /// Read the raw bytes of the element `ptr` points at
    pub fn read(&self, ptr: &PointerHandle) -> HeapResult<Vec<u8>> {
        let size = ptr.element_type().size();
        let address = self.checked_range(ptr, size)?;
        Ok(self.allocator.space().read(address, size).to_vec())
    }

    /// Overwrite the element `ptr` points at with `bytes`
    pub fn write(&mut self, ptr: &PointerHandle, bytes: &[u8]) -> HeapResult<()> {
        let ty = ptr.element_type();
        let address = self.checked_range(ptr, ty.size())?;
        if bytes.len() != ty.size() {
            return Err(HeapError::TypeMismatch {
                expected: format!("{} bytes of {}", ty.size(), ty.name()),
                found: format!("{} bytes", bytes.len()),
            });
        }
        self.allocator.space_mut().write(address, bytes);
        Ok(())
    }

    pub fn read_value(&self, ptr: &PointerHandle) -> HeapResult<Value> {
        let bytes = self.read(ptr)?;
        Value::decode(ptr.element_type(), &bytes)
    }

    pub fn write_value(&mut self, ptr: &PointerHandle, value: &Value) -> HeapResult<()> {
        self.checked_range(ptr, ptr.element_type().size())?;
        let bytes = value.encode(ptr.element_type())?;
        self.write(ptr, &bytes)
    }

    /// Release the allocation `ptr` points at. Only a pointer to the first
    /// byte of a live block may be freed; freeing null does nothing.
    pub fn free(&mut self, ptr: &PointerHandle) -> HeapResult<()> {
        if ptr.is_null() {
            return Ok(());
        }
        self.ensure_owned(ptr)?;
        if ptr.displacement() != 0 {
            return Err(HeapError::InvalidFree {
                address: ptr.effective_address().unwrap_or(ptr.address()),
                reason: "pointer does not point at the start of a block",
            });
        }
        if let Some(region) = self.allocator.region_at(ptr.address()) {
            if region.is_allocated() && region.epoch() != ptr.epoch() {
                return Err(HeapError::InvalidFree {
                    address: ptr.address(),
                    reason: "stale pointer to a block that was freed and reused",
                });
            }
        }
        let released = self.allocator.free(ptr.address())?;
        trace!(
            "heap {}: freed {} bytes at {:#x} (epoch {})",
            self.id,
            released.requested(),
            released.start(),
            released.epoch()
        );
        self.check_invariants();
        Ok(())
    }

    /// Resize the block `ptr` points at to `count` elements, like C `realloc`.
    /// The contents are copied into a new block and the old block is freed; a
    /// null `ptr` just allocates.
    pub fn reallocate(&mut self, ptr: &PointerHandle, count: usize) -> HeapResult<PointerHandle> {
        let ty = ptr.element_type().clone();
        if ptr.is_null() {
            return self.allocate(&ty, count);
        }
        let old = self.live_region(ptr)?;
        if ptr.displacement() != 0 {
            return Err(HeapError::InvalidFree {
                address: ptr.effective_address().unwrap_or(ptr.address()),
                reason: "pointer does not point at the start of a block",
            });
        }
        let (old_start, old_len) = (old.start(), old.requested());

        let moved = self.allocate(&ty, count)?;
        let keep = old_len.min(ty.size() * count);
        self.allocator
            .space_mut()
            .copy_within(old_start, moved.address(), keep);
        self.free(ptr)?;
        Ok(moved)
    }

    /// Copy `count` elements from `src` to `dst`, like C `memmove`
    pub fn copy(&mut self, dst: &PointerHandle, src: &PointerHandle, count: usize) -> HeapResult<()> {
        let len = src.element_type().size().checked_mul(count).ok_or(HeapError::OutOfBounds {
            base: src.address(),
            offset: src.displacement(),
            size: usize::MAX,
            extent: 0,
        })?;
        let from = self.checked_range(src, len)?;
        let to = self.checked_range(dst, len)?;
        self.allocator.space_mut().copy_within(from, to, len);
        Ok(())
    }

    /// Set `count` elements starting at `ptr` to `byte`, like C `memset`
    pub fn fill(&mut self, ptr: &PointerHandle, count: usize, byte: u8) -> HeapResult<()> {
        let len = ptr.element_type().size().checked_mul(count).ok_or(HeapError::OutOfBounds {
            base: ptr.address(),
            offset: ptr.displacement(),
            size: usize::MAX,
            extent: 0,
        })?;
        let address = self.checked_range(ptr, len)?;
        self.allocator.space_mut().fill(address, len, byte);
        Ok(())
    }

    /// All regions in address order
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.allocator.regions()
    }

    /// Blocks that are still allocated
    pub fn live_allocations(&self) -> impl Iterator<Item = &Region> {
        self.allocator.regions().filter(|r| r.is_allocated())
    }

    /// Check the allocator's region table
    pub fn verify(&self) -> Result<(), String> {
        self.allocator.verify()
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            capacity: self.usable_capacity(),
            grow_count: self.grow_count,
            ..HeapStats::default()
        };
        for region in self.allocator.regions() {
            if region.is_allocated() {
                stats.used_bytes += region.len();
                stats.requested_bytes += region.requested();
                stats.live_allocations += 1;
            } else {
                stats.free_bytes += region.len();
                stats.free_regions += 1;
                stats.largest_free_block = stats.largest_free_block.max(region.len());
            }
        }
        stats
    }
}

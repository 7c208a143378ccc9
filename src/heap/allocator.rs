use std::collections::BTreeMap;
use crate::heap::{align_up, AddressSpace, HeapError, HeapResult, NULL_GUARD};
use crate::types::TypeRef;

/// Allocation state of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Free,
    Allocated,
}

/// A contiguous byte range of the address space with a single state
#[derive(Debug, Clone)]
pub struct Region {
    start: usize,
    length: usize,
    requested: usize,
    state: RegionState,
    epoch: u64,
    ty: Option<TypeRef>,
}

impl Region {
    fn free(start: usize, length: usize, epoch: u64) -> Self {
        Self {
            start,
            length,
            requested: 0,
            state: RegionState::Free,
            epoch,
            ty: None,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Padded footprint in bytes
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes the caller asked for; accesses are bounded by this, not by `len`
    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Element type the block was allocated with
    pub fn ty(&self) -> Option<&TypeRef> {
        self.ty.as_ref()
    }

    pub fn is_free(&self) -> bool {
        self.state == RegionState::Free
    }

    pub fn is_allocated(&self) -> bool {
        self.state == RegionState::Allocated
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.start && address < self.end()
    }
}

/// First-fit allocator over an address-ordered region table.
///
/// The regions partition `NULL_GUARD..capacity` with no gaps, allocated
/// regions never overlap and no two free regions are adjacent.
pub struct Allocator {
    space: AddressSpace,
    regions: BTreeMap<usize, Region>,
    next_epoch: u64,
    scrub_on_free: bool,
}

impl Allocator {
    /// Create an allocator over `capacity` bytes, the null guard included
    pub fn new(capacity: usize, scrub_on_free: bool) -> Self {
        let capacity = capacity.max(NULL_GUARD);
        let mut regions = BTreeMap::new();
        if capacity > NULL_GUARD {
            regions.insert(NULL_GUARD, Region::free(NULL_GUARD, capacity - NULL_GUARD, 0));
        }
        Self {
            space: AddressSpace::new(capacity),
            regions,
            next_epoch: 0,
            scrub_on_free,
        }
    }

    pub fn capacity(&self) -> usize {
        self.space.capacity()
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut AddressSpace {
        &mut self.space
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    fn take(&mut self, start: usize) -> Region {
        match self.regions.remove(&start) {
            Some(region) => region,
            None => panic!("region table corrupted: no region at {:#x}", start),
        }
    }

    /// Grant `size` bytes aligned to `alignment` from the first free region
    /// that can hold them.
    pub fn allocate(&mut self, size: usize, alignment: usize, ty: Option<TypeRef>) -> HeapResult<Region> {
        let out_of_memory = HeapError::OutOfMemory {
            requested: size,
            capacity: self.capacity(),
        };
        let footprint = align_up(size.max(1), alignment).ok_or_else(|| out_of_memory.clone())?;

        let fit = self.regions.values().filter(|r| r.is_free()).find_map(|r| {
            let aligned = align_up(r.start, alignment)?;
            let end = aligned.checked_add(footprint)?;
            (end <= r.end()).then_some((r.start, aligned))
        });
        let (free_start, aligned) = fit.ok_or(out_of_memory)?;

        let free = self.take(free_start);
        if aligned > free.start {
            self.regions
                .insert(free.start, Region::free(free.start, aligned - free.start, free.epoch));
        }
        let end = aligned + footprint;
        if end < free.end() {
            self.regions.insert(end, Region::free(end, free.end() - end, free.epoch));
        }

        let epoch = self.bump_epoch();
        let region = Region {
            start: aligned,
            length: footprint,
            requested: size,
            state: RegionState::Allocated,
            epoch,
            ty,
        };
        self.regions.insert(aligned, region.clone());
        Ok(region)
    }

    /// Release the allocated region starting at `start`, returning it as it was
    /// before the free.
    pub fn free(&mut self, start: usize) -> HeapResult<Region> {
        let invalid = |reason| HeapError::InvalidFree { address: start, reason };
        match self.region_containing(start) {
            Some(r) if r.start == start && r.is_allocated() => {}
            Some(r) if r.is_free() => return Err(invalid("block already freed")),
            Some(_) => return Err(invalid("not the start of an allocation")),
            None => return Err(invalid("address outside the heap")),
        }

        let epoch = self.bump_epoch();
        let released = self.take(start);
        if self.scrub_on_free {
            self.space.fill(released.start, released.length, 0);
        }
        self.regions
            .insert(start, Region::free(start, released.length, epoch));
        self.coalesce(start);
        Ok(released)
    }

    /// Merge the free region at `start` with free neighbours on both sides
    fn coalesce(&mut self, start: usize) {
        let mut merged = self.take(start);

        let next_free = self
            .regions
            .get(&merged.end())
            .map_or(false, |next| next.is_free());
        if next_free {
            let next = self.take(merged.end());
            merged.length += next.length;
        }

        let left = self
            .regions
            .range(..merged.start)
            .next_back()
            .filter(|(_, prev)| prev.is_free() && prev.end() == merged.start)
            .map(|(&prev_start, _)| prev_start);
        if let Some(prev_start) = left {
            let prev = self.take(prev_start);
            merged.length += prev.length;
            merged.start = prev.start;
        }

        self.regions.insert(merged.start, merged);
    }

    /// Append `extra` free bytes to the end of the space and return the old
    /// capacity. Allocated regions keep their addresses.
    pub fn grow(&mut self, extra: usize) -> HeapResult<usize> {
        let old = self.space.grow(extra)?;
        if extra > 0 {
            self.regions.insert(old, Region::free(old, extra, 0));
            self.coalesce(old);
        }
        Ok(old)
    }

    pub fn region_at(&self, start: usize) -> Option<&Region> {
        self.regions.get(&start)
    }

    pub fn region_containing(&self, address: usize) -> Option<&Region> {
        self.regions
            .range(..=address)
            .next_back()
            .map(|(_, region)| region)
            .filter(|region| region.contains(address))
    }

    /// All regions in address order
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// Check the partition, no-overlap and coalescing invariants
    pub fn verify(&self) -> Result<(), String> {
        let mut expected = NULL_GUARD;
        let mut previous_free = false;
        for (&key, region) in &self.regions {
            if key != region.start {
                return Err(format!("region keyed at {:#x} starts at {:#x}", key, region.start));
            }
            if region.start != expected {
                return Err(format!("expected region at {:#x}, found {:#x}", expected, region.start));
            }
            if region.length == 0 {
                return Err(format!("empty region at {:#x}", region.start));
            }
            if region.requested > region.length {
                return Err(format!("region at {:#x} smaller than its request", region.start));
            }
            if region.is_free() && previous_free {
                return Err(format!("uncoalesced free region at {:#x}", region.start));
            }
            previous_free = region.is_free();
            expected = region.end();
        }
        let capacity = self.capacity();
        if expected != capacity {
            return Err(format!("regions end at {:#x}, capacity is {:#x}", expected, capacity));
        }
        Ok(())
    }

    /// Panic if the region table is corrupt
    pub fn assert_invariants(&self) {
        if let Err(defect) = self.verify() {
            panic!("allocator invariant violated: {}", defect);
        }
    }
}

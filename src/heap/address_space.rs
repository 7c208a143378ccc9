use crate::heap::{HeapError, HeapResult};

/// The simulated memory: a flat, append-only byte buffer.
///
/// Callers are expected to have validated every range against the region
/// table first; an out-of-range access here means the bookkeeping is corrupt
/// and panics.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    bytes: Vec<u8>,
}

impl AddressSpace {
    /// Create a zero-filled address space of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Append `extra` zeroed bytes and return the previous capacity.
    /// Existing addresses keep their contents. If the bytes cannot be
    /// reserved the space is left unchanged and `OutOfMemory` is returned.
    pub fn grow(&mut self, extra: usize) -> HeapResult<usize> {
        let old = self.bytes.len();
        let out_of_memory = HeapError::OutOfMemory {
            requested: extra,
            capacity: old,
        };
        let new_len = old.checked_add(extra).ok_or_else(|| out_of_memory.clone())?;
        self.bytes.try_reserve_exact(extra).map_err(|_| out_of_memory)?;
        self.bytes.resize(new_len, 0);
        Ok(old)
    }

    pub fn read(&self, address: usize, len: usize) -> &[u8] {
        &self.bytes[address..address + len]
    }

    pub fn write(&mut self, address: usize, data: &[u8]) {
        self.bytes[address..address + data.len()].copy_from_slice(data);
    }

    pub fn fill(&mut self, address: usize, len: usize, byte: u8) {
        self.bytes[address..address + len].fill(byte);
    }

    /// Copy `len` bytes from `src` to `dst`; the ranges may overlap
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.bytes.copy_within(src..src + len, dst);
    }
}

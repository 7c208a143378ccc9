//! Heap configuration options

use crate::heap::{HeapError, HeapResult};

/// Configuration options for a single heap.
///
/// Capacities count allocatable bytes; the null guard comes on top.
#[derive(Clone, Debug)]
pub struct HeapConfig {
    pub initial_capacity: usize,
    pub max_capacity: Option<usize>,
    pub growable: bool,
    pub scrub_on_free: bool,
    pub debug_checks: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 4096,
            max_capacity: None,
            growable: true,
            scrub_on_free: true,
            debug_checks: false,
        }
    }
}

impl HeapConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of allocatable bytes the heap starts with
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Cap growth at `capacity` allocatable bytes
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Enable or disable growing the address space when an allocation fails
    pub fn with_growable(mut self, growable: bool) -> Self {
        self.growable = growable;
        self
    }

    /// Enable or disable zeroing blocks when they are freed
    pub fn with_scrub_on_free(mut self, scrub: bool) -> Self {
        self.scrub_on_free = scrub;
        self
    }

    /// Verify the allocator invariants after every mutation
    pub fn with_debug_checks(mut self, enabled: bool) -> Self {
        self.debug_checks = enabled;
        self
    }

    pub fn validate(&self) -> HeapResult<()> {
        if let Some(max) = self.max_capacity {
            if max < self.initial_capacity {
                return Err(HeapError::InvalidConfig(format!(
                    "max capacity {} is below initial capacity {}",
                    max, self.initial_capacity
                )));
            }
        }
        if self.initial_capacity == 0 && !self.growable {
            return Err(HeapError::InvalidConfig(
                "a fixed-size heap needs a non-zero capacity".to_string(),
            ));
        }
        Ok(())
    }
}

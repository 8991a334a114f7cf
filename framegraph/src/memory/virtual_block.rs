//! Virtual block: bookkeeping-only sub-allocation of a future heap.

use super::buddy::BuddyAllocator;

/// A range reserved in a [`VirtualBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAllocation {
    /// Offset from the start of the block.
    pub offset: u64,
    /// Reserved bytes (the buddy block size, at least the requested size).
    pub size: u64,
}

impl VirtualAllocation {
    /// End of the reserved range.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Returns true if the two ranges share at least one byte.
    pub fn overlaps(&self, other: &VirtualAllocation) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Tracks used and free ranges of memory that does not exist yet.
///
/// Requests that do not fit grow the block, so allocation never fails; the
/// heap backing it is created afterwards with [`high_water`](Self::high_water)
/// bytes.
#[derive(Debug, Clone)]
pub struct VirtualBlock {
    buddy: BuddyAllocator,
    used: u64,
    peak: u64,
    high_water: u64,
}

impl VirtualBlock {
    /// Create a block with `min_block` granularity and one block of capacity.
    pub fn new(min_block: u64) -> Self {
        Self {
            buddy: BuddyAllocator::new(min_block, min_block),
            used: 0,
            peak: 0,
            high_water: 0,
        }
    }

    /// Reserve `size` bytes aligned to `alignment` (a power of two).
    pub fn allocate(&mut self, size: u64, alignment: u64) -> VirtualAllocation {
        // Buddy blocks are aligned to their size, so reserving at least
        // `alignment` bytes yields an aligned offset.
        let size = size.max(alignment.next_power_of_two());
        while size > self.buddy.capacity() {
            self.buddy.grow();
        }
        let offset = loop {
            match self.buddy.allocate(size) {
                Some(offset) => break offset,
                None => self.buddy.grow(),
            }
        };

        let allocation = VirtualAllocation {
            offset,
            size: self.buddy.block_size(size),
        };
        self.used += allocation.size;
        self.peak = self.peak.max(self.used);
        self.high_water = self.high_water.max(allocation.end());
        allocation
    }

    /// Release a range returned by [`allocate`](Self::allocate).
    pub fn free(&mut self, allocation: &VirtualAllocation) {
        self.buddy.deallocate(allocation.offset);
        self.used -= allocation.size;
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Largest number of bytes reserved at the same time.
    pub fn peak(&self) -> u64 {
        self.peak
    }

    /// Highest end offset ever reserved; the size the backing heap needs.
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    /// Current virtual capacity.
    pub fn capacity(&self) -> u64 {
        self.buddy.capacity()
    }

    /// Number of live reservations.
    pub fn allocation_count(&self) -> usize {
        self.buddy.allocation_count()
    }
}

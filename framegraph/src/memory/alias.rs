//! Memory alias manager for transient resources.
//!
//! Transient resources whose lifetimes do not overlap share physical memory.
//! The manager keeps one [`VirtualBlock`] per heap category (one universal
//! category on tier 2 hardware, three on tier 1). During compilation the
//! graph walks its operations in execution order, calling
//! [`allocate`](MemoryAliasManager::allocate) at a resource's first access and
//! [`release_memory`](MemoryAliasManager::release_memory) after its last, so
//! each virtual block ends up sized to the largest set of resources that are
//! alive at the same time.
//!
//! [`commit`](MemoryAliasManager::commit) then creates one heap per category,
//! sized to the block's high-water mark, and
//! [`create_resource`](MemoryAliasManager::create_resource) places each
//! resource at its planned offset. The heaps are owned by the manager, which
//! in turn is owned by the compiled graph.

use std::sync::Arc;

use crate::backend::{GpuBackend, GpuHeap, GpuResource, HeapCategory, HeapTier};
use crate::config::FrameGraphConfig;
use crate::error::{graph_assert, GraphicsError};
use crate::types::{ResourceDescriptor, ResourceState};

use super::virtual_block::{VirtualAllocation, VirtualBlock};

/// Memory assigned to one transient resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasAllocation {
    /// Heap the resource is placed in.
    pub category: HeapCategory,
    /// Offset inside the heap.
    pub offset: u64,
    /// Reserved bytes.
    pub size: u64,
    /// State the placed resource is created in.
    pub initial_state: ResourceState,
}

impl AliasAllocation {
    /// Returns true if both allocations live in the same heap and share bytes.
    pub fn overlaps(&self, other: &AliasAllocation) -> bool {
        self.category == other.category
            && self.offset < other.offset + other.size
            && other.offset < self.offset + self.size
    }

    fn range(&self) -> VirtualAllocation {
        VirtualAllocation {
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Usage statistics of one heap category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Heap category.
    pub category: HeapCategory,
    /// Size of the physical heap (0 before commit).
    pub heap_size: u64,
    /// Largest number of bytes reserved at the same time.
    pub peak_usage: u64,
    /// Number of resources placed in the heap.
    pub resource_count: usize,
}

#[derive(Debug)]
struct CategoryBlock {
    category: HeapCategory,
    block: VirtualBlock,
    alignment: u64,
    memory_type_bits: u32,
    placed: usize,
    heap: Option<GpuHeap>,
}

/// Assigns aliased heap memory to transient resources.
pub struct MemoryAliasManager {
    backend: Arc<dyn GpuBackend>,
    tier: HeapTier,
    min_block_size: u64,
    blocks: Vec<CategoryBlock>,
    committed: bool,
}

impl std::fmt::Debug for MemoryAliasManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAliasManager")
            .field("backend", &self.backend.name())
            .field("tier", &self.tier)
            .field("blocks", &self.blocks)
            .field("committed", &self.committed)
            .finish()
    }
}

impl MemoryAliasManager {
    /// Create a manager for `backend`.
    pub fn new(backend: Arc<dyn GpuBackend>, config: &FrameGraphConfig) -> Self {
        let tier = config
            .heap_tier
            .unwrap_or_else(|| backend.capabilities().heap_tier);
        Self {
            backend,
            tier,
            min_block_size: config.min_block_size.max(1).next_power_of_two(),
            blocks: Vec::new(),
            committed: false,
        }
    }

    /// Heap tier in use.
    pub fn tier(&self) -> HeapTier {
        self.tier
    }

    fn block_mut(&mut self, category: HeapCategory) -> &mut CategoryBlock {
        let index = match self.blocks.iter().position(|b| b.category == category) {
            Some(index) => index,
            None => {
                self.blocks.push(CategoryBlock {
                    category,
                    block: VirtualBlock::new(self.min_block_size),
                    alignment: 1,
                    memory_type_bits: u32::MAX,
                    placed: 0,
                    heap: None,
                });
                self.blocks.len() - 1
            }
        };
        &mut self.blocks[index]
    }

    /// Reserve memory for a transient resource whose first access wants `state`.
    ///
    /// The resource's creation state is chosen by the backend and may differ
    /// from `state`; the execution engine transitions on first use.
    pub fn allocate(
        &mut self,
        descriptor: &ResourceDescriptor,
        state: ResourceState,
    ) -> Result<AliasAllocation, GraphicsError> {
        graph_assert!(
            !self.committed,
            "transient allocation after the alias manager was committed"
        );
        let info = self.backend.allocation_info(descriptor)?;
        let initial_state = self.backend.creatable_state(descriptor, state);
        let category = HeapCategory::for_descriptor(descriptor, self.tier);

        let entry = self.block_mut(category);
        let range = entry.block.allocate(info.size, info.alignment);
        entry.alignment = entry.alignment.max(info.alignment);
        entry.memory_type_bits &= info.memory_type_bits;
        entry.placed += 1;

        log::debug!(
            "Aliasing {:?} into {} heap at offset {} ({} bytes, created in {:?})",
            descriptor.label(),
            category.name(),
            range.offset,
            range.size,
            initial_state
        );
        Ok(AliasAllocation {
            category,
            offset: range.offset,
            size: range.size,
            initial_state,
        })
    }

    /// Return the memory of `allocation` for reuse by later allocations.
    pub fn release_memory(&mut self, allocation: &AliasAllocation) {
        graph_assert!(
            !self.committed,
            "transient release after the alias manager was committed"
        );
        let entry = self.block_mut(allocation.category);
        entry.block.free(&allocation.range());
    }

    /// Create the physical heaps. Every allocation must be planned before.
    pub fn commit(&mut self) -> Result<(), GraphicsError> {
        graph_assert!(!self.committed, "alias manager committed twice");
        for entry in &mut self.blocks {
            if entry.placed == 0 {
                continue;
            }
            if entry.memory_type_bits == 0 {
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "no memory type is compatible with every resource in the {} heap",
                    entry.category.name()
                )));
            }
            let size = entry.block.high_water().next_multiple_of(entry.alignment);
            let heap = self.backend.create_heap(
                entry.category,
                size,
                entry.alignment,
                entry.memory_type_bits,
            )?;
            log::debug!(
                "Created {} heap of {} bytes for {} aliased resources",
                entry.category.name(),
                size,
                entry.placed
            );
            entry.heap = Some(heap);
        }
        self.committed = true;
        Ok(())
    }

    /// Create the placed resource for a planned allocation.
    pub fn create_resource(
        &self,
        allocation: &AliasAllocation,
        descriptor: &ResourceDescriptor,
    ) -> Result<GpuResource, GraphicsError> {
        graph_assert!(
            self.committed,
            "placed resource requested before the alias manager was committed"
        );
        let heap = self
            .blocks
            .iter()
            .find(|b| b.category == allocation.category)
            .and_then(|b| b.heap.as_ref())
            .ok_or_else(|| {
                GraphicsError::Internal(format!(
                    "no {} heap for allocation at offset {}",
                    allocation.category.name(),
                    allocation.offset
                ))
            })?;
        self.backend.create_placed_resource(
            heap,
            allocation.offset,
            descriptor,
            allocation.initial_state,
        )
    }

    /// Statistics for every category that received allocations.
    pub fn heap_stats(&self) -> Vec<HeapStats> {
        self.blocks
            .iter()
            .map(|entry| HeapStats {
                category: entry.category,
                heap_size: entry.heap.as_ref().map_or(0, GpuHeap::size),
                peak_usage: entry.block.peak(),
                resource_count: entry.placed,
            })
            .collect()
    }

    /// Peak reserved bytes in `category`.
    pub fn peak_usage(&self, category: HeapCategory) -> u64 {
        self.blocks
            .iter()
            .find(|b| b.category == category)
            .map_or(0, |b| b.block.peak())
    }

    /// Sum of the peak usage of all categories.
    pub fn total_peak_usage(&self) -> u64 {
        self.blocks.iter().map(|b| b.block.peak()).sum()
    }

    /// Number of physical heaps created by [`commit`](Self::commit).
    pub fn heap_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.heap.is_some()).count()
    }
}

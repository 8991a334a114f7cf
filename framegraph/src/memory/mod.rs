//! Transient memory management.
//!
//! - [`BuddyAllocator`]: index-arena buddy tree handing out offsets
//! - [`VirtualBlock`]: growable buddy block with usage statistics
//! - [`MemoryAliasManager`]: per-heap-category virtual blocks, heap creation
//!   and placed-resource creation for aliased transient resources

mod alias;
mod buddy;
mod virtual_block;

pub use alias::{AliasAllocation, HeapStats, MemoryAliasManager};
pub use buddy::BuddyAllocator;
pub use virtual_block::{VirtualAllocation, VirtualBlock};

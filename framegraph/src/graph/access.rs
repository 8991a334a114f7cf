//! Accesses: one entry per (operation, slot) pair.
//!
//! Accesses are stored in the order operations were added, which is also
//! execution order. Lifetimes and state transitions are derived from this
//! order alone.

use crate::types::ResourceState;

use super::resource::ResourceHandle;

/// Index into the access table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct AccessIndex(u32);

impl AccessIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position in execution order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How an operation uses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessCategory {
    /// Bound as a color attachment of a graphics-like operation.
    RenderTarget,
    /// Bound as the depth attachment of a graphics-like operation.
    Depth,
    /// Any other use (sampling, storage, copies).
    General,
}

impl AccessCategory {
    /// Returns true for attachments bound by the execution engine.
    pub fn is_attachment(self) -> bool {
        matches!(self, Self::RenderTarget | Self::Depth)
    }
}

/// One use of a resource by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub(crate) resource: ResourceHandle,
    pub(crate) category: AccessCategory,
    pub(crate) state: ResourceState,
}

impl Access {
    /// Resource being accessed.
    pub fn resource(&self) -> ResourceHandle {
        self.resource
    }

    /// Access category.
    pub fn category(&self) -> AccessCategory {
        self.category
    }

    /// State the resource must be in for this access.
    pub fn state(&self) -> ResourceState {
        self.state
    }
}

//! Resource handles and the resource table of the graph.

use crate::backend::GpuResource;
use crate::memory::AliasAllocation;
use crate::types::{ResourceDescriptor, ResourceState};

use super::access::AccessIndex;

/// Handle to a resource in a frame graph.
///
/// `ResourceHandle` is `Copy` and cheap to pass around. It is an index into
/// the resource table and is only valid within the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ResourceHandle(u32);

impl ResourceHandle {
    /// Marks a slot no resource was bound to.
    pub const INVALID: Self = Self(u32::MAX);

    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Index into the resource table.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns false for [`INVALID`](Self::INVALID).
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// How the memory of a resource is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Memory is only valid between the first and last access and is reused
    /// by other transients afterwards.
    Transient,
    /// Dedicated memory held for the lifetime of the compiled graph.
    Persistent,
    /// The presentation target; its GPU handle changes every frame.
    SwapChain,
}

/// One logical GPU resource.
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) kind: ResourceKind,
    pub(crate) descriptor: ResourceDescriptor,
    pub(crate) gpu: Option<GpuResource>,
    pub(crate) initial_state: ResourceState,
    pub(crate) current_state: ResourceState,
    pub(crate) first_access: Option<AccessIndex>,
    pub(crate) last_access: Option<AccessIndex>,
    pub(crate) allocation: Option<AliasAllocation>,
}

impl Resource {
    pub(crate) fn new(kind: ResourceKind, descriptor: ResourceDescriptor) -> Self {
        let state = match kind {
            ResourceKind::SwapChain => ResourceState::Present,
            ResourceKind::Transient | ResourceKind::Persistent => ResourceState::Common,
        };
        Self {
            kind,
            descriptor,
            gpu: None,
            initial_state: state,
            current_state: state,
            first_access: None,
            last_access: None,
            allocation: None,
        }
    }

    /// Memory management class.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Description the resource was created from.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Live GPU handle. `None` before compilation and for resources no
    /// operation accesses.
    pub fn gpu(&self) -> Option<&GpuResource> {
        self.gpu.as_ref()
    }

    /// State the resource is created in (and reset to by aliasing barriers).
    pub fn initial_state(&self) -> ResourceState {
        self.initial_state
    }

    /// State the execution engine last moved the resource to.
    pub fn current_state(&self) -> ResourceState {
        self.current_state
    }

    /// First access in execution order.
    pub fn first_access(&self) -> Option<AccessIndex> {
        self.first_access
    }

    /// Last access in execution order.
    pub fn last_access(&self) -> Option<AccessIndex> {
        self.last_access
    }

    /// Aliased memory of a transient resource.
    pub fn allocation(&self) -> Option<&AliasAllocation> {
        self.allocation.as_ref()
    }

    /// Returns true for transient resources.
    pub fn is_transient(&self) -> bool {
        self.kind == ResourceKind::Transient
    }
}

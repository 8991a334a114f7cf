//! GPU backend abstraction.
//!
//! The frame graph never talks to a graphics API directly. Everything it
//! needs from the rendering context (memory heaps, placed and committed
//! resources, a command list, barriers, render target binding, clears,
//! copies, fences and the swap chain's back buffer) goes through the
//! [`GpuBackend`] trait.
//!
//! Handles returned by a backend are enums with one variant per compiled-in
//! backend, so they can be stored in the graph without generics.
//!
//! Backends:
//! - [`dummy::DummyBackend`]: headless, simulates GPU memory on the CPU
//! - `vulkan::VulkanBackend`: native Vulkan through ash (`vulkan-backend` feature)

pub mod dummy;
#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "vulkan-backend")]
use ash::vk;

use crate::config::{BackendParameters, BackendType};
use crate::error::GraphicsError;
use crate::types::{
    ResourceDescriptor, ResourceState, ScissorRect, TextureDescriptor, Viewport,
};

pub use dummy::DummyBackend;

/// Row pitch alignment used when copying textures into buffers.
pub const TEXTURE_COPY_PITCH_ALIGNMENT: u64 = 256;

/// How resource categories may share a memory heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapTier {
    /// Buffers, non-render-target textures and render-target/depth textures
    /// each need their own heap.
    Tier1,
    /// All resource categories can live in one heap.
    #[default]
    Tier2,
}

/// Heap a transient resource is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapCategory {
    /// Buffers only (tier 1).
    Buffers,
    /// Textures that are never bound as attachments (tier 1).
    Textures,
    /// Color and depth attachments (tier 1).
    RenderTargets,
    /// Every resource category (tier 2).
    Universal,
}

impl HeapCategory {
    /// Heap category a resource with `descriptor` is placed in on `tier`.
    pub fn for_descriptor(descriptor: &ResourceDescriptor, tier: HeapTier) -> Self {
        match tier {
            HeapTier::Tier2 => Self::Universal,
            HeapTier::Tier1 if descriptor.is_buffer() => Self::Buffers,
            HeapTier::Tier1 if descriptor.is_render_target_or_depth() => Self::RenderTargets,
            HeapTier::Tier1 => Self::Textures,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Buffers => "buffers",
            Self::Textures => "textures",
            Self::RenderTargets => "render targets",
            Self::Universal => "universal",
        }
    }
}

/// Where a committed resource lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Device-local memory.
    #[default]
    GpuOnly,
    /// Host-visible memory the CPU reads GPU results from.
    GpuToCpu,
}

/// Static properties of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Heap sharing tier.
    pub heap_tier: HeapTier,
    /// Alignment of placed resources inside a heap.
    pub placement_alignment: u64,
    /// Mesh shading pipelines are available.
    pub mesh_shading: bool,
    /// Ray tracing pipelines are available.
    pub ray_tracing: bool,
}

/// Size and placement requirements of a resource, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationInfo {
    /// Size in bytes the resource occupies in a heap.
    pub size: u64,
    /// Required alignment of the resource's offset.
    pub alignment: u64,
    /// Memory types the resource may be bound to (bit per type).
    pub memory_type_bits: u32,
}

/// Layout of a texture copied into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopyLayout {
    /// Width of the copied region in texels.
    pub width: u32,
    /// Height of the copied region in texels.
    pub height: u32,
    /// Bytes per texel.
    pub bytes_per_texel: u32,
    /// Distance in bytes between rows in the buffer.
    pub row_pitch: u64,
}

impl TextureCopyLayout {
    /// Layout for copying the top mip level of the first layer of `descriptor`.
    pub fn for_texture(descriptor: &TextureDescriptor) -> Self {
        let bytes_per_texel = descriptor.format.block_size();
        let row_bytes = descriptor.size.width as u64 * bytes_per_texel as u64;
        Self {
            width: descriptor.size.width,
            height: descriptor.size.height,
            bytes_per_texel,
            row_pitch: row_bytes.next_multiple_of(TEXTURE_COPY_PITCH_ALIGNMENT),
        }
    }

    /// Tightly packed size of one row.
    pub fn row_bytes(&self) -> u64 {
        self.width as u64 * self.bytes_per_texel as u64
    }

    /// Size in bytes of the buffer receiving the copy.
    pub fn buffer_size(&self) -> u64 {
        self.row_pitch * self.height as u64
    }
}

// ============================================================================
// Handles
// ============================================================================

/// A memory heap transient resources are placed in.
#[derive(Clone)]
pub enum GpuHeap {
    /// Dummy backend heap (CPU byte array).
    Dummy(Arc<dummy::DummyHeap>),
    /// Vulkan device memory allocation.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(Arc<vulkan::VulkanHeap>),
}

impl GpuHeap {
    /// Size of the heap in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy(heap) => heap.size(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(heap) => heap.size(),
        }
    }
}

impl std::fmt::Debug for GpuHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(heap) => f
                .debug_struct("GpuHeap::Dummy")
                .field("id", &heap.id())
                .field("size", &heap.size())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(heap) => f
                .debug_struct("GpuHeap::Vulkan")
                .field("size", &heap.size())
                .finish_non_exhaustive(),
        }
    }
}

/// A GPU texture or buffer with memory bound to it.
#[derive(Clone)]
pub enum GpuResource {
    /// Dummy backend resource.
    Dummy(Arc<dummy::DummyResource>),
    /// Vulkan image or buffer.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(Arc<vulkan::VulkanResource>),
}

impl GpuResource {
    /// Backend-unique identifier of the resource.
    pub fn id(&self) -> u64 {
        match self {
            Self::Dummy(resource) => resource.id(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(resource) => resource.id(),
        }
    }

    /// Descriptor the resource was created from.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        match self {
            Self::Dummy(resource) => resource.descriptor(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(resource) => resource.descriptor(),
        }
    }
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Dummy(_) => "GpuResource::Dummy",
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(_) => "GpuResource::Vulkan",
        };
        f.debug_struct(name)
            .field("id", &self.id())
            .field("label", &self.descriptor().label())
            .finish()
    }
}

/// A command list recording one frame of work.
pub enum GpuCommandList {
    /// Dummy backend command list.
    Dummy(dummy::DummyCommandList),
    /// Vulkan command buffer.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanCommandList),
}

impl std::fmt::Debug for GpuCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(list) => f
                .debug_struct("GpuCommandList::Dummy")
                .field("commands", &list.len())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(list) => f
                .debug_struct("GpuCommandList::Vulkan")
                .field("command_buffer", &list.command_buffer())
                .finish(),
        }
    }
}

/// GPU fence for CPU-GPU synchronization.
pub enum GpuFence {
    /// Dummy backend fence, signaled as soon as the submission is applied.
    Dummy { signaled: AtomicBool },
    /// Vulkan fence.
    #[cfg(feature = "vulkan-backend")]
    Vulkan { device: ash::Device, fence: vk::Fence },
}

impl GpuFence {
    /// Mark a dummy fence as signaled.
    pub(crate) fn signal_dummy(&self) {
        if let Self::Dummy { signaled } = self {
            signaled.store(true, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for GpuFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { signaled } => f
                .debug_struct("GpuFence::Dummy")
                .field("signaled", signaled)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { fence, .. } => f
                .debug_struct("GpuFence::Vulkan")
                .field("fence", fence)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuFence {
    fn drop(&mut self) {
        if let Self::Vulkan { device, fence } = self {
            unsafe {
                device.destroy_fence(*fence, None);
            }
        }
    }
}

// ============================================================================
// Barriers and render targets
// ============================================================================

/// Kind of a resource barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// The memory of a placed resource now belongs to this resource.
    Aliasing,
    /// Read-modify-write hazard between dependent operations.
    UnorderedAccess,
    /// State transition.
    Transition,
}

/// A barrier recorded before an operation's accesses.
#[derive(Debug, Clone)]
pub enum ResourceBarrier {
    /// Activates `resource` in memory previously used by other resources.
    /// Its previous contents are undefined afterwards.
    Aliasing { resource: GpuResource },
    /// Orders unordered-access reads and writes of `resource`.
    UnorderedAccess { resource: GpuResource },
    /// Moves `resource` from `before` to `after`.
    Transition {
        resource: GpuResource,
        before: ResourceState,
        after: ResourceState,
    },
}

impl ResourceBarrier {
    /// Resource the barrier applies to.
    pub fn resource(&self) -> &GpuResource {
        match self {
            Self::Aliasing { resource }
            | Self::UnorderedAccess { resource }
            | Self::Transition { resource, .. } => resource,
        }
    }

    /// Kind of the barrier.
    pub fn kind(&self) -> BarrierKind {
        match self {
            Self::Aliasing { .. } => BarrierKind::Aliasing,
            Self::UnorderedAccess { .. } => BarrierKind::UnorderedAccess,
            Self::Transition { .. } => BarrierKind::Transition,
        }
    }
}

/// Output set bound for a graphics-like operation.
#[derive(Debug, Clone)]
pub struct RenderTargetBinding {
    /// Color attachments in slot order.
    pub color: Vec<GpuResource>,
    /// Depth attachment, if any.
    pub depth: Option<GpuResource>,
    /// Depth is bound for testing only.
    pub depth_read_only: bool,
    /// Viewport covering the bound targets.
    pub viewport: Viewport,
    /// Scissor covering the bound targets.
    pub scissor: ScissorRect,
}

// ============================================================================
// Backend trait
// ============================================================================

/// The rendering context the frame graph runs on.
///
/// Recording methods take the command list explicitly; nothing is executed
/// until [`submit`](Self::submit).
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Static capabilities of the device.
    fn capabilities(&self) -> BackendCapabilities;

    /// Driver-reported size and alignment of a resource.
    fn allocation_info(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<AllocationInfo, GraphicsError>;

    /// State a resource with `descriptor` is created in when `requested` is
    /// the first state it is used in.
    ///
    /// Backends return `requested` when the API can create the resource in
    /// it directly and a default state otherwise; the execution engine then
    /// transitions on first use.
    fn creatable_state(
        &self,
        descriptor: &ResourceDescriptor,
        requested: ResourceState,
    ) -> ResourceState;

    /// Create a heap for placed resources.
    fn create_heap(
        &self,
        category: HeapCategory,
        size: u64,
        alignment: u64,
        memory_type_bits: u32,
    ) -> Result<GpuHeap, GraphicsError>;

    /// Create a resource aliasing `heap` at `offset`.
    fn create_placed_resource(
        &self,
        heap: &GpuHeap,
        offset: u64,
        descriptor: &ResourceDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResource, GraphicsError>;

    /// Create a resource with its own dedicated memory.
    fn create_committed_resource(
        &self,
        descriptor: &ResourceDescriptor,
        initial_state: ResourceState,
        location: MemoryLocation,
    ) -> Result<GpuResource, GraphicsError>;

    /// Descriptor of the swap chain's back buffers, if a presentation surface exists.
    fn swap_chain_descriptor(&self) -> Option<TextureDescriptor>;

    /// Back buffer the current frame renders into.
    fn current_back_buffer(&self) -> Option<GpuResource>;

    /// Present the current back buffer and advance to the next one.
    fn present(&self) -> Result<(), GraphicsError>;

    /// Start recording a command list.
    fn begin_commands(&self) -> Result<GpuCommandList, GraphicsError>;

    /// Record barriers in order.
    fn resource_barriers(
        &self,
        commands: &mut GpuCommandList,
        barriers: &[ResourceBarrier],
    ) -> Result<(), GraphicsError>;

    /// Bind the output set of a graphics-like operation.
    fn begin_render_targets(
        &self,
        commands: &mut GpuCommandList,
        binding: &RenderTargetBinding,
    ) -> Result<(), GraphicsError>;

    /// Unbind the output set bound by [`begin_render_targets`](Self::begin_render_targets).
    fn end_render_targets(&self, commands: &mut GpuCommandList) -> Result<(), GraphicsError>;

    /// Clear a bound color target.
    fn clear_render_target(
        &self,
        commands: &mut GpuCommandList,
        target: &GpuResource,
        color: [f32; 4],
    ) -> Result<(), GraphicsError>;

    /// Clear a bound depth/stencil target.
    fn clear_depth_stencil(
        &self,
        commands: &mut GpuCommandList,
        target: &GpuResource,
        depth: f32,
        stencil: u8,
    ) -> Result<(), GraphicsError>;

    /// Copy the whole contents of `source` into `destination`.
    fn copy_resource(
        &self,
        commands: &mut GpuCommandList,
        source: &GpuResource,
        destination: &GpuResource,
    ) -> Result<(), GraphicsError>;

    /// Copy the top mip level of a texture into a buffer using `layout`.
    fn copy_texture_to_buffer(
        &self,
        commands: &mut GpuCommandList,
        source: &GpuResource,
        destination: &GpuResource,
        layout: &TextureCopyLayout,
    ) -> Result<(), GraphicsError>;

    /// Submit a recorded command list, optionally signaling a fence when done.
    fn submit(
        &self,
        commands: GpuCommandList,
        signal_fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError>;

    /// Create a fence.
    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError>;

    /// Block until the fence is signaled.
    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError>;

    /// Check whether the fence is signaled without blocking.
    fn is_fence_signaled(&self, fence: &GpuFence) -> bool;

    /// Block until all submitted work has finished.
    fn wait_idle(&self) -> Result<(), GraphicsError>;

    /// Read back data from a host-visible buffer.
    fn read_buffer(
        &self,
        buffer: &GpuResource,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError>;
}

/// Command recording handed to passes.
///
/// Wraps the backend and the frame's command list so passes record through a
/// single object.
pub struct CommandEncoder<'a> {
    backend: &'a dyn GpuBackend,
    commands: &'a mut GpuCommandList,
}

impl<'a> CommandEncoder<'a> {
    pub(crate) fn new(backend: &'a dyn GpuBackend, commands: &'a mut GpuCommandList) -> Self {
        Self { backend, commands }
    }

    /// Backend the commands are recorded for.
    pub fn backend(&self) -> &'a dyn GpuBackend {
        self.backend
    }

    /// Raw command list, for passes that record backend-specific work.
    pub fn command_list(&mut self) -> &mut GpuCommandList {
        self.commands
    }

    pub(crate) fn resource_barriers(
        &mut self,
        barriers: &[ResourceBarrier],
    ) -> Result<(), GraphicsError> {
        self.backend.resource_barriers(self.commands, barriers)
    }

    pub(crate) fn begin_render_targets(
        &mut self,
        binding: &RenderTargetBinding,
    ) -> Result<(), GraphicsError> {
        self.backend.begin_render_targets(self.commands, binding)
    }

    pub(crate) fn end_render_targets(&mut self) -> Result<(), GraphicsError> {
        self.backend.end_render_targets(self.commands)
    }

    /// Clear a bound color target.
    pub fn clear_render_target(
        &mut self,
        target: &GpuResource,
        color: [f32; 4],
    ) -> Result<(), GraphicsError> {
        self.backend.clear_render_target(self.commands, target, color)
    }

    /// Clear a bound depth/stencil target.
    pub fn clear_depth_stencil(
        &mut self,
        target: &GpuResource,
        depth: f32,
        stencil: u8,
    ) -> Result<(), GraphicsError> {
        self.backend
            .clear_depth_stencil(self.commands, target, depth, stencil)
    }

    /// Copy a whole resource.
    pub fn copy_resource(
        &mut self,
        source: &GpuResource,
        destination: &GpuResource,
    ) -> Result<(), GraphicsError> {
        self.backend.copy_resource(self.commands, source, destination)
    }

    /// Copy a texture into a buffer.
    pub fn copy_texture_to_buffer(
        &mut self,
        source: &GpuResource,
        destination: &GpuResource,
        layout: &TextureCopyLayout,
    ) -> Result<(), GraphicsError> {
        self.backend
            .copy_texture_to_buffer(self.commands, source, destination, layout)
    }
}

/// Create a backend according to `params`.
///
/// With [`BackendType::Auto`] the Vulkan backend is tried first when compiled
/// in, falling back to the dummy backend.
pub fn create_backend(params: &BackendParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match params.backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(
                DummyBackend::new().with_validation(params.validation),
            ))
        }
        BackendType::Vulkan => create_vulkan_backend(params),
        BackendType::Auto => {
            if has_gpu_backend() {
                match create_vulkan_backend(params) {
                    Ok(backend) => return Ok(backend),
                    Err(e) => log::warn!("Failed to create Vulkan backend: {}", e),
                }
            }
            log::info!("Using dummy backend");
            Ok(Arc::new(
                DummyBackend::new().with_validation(params.validation),
            ))
        }
    }
}

#[cfg(feature = "vulkan-backend")]
fn create_vulkan_backend(
    params: &BackendParameters,
) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    let backend = vulkan::VulkanBackend::with_params(params)?;
    log::info!("Using Vulkan backend (ash)");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "vulkan-backend"))]
fn create_vulkan_backend(
    _params: &BackendParameters,
) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    Err(GraphicsError::FeatureNotSupported(
        "Vulkan backend not compiled in (enable the `vulkan-backend` feature)".to_string(),
    ))
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "vulkan-backend")
}

static_assertions::assert_impl_all!(GpuResource: Send, Sync);
static_assertions::assert_impl_all!(GpuHeap: Send, Sync);
static_assertions::assert_impl_all!(GpuFence: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferDescriptor, BufferUsage, TextureFormat, TextureUsage};

    #[test]
    fn test_heap_category_tier1() {
        let buffer: ResourceDescriptor =
            BufferDescriptor::new(1024, BufferUsage::STORAGE).into();
        let sampled: ResourceDescriptor = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        )
        .into();
        let target: ResourceDescriptor = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT,
        )
        .into();

        assert_eq!(
            HeapCategory::for_descriptor(&buffer, HeapTier::Tier1),
            HeapCategory::Buffers
        );
        assert_eq!(
            HeapCategory::for_descriptor(&sampled, HeapTier::Tier1),
            HeapCategory::Textures
        );
        assert_eq!(
            HeapCategory::for_descriptor(&target, HeapTier::Tier1),
            HeapCategory::RenderTargets
        );
        assert_eq!(
            HeapCategory::for_descriptor(&target, HeapTier::Tier2),
            HeapCategory::Universal
        );
    }

    #[test]
    fn test_texture_copy_layout_pitch() {
        let desc = TextureDescriptor::new_2d(
            10,
            4,
            TextureFormat::Rgba8Unorm,
            TextureUsage::COPY_SRC,
        );
        let layout = TextureCopyLayout::for_texture(&desc);
        assert_eq!(layout.row_bytes(), 40);
        assert_eq!(layout.row_pitch, 256);
        assert_eq!(layout.buffer_size(), 1024);
    }

    #[test]
    fn test_create_dummy_backend() {
        let params = BackendParameters::default().with_backend(BackendType::Dummy);
        let backend = create_backend(&params).unwrap();
        assert_eq!(backend.name(), "Dummy");
    }

    #[cfg(not(feature = "vulkan-backend"))]
    #[test]
    fn test_vulkan_unavailable_without_feature() {
        let params = BackendParameters::default().with_backend(BackendType::Vulkan);
        assert!(matches!(
            create_backend(&params),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }
}

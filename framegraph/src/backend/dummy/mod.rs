//! Dummy GPU backend for testing and development.
//!
//! This backend performs no GPU work but simulates GPU memory on the CPU:
//! heaps are byte arrays, placed resources are windows into them, and clears
//! and copies write real bytes when a command list is submitted. That makes
//! aliasing observable: two transient resources placed at the same offset
//! really do overwrite each other.
//!
//! Every submission is recorded as a list of [`CommandRecord`]s for
//! inspection in tests. With validation enabled the backend additionally
//! checks that placed resources are only used while they own their memory
//! (after an aliasing barrier) and that every transition starts from the
//! state the resource is actually in.

mod memory;
mod validation;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, ResourceDescriptor, ResourceState, TextureDescriptor, TextureFormat,
    TextureUsage,
};

use super::{
    AllocationInfo, BackendCapabilities, BarrierKind, GpuBackend, GpuCommandList, GpuFence,
    GpuHeap, GpuResource, HeapCategory, HeapTier, MemoryLocation, RenderTargetBinding,
    ResourceBarrier, TextureCopyLayout,
};

pub use memory::{
    encode_color, encode_depth_stencil, f32_to_f16_bits, DummyHeap, DummyMemory, DummyResource,
    UNINITIALIZED_BYTE,
};

use self::validation::Validator;

/// Default placement alignment of the dummy backend (4 KiB).
pub const DEFAULT_PLACEMENT_ALIGNMENT: u64 = 4096;

/// Swap chain simulated by the dummy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainSettings {
    /// Back buffer width.
    pub width: u32,
    /// Back buffer height.
    pub height: u32,
    /// Back buffer format.
    pub format: TextureFormat,
    /// Number of back buffers.
    pub buffer_count: u32,
}

/// One command as it was applied by a submission.
///
/// Resources are identified by their backend id.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandRecord {
    /// A barrier.
    Barrier {
        kind: BarrierKind,
        resource: u64,
        before: Option<ResourceState>,
        after: Option<ResourceState>,
    },
    /// Render targets bound.
    BeginRenderTargets {
        color: Vec<u64>,
        depth: Option<u64>,
        width: u32,
        height: u32,
    },
    /// Render targets unbound.
    EndRenderTargets,
    /// Color clear.
    ClearRenderTarget { target: u64 },
    /// Depth/stencil clear.
    ClearDepthStencil { target: u64 },
    /// Whole-resource copy.
    CopyResource { source: u64, destination: u64 },
    /// Texture to buffer copy.
    CopyTextureToBuffer { source: u64, destination: u64 },
}

#[derive(Debug)]
enum DummyCommand {
    Aliasing(Arc<DummyResource>),
    UnorderedAccess(Arc<DummyResource>),
    Transition {
        resource: Arc<DummyResource>,
        before: ResourceState,
        after: ResourceState,
    },
    BeginRenderTargets {
        color: Vec<Arc<DummyResource>>,
        depth: Option<Arc<DummyResource>>,
        depth_read_only: bool,
        width: u32,
        height: u32,
    },
    EndRenderTargets,
    ClearRenderTarget {
        target: Arc<DummyResource>,
        texel: Vec<u8>,
    },
    ClearDepthStencil {
        target: Arc<DummyResource>,
        texel: Vec<u8>,
    },
    CopyResource {
        source: Arc<DummyResource>,
        destination: Arc<DummyResource>,
    },
    CopyTextureToBuffer {
        source: Arc<DummyResource>,
        destination: Arc<DummyResource>,
        layout: TextureCopyLayout,
    },
}

/// Commands recorded for the dummy backend, applied on submit.
#[derive(Debug, Default)]
pub struct DummyCommandList {
    commands: Vec<DummyCommand>,
}

impl DummyCommandList {
    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    heap_tier: HeapTier,
    placement_alignment: u64,
    validation: bool,
    next_id: AtomicU64,
    swap_chain: Option<SwapChainSettings>,
    back_buffers: Vec<GpuResource>,
    back_buffer_index: AtomicUsize,
    heaps: Mutex<Vec<Weak<DummyHeap>>>,
    submissions: Mutex<Vec<Vec<CommandRecord>>>,
    validator: Mutex<Validator>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a new headless dummy backend.
    pub fn new() -> Self {
        Self {
            heap_tier: HeapTier::Tier2,
            placement_alignment: DEFAULT_PLACEMENT_ALIGNMENT,
            validation: false,
            next_id: AtomicU64::new(1),
            swap_chain: None,
            back_buffers: Vec::new(),
            back_buffer_index: AtomicUsize::new(0),
            heaps: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            validator: Mutex::new(Validator::default()),
        }
    }

    /// Report `tier` as the heap tier.
    pub fn with_heap_tier(mut self, tier: HeapTier) -> Self {
        self.heap_tier = tier;
        self
    }

    /// Set the placement alignment. Must be a power of two.
    pub fn with_placement_alignment(mut self, alignment: u64) -> Self {
        self.placement_alignment = alignment.max(1).next_power_of_two();
        self
    }

    /// Enable aliasing and state validation.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Simulate a presentation surface with `settings`.
    pub fn with_swap_chain(mut self, settings: SwapChainSettings) -> Self {
        let descriptor = Self::back_buffer_descriptor(&settings);
        self.back_buffers = (0..settings.buffer_count.max(1))
            .map(|index| {
                let descriptor: ResourceDescriptor = descriptor
                    .clone()
                    .with_label(format!("back buffer {index}"))
                    .into();
                let size = descriptor.byte_size() as usize;
                GpuResource::Dummy(Arc::new(DummyResource::new(
                    self.allocate_id(),
                    descriptor,
                    DummyMemory::Committed {
                        bytes: Mutex::new(vec![UNINITIALIZED_BYTE; size]),
                        location: MemoryLocation::GpuOnly,
                    },
                    ResourceState::Present,
                )))
            })
            .collect();
        self.swap_chain = Some(settings);
        self
    }

    fn back_buffer_descriptor(settings: &SwapChainSettings) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            settings.width,
            settings.height,
            settings.format,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        )
        .with_label("back buffer")
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// All submissions so far, oldest first.
    pub fn submissions(&self) -> Vec<Vec<CommandRecord>> {
        self.submissions.lock().clone()
    }

    /// Number of submissions so far.
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Forget recorded submissions.
    pub fn clear_submissions(&self) {
        self.submissions.lock().clear();
    }

    /// Validation errors reported so far.
    pub fn validation_errors(&self) -> Vec<String> {
        self.validator.lock().errors().to_vec()
    }

    /// Forget reported validation errors.
    pub fn clear_validation_errors(&self) {
        self.validator.lock().clear_errors();
    }

    /// Category and size of every heap that is still alive.
    pub fn live_heaps(&self) -> Vec<(HeapCategory, u64)> {
        let mut heaps = self.heaps.lock();
        heaps.retain(|heap| heap.strong_count() > 0);
        heaps
            .iter()
            .filter_map(Weak::upgrade)
            .map(|heap| (heap.category(), heap.size()))
            .collect()
    }

    fn dummy_resource(resource: &GpuResource) -> Result<&Arc<DummyResource>, GraphicsError> {
        match resource {
            GpuResource::Dummy(resource) => Ok(resource),
            #[cfg(feature = "vulkan-backend")]
            _ => Err(GraphicsError::InvalidParameter(
                "resource belongs to another backend".to_string(),
            )),
        }
    }

    fn dummy_commands(
        commands: &mut GpuCommandList,
    ) -> Result<&mut DummyCommandList, GraphicsError> {
        match commands {
            GpuCommandList::Dummy(list) => Ok(list),
            #[cfg(feature = "vulkan-backend")]
            _ => Err(GraphicsError::InvalidParameter(
                "command list belongs to another backend".to_string(),
            )),
        }
    }

    fn texture_format(resource: &DummyResource) -> Result<TextureFormat, GraphicsError> {
        resource.descriptor().format().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "resource {} is a buffer, a texture is required",
                resource.id()
            ))
        })
    }

    /// Apply one command to simulated memory and return its record.
    fn apply(
        &self,
        command: &DummyCommand,
        validator: &mut Validator,
        bound: &mut Vec<u64>,
    ) -> Result<CommandRecord, GraphicsError> {
        let validate = self.validation;
        let record = match command {
            DummyCommand::Aliasing(resource) => {
                validator.activate(resource);
                resource.set_state(resource.creation_state());
                CommandRecord::Barrier {
                    kind: BarrierKind::Aliasing,
                    resource: resource.id(),
                    before: None,
                    after: None,
                }
            }
            DummyCommand::UnorderedAccess(resource) => {
                if validate {
                    validator.check_use(resource, "uav barrier");
                }
                CommandRecord::Barrier {
                    kind: BarrierKind::UnorderedAccess,
                    resource: resource.id(),
                    before: None,
                    after: None,
                }
            }
            DummyCommand::Transition {
                resource,
                before,
                after,
            } => {
                if validate {
                    validator.check_use(resource, "transition");
                    validator.check_state(resource, *before, "transition");
                }
                resource.set_state(*after);
                CommandRecord::Barrier {
                    kind: BarrierKind::Transition,
                    resource: resource.id(),
                    before: Some(*before),
                    after: Some(*after),
                }
            }
            DummyCommand::BeginRenderTargets {
                color,
                depth,
                depth_read_only,
                width,
                height,
            } => {
                if validate {
                    for target in color {
                        validator.check_use(target, "bind render target");
                        validator.check_state(target, ResourceState::RenderTarget, "bind render target");
                    }
                    if let Some(target) = depth {
                        let expected = if *depth_read_only {
                            ResourceState::DepthRead
                        } else {
                            ResourceState::DepthWrite
                        };
                        validator.check_use(target, "bind depth target");
                        validator.check_state(target, expected, "bind depth target");
                    }
                }
                bound.clear();
                bound.extend(color.iter().map(|target| target.id()));
                bound.extend(depth.iter().map(|target| target.id()));
                CommandRecord::BeginRenderTargets {
                    color: color.iter().map(|target| target.id()).collect(),
                    depth: depth.as_ref().map(|target| target.id()),
                    width: *width,
                    height: *height,
                }
            }
            DummyCommand::EndRenderTargets => {
                bound.clear();
                CommandRecord::EndRenderTargets
            }
            DummyCommand::ClearRenderTarget { target, texel } => {
                if validate {
                    validator.check_use(target, "clear render target");
                    validator.check_state(target, ResourceState::RenderTarget, "clear render target");
                    if !bound.contains(&target.id()) {
                        validator.report(format!(
                            "clear render target: resource {} is not bound",
                            target.id()
                        ));
                    }
                }
                target.fill(texel)?;
                CommandRecord::ClearRenderTarget { target: target.id() }
            }
            DummyCommand::ClearDepthStencil { target, texel } => {
                if validate {
                    validator.check_use(target, "clear depth");
                    validator.check_state(target, ResourceState::DepthWrite, "clear depth");
                    if !bound.contains(&target.id()) {
                        validator.report(format!(
                            "clear depth: resource {} is not bound",
                            target.id()
                        ));
                    }
                }
                target.fill(texel)?;
                CommandRecord::ClearDepthStencil { target: target.id() }
            }
            DummyCommand::CopyResource {
                source,
                destination,
            } => {
                if validate {
                    validator.check_use(source, "copy source");
                    validator.check_use(destination, "copy destination");
                    validator.check_state(source, ResourceState::CopySource, "copy source");
                    validator.check_state(destination, ResourceState::CopyDest, "copy destination");
                }
                let data = source.read(0, source.size())?;
                destination.write(0, &data)?;
                CommandRecord::CopyResource {
                    source: source.id(),
                    destination: destination.id(),
                }
            }
            DummyCommand::CopyTextureToBuffer {
                source,
                destination,
                layout,
            } => {
                if validate {
                    validator.check_use(source, "copy texture to buffer");
                    validator.check_state(source, ResourceState::CopySource, "copy texture to buffer");
                    validator.check_state(destination, ResourceState::CopyDest, "copy texture to buffer");
                }
                let row_bytes = layout.row_bytes();
                for row in 0..layout.height as u64 {
                    let data = source.read(row * row_bytes, row_bytes)?;
                    destination.write(row * layout.row_pitch, &data)?;
                }
                CommandRecord::CopyTextureToBuffer {
                    source: source.id(),
                    destination: destination.id(),
                }
            }
        };
        Ok(record)
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            heap_tier: self.heap_tier,
            placement_alignment: self.placement_alignment,
            mesh_shading: true,
            ray_tracing: true,
        }
    }

    fn allocation_info(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<AllocationInfo, GraphicsError> {
        let size = descriptor.byte_size();
        if size == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "resource {:?} has zero size",
                descriptor.label()
            )));
        }
        Ok(AllocationInfo {
            size: size.next_multiple_of(self.placement_alignment),
            alignment: self.placement_alignment,
            memory_type_bits: u32::MAX,
        })
    }

    fn creatable_state(
        &self,
        descriptor: &ResourceDescriptor,
        requested: ResourceState,
    ) -> ResourceState {
        match (descriptor, requested) {
            (ResourceDescriptor::Buffer(_), _) => ResourceState::Common,
            (
                ResourceDescriptor::Texture(_),
                ResourceState::RenderTarget | ResourceState::DepthWrite | ResourceState::CopyDest,
            ) => requested,
            (ResourceDescriptor::Texture(_), _) => ResourceState::Common,
        }
    }

    fn create_heap(
        &self,
        category: HeapCategory,
        size: u64,
        _alignment: u64,
        _memory_type_bits: u32,
    ) -> Result<GpuHeap, GraphicsError> {
        log::trace!(
            "DummyBackend: creating {} heap ({} bytes)",
            category.name(),
            size
        );
        let heap = Arc::new(DummyHeap::new(self.allocate_id(), category, size));
        self.heaps.lock().push(Arc::downgrade(&heap));
        Ok(GpuHeap::Dummy(heap))
    }

    fn create_placed_resource(
        &self,
        heap: &GpuHeap,
        offset: u64,
        descriptor: &ResourceDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResource, GraphicsError> {
        let heap = match heap {
            GpuHeap::Dummy(heap) => heap,
            #[cfg(feature = "vulkan-backend")]
            _ => {
                return Err(GraphicsError::InvalidParameter(
                    "heap belongs to another backend".to_string(),
                ))
            }
        };
        let info = self.allocation_info(descriptor)?;
        if offset % info.alignment != 0 || offset + info.size > heap.size() {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "placement of {:?} at offset {} ({} bytes) does not fit heap {} ({} bytes)",
                descriptor.label(),
                offset,
                info.size,
                heap.id(),
                heap.size()
            )));
        }
        log::trace!(
            "DummyBackend: placing {:?} in heap {} at offset {}",
            descriptor.label(),
            heap.id(),
            offset
        );
        Ok(GpuResource::Dummy(Arc::new(DummyResource::new(
            self.allocate_id(),
            descriptor.clone(),
            DummyMemory::Placed {
                heap: Arc::clone(heap),
                offset,
            },
            initial_state,
        ))))
    }

    fn create_committed_resource(
        &self,
        descriptor: &ResourceDescriptor,
        initial_state: ResourceState,
        location: MemoryLocation,
    ) -> Result<GpuResource, GraphicsError> {
        let size = descriptor.byte_size() as usize;
        let fill = match location {
            MemoryLocation::GpuOnly => UNINITIALIZED_BYTE,
            MemoryLocation::GpuToCpu => 0,
        };
        log::trace!(
            "DummyBackend: creating committed {:?} ({} bytes, {:?})",
            descriptor.label(),
            size,
            location
        );
        Ok(GpuResource::Dummy(Arc::new(DummyResource::new(
            self.allocate_id(),
            descriptor.clone(),
            DummyMemory::Committed {
                bytes: Mutex::new(vec![fill; size]),
                location,
            },
            initial_state,
        ))))
    }

    fn swap_chain_descriptor(&self) -> Option<TextureDescriptor> {
        self.swap_chain.as_ref().map(Self::back_buffer_descriptor)
    }

    fn current_back_buffer(&self) -> Option<GpuResource> {
        if self.back_buffers.is_empty() {
            return None;
        }
        let index = self.back_buffer_index.load(Ordering::Acquire) % self.back_buffers.len();
        self.back_buffers.get(index).cloned()
    }

    fn present(&self) -> Result<(), GraphicsError> {
        let Some(GpuResource::Dummy(back_buffer)) = self.current_back_buffer() else {
            return Err(GraphicsError::SurfaceLost);
        };
        if self.validation {
            self.validator
                .lock()
                .check_state(&back_buffer, ResourceState::Present, "present");
        }
        log::trace!("DummyBackend: presenting back buffer {}", back_buffer.id());
        self.back_buffer_index.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn begin_commands(&self) -> Result<GpuCommandList, GraphicsError> {
        Ok(GpuCommandList::Dummy(DummyCommandList::default()))
    }

    fn resource_barriers(
        &self,
        commands: &mut GpuCommandList,
        barriers: &[ResourceBarrier],
    ) -> Result<(), GraphicsError> {
        let list = Self::dummy_commands(commands)?;
        for barrier in barriers {
            let resource = Arc::clone(Self::dummy_resource(barrier.resource())?);
            list.commands.push(match barrier {
                ResourceBarrier::Aliasing { .. } => DummyCommand::Aliasing(resource),
                ResourceBarrier::UnorderedAccess { .. } => DummyCommand::UnorderedAccess(resource),
                ResourceBarrier::Transition { before, after, .. } => DummyCommand::Transition {
                    resource,
                    before: *before,
                    after: *after,
                },
            });
        }
        Ok(())
    }

    fn begin_render_targets(
        &self,
        commands: &mut GpuCommandList,
        binding: &RenderTargetBinding,
    ) -> Result<(), GraphicsError> {
        let color = binding
            .color
            .iter()
            .map(|target| Self::dummy_resource(target).map(Arc::clone))
            .collect::<Result<Vec<_>, _>>()?;
        let depth = binding
            .depth
            .as_ref()
            .map(|target| Self::dummy_resource(target).map(Arc::clone))
            .transpose()?;
        Self::dummy_commands(commands)?
            .commands
            .push(DummyCommand::BeginRenderTargets {
                color,
                depth,
                depth_read_only: binding.depth_read_only,
                width: binding.scissor.width,
                height: binding.scissor.height,
            });
        Ok(())
    }

    fn end_render_targets(&self, commands: &mut GpuCommandList) -> Result<(), GraphicsError> {
        Self::dummy_commands(commands)?
            .commands
            .push(DummyCommand::EndRenderTargets);
        Ok(())
    }

    fn clear_render_target(
        &self,
        commands: &mut GpuCommandList,
        target: &GpuResource,
        color: [f32; 4],
    ) -> Result<(), GraphicsError> {
        let target = Arc::clone(Self::dummy_resource(target)?);
        let texel = encode_color(Self::texture_format(&target)?, color)?;
        Self::dummy_commands(commands)?
            .commands
            .push(DummyCommand::ClearRenderTarget { target, texel });
        Ok(())
    }

    fn clear_depth_stencil(
        &self,
        commands: &mut GpuCommandList,
        target: &GpuResource,
        depth: f32,
        stencil: u8,
    ) -> Result<(), GraphicsError> {
        let target = Arc::clone(Self::dummy_resource(target)?);
        let texel = encode_depth_stencil(Self::texture_format(&target)?, depth, stencil)?;
        Self::dummy_commands(commands)?
            .commands
            .push(DummyCommand::ClearDepthStencil { target, texel });
        Ok(())
    }

    fn copy_resource(
        &self,
        commands: &mut GpuCommandList,
        source: &GpuResource,
        destination: &GpuResource,
    ) -> Result<(), GraphicsError> {
        let source = Arc::clone(Self::dummy_resource(source)?);
        let destination = Arc::clone(Self::dummy_resource(destination)?);
        if source.size() != destination.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "copy between resources of different size ({} and {} bytes)",
                source.size(),
                destination.size()
            )));
        }
        Self::dummy_commands(commands)?
            .commands
            .push(DummyCommand::CopyResource {
                source,
                destination,
            });
        Ok(())
    }

    fn copy_texture_to_buffer(
        &self,
        commands: &mut GpuCommandList,
        source: &GpuResource,
        destination: &GpuResource,
        layout: &TextureCopyLayout,
    ) -> Result<(), GraphicsError> {
        let source = Arc::clone(Self::dummy_resource(source)?);
        let destination = Arc::clone(Self::dummy_resource(destination)?);
        Self::texture_format(&source)?;
        if destination.size() < layout.buffer_size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "readback buffer of {} bytes is smaller than {} bytes",
                destination.size(),
                layout.buffer_size()
            )));
        }
        Self::dummy_commands(commands)?
            .commands
            .push(DummyCommand::CopyTextureToBuffer {
                source,
                destination,
                layout: *layout,
            });
        Ok(())
    }

    fn submit(
        &self,
        commands: GpuCommandList,
        signal_fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        let list = match commands {
            GpuCommandList::Dummy(list) => list,
            #[cfg(feature = "vulkan-backend")]
            _ => {
                return Err(GraphicsError::InvalidParameter(
                    "command list belongs to another backend".to_string(),
                ))
            }
        };
        log::trace!("DummyBackend: submitting {} commands", list.len());

        let mut validator = self.validator.lock();
        let mut bound = Vec::new();
        let records = list
            .commands
            .iter()
            .map(|command| self.apply(command, &mut validator, &mut bound))
            .collect::<Result<Vec<_>, _>>()?;
        drop(validator);

        self.submissions.lock().push(records);
        if let Some(fence) = signal_fence {
            fence.signal_dummy();
        }
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Dummy {
            signaled: AtomicBool::new(signaled),
        })
    }

    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        if self.is_fence_signaled(fence) {
            Ok(())
        } else {
            Err(GraphicsError::Internal(
                "waiting on a fence no submission will signal".to_string(),
            ))
        }
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        match fence {
            GpuFence::Dummy { signaled } => signaled.load(Ordering::Acquire),
            #[cfg(feature = "vulkan-backend")]
            _ => false,
        }
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuResource,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let buffer = Self::dummy_resource(buffer)?;
        let readable = buffer
            .descriptor()
            .as_buffer()
            .is_some_and(BufferDescriptor::is_host_readable);
        match buffer.memory() {
            DummyMemory::Committed {
                location: MemoryLocation::GpuToCpu,
                ..
            } if readable => buffer.read(offset, size),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "resource {} is not host visible",
                buffer.id()
            ))),
        }
    }
}

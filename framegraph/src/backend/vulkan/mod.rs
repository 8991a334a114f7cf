//! Vulkan backend using ash.
//!
//! A headless backend on Vulkan 1.3: dynamic rendering for attachment
//! binding and synchronization2 for barriers. Heaps are gpu-allocator
//! allocations that placed images and buffers are bound into at an offset.
//!
//! There is no presentation surface, so graphs compiled on this backend have
//! no swap chain resource.

mod allocator;
mod command;
mod conversion;
mod debug;
mod device;
mod instance;
mod resource;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::backend::{
    AllocationInfo, BackendCapabilities, GpuBackend, GpuCommandList, GpuFence, GpuHeap,
    GpuResource, HeapCategory, MemoryLocation, RenderTargetBinding, ResourceBarrier,
    TextureCopyLayout,
};
use crate::config::BackendParameters;
use crate::error::GraphicsError;
use crate::types::{ResourceDescriptor, ResourceState, TextureDescriptor};

pub use command::VulkanCommandList;
pub use resource::{VulkanDevice, VulkanHeap, VulkanObject, VulkanResource};

use command::vulkan_resource;
use conversion::state_scope;

/// Timeout for fence waits, in nanoseconds.
const FENCE_TIMEOUT_NS: u64 = 10_000_000_000;

/// A submitted command buffer whose completion has not been observed yet.
struct PendingSubmission {
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    _keep_alive: Vec<GpuResource>,
}

struct CommandState {
    pool: vk::CommandPool,
    pending: Vec<PendingSubmission>,
}

/// Vulkan implementation of [`GpuBackend`].
pub struct VulkanBackend {
    shared: Arc<VulkanDevice>,
    queue: Mutex<vk::Queue>,
    queue_family: u32,
    commands: Mutex<CommandState>,
    capabilities: BackendCapabilities,
    next_resource_id: AtomicU64,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("queue_family", &self.queue_family)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl VulkanBackend {
    /// Create a Vulkan backend.
    ///
    /// Initializes the instance, selects a physical device, creates a logical
    /// device and sets up the memory allocator.
    pub fn with_params(params: &BackendParameters) -> Result<Self, GraphicsError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let validation_errors = Box::new(AtomicU64::new(0));
        let bundle =
            instance::create_instance(&entry, params.validation, &*validation_errors)?;

        let opened = open_device(&bundle.instance);
        let (physical_device, queue_family, device) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                destroy_instance(&bundle);
                return Err(e);
            }
        };

        let allocator =
            match allocator::create_allocator(&bundle.instance, physical_device, device.clone()) {
                Ok(allocator) => allocator,
                Err(e) => {
                    unsafe { device.destroy_device(None) };
                    destroy_instance(&bundle);
                    return Err(e);
                }
            };

        let properties =
            unsafe { bundle.instance.get_physical_device_properties(physical_device) };
        let limits = properties.limits;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        // From here on the shared device owns every object and cleans up on drop.
        let shared = Arc::new(VulkanDevice {
            instance: bundle.instance,
            debug_utils: bundle.debug_utils,
            debug_messenger: bundle.debug_messenger,
            physical_device,
            limits,
            device,
            allocator: Mutex::new(Some(allocator)),
            validation_errors,
            _entry: entry,
        });

        let pool = command::create_command_pool(&shared.device, queue_family)?;

        let capabilities = BackendCapabilities {
            heap_tier: device::heap_tier(&limits),
            placement_alignment: limits.buffer_image_granularity.max(1),
            mesh_shading: false,
            ray_tracing: false,
        };

        log::info!(
            "Vulkan backend initialized (validation: {}, heap tier: {:?})",
            params.validation,
            capabilities.heap_tier
        );

        Ok(Self {
            shared,
            queue: Mutex::new(queue),
            queue_family,
            commands: Mutex::new(CommandState {
                pool,
                pending: Vec::new(),
            }),
            capabilities,
            next_resource_id: AtomicU64::new(1),
        })
    }

    /// The shared device.
    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.shared
    }

    /// Number of error messages reported by the validation layer so far.
    pub fn validation_error_count(&self) -> u64 {
        self.shared.validation_errors.load(Ordering::Relaxed)
    }

    /// Physical device limits.
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.shared.limits
    }

    fn next_id(&self) -> u64 {
        self.next_resource_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record commands through `record` and wait for them to finish.
    fn immediate_submit(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer) -> Result<(), GraphicsError>,
    ) -> Result<(), GraphicsError> {
        let device = &self.shared.device;
        let state = self.commands.lock();
        let cmd = command::begin_command_buffer(device, state.pool)?;

        let result = record(device, cmd).and_then(|()| {
            unsafe { device.end_command_buffer(cmd) }.map_err(|e| {
                GraphicsError::Internal(format!("Failed to end command buffer: {:?}", e))
            })?;
            let command_buffers = [cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            let queue = self.queue.lock();
            unsafe {
                device
                    .queue_submit(*queue, &[submit_info], vk::Fence::null())
                    .map_err(map_submit_error)?;
                device.queue_wait_idle(*queue).map_err(map_submit_error)
            }
        });

        unsafe { device.free_command_buffers(state.pool, &[cmd]) };
        result
    }

    /// Move a freshly created image out of `UNDEFINED` into the layout of its
    /// creation state.
    fn initialize_image_layout(&self, resource: &VulkanResource) -> Result<(), GraphicsError> {
        let VulkanObject::Image { image, aspect, .. } = resource.object() else {
            return Ok(());
        };
        let dst = state_scope(resource.creation_state());
        self.immediate_submit(|device, cmd| {
            let barrier = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::NONE)
                .src_access_mask(vk::AccessFlags2::NONE)
                .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                .dst_access_mask(dst.access)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(dst.layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: vk::REMAINING_ARRAY_LAYERS,
                });
            let barriers = [barrier];
            let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
            unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
            Ok(())
        })
    }

    /// Release submissions whose fence has signaled.
    fn reclaim_finished(&self, state: &mut CommandState, wait_all: bool) {
        let device = &self.shared.device;
        let pool = state.pool;
        state.pending.retain(|submission| {
            let done = wait_all
                || matches!(unsafe { device.get_fence_status(submission.fence) }, Ok(true));
            if done {
                unsafe {
                    device.destroy_fence(submission.fence, None);
                    device.free_command_buffers(pool, &[submission.cmd]);
                }
            }
            !done
        });
    }
}

fn open_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, u32, ash::Device), GraphicsError> {
    let physical_device = device::select_physical_device(instance)?;
    let queue_family = device::find_graphics_queue_family(instance, physical_device)?;
    let device = device::create_logical_device(instance, physical_device, queue_family)?;
    Ok((physical_device, queue_family, device))
}

fn destroy_instance(bundle: &instance::InstanceBundle) {
    unsafe {
        if let (Some(debug_utils), Some(messenger)) = (&bundle.debug_utils, bundle.debug_messenger)
        {
            debug_utils.destroy_debug_utils_messenger(messenger, None);
        }
        bundle.instance.destroy_instance(None);
    }
}

fn map_submit_error(e: vk::Result) -> GraphicsError {
    match e {
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GraphicsError::OutOfMemory
        }
        other => GraphicsError::Internal(format!("Queue operation failed: {:?}", other)),
    }
}

fn vulkan_list(commands: &mut GpuCommandList) -> Result<&mut VulkanCommandList, GraphicsError> {
    match commands {
        GpuCommandList::Vulkan(list) => Ok(list),
        _ => Err(GraphicsError::InvalidParameter(
            "command list was not created by the Vulkan backend".to_string(),
        )),
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let device = &self.shared.device;
        unsafe {
            let _ = device.device_wait_idle();
        }
        let mut state = self.commands.lock();
        self.reclaim_finished(&mut state, true);
        unsafe { device.destroy_command_pool(state.pool, None) };
        log::info!("Vulkan backend destroyed");
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn allocation_info(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<AllocationInfo, GraphicsError> {
        Ok(resource::allocation_info(&self.shared.device, descriptor))
    }

    fn creatable_state(
        &self,
        descriptor: &ResourceDescriptor,
        requested: ResourceState,
    ) -> ResourceState {
        // Images get their first layout from an explicit barrier, so any
        // layout but the presentation one works. Buffers have no layout.
        match descriptor {
            ResourceDescriptor::Texture(_) if requested != ResourceState::Present => requested,
            _ => ResourceState::Common,
        }
    }

    fn create_heap(
        &self,
        category: HeapCategory,
        size: u64,
        alignment: u64,
        memory_type_bits: u32,
    ) -> Result<GpuHeap, GraphicsError> {
        let heap = VulkanHeap::new(
            Arc::clone(&self.shared),
            category,
            size,
            alignment,
            memory_type_bits,
        )?;
        log::debug!("Created {} heap of {} bytes", category.name(), size);
        Ok(GpuHeap::Vulkan(Arc::new(heap)))
    }

    fn create_placed_resource(
        &self,
        heap: &GpuHeap,
        offset: u64,
        descriptor: &ResourceDescriptor,
        initial_state: ResourceState,
    ) -> Result<GpuResource, GraphicsError> {
        let GpuHeap::Vulkan(heap) = heap else {
            return Err(GraphicsError::InvalidParameter(
                "heap was not created by the Vulkan backend".to_string(),
            ));
        };
        if offset >= heap.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "placement offset {} outside heap of {} bytes",
                offset,
                heap.size()
            )));
        }
        let resource = resource::create_placed(
            &self.shared,
            self.next_id(),
            heap,
            offset,
            descriptor,
            initial_state,
        )?;
        Ok(GpuResource::Vulkan(Arc::new(resource)))
    }

    fn create_committed_resource(
        &self,
        descriptor: &ResourceDescriptor,
        initial_state: ResourceState,
        location: MemoryLocation,
    ) -> Result<GpuResource, GraphicsError> {
        let resource = resource::create_committed(
            &self.shared,
            self.next_id(),
            descriptor,
            initial_state,
            location,
        )?;
        self.initialize_image_layout(&resource)?;
        Ok(GpuResource::Vulkan(Arc::new(resource)))
    }

    fn swap_chain_descriptor(&self) -> Option<TextureDescriptor> {
        None
    }

    fn current_back_buffer(&self) -> Option<GpuResource> {
        None
    }

    fn present(&self) -> Result<(), GraphicsError> {
        Err(GraphicsError::FeatureNotSupported(
            "the Vulkan backend is headless and cannot present".to_string(),
        ))
    }

    fn begin_commands(&self) -> Result<GpuCommandList, GraphicsError> {
        let mut state = self.commands.lock();
        self.reclaim_finished(&mut state, false);
        let cmd = command::begin_command_buffer(&self.shared.device, state.pool)?;
        Ok(GpuCommandList::Vulkan(VulkanCommandList::new(cmd)))
    }

    fn resource_barriers(
        &self,
        commands: &mut GpuCommandList,
        barriers: &[ResourceBarrier],
    ) -> Result<(), GraphicsError> {
        let list = vulkan_list(commands)?;
        {
            let _pool = self.commands.lock();
            command::record_barriers(&self.shared.device, list.cmd, barriers)?;
        }
        for barrier in barriers {
            list.retain(barrier.resource());
        }
        Ok(())
    }

    fn begin_render_targets(
        &self,
        commands: &mut GpuCommandList,
        binding: &RenderTargetBinding,
    ) -> Result<(), GraphicsError> {
        let list = vulkan_list(commands)?;
        let _pool = self.commands.lock();
        command::begin_rendering(&self.shared.device, list, binding)
    }

    fn end_render_targets(&self, commands: &mut GpuCommandList) -> Result<(), GraphicsError> {
        let list = vulkan_list(commands)?;
        let _pool = self.commands.lock();
        command::end_rendering(&self.shared.device, list)
    }

    fn clear_render_target(
        &self,
        commands: &mut GpuCommandList,
        target: &GpuResource,
        color: [f32; 4],
    ) -> Result<(), GraphicsError> {
        let list = vulkan_list(commands)?;
        let _pool = self.commands.lock();
        command::clear_color(&self.shared.device, list, vulkan_resource(target)?, color)
    }

    fn clear_depth_stencil(
        &self,
        commands: &mut GpuCommandList,
        target: &GpuResource,
        depth: f32,
        stencil: u8,
    ) -> Result<(), GraphicsError> {
        let list = vulkan_list(commands)?;
        let _pool = self.commands.lock();
        command::clear_depth_stencil(
            &self.shared.device,
            list,
            vulkan_resource(target)?,
            depth,
            stencil,
        )
    }

    fn copy_resource(
        &self,
        commands: &mut GpuCommandList,
        source: &GpuResource,
        destination: &GpuResource,
    ) -> Result<(), GraphicsError> {
        let list = vulkan_list(commands)?;
        {
            let _pool = self.commands.lock();
            command::copy_resource(
                &self.shared.device,
                list.cmd,
                vulkan_resource(source)?,
                vulkan_resource(destination)?,
            )?;
        }
        list.retain(source);
        list.retain(destination);
        Ok(())
    }

    fn copy_texture_to_buffer(
        &self,
        commands: &mut GpuCommandList,
        source: &GpuResource,
        destination: &GpuResource,
        layout: &TextureCopyLayout,
    ) -> Result<(), GraphicsError> {
        let list = vulkan_list(commands)?;
        {
            let _pool = self.commands.lock();
            command::copy_texture_to_buffer(
                &self.shared.device,
                list.cmd,
                vulkan_resource(source)?,
                vulkan_resource(destination)?,
                layout,
            )?;
        }
        list.retain(source);
        list.retain(destination);
        Ok(())
    }

    fn submit(
        &self,
        commands: GpuCommandList,
        signal_fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        let GpuCommandList::Vulkan(list) = commands else {
            return Err(GraphicsError::InvalidParameter(
                "command list was not created by the Vulkan backend".to_string(),
            ));
        };
        if list.rendering {
            return Err(GraphicsError::InvalidParameter(
                "cannot submit while render targets are bound".to_string(),
            ));
        }
        let user_fence = match signal_fence {
            Some(GpuFence::Vulkan { fence, .. }) => Some(*fence),
            Some(_) => {
                return Err(GraphicsError::InvalidParameter(
                    "fence was not created by the Vulkan backend".to_string(),
                ))
            }
            None => None,
        };

        let device = &self.shared.device;
        let mut state = self.commands.lock();
        unsafe { device.end_command_buffer(list.cmd) }.map_err(|e| {
            GraphicsError::Internal(format!("Failed to end command buffer: {:?}", e))
        })?;

        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(|e| GraphicsError::Internal(format!("Failed to create fence: {:?}", e)))?;

        let command_buffers = [list.cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        {
            let queue = self.queue.lock();
            let submitted = unsafe { device.queue_submit(*queue, &[submit_info], fence) }
                .map_err(map_submit_error)
                .and_then(|()| match user_fence {
                    // An empty submission signals once all prior work completes.
                    Some(user_fence) => unsafe { device.queue_submit(*queue, &[], user_fence) }
                        .map_err(map_submit_error),
                    None => Ok(()),
                });
            if let Err(e) = submitted {
                unsafe {
                    let _ = device.queue_wait_idle(*queue);
                    device.destroy_fence(fence, None);
                    device.free_command_buffers(state.pool, &[list.cmd]);
                }
                return Err(e);
            }
        }

        state.pending.push(PendingSubmission {
            cmd: list.cmd,
            fence,
            _keep_alive: list.keep_alive,
        });
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.shared.device.create_fence(&fence_info, None) }
            .map_err(|e| GraphicsError::Internal(format!("Failed to create fence: {:?}", e)))?;
        Ok(GpuFence::Vulkan {
            device: self.shared.device.clone(),
            fence,
        })
    }

    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let GpuFence::Vulkan { device, fence } = fence else {
            return Err(GraphicsError::InvalidParameter(
                "fence was not created by the Vulkan backend".to_string(),
            ));
        };
        match unsafe { device.wait_for_fences(&[*fence], true, FENCE_TIMEOUT_NS) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                log::warn!("Fence wait timed out after 10 seconds");
                Err(GraphicsError::Internal("fence wait timed out".to_string()))
            }
            Err(e) => Err(map_submit_error(e)),
        }
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        match fence {
            GpuFence::Vulkan { device, fence } => {
                matches!(unsafe { device.get_fence_status(*fence) }, Ok(true))
            }
            _ => false,
        }
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        unsafe { self.shared.device.device_wait_idle() }.map_err(map_submit_error)?;
        let mut state = self.commands.lock();
        self.reclaim_finished(&mut state, true);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuResource,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        vulkan_resource(buffer)?.read_mapped(offset, size)
    }
}

static_assertions::assert_impl_all!(VulkanBackend: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferDescriptor, BufferUsage, TextureFormat, TextureUsage};

    fn try_backend() -> Option<VulkanBackend> {
        match VulkanBackend::with_params(&BackendParameters::default().with_validation(true)) {
            Ok(backend) => Some(backend),
            Err(e) => {
                eprintln!("Skipping Vulkan test: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_committed_readback_buffer_bounds() {
        let Some(backend) = try_backend() else {
            return;
        };
        let descriptor: ResourceDescriptor =
            BufferDescriptor::new(256, BufferUsage::MAP_READ | BufferUsage::COPY_DST).into();
        let buffer = backend
            .create_committed_resource(
                &descriptor,
                ResourceState::CopyDest,
                MemoryLocation::GpuToCpu,
            )
            .unwrap();
        assert_eq!(backend.read_buffer(&buffer, 0, 256).unwrap().len(), 256);
        assert!(backend.read_buffer(&buffer, 128, 256).is_err());
        assert_eq!(backend.validation_error_count(), 0);
    }

    #[test]
    fn test_texture_created_in_requested_state() {
        let Some(backend) = try_backend() else {
            return;
        };
        let texture: ResourceDescriptor = TextureDescriptor::new_2d(
            8,
            8,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        )
        .into();
        assert_eq!(
            backend.creatable_state(&texture, ResourceState::ShaderResource),
            ResourceState::ShaderResource
        );
        assert_eq!(
            backend.creatable_state(&texture, ResourceState::Present),
            ResourceState::Common
        );
    }

    #[test]
    fn test_fence_signaled_after_empty_frame() {
        let Some(backend) = try_backend() else {
            return;
        };
        let fence = backend.create_fence(false).unwrap();
        let commands = backend.begin_commands().unwrap();
        backend.submit(commands, Some(&fence)).unwrap();
        backend.wait_fence(&fence).unwrap();
        assert!(backend.is_fence_signaled(&fence));
        backend.wait_idle().unwrap();
    }

    #[test]
    fn test_headless_has_no_swap_chain() {
        let Some(backend) = try_backend() else {
            return;
        };
        assert!(backend.swap_chain_descriptor().is_none());
        assert!(backend.current_back_buffer().is_none());
        assert!(matches!(
            backend.present(),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }
}

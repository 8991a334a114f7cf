//! Vulkan device ownership, heaps and resources.
//!
//! Heaps and resources keep the [`VulkanDevice`] alive through an `Arc`, so
//! the logical device is destroyed only after the last GPU object created
//! from it.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::backend::{AllocationInfo, HeapCategory, MemoryLocation};
use crate::error::GraphicsError;
use crate::types::{ResourceDescriptor, ResourceState, TextureDescriptor, TextureDimension, TextureUsage};

use super::allocator;
use super::conversion::{aspect_mask, convert_buffer_usage, convert_texture_format, image_create_info};

/// Instance, logical device and allocator shared by every Vulkan object.
pub struct VulkanDevice {
    pub(super) instance: ash::Instance,
    pub(super) debug_utils: Option<ash::ext::debug_utils::Instance>,
    pub(super) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    pub(super) physical_device: vk::PhysicalDevice,
    pub(super) limits: vk::PhysicalDeviceLimits,
    pub(super) device: ash::Device,
    pub(super) allocator: Mutex<Option<Allocator>>,
    /// Referenced by the debug messenger; boxed so its address is stable.
    pub(super) validation_errors: Box<AtomicU64>,
    // Dropped last: unloads the Vulkan library.
    pub(super) _entry: ash::Entry,
}

impl VulkanDevice {
    /// The logical device.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// The physical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // The allocator frees its memory blocks and must go before the device.
            self.allocator.lock().take();
            self.device.destroy_device(None);
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::info!("Vulkan device destroyed");
    }
}

/// Device memory transient resources are placed in.
pub struct VulkanHeap {
    device: Arc<VulkanDevice>,
    category: HeapCategory,
    allocation: Mutex<Option<Allocation>>,
    memory: vk::DeviceMemory,
    base_offset: u64,
    size: u64,
}

impl VulkanHeap {
    pub(super) fn new(
        device: Arc<VulkanDevice>,
        category: HeapCategory,
        size: u64,
        alignment: u64,
        memory_type_bits: u32,
    ) -> Result<Self, GraphicsError> {
        let requirements = vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits,
        };
        let allocation = allocator::allocate(
            &device.allocator,
            category.name(),
            requirements,
            MemoryLocation::GpuOnly,
            category == HeapCategory::Buffers,
        )?;
        // SAFETY: the allocation is alive until this heap is dropped
        let memory = unsafe { allocation.memory() };
        let base_offset = allocation.offset();
        Ok(Self {
            device,
            category,
            allocation: Mutex::new(Some(allocation)),
            memory,
            base_offset,
            size,
        })
    }

    /// Size of the heap in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Resource category the heap holds.
    pub fn category(&self) -> HeapCategory {
        self.category
    }
}

impl Drop for VulkanHeap {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.lock().take() {
            allocator::free(&self.device.allocator, allocation);
        }
    }
}

/// The Vulkan object behind a resource.
#[derive(Debug, Clone, Copy)]
pub enum VulkanObject {
    /// An image, with a view when it can be bound as an attachment.
    Image {
        image: vk::Image,
        view: Option<vk::ImageView>,
        aspect: vk::ImageAspectFlags,
    },
    /// A buffer.
    Buffer { buffer: vk::Buffer, size: u64 },
}

enum ResourceMemory {
    Placed(Arc<VulkanHeap>),
    Committed(Mutex<Option<Allocation>>),
}

/// A Vulkan image or buffer with bound memory.
pub struct VulkanResource {
    id: u64,
    descriptor: ResourceDescriptor,
    creation_state: ResourceState,
    object: VulkanObject,
    memory: ResourceMemory,
    device: Arc<VulkanDevice>,
}

impl VulkanResource {
    /// Backend-unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Descriptor the resource was created from.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// State the resource was created in.
    pub fn creation_state(&self) -> ResourceState {
        self.creation_state
    }

    /// The underlying image or buffer.
    pub fn object(&self) -> VulkanObject {
        self.object
    }

    /// Image view for attachment binding.
    pub fn view(&self) -> Option<vk::ImageView> {
        match self.object {
            VulkanObject::Image { view, .. } => view,
            VulkanObject::Buffer { .. } => None,
        }
    }

    /// Copy `size` bytes at `offset` out of host-visible memory.
    pub(super) fn read_mapped(&self, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        let ResourceMemory::Committed(allocation) = &self.memory else {
            return Err(GraphicsError::InvalidParameter(
                "placed resources are not host visible".to_string(),
            ));
        };
        let allocation = allocation.lock();
        let bytes = allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_slice())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "resource {} is not host visible",
                    self.id
                ))
            })?;
        let start = offset as usize;
        let end = start + size as usize;
        bytes
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or(GraphicsError::OutOfRange {
                what: "buffer byte",
                index: end,
                len: bytes.len(),
            })
    }
}

impl Drop for VulkanResource {
    fn drop(&mut self) {
        let device = &self.device.device;
        unsafe {
            match self.object {
                VulkanObject::Image { image, view, .. } => {
                    if let Some(view) = view {
                        device.destroy_image_view(view, None);
                    }
                    device.destroy_image(image, None);
                }
                VulkanObject::Buffer { buffer, .. } => device.destroy_buffer(buffer, None),
            }
        }
        if let ResourceMemory::Committed(allocation) = &self.memory {
            if let Some(allocation) = allocation.lock().take() {
                allocator::free(&self.device.allocator, allocation);
            }
        }
    }
}

// ============================================================================
// Creation
// ============================================================================

fn buffer_create_info(size: u64, usage: vk::BufferUsageFlags) -> vk::BufferCreateInfo<'static> {
    vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
}

/// Memory requirements of a resource, queried without creating it.
pub(super) fn allocation_info(
    device: &ash::Device,
    descriptor: &ResourceDescriptor,
) -> AllocationInfo {
    let mut requirements = vk::MemoryRequirements2::default();
    match descriptor {
        ResourceDescriptor::Texture(texture) => {
            let create_info = image_create_info(texture);
            let query = vk::DeviceImageMemoryRequirements::default().create_info(&create_info);
            unsafe { device.get_device_image_memory_requirements(&query, &mut requirements) };
        }
        ResourceDescriptor::Buffer(buffer) => {
            let create_info = buffer_create_info(buffer.size, convert_buffer_usage(buffer.usage));
            let query = vk::DeviceBufferMemoryRequirements::default().create_info(&create_info);
            unsafe { device.get_device_buffer_memory_requirements(&query, &mut requirements) };
        }
    }
    let requirements = requirements.memory_requirements;
    AllocationInfo {
        size: requirements.size,
        alignment: requirements.alignment,
        memory_type_bits: requirements.memory_type_bits,
    }
}

fn create_object(
    device: &ash::Device,
    descriptor: &ResourceDescriptor,
) -> Result<VulkanObject, GraphicsError> {
    match descriptor {
        ResourceDescriptor::Texture(texture) => {
            let image = unsafe { device.create_image(&image_create_info(texture), None) }
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "Failed to create image: {:?}",
                        e
                    ))
                })?;
            Ok(VulkanObject::Image {
                image,
                view: None,
                aspect: aspect_mask(texture.format),
            })
        }
        ResourceDescriptor::Buffer(buffer) => {
            let create_info = buffer_create_info(buffer.size, convert_buffer_usage(buffer.usage));
            let raw = unsafe { device.create_buffer(&create_info, None) }.map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {:?}", e))
            })?;
            Ok(VulkanObject::Buffer {
                buffer: raw,
                size: buffer.size,
            })
        }
    }
}

fn destroy_object(device: &ash::Device, object: VulkanObject) {
    unsafe {
        match object {
            VulkanObject::Image { image, view, .. } => {
                if let Some(view) = view {
                    device.destroy_image_view(view, None);
                }
                device.destroy_image(image, None);
            }
            VulkanObject::Buffer { buffer, .. } => device.destroy_buffer(buffer, None),
        }
    }
}

fn create_attachment_view(
    device: &ash::Device,
    image: vk::Image,
    texture: &TextureDescriptor,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView, GraphicsError> {
    let view_type = match texture.dimension {
        TextureDimension::D1 => vk::ImageViewType::TYPE_1D,
        TextureDimension::D2 => vk::ImageViewType::TYPE_2D,
        TextureDimension::D3 => vk::ImageViewType::TYPE_3D,
    };
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(convert_texture_format(texture.format))
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&view_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create image view: {:?}", e))
    })
}

/// Bind `memory` at `offset` and create the attachment view if needed.
fn bind_object(
    device: &ash::Device,
    object: VulkanObject,
    descriptor: &ResourceDescriptor,
    memory: vk::DeviceMemory,
    offset: u64,
) -> Result<VulkanObject, GraphicsError> {
    match (object, descriptor) {
        (VulkanObject::Image { image, aspect, .. }, ResourceDescriptor::Texture(texture)) => {
            unsafe { device.bind_image_memory(image, memory, offset) }.map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to bind image memory: {:?}",
                    e
                ))
            })?;
            let view = if texture.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
                Some(create_attachment_view(device, image, texture, aspect)?)
            } else {
                None
            };
            Ok(VulkanObject::Image {
                image,
                view,
                aspect,
            })
        }
        (VulkanObject::Buffer { buffer, .. }, _) => {
            unsafe { device.bind_buffer_memory(buffer, memory, offset) }.map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to bind buffer memory: {:?}",
                    e
                ))
            })?;
            Ok(object)
        }
        (VulkanObject::Image { .. }, ResourceDescriptor::Buffer(_)) => Err(
            GraphicsError::Internal("image created for a buffer descriptor".to_string()),
        ),
    }
}

/// Create a resource aliasing `heap` at `offset`.
pub(super) fn create_placed(
    device: &Arc<VulkanDevice>,
    id: u64,
    heap: &Arc<VulkanHeap>,
    offset: u64,
    descriptor: &ResourceDescriptor,
    creation_state: ResourceState,
) -> Result<VulkanResource, GraphicsError> {
    let raw = &device.device;
    let object = create_object(raw, descriptor)?;
    let object = match bind_object(raw, object, descriptor, heap.memory, heap.base_offset + offset)
    {
        Ok(object) => object,
        Err(e) => {
            destroy_object(raw, object);
            return Err(e);
        }
    };
    Ok(VulkanResource {
        id,
        descriptor: descriptor.clone(),
        creation_state,
        object,
        memory: ResourceMemory::Placed(Arc::clone(heap)),
        device: Arc::clone(device),
    })
}

/// Create a resource with its own allocation.
pub(super) fn create_committed(
    device: &Arc<VulkanDevice>,
    id: u64,
    descriptor: &ResourceDescriptor,
    creation_state: ResourceState,
    location: MemoryLocation,
) -> Result<VulkanResource, GraphicsError> {
    let raw = &device.device;
    let object = create_object(raw, descriptor)?;
    let requirements = unsafe {
        match object {
            VulkanObject::Image { image, .. } => raw.get_image_memory_requirements(image),
            VulkanObject::Buffer { buffer, .. } => raw.get_buffer_memory_requirements(buffer),
        }
    };
    let allocation = match allocator::allocate(
        &device.allocator,
        descriptor.label().unwrap_or("committed resource"),
        requirements,
        location,
        descriptor.is_buffer(),
    ) {
        Ok(allocation) => allocation,
        Err(e) => {
            destroy_object(raw, object);
            return Err(e);
        }
    };
    // SAFETY: the allocation is owned by the resource and freed after the object
    let memory = unsafe { allocation.memory() };
    let object = match bind_object(raw, object, descriptor, memory, allocation.offset()) {
        Ok(object) => object,
        Err(e) => {
            destroy_object(raw, object);
            allocator::free(&device.allocator, allocation);
            return Err(e);
        }
    };
    Ok(VulkanResource {
        id,
        descriptor: descriptor.clone(),
        creation_state,
        object,
        memory: ResourceMemory::Committed(Mutex::new(Some(allocation))),
        device: Arc::clone(device),
    })
}

//! GPU memory allocator integration using gpu-allocator.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation as AllocatorLocation;
use parking_lot::Mutex;

use crate::backend::MemoryLocation;
use crate::error::GraphicsError;

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, GraphicsError> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
    })
}

/// Map a frame graph memory location to a gpu-allocator location.
pub fn allocator_location(location: MemoryLocation) -> AllocatorLocation {
    match location {
        MemoryLocation::GpuOnly => AllocatorLocation::GpuOnly,
        MemoryLocation::GpuToCpu => AllocatorLocation::GpuToCpu,
    }
}

/// Allocate memory for `requirements`.
///
/// `allocator` is `None` only while the device is being torn down.
pub fn allocate(
    allocator: &Mutex<Option<Allocator>>,
    name: &str,
    requirements: vk::MemoryRequirements,
    location: MemoryLocation,
    linear: bool,
) -> Result<Allocation, GraphicsError> {
    let mut allocator = allocator.lock();
    let Some(allocator) = allocator.as_mut() else {
        return Err(GraphicsError::DeviceLost);
    };
    allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: allocator_location(location),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| match e {
            gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
            other => GraphicsError::ResourceCreationFailed(format!(
                "Failed to allocate memory for {}: {}",
                name, other
            )),
        })
}

/// Return `allocation` to the allocator.
pub fn free(allocator: &Mutex<Option<Allocator>>, allocation: Allocation) {
    let mut allocator = allocator.lock();
    if let Some(allocator) = allocator.as_mut() {
        if let Err(e) = allocator.free(allocation) {
            log::warn!("Failed to free GPU allocation: {}", e);
        }
    }
}

//! Type conversions between frame graph types and Vulkan types.

use ash::vk;

use crate::types::{
    BufferUsage, ResourceState, TextureDescriptor, TextureDimension, TextureFormat, TextureUsage,
};

/// Convert BufferUsage flags to Vulkan buffer usage flags.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        result |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    // Readback buffers are always copy destinations.
    if usage.intersects(BufferUsage::COPY_DST | BufferUsage::MAP_READ) {
        result |= vk::BufferUsageFlags::TRANSFER_DST;
    }

    result
}

/// Convert TextureFormat to Vulkan format.
pub fn convert_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8Unorm => vk::Format::R8_UNORM,
        TextureFormat::R8Uint => vk::Format::R8_UINT,
        TextureFormat::R16Float => vk::Format::R16_SFLOAT,
        TextureFormat::Rg8Unorm => vk::Format::R8G8_UNORM,
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::R32Uint => vk::Format::R32_UINT,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rg32Float => vk::Format::R32G32_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Depth16Unorm => vk::Format::D16_UNORM,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Convert TextureUsage flags to Vulkan image usage flags.
///
/// RENDER_ATTACHMENT maps to a color or depth/stencil attachment depending on
/// the format.
pub fn convert_texture_usage(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        result |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        if format.is_depth_stencil() {
            result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }

    result
}

/// Aspects covered by views and barriers of an image with `format`.
pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Image create info for `descriptor`, without usage-derived flags applied
/// by the caller.
pub fn image_create_info(descriptor: &TextureDescriptor) -> vk::ImageCreateInfo<'static> {
    let (image_type, extent, array_layers) = match descriptor.dimension {
        TextureDimension::D1 => (
            vk::ImageType::TYPE_1D,
            vk::Extent3D {
                width: descriptor.size.width,
                height: 1,
                depth: 1,
            },
            descriptor.size.depth_or_array_layers.max(1),
        ),
        TextureDimension::D2 => (
            vk::ImageType::TYPE_2D,
            vk::Extent3D {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth: 1,
            },
            descriptor.size.depth_or_array_layers.max(1),
        ),
        TextureDimension::D3 => (
            vk::ImageType::TYPE_3D,
            vk::Extent3D {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth: descriptor.size.depth_or_array_layers.max(1),
            },
            1,
        ),
    };

    let flags = if descriptor.view_formats.is_empty() {
        vk::ImageCreateFlags::empty()
    } else {
        vk::ImageCreateFlags::MUTABLE_FORMAT
    };

    vk::ImageCreateInfo::default()
        .flags(flags)
        .image_type(image_type)
        .format(convert_texture_format(descriptor.format))
        .extent(extent)
        .mip_levels(descriptor.mip_level_count.max(1))
        .array_layers(array_layers)
        .samples(convert_sample_count(descriptor.sample_count))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(convert_texture_usage(descriptor.usage, descriptor.format))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

/// Convert a sample count to Vulkan sample count flags.
pub fn convert_sample_count(count: u32) -> vk::SampleCountFlags {
    match count {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Synchronization scope of a resource state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateScope {
    /// Image layout for the state.
    pub layout: vk::ImageLayout,
    /// Pipeline stages accessing the resource in this state.
    pub stages: vk::PipelineStageFlags2,
    /// Memory accesses performed in this state.
    pub access: vk::AccessFlags2,
}

/// Map a resource state to its Vulkan layout, stages and access mask.
pub fn state_scope(state: ResourceState) -> StateScope {
    let shader_stages = vk::PipelineStageFlags2::VERTEX_SHADER
        | vk::PipelineStageFlags2::FRAGMENT_SHADER
        | vk::PipelineStageFlags2::COMPUTE_SHADER;
    match state {
        ResourceState::Common => StateScope {
            layout: vk::ImageLayout::GENERAL,
            stages: vk::PipelineStageFlags2::ALL_COMMANDS,
            access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        },
        ResourceState::RenderTarget => StateScope {
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            stages: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            access: vk::AccessFlags2::COLOR_ATTACHMENT_READ
                | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        },
        ResourceState::DepthWrite => StateScope {
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            stages: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        },
        ResourceState::DepthRead => StateScope {
            layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            stages: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
                | shader_stages,
            access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::SHADER_SAMPLED_READ,
        },
        ResourceState::ShaderResource => StateScope {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            stages: shader_stages,
            access: vk::AccessFlags2::SHADER_SAMPLED_READ | vk::AccessFlags2::SHADER_STORAGE_READ,
        },
        ResourceState::UnorderedAccess => StateScope {
            layout: vk::ImageLayout::GENERAL,
            stages: shader_stages,
            access: vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        },
        ResourceState::CopySource => StateScope {
            layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            stages: vk::PipelineStageFlags2::COPY,
            access: vk::AccessFlags2::TRANSFER_READ,
        },
        ResourceState::CopyDest => StateScope {
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            stages: vk::PipelineStageFlags2::COPY,
            access: vk::AccessFlags2::TRANSFER_WRITE,
        },
        ResourceState::Present => StateScope {
            layout: vk::ImageLayout::PRESENT_SRC_KHR,
            stages: vk::PipelineStageFlags2::NONE,
            access: vk::AccessFlags2::NONE,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_usage_maps_to_depth_attachment() {
        let usage = convert_texture_usage(TextureUsage::RENDER_ATTACHMENT, TextureFormat::Depth32Float);
        assert!(usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(!usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn test_readback_buffer_is_transfer_destination() {
        let usage = convert_buffer_usage(BufferUsage::MAP_READ);
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn test_aspect_mask() {
        assert_eq!(aspect_mask(TextureFormat::Rgba8Unorm), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_mask(TextureFormat::Depth32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_mask(TextureFormat::Depth24PlusStencil8),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_unordered_access_and_common_share_general_layout() {
        assert_eq!(
            state_scope(ResourceState::UnorderedAccess).layout,
            state_scope(ResourceState::Common).layout
        );
        assert_eq!(
            state_scope(ResourceState::CopyDest).layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
    }

    #[test]
    fn test_image_create_info_3d() {
        let desc = TextureDescriptor::new_3d(8, 8, 4, TextureFormat::R32Float, TextureUsage::STORAGE_BINDING);
        let info = image_create_info(&desc);
        assert_eq!(info.image_type, vk::ImageType::TYPE_3D);
        assert_eq!(info.extent.depth, 4);
        assert_eq!(info.array_layers, 1);
    }
}

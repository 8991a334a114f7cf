//! Vulkan command pool, command buffers and recording helpers.

use ash::vk;

use crate::backend::{GpuResource, RenderTargetBinding, ResourceBarrier, TextureCopyLayout};
use crate::error::GraphicsError;
use crate::types::TextureDimension;

use super::conversion::state_scope;
use super::resource::{VulkanObject, VulkanResource};

/// Create a command pool for graphics operations.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, GraphicsError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
    })
}

/// Allocate one primary command buffer and begin recording it.
pub fn begin_command_buffer(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer, GraphicsError> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let cmd = unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(|e| {
            GraphicsError::Internal(format!("Failed to allocate command buffer: {:?}", e))
        })?
        .into_iter()
        .next()
        .ok_or_else(|| GraphicsError::Internal("No command buffer allocated".to_string()))?;

    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    if let Err(e) = unsafe { device.begin_command_buffer(cmd, &begin_info) } {
        unsafe { device.free_command_buffers(pool, &[cmd]) };
        return Err(GraphicsError::Internal(format!(
            "Failed to begin command buffer: {:?}",
            e
        )));
    }
    Ok(cmd)
}

/// A command buffer recording one frame.
///
/// Resources referenced by recorded commands are kept alive until the
/// submission completes.
pub struct VulkanCommandList {
    pub(super) cmd: vk::CommandBuffer,
    pub(super) keep_alive: Vec<GpuResource>,
    pub(super) color_targets: Vec<u64>,
    pub(super) depth_target: Option<u64>,
    pub(super) render_area: vk::Rect2D,
    pub(super) rendering: bool,
}

impl VulkanCommandList {
    pub(super) fn new(cmd: vk::CommandBuffer) -> Self {
        Self {
            cmd,
            keep_alive: Vec::new(),
            color_targets: Vec::new(),
            depth_target: None,
            render_area: vk::Rect2D::default(),
            rendering: false,
        }
    }

    /// The raw command buffer.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    pub(super) fn retain(&mut self, resource: &GpuResource) {
        self.keep_alive.push(resource.clone());
    }
}

/// Extract the Vulkan resource behind a backend handle.
pub(super) fn vulkan_resource(resource: &GpuResource) -> Result<&VulkanResource, GraphicsError> {
    match resource {
        GpuResource::Vulkan(resource) => Ok(resource),
        _ => Err(GraphicsError::InvalidParameter(
            "resource was not created by the Vulkan backend".to_string(),
        )),
    }
}

fn full_subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

/// Record `barriers` as one dependency.
///
/// Aliasing barriers discard previous contents: images move from
/// `UNDEFINED` into the layout of their creation state.
pub fn record_barriers(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    barriers: &[ResourceBarrier],
) -> Result<(), GraphicsError> {
    let mut image_barriers = Vec::new();
    let mut buffer_barriers = Vec::new();
    let mut memory_barriers = Vec::new();

    for barrier in barriers {
        let resource = vulkan_resource(barrier.resource())?;
        match (barrier, resource.object()) {
            (ResourceBarrier::Aliasing { .. }, VulkanObject::Image { image, aspect, .. }) => {
                let dst = state_scope(resource.creation_state());
                image_barriers.push(
                    vk::ImageMemoryBarrier2::default()
                        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
                        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                        .dst_access_mask(dst.access)
                        .old_layout(vk::ImageLayout::UNDEFINED)
                        .new_layout(dst.layout)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image)
                        .subresource_range(full_subresource_range(aspect)),
                );
            }
            (ResourceBarrier::Aliasing { .. }, VulkanObject::Buffer { buffer, .. }) => {
                buffer_barriers.push(
                    vk::BufferMemoryBarrier2::default()
                        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
                        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                        .dst_access_mask(
                            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                        )
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                );
            }
            (ResourceBarrier::UnorderedAccess { .. }, _) => {
                let shader_stages = vk::PipelineStageFlags2::VERTEX_SHADER
                    | vk::PipelineStageFlags2::FRAGMENT_SHADER
                    | vk::PipelineStageFlags2::COMPUTE_SHADER;
                memory_barriers.push(
                    vk::MemoryBarrier2::default()
                        .src_stage_mask(shader_stages)
                        .src_access_mask(vk::AccessFlags2::SHADER_STORAGE_WRITE)
                        .dst_stage_mask(shader_stages)
                        .dst_access_mask(
                            vk::AccessFlags2::SHADER_STORAGE_READ
                                | vk::AccessFlags2::SHADER_STORAGE_WRITE,
                        ),
                );
            }
            (
                ResourceBarrier::Transition { before, after, .. },
                VulkanObject::Image { image, aspect, .. },
            ) => {
                let src = state_scope(*before);
                let dst = state_scope(*after);
                image_barriers.push(
                    vk::ImageMemoryBarrier2::default()
                        .src_stage_mask(src.stages)
                        .src_access_mask(src.access)
                        .dst_stage_mask(dst.stages)
                        .dst_access_mask(dst.access)
                        .old_layout(src.layout)
                        .new_layout(dst.layout)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image)
                        .subresource_range(full_subresource_range(aspect)),
                );
            }
            (ResourceBarrier::Transition { before, after, .. }, VulkanObject::Buffer { buffer, .. }) => {
                let src = state_scope(*before);
                let dst = state_scope(*after);
                buffer_barriers.push(
                    vk::BufferMemoryBarrier2::default()
                        .src_stage_mask(src.stages)
                        .src_access_mask(src.access)
                        .dst_stage_mask(dst.stages)
                        .dst_access_mask(dst.access)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                );
            }
        }
    }

    if image_barriers.is_empty() && buffer_barriers.is_empty() && memory_barriers.is_empty() {
        return Ok(());
    }

    let dependency = vk::DependencyInfo::default()
        .memory_barriers(&memory_barriers)
        .buffer_memory_barriers(&buffer_barriers)
        .image_memory_barriers(&image_barriers);
    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
    Ok(())
}

/// Begin dynamic rendering into `binding` and set viewport and scissor.
pub fn begin_rendering(
    device: &ash::Device,
    list: &mut VulkanCommandList,
    binding: &RenderTargetBinding,
) -> Result<(), GraphicsError> {
    if list.rendering {
        return Err(GraphicsError::InvalidParameter(
            "render targets are already bound".to_string(),
        ));
    }

    let mut color_ids = Vec::with_capacity(binding.color.len());
    let mut color_attachments = Vec::with_capacity(binding.color.len());
    for target in &binding.color {
        let resource = vulkan_resource(target)?;
        let view = resource.view().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "resource {} cannot be bound as a color attachment",
                resource.id()
            ))
        })?;
        color_ids.push(resource.id());
        color_attachments.push(
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE),
        );
    }

    let depth_layout = if binding.depth_read_only {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    };
    let mut depth_id = None;
    let mut has_stencil = false;
    let depth_attachment = match &binding.depth {
        Some(target) => {
            let resource = vulkan_resource(target)?;
            let view = resource.view().ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "resource {} cannot be bound as a depth attachment",
                    resource.id()
                ))
            })?;
            depth_id = Some(resource.id());
            has_stencil = resource
                .descriptor()
                .format()
                .is_some_and(|format| format.has_stencil());
            Some(
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(depth_layout)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(if binding.depth_read_only {
                        vk::AttachmentStoreOp::NONE
                    } else {
                        vk::AttachmentStoreOp::STORE
                    }),
            )
        }
        None => None,
    };

    let render_area = vk::Rect2D {
        offset: vk::Offset2D {
            x: binding.scissor.x,
            y: binding.scissor.y,
        },
        extent: vk::Extent2D {
            width: binding.scissor.width,
            height: binding.scissor.height,
        },
    };

    let mut rendering_info = vk::RenderingInfo::default()
        .render_area(render_area)
        .layer_count(1)
        .color_attachments(&color_attachments);
    if let Some(depth) = depth_attachment.as_ref() {
        rendering_info = rendering_info.depth_attachment(depth);
        if has_stencil {
            rendering_info = rendering_info.stencil_attachment(depth);
        }
    }

    let viewport = vk::Viewport {
        x: binding.viewport.x,
        y: binding.viewport.y,
        width: binding.viewport.width,
        height: binding.viewport.height,
        min_depth: binding.viewport.min_depth,
        max_depth: binding.viewport.max_depth,
    };

    unsafe {
        device.cmd_begin_rendering(list.cmd, &rendering_info);
        device.cmd_set_viewport(list.cmd, 0, &[viewport]);
        device.cmd_set_scissor(list.cmd, 0, &[render_area]);
    }

    for target in binding.color.iter().chain(binding.depth.iter()) {
        list.retain(target);
    }
    list.color_targets = color_ids;
    list.depth_target = depth_id;
    list.render_area = render_area;
    list.rendering = true;
    Ok(())
}

/// End dynamic rendering started by [`begin_rendering`].
pub fn end_rendering(device: &ash::Device, list: &mut VulkanCommandList) -> Result<(), GraphicsError> {
    if !list.rendering {
        return Err(GraphicsError::InvalidParameter(
            "no render targets are bound".to_string(),
        ));
    }
    unsafe { device.cmd_end_rendering(list.cmd) };
    list.color_targets.clear();
    list.depth_target = None;
    list.rendering = false;
    Ok(())
}

fn clear_rect(list: &VulkanCommandList) -> vk::ClearRect {
    vk::ClearRect {
        rect: list.render_area,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Clear a bound color attachment.
pub fn clear_color(
    device: &ash::Device,
    list: &VulkanCommandList,
    target: &VulkanResource,
    color: [f32; 4],
) -> Result<(), GraphicsError> {
    let index = list
        .color_targets
        .iter()
        .position(|&id| id == target.id())
        .ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "resource {} is not a bound color target",
                target.id()
            ))
        })?;
    let attachment = vk::ClearAttachment {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        color_attachment: index as u32,
        clear_value: vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
    };
    unsafe { device.cmd_clear_attachments(list.cmd, &[attachment], &[clear_rect(list)]) };
    Ok(())
}

/// Clear the bound depth/stencil attachment.
pub fn clear_depth_stencil(
    device: &ash::Device,
    list: &VulkanCommandList,
    target: &VulkanResource,
    depth: f32,
    stencil: u8,
) -> Result<(), GraphicsError> {
    if list.depth_target != Some(target.id()) {
        return Err(GraphicsError::InvalidParameter(format!(
            "resource {} is not the bound depth target",
            target.id()
        )));
    }
    let aspect_mask = match target.object() {
        VulkanObject::Image { aspect, .. } => aspect,
        VulkanObject::Buffer { .. } => {
            return Err(GraphicsError::InvalidParameter(
                "cannot clear a buffer as depth".to_string(),
            ))
        }
    };
    let attachment = vk::ClearAttachment {
        aspect_mask,
        color_attachment: 0,
        clear_value: vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth,
                stencil: stencil as u32,
            },
        },
    };
    unsafe { device.cmd_clear_attachments(list.cmd, &[attachment], &[clear_rect(list)]) };
    Ok(())
}

/// Copy a whole resource into another of the same kind and size.
pub fn copy_resource(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    source: &VulkanResource,
    destination: &VulkanResource,
) -> Result<(), GraphicsError> {
    match (source.object(), destination.object()) {
        (
            VulkanObject::Buffer { buffer: src, size },
            VulkanObject::Buffer {
                buffer: dst,
                size: dst_size,
            },
        ) => {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: size.min(dst_size),
            };
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
            Ok(())
        }
        (
            VulkanObject::Image {
                image: src, aspect, ..
            },
            VulkanObject::Image { image: dst, .. },
        ) => {
            let texture = source.descriptor().as_texture().ok_or_else(|| {
                GraphicsError::Internal("image without a texture descriptor".to_string())
            })?;
            let layers = match texture.dimension {
                TextureDimension::D3 => 1,
                _ => texture.size.depth_or_array_layers.max(1),
            };
            let regions: Vec<vk::ImageCopy> = (0..texture.mip_level_count.max(1))
                .map(|mip| {
                    let extent = texture.size.mip_level_size(mip);
                    let subresource = vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: mip,
                        base_array_layer: 0,
                        layer_count: layers,
                    };
                    vk::ImageCopy {
                        src_subresource: subresource,
                        src_offset: vk::Offset3D::default(),
                        dst_subresource: subresource,
                        dst_offset: vk::Offset3D::default(),
                        extent: vk::Extent3D {
                            width: extent.width.max(1),
                            height: extent.height.max(1),
                            depth: match texture.dimension {
                                TextureDimension::D3 => {
                                    extent.depth_or_array_layers.max(1)
                                }
                                _ => 1,
                            },
                        },
                    }
                })
                .collect();
            unsafe {
                device.cmd_copy_image(
                    cmd,
                    src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                )
            };
            Ok(())
        }
        _ => Err(GraphicsError::InvalidParameter(
            "copy source and destination must both be buffers or both be textures".to_string(),
        )),
    }
}

/// Copy the top mip level of an image into a buffer.
pub fn copy_texture_to_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    source: &VulkanResource,
    destination: &VulkanResource,
    layout: &TextureCopyLayout,
) -> Result<(), GraphicsError> {
    let (VulkanObject::Image { image, aspect, .. }, VulkanObject::Buffer { buffer, size }) =
        (source.object(), destination.object())
    else {
        return Err(GraphicsError::InvalidParameter(
            "texture-to-buffer copy needs a texture source and a buffer destination".to_string(),
        ));
    };
    if size < layout.buffer_size() {
        return Err(GraphicsError::InvalidParameter(format!(
            "readback buffer of {} bytes is smaller than the {} bytes copied",
            size,
            layout.buffer_size()
        )));
    }
    // Only one aspect can be copied at a time; depth carries the data we read back.
    let aspect_mask = if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect
    };
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: (layout.row_pitch / layout.bytes_per_texel.max(1) as u64) as u32,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: vk::Extent3D {
            width: layout.width,
            height: layout.height,
            depth: 1,
        },
    };
    unsafe {
        device.cmd_copy_image_to_buffer(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            buffer,
            &[region],
        );
        // Make the copied bytes visible to host reads once the submission completes.
        let host_barrier = [vk::BufferMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COPY)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::HOST)
            .dst_access_mask(vk::AccessFlags2::HOST_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)];
        let dependency = vk::DependencyInfo::default().buffer_memory_barriers(&host_barrier);
        device.cmd_pipeline_barrier2(cmd, &dependency);
    }
    Ok(())
}

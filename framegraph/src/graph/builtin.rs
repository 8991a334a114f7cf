//! Built-in passes.
//!
//! These are ordinary [`RenderPass`] implementations with declared slots, so
//! they take part in lifetime analysis and barrier insertion exactly like
//! user passes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, GpuResource, MemoryLocation, TextureCopyLayout};
use crate::error::{graph_fatal, GraphicsError};
use crate::pass_slots;
use crate::types::{BufferDescriptor, ResourceDescriptor, ResourceState, TextureDimension};

use super::pass::{PassContext, PassKind, PassSetup, RenderPass};

// ============================================================================
// Clears
// ============================================================================

/// Clears a color target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearFrameBuffer {
    /// Clear color.
    pub color: [f32; 4],
}

pass_slots!(ClearFrameBuffer {
    /// Color target of [`ClearFrameBuffer`].
    pub ClearColorTarget: RenderTarget => RenderTarget,
});

impl RenderPass for ClearFrameBuffer {
    const KIND: PassKind = PassKind::Graphics;

    fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        let target = ctx.resource(ClearColorTarget);
        ctx.encoder().clear_render_target(target.gpu, self.color)
    }

    fn display_gui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Color");
            ui.color_edit_button_rgba_unmultiplied(&mut self.color);
        });
    }
}

/// Clears a depth/stencil target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearDepthBuffer {
    /// Depth clear value.
    pub depth: f32,
    /// Stencil clear value.
    pub stencil: u8,
}

pass_slots!(ClearDepthBuffer {
    /// Depth target of [`ClearDepthBuffer`].
    pub ClearDepthTarget: Depth => DepthWrite,
});

impl RenderPass for ClearDepthBuffer {
    const KIND: PassKind = PassKind::Graphics;

    fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        let target = ctx.resource(ClearDepthTarget);
        ctx.encoder()
            .clear_depth_stencil(target.gpu, self.depth, self.stencil)
    }

    fn display_gui(&mut self, ui: &mut egui::Ui) {
        ui.add(egui::Slider::new(&mut self.depth, 0.0..=1.0).text("Depth"));
        ui.add(egui::Slider::new(&mut self.stencil, 0..=255).text("Stencil"));
    }
}

// ============================================================================
// Copy
// ============================================================================

/// Copies one resource into another of identical shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyResource;

pass_slots!(CopyResource {
    /// Source of [`CopyResource`].
    pub CopyFrom: General => CopySource,
    /// Destination of [`CopyResource`].
    pub CopyTo: General => CopyDest,
});

fn copy_compatible(source: &ResourceDescriptor, destination: &ResourceDescriptor) -> bool {
    match (source, destination) {
        (ResourceDescriptor::Buffer(src), ResourceDescriptor::Buffer(dst)) => src.size == dst.size,
        (ResourceDescriptor::Texture(src), ResourceDescriptor::Texture(dst)) => {
            src.size == dst.size
                && src.dimension == dst.dimension
                && src.mip_level_count == dst.mip_level_count
                && src.sample_count == dst.sample_count
                && src.format.block_size() == dst.format.block_size()
        }
        _ => false,
    }
}

impl RenderPass for CopyResource {
    const KIND: PassKind = PassKind::Transfer;

    fn initialize(&mut self, setup: &mut PassSetup<'_, Self>) -> Result<(), GraphicsError> {
        let source = setup.descriptor(CopyFrom);
        let destination = setup.descriptor(CopyTo);
        if setup.handle(CopyFrom) == setup.handle(CopyTo) {
            return Err(GraphicsError::InvalidParameter(format!(
                "operation '{}' copies a resource onto itself",
                setup.operation_name()
            )));
        }
        if !copy_compatible(source, destination) {
            return Err(GraphicsError::InvalidParameter(format!(
                "operation '{}' copies between incompatible resources {:?} and {:?}",
                setup.operation_name(),
                source.label(),
                destination.label()
            )));
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        let source = ctx.resource(CopyFrom);
        let destination = ctx.resource(CopyTo);
        ctx.encoder().copy_resource(source.gpu, destination.gpu)
    }
}

// ============================================================================
// Download
// ============================================================================

#[derive(Default)]
struct ReadbackState {
    backend: Option<Arc<dyn GpuBackend>>,
    buffer: Option<GpuResource>,
    layout: Option<TextureCopyLayout>,
}

/// CPU side of a texture download.
///
/// Returned by [`GraphBuilder::download_texture`](super::GraphBuilder::download_texture).
/// After the graph executed, [`read`](Self::read) waits for the GPU and
/// returns the top mip level of the texture, rows tightly packed.
#[derive(Clone, Default)]
pub struct TextureReadback {
    state: Arc<Mutex<ReadbackState>>,
}

impl std::fmt::Debug for TextureReadback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TextureReadback")
            .field("buffer", &state.buffer)
            .field("layout", &state.layout)
            .finish()
    }
}

impl TextureReadback {
    /// Copy layout, available once the graph is compiled.
    pub fn layout(&self) -> Option<TextureCopyLayout> {
        self.state.lock().layout
    }

    /// Returns true once the readback buffer exists.
    pub fn is_ready(&self) -> bool {
        self.state.lock().buffer.is_some()
    }

    /// Wait for all GPU work and return the downloaded texels.
    pub fn read(&self) -> Result<Vec<u8>, GraphicsError> {
        let state = self.state.lock();
        let (Some(backend), Some(buffer), Some(layout)) =
            (state.backend.as_ref(), state.buffer.as_ref(), state.layout)
        else {
            return Err(GraphicsError::InvalidParameter(
                "texture readback was not compiled or was destroyed".to_string(),
            ));
        };
        backend.wait_idle()?;
        let data = backend.read_buffer(buffer, 0, layout.buffer_size())?;

        let row_bytes = layout.row_bytes() as usize;
        let row_pitch = layout.row_pitch as usize;
        let mut texels = Vec::with_capacity(row_bytes * layout.height as usize);
        for row in data.chunks(row_pitch).take(layout.height as usize) {
            texels.extend_from_slice(&row[..row_bytes]);
        }
        Ok(texels)
    }
}

/// Copies a 2D texture into a host-visible buffer.
#[derive(Debug, Clone, Default)]
pub struct DownloadTexture {
    readback: TextureReadback,
}

impl DownloadTexture {
    /// Create the pass and the handle its result is read through.
    pub fn new() -> (Self, TextureReadback) {
        let readback = TextureReadback::default();
        (
            Self {
                readback: readback.clone(),
            },
            readback,
        )
    }
}

pass_slots!(DownloadTexture {
    /// Texture read by [`DownloadTexture`].
    pub DownloadSource: General => CopySource,
});

impl RenderPass for DownloadTexture {
    const KIND: PassKind = PassKind::Transfer;

    fn initialize(&mut self, setup: &mut PassSetup<'_, Self>) -> Result<(), GraphicsError> {
        let descriptor = setup.descriptor(DownloadSource);
        let texture = descriptor
            .as_texture()
            .filter(|desc| desc.dimension == TextureDimension::D2);
        let Some(texture) = texture else {
            graph_fatal!(
                "operation '{}' downloads {:?}, which is not a 2D texture",
                setup.operation_name(),
                descriptor.label()
            );
        };

        let layout = TextureCopyLayout::for_texture(texture);
        let backend = Arc::clone(setup.backend());
        let buffer = backend.create_committed_resource(
            &BufferDescriptor::readback(layout.buffer_size())
                .with_label(format!("{} readback", setup.operation_name()))
                .into(),
            ResourceState::CopyDest,
            MemoryLocation::GpuToCpu,
        )?;
        log::debug!(
            "Created readback buffer of {} bytes for '{}'",
            layout.buffer_size(),
            setup.operation_name()
        );

        let mut state = self.readback.state.lock();
        state.backend = Some(backend);
        state.buffer = Some(buffer);
        state.layout = Some(layout);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        let source = ctx.resource(DownloadSource);
        let (buffer, layout) = {
            let state = self.readback.state.lock();
            match (state.buffer.clone(), state.layout) {
                (Some(buffer), Some(layout)) => (buffer, layout),
                _ => {
                    return Err(GraphicsError::Internal(format!(
                        "readback buffer of '{}' is missing",
                        ctx.operation_name()
                    )))
                }
            }
        };
        ctx.encoder()
            .copy_texture_to_buffer(source.gpu, &buffer, &layout)
    }

    fn destroy(&mut self, _backend: &dyn GpuBackend) {
        let mut state = self.readback.state.lock();
        state.buffer = None;
        state.backend = None;
    }
}

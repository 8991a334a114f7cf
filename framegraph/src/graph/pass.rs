//! Render pass capability set and type-erased pass storage.
//!
//! A pass type implements [`RenderPass`]: it declares its slots (through
//! [`pass_slots!`](crate::pass_slots)) and its [`PassKind`], records its GPU
//! work in [`execute`](RenderPass::execute) and may optionally implement
//! one-time setup, a GUI callback and teardown.
//!
//! The graph stores passes of different types side by side as boxed
//! [`ErasedPass`] objects.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use crate::backend::{CommandEncoder, GpuBackend, GpuResource};
use crate::error::{graph_assert, graph_fatal, GraphicsError};
use crate::types::{
    ResourceDescriptor, ResourceState, ScissorRect, TextureDescriptor, TextureDimension,
    TextureFormat, Viewport,
};

use super::access::{Access, AccessCategory};
use super::binding::{PassSlots, Slot};
use super::resource::{Resource, ResourceHandle};

/// Handle to an operation in a frame graph.
///
/// `OperationHandle` is `Copy` and cheap to pass around. It is only valid
/// within the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct OperationHandle(u32);

impl OperationHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the operation in execution order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of GPU work a pass records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Rasterization. Render targets are bound around `execute`.
    Graphics,
    /// Compute dispatches.
    Compute,
    /// Mesh shading. Render targets are bound around `execute`.
    MeshShading,
    /// Ray tracing dispatches.
    RayTracing,
    /// Copies only.
    Transfer,
}

impl PassKind {
    /// Returns true if the execution engine binds render targets for the pass.
    pub fn is_graphics_like(self) -> bool {
        matches!(self, Self::Graphics | Self::MeshShading)
    }
}

/// Output formats of a graphics-like operation, gathered from its slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineTemplate {
    /// Formats of the render target slots, in slot order.
    pub color_formats: Vec<TextureFormat>,
    /// Format of the depth slot.
    pub depth_format: Option<TextureFormat>,
    /// Sample count of the attachments.
    pub sample_count: u32,
}

/// A GPU pass the frame graph can schedule.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::graph::{PassContext, PassKind, RenderPass};
/// use redlilium_framegraph::{pass_slots, GraphicsError};
///
/// struct Fill {
///     color: [f32; 4],
/// }
///
/// pass_slots!(Fill {
///     Output: RenderTarget => RenderTarget,
/// });
///
/// impl RenderPass for Fill {
///     const KIND: PassKind = PassKind::Graphics;
///
///     fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
///         let output = ctx.resource(Output);
///         ctx.encoder().clear_render_target(output.gpu, self.color)
///     }
/// }
/// ```
pub trait RenderPass: PassSlots + Sized + Send + 'static {
    /// Kind of work the pass records.
    const KIND: PassKind;

    /// One-time setup during compilation (pipelines, readback buffers).
    fn initialize(&mut self, setup: &mut PassSetup<'_, Self>) -> Result<(), GraphicsError> {
        let _ = setup;
        Ok(())
    }

    /// Record the pass's GPU work.
    fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError>;

    /// Draw debug controls.
    fn display_gui(&mut self, ui: &mut egui::Ui) {
        let _ = ui;
    }

    /// Release GPU objects created in `initialize`.
    fn destroy(&mut self, backend: &dyn GpuBackend) {
        let _ = backend;
    }
}

// ============================================================================
// Setup and execution contexts
// ============================================================================

pub(crate) struct SetupParts<'a> {
    pub backend: &'a Arc<dyn GpuBackend>,
    pub name: &'a str,
    pub accesses: &'a [Access],
    pub resources: &'a [Resource],
    pub template: Option<PipelineTemplate>,
}

/// What a pass sees during [`RenderPass::initialize`].
pub struct PassSetup<'a, P> {
    parts: SetupParts<'a>,
    _pass: PhantomData<fn() -> P>,
}

impl<'a, P: RenderPass> PassSetup<'a, P> {
    /// Backend the graph compiles for.
    pub fn backend(&self) -> &'a Arc<dyn GpuBackend> {
        self.parts.backend
    }

    /// Name of the operation.
    pub fn operation_name(&self) -> &'a str {
        self.parts.name
    }

    /// Descriptor of the resource bound to `slot`.
    pub fn descriptor<S: Slot<Pass = P>>(&self, _slot: S) -> &'a ResourceDescriptor {
        let access = &self.parts.accesses[S::INDEX];
        &self.parts.resources[access.resource.index()].descriptor
    }

    /// Handle of the resource bound to `slot`.
    pub fn handle<S: Slot<Pass = P>>(&self, _slot: S) -> ResourceHandle {
        self.parts.accesses[S::INDEX].resource
    }

    /// Output formats for graphics-like passes, `None` otherwise.
    pub fn pipeline_template(&self) -> Option<&PipelineTemplate> {
        self.parts.template.as_ref()
    }
}

pub(crate) struct ExecuteParts<'a> {
    pub name: &'a str,
    pub accesses: &'a [Access],
    pub resources: &'a [Resource],
    pub encoder: CommandEncoder<'a>,
    pub viewport: Option<Viewport>,
    pub scissor: Option<ScissorRect>,
}

/// A resource bound to a slot, as seen by the pass that declared it.
#[derive(Debug, Clone, Copy)]
pub struct BoundResource<'a> {
    /// Handle of the resource.
    pub handle: ResourceHandle,
    /// Description of the resource.
    pub descriptor: &'a ResourceDescriptor,
    /// Live GPU resource.
    pub gpu: &'a GpuResource,
    /// State the resource is in while the pass runs.
    pub state: ResourceState,
    /// Slot category.
    pub category: AccessCategory,
}

/// What a pass sees during [`RenderPass::execute`].
///
/// Only resources bound to the pass's own slots are reachable.
pub struct PassContext<'a, P> {
    parts: ExecuteParts<'a>,
    _pass: PhantomData<fn() -> P>,
}

impl<'a, P: RenderPass> PassContext<'a, P> {
    /// Resource bound to `slot`.
    pub fn resource<S: Slot<Pass = P>>(&self, _slot: S) -> BoundResource<'a> {
        let access = self.parts.accesses[S::INDEX];
        let resources = self.parts.resources;
        graph_assert!(
            access.resource.index() < resources.len(),
            "operation '{}' slot {} refers to resource {} of {}",
            self.parts.name,
            S::INDEX,
            access.resource.index(),
            resources.len()
        );
        let resource = &resources[access.resource.index()];
        let Some(gpu) = resource.gpu.as_ref() else {
            graph_fatal!(
                "operation '{}' slot {} has no GPU resource",
                self.parts.name,
                S::INDEX
            );
        };
        BoundResource {
            handle: access.resource,
            descriptor: &resource.descriptor,
            gpu,
            state: access.state,
            category: access.category,
        }
    }

    /// Descriptor of a 2D texture bound to `slot`. Anything else is fatal.
    pub fn texture_2d<S: Slot<Pass = P>>(&self, slot: S) -> &'a TextureDescriptor {
        let bound = self.resource(slot);
        let texture = bound
            .descriptor
            .as_texture()
            .filter(|desc| desc.dimension == TextureDimension::D2);
        let Some(texture) = texture else {
            graph_fatal!(
                "operation '{}' requires a 2D texture in slot {}",
                self.parts.name,
                S::INDEX
            );
        };
        texture
    }

    /// Command recording for this pass.
    pub fn encoder(&mut self) -> &mut CommandEncoder<'a> {
        &mut self.parts.encoder
    }

    /// Name of the operation.
    pub fn operation_name(&self) -> &'a str {
        self.parts.name
    }

    /// Viewport covering the bound render targets (graphics-like passes).
    pub fn viewport(&self) -> Option<Viewport> {
        self.parts.viewport
    }

    /// Scissor covering the bound render targets (graphics-like passes).
    pub fn scissor(&self) -> Option<ScissorRect> {
        self.parts.scissor
    }
}

// ============================================================================
// Type-erased storage
// ============================================================================

pub(crate) trait ErasedPass: Send {
    fn initialize(&mut self, parts: SetupParts<'_>) -> Result<(), GraphicsError>;
    fn execute(&mut self, parts: ExecuteParts<'_>) -> Result<(), GraphicsError>;
    fn display_gui(&mut self, ui: &mut egui::Ui);
    fn destroy(&mut self, backend: &dyn GpuBackend);
    fn type_name(&self) -> &'static str;
}

pub(crate) struct StoredPass<P>(pub P);

impl<P: RenderPass> ErasedPass for StoredPass<P> {
    fn initialize(&mut self, parts: SetupParts<'_>) -> Result<(), GraphicsError> {
        let mut setup = PassSetup::<P> {
            parts,
            _pass: PhantomData,
        };
        self.0.initialize(&mut setup)
    }

    fn execute(&mut self, parts: ExecuteParts<'_>) -> Result<(), GraphicsError> {
        let mut ctx = PassContext::<P> {
            parts,
            _pass: PhantomData,
        };
        self.0.execute(&mut ctx)
    }

    fn display_gui(&mut self, ui: &mut egui::Ui) {
        self.0.display_gui(ui);
    }

    fn destroy(&mut self, backend: &dyn GpuBackend) {
        self.0.destroy(backend);
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<P>()
    }
}

/// One scheduled pass instance.
pub(crate) struct Operation {
    pub name: String,
    pub kind: PassKind,
    pub pass: Box<dyn ErasedPass>,
    pub accesses: Range<usize>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("pass", &self.pass.type_name())
            .field("accesses", &self.accesses)
            .finish()
    }
}

//! Graph builder: the single-use construction context of a frame graph.

use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::config::FrameGraphConfig;
use crate::error::{graph_assert, GraphicsError};
use crate::types::ResourceDescriptor;

use super::access::Access;
use super::binding::{IntoBinder, PendingOperation};
use super::builtin::{
    ClearColorTarget, ClearDepthBuffer, ClearDepthTarget, ClearFrameBuffer, CopyFrom,
    CopyResource, CopyTo, DownloadSource, DownloadTexture, TextureReadback,
};
use super::compiled::CompiledGraph;
use super::pass::{Operation, OperationHandle, RenderPass, StoredPass};
use super::resource::{Resource, ResourceHandle, ResourceKind};

/// Accumulates resources and operations, then compiles them.
///
/// Operations run in the order they are added. No GPU work happens before
/// [`compile`](Self::compile), which consumes the builder.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::backend::DummyBackend;
/// use redlilium_framegraph::graph::GraphBuilder;
/// use redlilium_framegraph::types::{TextureDescriptor, TextureFormat, TextureUsage};
/// use std::sync::Arc;
///
/// let mut graph = GraphBuilder::new(Arc::new(DummyBackend::new()));
/// let target = graph.create_transient_resource(TextureDescriptor::new_2d(
///     64,
///     64,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
/// ));
/// graph.clear_frame_buffer(target, [0.1, 0.2, 0.3, 1.0]);
/// let (_, readback) = graph.download_texture(target);
///
/// let mut compiled = graph.compile().unwrap();
/// compiled.execute().unwrap();
/// assert_eq!(readback.read().unwrap().len(), 64 * 64 * 4);
/// ```
pub struct GraphBuilder {
    pub(crate) backend: Arc<dyn GpuBackend>,
    pub(crate) config: FrameGraphConfig,
    pub(crate) resources: Vec<Resource>,
    pub(crate) accesses: Vec<Access>,
    pub(crate) operations: Vec<Operation>,
    pub(crate) swap_chain: Option<ResourceHandle>,
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("resources", &self.resources.len())
            .field("accesses", &self.accesses.len())
            .field("operations", &self.operations)
            .finish()
    }
}

impl GraphBuilder {
    /// Create a builder with the default configuration.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self::with_config(backend, FrameGraphConfig::default())
    }

    /// Create a builder.
    ///
    /// When the backend has a presentation surface, the swap chain resource
    /// is registered first.
    pub fn with_config(backend: Arc<dyn GpuBackend>, config: FrameGraphConfig) -> Self {
        let mut builder = Self {
            backend,
            config,
            resources: Vec::new(),
            accesses: Vec::new(),
            operations: Vec::new(),
            swap_chain: None,
        };
        if let Some(descriptor) = builder.backend.swap_chain_descriptor() {
            let handle = builder.push_resource(ResourceKind::SwapChain, descriptor.into());
            builder.swap_chain = Some(handle);
        }
        builder
    }

    fn push_resource(&mut self, kind: ResourceKind, descriptor: ResourceDescriptor) -> ResourceHandle {
        let handle = ResourceHandle::new(self.resources.len());
        self.resources.push(Resource::new(kind, descriptor));
        handle
    }

    /// Add a resource whose memory is reused once its last access is done.
    pub fn create_transient_resource(
        &mut self,
        descriptor: impl Into<ResourceDescriptor>,
    ) -> ResourceHandle {
        self.push_resource(ResourceKind::Transient, descriptor.into())
    }

    /// Add a resource that keeps dedicated memory for the graph's lifetime.
    pub fn create_persistent_resource(
        &mut self,
        descriptor: impl Into<ResourceDescriptor>,
    ) -> ResourceHandle {
        self.push_resource(ResourceKind::Persistent, descriptor.into())
    }

    /// The presentation target, if the backend has one.
    pub fn swap_chain_resource(&self) -> Option<ResourceHandle> {
        self.swap_chain
    }

    /// Add an operation running `pass`.
    ///
    /// Returns a [`Binder`](super::Binder) that must bind every slot of the
    /// pass and be finalized, or the operation's handle directly when the
    /// pass declares no slots.
    pub fn add_operation<'g, P>(
        &'g mut self,
        name: impl Into<String>,
        pass: P,
    ) -> <P::Slots as IntoBinder<'g, P>>::Output
    where
        P: RenderPass,
        P::Slots: IntoBinder<'g, P>,
    {
        let pending = PendingOperation::new(name.into(), pass);
        <P::Slots as IntoBinder<'g, P>>::into_binder(self, pending)
    }

    pub(crate) fn push_operation<P: RenderPass>(
        &mut self,
        pending: PendingOperation<P>,
    ) -> OperationHandle {
        let begin = self.accesses.len();
        for (slot, &resource) in P::SLOTS.iter().zip(&pending.bindings) {
            graph_assert!(
                resource.is_valid(),
                "operation '{}' finalized with slot {} unbound",
                pending.name,
                slot.name
            );
            self.accesses.push(Access {
                resource,
                category: slot.category,
                state: slot.state,
            });
        }
        let handle = OperationHandle::new(self.operations.len());
        log::trace!(
            "Added operation '{}' ({} accesses)",
            pending.name,
            P::SLOTS.len()
        );
        self.operations.push(Operation {
            name: pending.name,
            kind: P::KIND,
            pass: Box::new(StoredPass(pending.pass)),
            accesses: begin..self.accesses.len(),
        });
        handle
    }

    /// Clear a color target.
    pub fn clear_frame_buffer(&mut self, target: ResourceHandle, color: [f32; 4]) -> OperationHandle {
        self.add_operation("clear frame buffer", ClearFrameBuffer { color })
            .bind(ClearColorTarget, target)
            .finalize()
    }

    /// Clear a depth/stencil target.
    pub fn clear_depth_buffer(
        &mut self,
        target: ResourceHandle,
        depth: f32,
        stencil: u8,
    ) -> OperationHandle {
        self.add_operation("clear depth buffer", ClearDepthBuffer { depth, stencil })
            .bind(ClearDepthTarget, target)
            .finalize()
    }

    /// Copy `source` into `destination`. Both must have the same shape;
    /// this is checked when the graph is compiled.
    pub fn copy_resource(
        &mut self,
        source: ResourceHandle,
        destination: ResourceHandle,
    ) -> OperationHandle {
        self.add_operation("copy resource", CopyResource)
            .bind(CopyFrom, source)
            .bind(CopyTo, destination)
            .finalize()
    }

    /// Download the top mip level of a 2D texture to the CPU.
    pub fn download_texture(&mut self, source: ResourceHandle) -> (OperationHandle, TextureReadback) {
        let (pass, readback) = DownloadTexture::new();
        let handle = self
            .add_operation("download texture", pass)
            .bind(DownloadSource, source)
            .finalize();
        (handle, readback)
    }

    /// Descriptor of a resource.
    pub fn resource_descriptor(
        &self,
        handle: ResourceHandle,
    ) -> Result<&ResourceDescriptor, GraphicsError> {
        self.resources
            .get(handle.index())
            .map(|resource| &resource.descriptor)
            .ok_or(GraphicsError::OutOfRange {
                what: "resource",
                index: handle.index(),
                len: self.resources.len(),
            })
    }

    /// Number of resources, including the swap chain.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Number of operations.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Number of accesses.
    pub fn access_count(&self) -> usize {
        self.accesses.len()
    }

    /// Backend the graph is built for.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Compile the graph: run pass setup, compute lifetimes and assign memory.
    pub fn compile(self) -> Result<CompiledGraph, GraphicsError> {
        super::compile::compile(self)
    }
}

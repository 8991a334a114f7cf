//! Common utilities for frame graph integration tests.
//!
//! Tests are parameterized over [`Backend`]; a [`TestContext`] is only
//! created for backends that are compiled in and have a usable device.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_framegraph::backend::dummy::DummyBackend;
use redlilium_framegraph::backend::{GpuBackend, HeapTier};
use redlilium_framegraph::graph::{
    AccessCategory, CompiledGraph, GraphBuilder, PassContext, PassKind, RenderPass,
    ResourceHandle,
};
use redlilium_framegraph::{
    pass_slots, BufferDescriptor, BufferUsage, FrameGraphConfig, GraphicsError,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Install the test logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Backends integration tests can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Headless dummy backend (CPU-simulated memory).
    Dummy,
    /// Vulkan backend through ash.
    Vulkan,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::Vulkan => cfg!(feature = "vulkan-backend"),
        }
    }

    /// Get the backend name for display.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::Vulkan => "vulkan",
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context owning a backend with validation enabled.
pub struct TestContext {
    /// The backend being tested.
    pub backend: Backend,
    /// Backend handed to graph builders.
    pub gpu: Arc<dyn GpuBackend>,
    dummy: Option<Arc<DummyBackend>>,
    #[cfg(feature = "vulkan-backend")]
    vulkan: Option<Arc<redlilium_framegraph::backend::vulkan::VulkanBackend>>,
}

impl TestContext {
    /// Create a context for `backend`.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_heap_tier(backend, None)
    }

    /// Create a context whose dummy backend reports `tier`.
    ///
    /// The tier of a real device cannot be chosen; `tier` only applies to the
    /// dummy backend.
    pub fn with_heap_tier(backend: Backend, tier: Option<HeapTier>) -> Option<Self> {
        init_logging();
        if !backend.is_available() {
            return None;
        }
        match backend {
            Backend::Dummy => {
                let mut dummy = DummyBackend::new().with_validation(true);
                if let Some(tier) = tier {
                    dummy = dummy.with_heap_tier(tier);
                }
                let dummy = Arc::new(dummy);
                Some(Self {
                    backend,
                    gpu: dummy.clone(),
                    dummy: Some(dummy),
                    #[cfg(feature = "vulkan-backend")]
                    vulkan: None,
                })
            }
            Backend::Vulkan => Self::vulkan(),
        }
    }

    #[cfg(feature = "vulkan-backend")]
    fn vulkan() -> Option<Self> {
        use redlilium_framegraph::backend::vulkan::VulkanBackend;
        use redlilium_framegraph::BackendParameters;

        let params = BackendParameters::default().with_validation(true);
        let vulkan = match VulkanBackend::with_params(&params) {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                eprintln!("Vulkan device unavailable: {}", e);
                return None;
            }
        };
        Some(Self {
            backend: Backend::Vulkan,
            gpu: vulkan.clone(),
            dummy: None,
            vulkan: Some(vulkan),
        })
    }

    #[cfg(not(feature = "vulkan-backend"))]
    fn vulkan() -> Option<Self> {
        None
    }

    /// Graph builder with the default configuration.
    pub fn builder(&self) -> GraphBuilder {
        GraphBuilder::new(self.gpu.clone())
    }

    /// Graph builder with `config`.
    pub fn builder_with_config(&self, config: FrameGraphConfig) -> GraphBuilder {
        GraphBuilder::with_config(self.gpu.clone(), config)
    }

    /// The dummy backend, when testing on it.
    pub fn dummy(&self) -> Option<&Arc<DummyBackend>> {
        self.dummy.as_ref()
    }

    /// Number of errors the backend's validation reported so far.
    pub fn validation_error_count(&self) -> usize {
        if let Some(dummy) = &self.dummy {
            let errors = dummy.validation_errors();
            for error in &errors {
                eprintln!("validation: {}", error);
            }
            return errors.len();
        }
        #[cfg(feature = "vulkan-backend")]
        if let Some(vulkan) = &self.vulkan {
            return vulkan.validation_error_count() as usize;
        }
        0
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// A 2D color target that can also be copied from.
pub fn color_target(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        width,
        height,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_ATTACHMENT
            | TextureUsage::TEXTURE_BINDING
            | TextureUsage::COPY_SRC
            | TextureUsage::COPY_DST,
    )
}

/// A 2D depth target that can be downloaded.
pub fn depth_target(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        width,
        height,
        TextureFormat::Depth32Float,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
    )
}

/// A storage buffer of `size` bytes.
pub fn storage_buffer(size: u64) -> BufferDescriptor {
    BufferDescriptor::new(
        size,
        BufferUsage::STORAGE | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
    )
}

// ============================================================================
// Passes
// ============================================================================

/// Compute pass writing one storage buffer.
pub struct FillBuffer;

pass_slots!(FillBuffer {
    pub FillTarget: General => UnorderedAccess,
});

impl RenderPass for FillBuffer {
    const KIND: PassKind = PassKind::Compute;

    fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        assert_eq!(ctx.resource(FillTarget).category, AccessCategory::General);
        Ok(())
    }
}

/// Compute pass reading one buffer and writing another.
pub struct Transform;

pass_slots!(Transform {
    pub TransformInput: General => ShaderResource,
    pub TransformOutput: General => UnorderedAccess,
});

impl RenderPass for Transform {
    const KIND: PassKind = PassKind::Compute;

    fn execute(&mut self, _ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        Ok(())
    }
}

/// Graphics pass sampling one texture into a color target.
pub struct Resolve;

pass_slots!(Resolve {
    pub ResolveInput: General => ShaderResource,
    pub ResolveOutput: RenderTarget => RenderTarget,
});

impl RenderPass for Resolve {
    const KIND: PassKind = PassKind::Graphics;

    fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        let output = ctx.resource(ResolveOutput);
        ctx.encoder().clear_render_target(output.gpu, [0.25, 0.5, 0.75, 1.0])
    }
}

/// Add `FillBuffer` on `target`.
pub fn fill(graph: &mut GraphBuilder, name: &str, target: ResourceHandle) {
    graph
        .add_operation(name, FillBuffer)
        .bind(FillTarget, target)
        .finalize();
}

/// Add `Transform` from `input` into `output`.
pub fn transform(
    graph: &mut GraphBuilder,
    name: &str,
    input: ResourceHandle,
    output: ResourceHandle,
) {
    graph
        .add_operation(name, Transform)
        .bind(TransformInput, input)
        .bind(TransformOutput, output)
        .finalize();
}

/// Add `Resolve` from `input` into `output`.
pub fn resolve(graph: &mut GraphBuilder, name: &str, input: ResourceHandle, output: ResourceHandle) {
    graph
        .add_operation(name, Resolve)
        .bind(ResolveInput, input)
        .bind(ResolveOutput, output)
        .finalize();
}

// ============================================================================
// Assertions
// ============================================================================

/// Inclusive access range of every accessed resource, by resource index.
pub fn lifetimes(graph: &CompiledGraph) -> Vec<(usize, usize, usize)> {
    graph
        .resources()
        .iter()
        .enumerate()
        .filter_map(|(index, resource)| {
            let first = resource.first_access()?;
            let last = resource.last_access()?;
            Some((index, first.index(), last.index()))
        })
        .collect()
}

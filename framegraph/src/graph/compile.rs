//! Frame graph compilation.
//!
//! [`compile`] turns a [`GraphBuilder`] into a [`CompiledGraph`] in four steps:
//!
//! 1. **Static setup** - every pass's `initialize` runs once, with the output
//!    formats of graphics-like operations gathered from their slots
//! 2. **Lifetimes** - one linear scan over the accesses records the first and
//!    last access of every resource
//! 3. **Memory assignment** - operations are walked in order; transients get
//!    aliased memory at their first access and give it back after the
//!    operation holding their last access, persistent resources get
//!    dedicated memory
//! 4. **Materialization** - heaps are created at the planned sizes and
//!    placed resources are created at the planned offsets
//!
//! Access order is execution order, so the whole analysis is linear in the
//! number of accesses.

use std::sync::Arc;

use crate::backend::{GpuBackend, MemoryLocation};
use crate::error::{graph_assert, GraphicsError};
use crate::memory::MemoryAliasManager;
use crate::profiling::profile_function;

use super::access::{Access, AccessCategory, AccessIndex};
use super::builder::GraphBuilder;
use super::compiled::CompiledGraph;
use super::pass::{Operation, PipelineTemplate, SetupParts};
use super::resource::{Resource, ResourceKind};

/// Compile `builder`. See the [module documentation](self).
pub fn compile(builder: GraphBuilder) -> Result<CompiledGraph, GraphicsError> {
    profile_function!();
    let GraphBuilder {
        backend,
        config,
        mut resources,
        accesses,
        mut operations,
        swap_chain,
    } = builder;

    initialize_passes(&backend, &mut operations, &accesses, &resources)?;
    compute_lifetimes(&mut resources, &accesses);

    let mut aliases = MemoryAliasManager::new(Arc::clone(&backend), &config);
    assign_memory(
        &backend,
        &mut aliases,
        &mut resources,
        &accesses,
        &operations,
        config.aliasing,
    )?;

    for resource in &mut resources {
        resource.current_state = resource.initial_state;
    }

    log::info!(
        "Compiled {} with {} operations, {} resources, {} accesses ({} bytes of aliased memory in {} heaps)",
        config.display_label(),
        operations.len(),
        resources.len(),
        accesses.len(),
        aliases.total_peak_usage(),
        aliases.heap_count()
    );

    Ok(CompiledGraph::new(
        backend, config, resources, accesses, operations, swap_chain, aliases,
    ))
}

/// Output formats of a graphics-like operation.
fn pipeline_template(accesses: &[Access], resources: &[Resource]) -> PipelineTemplate {
    let mut template = PipelineTemplate {
        sample_count: 1,
        ..PipelineTemplate::default()
    };
    let mut first_attachment = true;
    for access in accesses {
        let Some(texture) = resources[access.resource.index()].descriptor.as_texture() else {
            continue;
        };
        match access.category {
            AccessCategory::RenderTarget => template.color_formats.push(texture.format),
            AccessCategory::Depth => template.depth_format = Some(texture.format),
            AccessCategory::General => continue,
        }
        if first_attachment {
            template.sample_count = texture.sample_count;
            first_attachment = false;
        }
    }
    template
}

fn initialize_passes(
    backend: &Arc<dyn GpuBackend>,
    operations: &mut [Operation],
    accesses: &[Access],
    resources: &[Resource],
) -> Result<(), GraphicsError> {
    for operation in operations {
        let accesses = &accesses[operation.accesses.clone()];
        let template = operation
            .kind
            .is_graphics_like()
            .then(|| pipeline_template(accesses, resources));
        operation.pass.initialize(SetupParts {
            backend,
            name: &operation.name,
            accesses,
            resources,
            template,
        })?;
    }
    Ok(())
}

fn compute_lifetimes(resources: &mut [Resource], accesses: &[Access]) {
    for (index, access) in accesses.iter().enumerate() {
        let resource_index = access.resource.index();
        graph_assert!(
            resource_index < resources.len(),
            "access {} refers to resource {} but only {} resources exist",
            index,
            resource_index,
            resources.len()
        );
        let resource = &mut resources[resource_index];
        let index = AccessIndex::new(index);
        resource.first_access.get_or_insert(index);
        resource.last_access = Some(index);
    }
}

fn assign_memory(
    backend: &Arc<dyn GpuBackend>,
    aliases: &mut MemoryAliasManager,
    resources: &mut [Resource],
    accesses: &[Access],
    operations: &[Operation],
    aliasing: bool,
) -> Result<(), GraphicsError> {
    for operation in operations {
        for index in operation.accesses.clone() {
            let access = accesses[index];
            let resource = &mut resources[access.resource.index()];
            if resource.first_access != Some(AccessIndex::new(index)) {
                continue;
            }
            match resource.kind {
                ResourceKind::Transient => {
                    let allocation = aliases.allocate(&resource.descriptor, access.state)?;
                    resource.initial_state = allocation.initial_state;
                    resource.allocation = Some(allocation);
                }
                ResourceKind::Persistent => {
                    // Created in the state of its last access, so every frame
                    // starts where the previous one ended.
                    let last_state = resource
                        .last_access
                        .map_or(access.state, |last| accesses[last.index()].state);
                    let state = backend.creatable_state(&resource.descriptor, last_state);
                    let gpu = backend.create_committed_resource(
                        &resource.descriptor,
                        state,
                        MemoryLocation::GpuOnly,
                    )?;
                    log::debug!(
                        "Created persistent resource {:?} in {:?}",
                        resource.descriptor.label(),
                        state
                    );
                    resource.initial_state = state;
                    resource.gpu = Some(gpu);
                }
                ResourceKind::SwapChain => {}
            }
        }

        if aliasing {
            release_finished(aliases, resources, accesses, operation.accesses.clone());
        }
    }
    if !aliasing {
        release_finished(aliases, resources, accesses, 0..accesses.len());
    }

    aliases.commit()?;

    for resource in resources.iter_mut() {
        if let Some(allocation) = resource.allocation {
            resource.gpu = Some(aliases.create_resource(&allocation, &resource.descriptor)?);
        } else if resource.first_access.is_none() && resource.kind != ResourceKind::SwapChain {
            log::debug!(
                "Resource {:?} is never accessed and gets no memory",
                resource.descriptor.label()
            );
        }
    }
    Ok(())
}

/// Release transients whose last access lies in `range`.
fn release_finished(
    aliases: &mut MemoryAliasManager,
    resources: &[Resource],
    accesses: &[Access],
    range: std::ops::Range<usize>,
) {
    for index in range {
        let resource = &resources[accesses[index].resource.index()];
        if resource.last_access != Some(AccessIndex::new(index)) {
            continue;
        }
        if let Some(allocation) = &resource.allocation {
            aliases.release_memory(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::config::FrameGraphConfig;
    use crate::graph::{PassContext, PassKind, PassSetup, RenderPass};
    use crate::types::{
        ResourceState, TextureDescriptor, TextureFormat, TextureUsage,
    };
    use parking_lot::Mutex;

    fn texture(format: TextureFormat) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            64,
            64,
            format,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
    }

    fn builder(config: FrameGraphConfig) -> GraphBuilder {
        GraphBuilder::with_config(Arc::new(DummyBackend::new()), config)
    }

    struct Shade {
        seen: Arc<Mutex<Option<PipelineTemplate>>>,
    }

    crate::pass_slots!(Shade {
        Input: General => ShaderResource,
        Albedo: RenderTarget => RenderTarget,
        Normal: RenderTarget => RenderTarget,
        DepthBuffer: Depth => DepthRead,
    });

    impl RenderPass for Shade {
        const KIND: PassKind = PassKind::Graphics;

        fn initialize(&mut self, setup: &mut PassSetup<'_, Self>) -> Result<(), GraphicsError> {
            *self.seen.lock() = setup.pipeline_template().cloned();
            Ok(())
        }

        fn execute(&mut self, _ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
            Ok(())
        }
    }

    #[test]
    fn test_pipeline_template_from_slots() {
        let mut graph = builder(FrameGraphConfig::default());
        let input = graph.create_transient_resource(texture(TextureFormat::R32Float));
        let albedo = graph.create_transient_resource(texture(TextureFormat::Rgba8UnormSrgb));
        let normal = graph.create_transient_resource(texture(TextureFormat::Rgba16Float));
        let depth = graph.create_transient_resource(texture(TextureFormat::Depth32Float));
        let seen = Arc::new(Mutex::new(None));
        graph
            .add_operation("shade", Shade { seen: seen.clone() })
            .bind(Input, input)
            .bind(Albedo, albedo)
            .bind(Normal, normal)
            .bind(DepthBuffer, depth)
            .finalize();
        graph.compile().unwrap();

        let template = seen.lock().clone().unwrap();
        assert_eq!(
            template.color_formats,
            vec![TextureFormat::Rgba8UnormSrgb, TextureFormat::Rgba16Float]
        );
        assert_eq!(template.depth_format, Some(TextureFormat::Depth32Float));
        assert_eq!(template.sample_count, 1);
    }

    #[test]
    fn test_lifetimes_and_unaccessed_resources() {
        let mut graph = builder(FrameGraphConfig::default());
        let a = graph.create_transient_resource(texture(TextureFormat::Rgba8Unorm));
        let unused = graph.create_transient_resource(texture(TextureFormat::Rgba8Unorm));
        let b = graph.create_transient_resource(texture(TextureFormat::Rgba8Unorm));
        graph.clear_frame_buffer(a, [0.0; 4]);
        graph.clear_frame_buffer(b, [0.0; 4]);
        graph.copy_resource(a, b);
        let compiled = graph.compile().unwrap();

        let a = compiled.resource(a).unwrap();
        assert_eq!(a.first_access(), Some(AccessIndex::new(0)));
        assert_eq!(a.last_access(), Some(AccessIndex::new(2)));
        let b = compiled.resource(b).unwrap();
        assert_eq!(b.first_access(), Some(AccessIndex::new(1)));
        assert_eq!(b.last_access(), Some(AccessIndex::new(3)));

        let unused = compiled.resource(unused).unwrap();
        assert!(unused.first_access().is_none());
        assert!(unused.gpu().is_none());
        assert!(unused.allocation().is_none());
    }

    #[test]
    fn test_same_operation_resources_do_not_alias() {
        let mut graph = builder(FrameGraphConfig::default().with_min_block_size(4096));
        let a = graph.create_transient_resource(texture(TextureFormat::Rgba8Unorm));
        let b = graph.create_transient_resource(texture(TextureFormat::Rgba8Unorm));
        graph.clear_frame_buffer(a, [0.0; 4]);
        graph.copy_resource(a, b);
        let compiled = graph.compile().unwrap();

        let a = compiled.resource(a).unwrap().allocation().copied().unwrap();
        let b = compiled.resource(b).unwrap().allocation().copied().unwrap();
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_persistent_created_in_last_state() {
        let mut graph = builder(FrameGraphConfig::default());
        let source = graph.create_transient_resource(texture(TextureFormat::Rgba8Unorm));
        let history = graph.create_persistent_resource(texture(TextureFormat::Rgba8Unorm));
        graph.clear_frame_buffer(history, [0.0; 4]);
        graph.clear_frame_buffer(source, [1.0; 4]);
        graph.copy_resource(source, history);
        let compiled = graph.compile().unwrap();

        let history = compiled.resource(history).unwrap();
        assert_eq!(history.initial_state(), ResourceState::CopyDest);
        assert!(history.allocation().is_none());
        assert!(history.gpu().is_some());
    }

    #[test]
    fn test_incompatible_copy_fails_compile() {
        let mut graph = builder(FrameGraphConfig::default());
        let a = graph.create_transient_resource(texture(TextureFormat::Rgba8Unorm));
        let b = graph.create_transient_resource(texture(TextureFormat::Rgba32Float));
        graph.copy_resource(a, b);
        assert!(matches!(
            graph.compile(),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }
}

//! Execution engine: per-frame barrier scheduling and pass dispatch.
//!
//! Execution walks the compiled operations in order. Before each operation,
//! every access of its range is turned into up to three barriers:
//!
//! 1. an aliasing barrier on the first access of a transient resource,
//! 2. an unordered-access barrier when the resource is, or is about to be,
//!    in a read-modify-write state,
//! 3. a transition when the tracked state differs from the desired one.
//!
//! The hazard barrier is recorded before the transition so the driver cannot
//! fold it into the transition. Graphics-like operations then get their
//! render targets bound for the duration of `execute`.
//!
//! After the last operation, persistent resources are transitioned back to
//! their creation state and the back buffer to `Present`.

use std::sync::Arc;

use crate::backend::{CommandEncoder, GpuFence, RenderTargetBinding, ResourceBarrier};
use crate::error::{graph_assert, graph_fatal, GraphicsError};
use crate::profiling::{profile_function, profile_scope};
use crate::types::{ResourceState, ScissorRect, Viewport};

use super::access::{Access, AccessCategory, AccessIndex};
use super::compiled::CompiledGraph;
use super::pass::ExecuteParts;
use super::resource::{Resource, ResourceKind};

impl CompiledGraph {
    /// Record and submit one frame.
    pub fn execute(&mut self) -> Result<(), GraphicsError> {
        self.execute_with_fence(None)
    }

    /// Record and submit one frame, signaling `fence` when the GPU is done.
    ///
    /// On error nothing is submitted and every tracked resource state is
    /// rolled back to where the previous frame left it, so the next call
    /// records the same barriers a clean frame would.
    pub fn execute_with_fence(&mut self, fence: Option<&GpuFence>) -> Result<(), GraphicsError> {
        profile_function!();

        let states: Vec<ResourceState> = self
            .resources
            .iter()
            .map(|resource| resource.current_state)
            .collect();
        let result = self.record_frame(fence);
        if let Err(err) = &result {
            log::warn!(
                "{} frame {} failed, rolling back resource states: {}",
                self.config.display_label(),
                self.frame_count + 1,
                err
            );
            for (resource, state) in self.resources.iter_mut().zip(states) {
                resource.current_state = state;
            }
        }
        result
    }

    fn record_frame(&mut self, fence: Option<&GpuFence>) -> Result<(), GraphicsError> {
        self.acquire_back_buffer()?;

        let backend = Arc::clone(&self.backend);
        let mut commands = backend.begin_commands()?;
        let mut barriers = Vec::new();

        for operation in &mut self.operations {
            profile_scope!("operation");

            barriers.clear();
            for index in operation.accesses.clone() {
                collect_barriers(
                    &mut self.resources,
                    AccessIndex::new(index),
                    &self.accesses[index],
                    &operation.name,
                    &mut barriers,
                );
            }
            if !barriers.is_empty() {
                CommandEncoder::new(&*backend, &mut commands).resource_barriers(&barriers)?;
            }

            let accesses = &self.accesses[operation.accesses.clone()];
            let binding = if operation.kind.is_graphics_like() {
                render_target_binding(accesses, &self.resources)
            } else {
                None
            };
            if let Some(binding) = &binding {
                CommandEncoder::new(&*backend, &mut commands).begin_render_targets(binding)?;
            }

            operation.pass.execute(ExecuteParts {
                name: &operation.name,
                accesses,
                resources: &self.resources,
                encoder: CommandEncoder::new(&*backend, &mut commands),
                viewport: binding.as_ref().map(|binding| binding.viewport),
                scissor: binding.as_ref().map(|binding| binding.scissor),
            })?;

            if binding.is_some() {
                CommandEncoder::new(&*backend, &mut commands).end_render_targets()?;
            }
        }

        barriers.clear();
        self.restore_persistent_states(&mut barriers);
        barriers.extend(self.present_barrier());
        if !barriers.is_empty() {
            CommandEncoder::new(&*backend, &mut commands).resource_barriers(&barriers)?;
        }

        backend.submit(commands, fence)?;
        self.frame_count += 1;
        log::trace!(
            "Executed {} frame {} ({} operations)",
            self.config.display_label(),
            self.frame_count,
            self.operations.len()
        );
        Ok(())
    }

    /// Present the swap chain's current back buffer.
    pub fn present(&self) -> Result<(), GraphicsError> {
        profile_function!();
        self.backend.present()
    }

    fn acquire_back_buffer(&mut self) -> Result<(), GraphicsError> {
        let Some(handle) = self.swap_chain else {
            return Ok(());
        };
        let back_buffer = self
            .backend
            .current_back_buffer()
            .ok_or(GraphicsError::SurfaceLost)?;
        let resource = &mut self.resources[handle.index()];
        resource.gpu = Some(back_buffer);
        resource.current_state = ResourceState::Present;
        Ok(())
    }

    /// Return persistent resources to the state they were created in, so
    /// every frame starts from the same states.
    fn restore_persistent_states(&mut self, barriers: &mut Vec<ResourceBarrier>) {
        for resource in &mut self.resources {
            if resource.kind != ResourceKind::Persistent
                || resource.current_state == resource.initial_state
            {
                continue;
            }
            let Some(gpu) = resource.gpu.clone() else {
                continue;
            };
            barriers.push(ResourceBarrier::Transition {
                resource: gpu,
                before: resource.current_state,
                after: resource.initial_state,
            });
            resource.current_state = resource.initial_state;
        }
    }

    fn present_barrier(&mut self) -> Option<ResourceBarrier> {
        let resource = &mut self.resources[self.swap_chain?.index()];
        if resource.current_state == ResourceState::Present {
            return None;
        }
        let barrier = ResourceBarrier::Transition {
            resource: resource.gpu.clone()?,
            before: resource.current_state,
            after: ResourceState::Present,
        };
        resource.current_state = ResourceState::Present;
        Some(barrier)
    }
}

fn collect_barriers(
    resources: &mut [Resource],
    index: AccessIndex,
    access: &Access,
    operation: &str,
    barriers: &mut Vec<ResourceBarrier>,
) {
    graph_assert!(
        access.resource.index() < resources.len(),
        "access {} of operation '{}' refers to resource {} of {}",
        index.index(),
        operation,
        access.resource.index(),
        resources.len()
    );
    let resource = &mut resources[access.resource.index()];
    let Some(gpu) = resource.gpu.clone() else {
        graph_fatal!(
            "resource {} accessed by operation '{}' has no GPU resource",
            access.resource.index(),
            operation
        );
    };

    if resource.kind == ResourceKind::Transient && resource.first_access == Some(index) {
        barriers.push(ResourceBarrier::Aliasing {
            resource: gpu.clone(),
        });
        resource.current_state = resource.initial_state;
    }

    if resource.current_state.is_read_modify_write() || access.state.is_read_modify_write() {
        barriers.push(ResourceBarrier::UnorderedAccess {
            resource: gpu.clone(),
        });
    }

    if resource.current_state != access.state {
        barriers.push(ResourceBarrier::Transition {
            resource: gpu,
            before: resource.current_state,
            after: access.state,
        });
        resource.current_state = access.state;
    }
}

/// Output set of a graphics-like operation. `None` when it has no
/// attachment slots.
fn render_target_binding(accesses: &[Access], resources: &[Resource]) -> Option<RenderTargetBinding> {
    let mut color = Vec::new();
    let mut depth = None;
    let mut depth_read_only = false;
    let mut extent = None;

    for access in accesses {
        if !access.category.is_attachment() {
            continue;
        }
        let resource = &resources[access.resource.index()];
        let Some(gpu) = resource.gpu.clone() else {
            continue;
        };
        match access.category {
            AccessCategory::RenderTarget => color.push(gpu),
            AccessCategory::Depth => {
                depth = Some(gpu);
                depth_read_only = access.state == ResourceState::DepthRead;
            }
            AccessCategory::General => {}
        }
        // Attachments of different sizes: the last one decides.
        extent = Some(resource.descriptor.extent());
    }

    let extent = extent?;
    Some(RenderTargetBinding {
        color,
        depth,
        depth_read_only,
        viewport: Viewport::from_extent(extent),
        scissor: ScissorRect::from_extent(extent),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::backend::dummy::{CommandRecord, SwapChainSettings};
    use crate::backend::{BarrierKind, DummyBackend, GpuBackend};
    use crate::graph::{GraphBuilder, PassContext, PassKind, RenderPass, ResourceHandle};
    use crate::types::{
        BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage,
    };

    fn target(size: u32) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            size,
            size,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        )
    }

    fn barriers(records: &[CommandRecord]) -> Vec<(BarrierKind, u64)> {
        records
            .iter()
            .filter_map(|record| match record {
                CommandRecord::Barrier { kind, resource, .. } => Some((*kind, *resource)),
                _ => None,
            })
            .collect()
    }

    fn gpu_id(graph: &CompiledGraph, handle: ResourceHandle) -> u64 {
        graph.resource(handle).unwrap().gpu().unwrap().id()
    }

    #[test]
    fn test_clear_records_aliasing_then_render_targets() {
        let backend = Arc::new(DummyBackend::new().with_validation(true));
        let mut graph = GraphBuilder::new(backend.clone());
        let a = graph.create_transient_resource(target(32));
        graph.clear_frame_buffer(a, [1.0, 0.0, 0.0, 1.0]);
        let mut compiled = graph.compile().unwrap();
        compiled.execute().unwrap();

        let id = gpu_id(&compiled, a);
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0],
            vec![
                CommandRecord::Barrier {
                    kind: BarrierKind::Aliasing,
                    resource: id,
                    before: None,
                    after: None,
                },
                CommandRecord::BeginRenderTargets {
                    color: vec![id],
                    depth: None,
                    width: 32,
                    height: 32,
                },
                CommandRecord::ClearRenderTarget { target: id },
                CommandRecord::EndRenderTargets,
            ]
        );
        assert!(backend.validation_errors().is_empty());
        assert_eq!(compiled.frame_count(), 1);
    }

    #[test]
    fn test_transition_between_operations() {
        let backend = Arc::new(DummyBackend::new().with_validation(true));
        let mut graph = GraphBuilder::new(backend.clone());
        let a = graph.create_transient_resource(target(16));
        graph.clear_frame_buffer(a, [0.0; 4]);
        graph.download_texture(a);
        let mut compiled = graph.compile().unwrap();
        compiled.execute().unwrap();

        let records = &backend.submissions()[0];
        let id = gpu_id(&compiled, a);
        assert!(records.contains(&CommandRecord::Barrier {
            kind: BarrierKind::Transition,
            resource: id,
            before: Some(ResourceState::RenderTarget),
            after: Some(ResourceState::CopySource),
        }));
        assert!(matches!(
            records.last(),
            Some(CommandRecord::CopyTextureToBuffer { source, .. }) if *source == id
        ));
        assert!(backend.validation_errors().is_empty());
    }

    #[test]
    fn test_frames_record_identical_barriers() {
        let backend = Arc::new(DummyBackend::new().with_validation(true));
        let mut graph = GraphBuilder::new(backend.clone());
        let a = graph.create_transient_resource(target(16));
        let history = graph.create_persistent_resource(target(16));
        graph.clear_frame_buffer(a, [0.5; 4]);
        graph.copy_resource(a, history);
        graph.clear_frame_buffer(history, [0.0; 4]);
        let mut compiled = graph.compile().unwrap();

        for _ in 0..3 {
            compiled.execute().unwrap();
        }
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 3);
        assert_eq!(submissions[0], submissions[1]);
        assert_eq!(submissions[1], submissions[2]);
        assert!(backend.validation_errors().is_empty());
    }

    struct Accumulate;

    crate::pass_slots!(Accumulate {
        Values: General => UnorderedAccess,
    });

    impl RenderPass for Accumulate {
        const KIND: PassKind = PassKind::Compute;

        fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
            assert!(ctx.viewport().is_none());
            assert_eq!(ctx.resource(Values).state, ResourceState::UnorderedAccess);
            Ok(())
        }
    }

    #[test]
    fn test_unordered_access_barriers_precede_transitions() {
        let backend = Arc::new(DummyBackend::new().with_validation(true));
        let mut graph = GraphBuilder::new(backend.clone());
        let values = graph.create_persistent_resource(BufferDescriptor::new(
            256,
            BufferUsage::STORAGE | BufferUsage::COPY_SRC,
        ));
        let copy = graph.create_persistent_resource(BufferDescriptor::new(
            256,
            BufferUsage::COPY_DST,
        ));
        graph.add_operation("first", Accumulate).bind(Values, values).finalize();
        graph.add_operation("second", Accumulate).bind(Values, values).finalize();
        graph.copy_resource(values, copy);
        let mut compiled = graph.compile().unwrap();
        compiled.execute().unwrap();

        let id = gpu_id(&compiled, values);
        let kinds: Vec<BarrierKind> = barriers(&backend.submissions()[0])
            .into_iter()
            .filter(|(_, resource)| *resource == id)
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                BarrierKind::UnorderedAccess,
                BarrierKind::Transition,
                BarrierKind::UnorderedAccess,
                BarrierKind::UnorderedAccess,
                BarrierKind::Transition,
                BarrierKind::Transition,
            ]
        );
        assert!(backend.validation_errors().is_empty());
    }

    struct Sample {
        fail: Arc<AtomicBool>,
    }

    crate::pass_slots!(Sample {
        Input: General => ShaderResource,
    });

    impl RenderPass for Sample {
        const KIND: PassKind = PassKind::Compute;

        fn execute(&mut self, _ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
            if self.fail.swap(false, Ordering::SeqCst) {
                return Err(GraphicsError::Internal("pipeline not ready".into()));
            }
            Ok(())
        }
    }

    fn accumulate_then_sample(
        backend: Arc<DummyBackend>,
        fail: Arc<AtomicBool>,
    ) -> (CompiledGraph, ResourceHandle) {
        let mut graph = GraphBuilder::new(backend);
        let values = graph.create_persistent_resource(BufferDescriptor::new(
            256,
            BufferUsage::STORAGE,
        ));
        graph.add_operation("accumulate", Accumulate).bind(Values, values).finalize();
        graph
            .add_operation("sample", Sample { fail })
            .bind(Input, values)
            .finalize();
        (graph.compile().unwrap(), values)
    }

    #[test]
    fn test_persistent_buffer_returns_to_initial_state() {
        let backend = Arc::new(DummyBackend::new().with_validation(true));
        let (mut compiled, values) =
            accumulate_then_sample(backend.clone(), Arc::new(AtomicBool::new(false)));
        let initial = compiled.resource(values).unwrap().initial_state();
        assert_ne!(initial, ResourceState::ShaderResource);

        compiled.execute().unwrap();
        compiled.execute().unwrap();

        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0], submissions[1]);
        assert_eq!(
            submissions[0].last(),
            Some(&CommandRecord::Barrier {
                kind: BarrierKind::Transition,
                resource: gpu_id(&compiled, values),
                before: Some(ResourceState::ShaderResource),
                after: Some(initial),
            })
        );
        assert_eq!(compiled.resource(values).unwrap().current_state(), initial);
        assert!(backend.validation_errors().is_empty());
    }

    #[test]
    fn test_failed_frame_rolls_back_states() {
        let backend = Arc::new(DummyBackend::new().with_validation(true));
        let fail = Arc::new(AtomicBool::new(true));
        let (mut compiled, values) = accumulate_then_sample(backend.clone(), fail.clone());
        let initial = compiled.resource(values).unwrap().initial_state();

        let err = compiled.execute().unwrap_err();
        assert!(matches!(err, GraphicsError::Internal(_)));
        assert!(!fail.load(Ordering::SeqCst));
        assert!(backend.submissions().is_empty());
        assert_eq!(compiled.frame_count(), 0);
        assert_eq!(compiled.resource(values).unwrap().current_state(), initial);

        compiled.execute().unwrap();
        compiled.execute().unwrap();
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0], submissions[1]);
        assert_eq!(compiled.frame_count(), 2);
        assert!(backend.validation_errors().is_empty());
    }

    struct TwoTargets {
        seen: Arc<Mutex<Option<Viewport>>>,
    }

    crate::pass_slots!(TwoTargets {
        Small: RenderTarget => RenderTarget,
        Large: RenderTarget => RenderTarget,
        DepthTarget: Depth => DepthRead,
    });

    impl RenderPass for TwoTargets {
        const KIND: PassKind = PassKind::Graphics;

        fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
            *self.seen.lock() = ctx.viewport();
            Ok(())
        }
    }

    #[test]
    fn test_last_attachment_decides_extent() {
        let backend = Arc::new(DummyBackend::new().with_validation(true));
        let mut graph = GraphBuilder::new(backend.clone());
        let small = graph.create_transient_resource(target(8));
        let large = graph.create_transient_resource(target(16));
        let depth = graph.create_transient_resource(TextureDescriptor::new_2d(
            24,
            24,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT,
        ));
        let seen = Arc::new(Mutex::new(None));
        graph
            .add_operation("two targets", TwoTargets { seen: seen.clone() })
            .bind(Small, small)
            .bind(Large, large)
            .bind(DepthTarget, depth)
            .finalize();
        let mut compiled = graph.compile().unwrap();
        compiled.execute().unwrap();

        assert_eq!(*seen.lock(), Some(Viewport::new(0.0, 0.0, 24.0, 24.0)));
        let records = &backend.submissions()[0];
        assert!(records.contains(&CommandRecord::BeginRenderTargets {
            color: vec![gpu_id(&compiled, small), gpu_id(&compiled, large)],
            depth: Some(gpu_id(&compiled, depth)),
            width: 24,
            height: 24,
        }));
        assert!(backend.validation_errors().is_empty());
    }

    #[test]
    fn test_swap_chain_returns_to_present() {
        let backend = Arc::new(DummyBackend::new().with_validation(true).with_swap_chain(
            SwapChainSettings {
                width: 16,
                height: 16,
                format: TextureFormat::Bgra8Unorm,
                buffer_count: 2,
            },
        ));
        let mut graph = GraphBuilder::new(backend.clone());
        let swap_chain = graph.swap_chain_resource().unwrap();
        graph.clear_frame_buffer(swap_chain, [0.0, 0.0, 1.0, 1.0]);
        let mut compiled = graph.compile().unwrap();

        compiled.execute().unwrap();
        let first = gpu_id(&compiled, swap_chain);
        compiled.present().unwrap();
        compiled.execute().unwrap();
        let second = gpu_id(&compiled, swap_chain);
        compiled.present().unwrap();
        assert_ne!(first, second);

        let submissions = backend.submissions();
        for (records, id) in submissions.iter().zip([first, second]) {
            assert_eq!(
                records.first(),
                Some(&CommandRecord::Barrier {
                    kind: BarrierKind::Transition,
                    resource: id,
                    before: Some(ResourceState::Present),
                    after: Some(ResourceState::RenderTarget),
                })
            );
            assert_eq!(
                records.last(),
                Some(&CommandRecord::Barrier {
                    kind: BarrierKind::Transition,
                    resource: id,
                    before: Some(ResourceState::RenderTarget),
                    after: Some(ResourceState::Present),
                })
            );
        }
        assert_eq!(
            compiled.resource(swap_chain).unwrap().current_state(),
            ResourceState::Present
        );
        assert!(backend.validation_errors().is_empty());
    }

    #[test]
    fn test_fence_signaled_after_execute() {
        let backend = Arc::new(DummyBackend::new());
        let mut graph = GraphBuilder::new(backend.clone());
        let a = graph.create_transient_resource(target(4));
        graph.clear_frame_buffer(a, [0.0; 4]);
        let mut compiled = graph.compile().unwrap();

        let fence = backend.create_fence(false).unwrap();
        assert!(!backend.is_fence_signaled(&fence));
        compiled.execute_with_fence(Some(&fence)).unwrap();
        assert!(backend.is_fence_signaled(&fence));
        backend.wait_fence(&fence).unwrap();
    }
}

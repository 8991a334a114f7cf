//! The compiled, repeatedly executable frame graph.

use std::sync::Arc;

use crate::backend::{GpuBackend, HeapTier};
use crate::config::FrameGraphConfig;
use crate::error::GraphicsError;
use crate::memory::{HeapStats, MemoryAliasManager};

use super::access::{Access, AccessIndex};
use super::pass::{Operation, OperationHandle, PassKind};
use super::resource::{Resource, ResourceHandle};

/// A compiled frame graph.
///
/// Owns every resource of the graph: persistent resources, the placed
/// transients and the heaps they alias. Call
/// [`execute`](Self::execute) once per frame.
pub struct CompiledGraph {
    pub(crate) backend: Arc<dyn GpuBackend>,
    pub(crate) config: FrameGraphConfig,
    pub(crate) resources: Vec<Resource>,
    pub(crate) accesses: Vec<Access>,
    pub(crate) operations: Vec<Operation>,
    pub(crate) swap_chain: Option<ResourceHandle>,
    pub(crate) aliases: MemoryAliasManager,
    pub(crate) frame_count: u64,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("label", &self.config.display_label())
            .field("operations", &self.operations)
            .field("resources", &self.resources.len())
            .field("accesses", &self.accesses.len())
            .field("aliases", &self.aliases)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

impl CompiledGraph {
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        config: FrameGraphConfig,
        resources: Vec<Resource>,
        accesses: Vec<Access>,
        operations: Vec<Operation>,
        swap_chain: Option<ResourceHandle>,
        aliases: MemoryAliasManager,
    ) -> Self {
        Self {
            backend,
            config,
            resources,
            accesses,
            operations,
            swap_chain,
            aliases,
            frame_count: 0,
        }
    }

    /// Backend the graph runs on.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Configuration the graph was compiled with.
    pub fn config(&self) -> &FrameGraphConfig {
        &self.config
    }

    /// A resource.
    pub fn resource(&self, handle: ResourceHandle) -> Result<&Resource, GraphicsError> {
        self.resources
            .get(handle.index())
            .ok_or(GraphicsError::OutOfRange {
                what: "resource",
                index: handle.index(),
                len: self.resources.len(),
            })
    }

    /// An access.
    pub fn access(&self, index: AccessIndex) -> Result<&Access, GraphicsError> {
        self.accesses
            .get(index.index())
            .ok_or(GraphicsError::OutOfRange {
                what: "access",
                index: index.index(),
                len: self.accesses.len(),
            })
    }

    fn operation(&self, handle: OperationHandle) -> Result<&Operation, GraphicsError> {
        self.operations
            .get(handle.index())
            .ok_or(GraphicsError::OutOfRange {
                what: "operation",
                index: handle.index(),
                len: self.operations.len(),
            })
    }

    /// Name of an operation.
    pub fn operation_name(&self, handle: OperationHandle) -> Result<&str, GraphicsError> {
        self.operation(handle).map(|op| op.name.as_str())
    }

    /// Kind of an operation.
    pub fn operation_kind(&self, handle: OperationHandle) -> Result<PassKind, GraphicsError> {
        self.operation(handle).map(|op| op.kind)
    }

    /// Accesses of an operation, in slot order.
    pub fn operation_accesses(&self, handle: OperationHandle) -> Result<&[Access], GraphicsError> {
        self.operation(handle)
            .map(|op| &self.accesses[op.accesses.clone()])
    }

    /// All resources.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// All accesses, in execution order.
    pub fn accesses(&self) -> &[Access] {
        &self.accesses
    }

    /// Number of operations.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// The presentation target, if any.
    pub fn swap_chain_resource(&self) -> Option<ResourceHandle> {
        self.swap_chain
    }

    /// Heap tier used for transient memory.
    pub fn heap_tier(&self) -> HeapTier {
        self.aliases.tier()
    }

    /// Per-heap memory statistics.
    pub fn memory_stats(&self) -> Vec<HeapStats> {
        self.aliases.heap_stats()
    }

    /// Sum of the peak aliased memory of every heap.
    pub fn peak_memory_usage(&self) -> u64 {
        self.aliases.total_peak_usage()
    }

    /// Number of times the graph was executed.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Show every operation's GUI, each in its own collapsible section.
    pub fn display_gui(&mut self, ui: &mut egui::Ui) {
        for (index, operation) in self.operations.iter_mut().enumerate() {
            ui.push_id(index, |ui| {
                ui.collapsing(operation.name.as_str(), |ui| {
                    operation.pass.display_gui(ui);
                });
            });
        }
    }
}

impl Drop for CompiledGraph {
    fn drop(&mut self) {
        for operation in &mut self.operations {
            operation.pass.destroy(&*self.backend);
        }
        log::debug!("Destroyed {}", self.config.display_label());
    }
}

static_assertions::assert_impl_all!(CompiledGraph: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::graph::GraphBuilder;
    use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

    fn compiled() -> (CompiledGraph, ResourceHandle, OperationHandle) {
        let mut graph = GraphBuilder::new(Arc::new(DummyBackend::new()));
        let target = graph.create_transient_resource(TextureDescriptor::new_2d(
            8,
            8,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        ));
        let clear = graph.clear_frame_buffer(target, [0.0; 4]);
        (graph.compile().unwrap(), target, clear)
    }

    #[test]
    fn test_accessors() {
        let (graph, target, clear) = compiled();
        assert_eq!(graph.operation_name(clear).unwrap(), "clear frame buffer");
        assert_eq!(graph.operation_kind(clear).unwrap(), PassKind::Graphics);
        assert_eq!(graph.operation_accesses(clear).unwrap().len(), 1);
        assert_eq!(graph.access(AccessIndex::new(0)).unwrap().resource(), target);
        assert!(graph.resource(target).unwrap().gpu().is_some());
        assert_eq!(graph.frame_count(), 0);
    }

    #[test]
    fn test_out_of_range_accessors() {
        let (graph, _, _) = compiled();
        assert_eq!(
            graph.resource(ResourceHandle::new(5)).unwrap_err(),
            GraphicsError::OutOfRange {
                what: "resource",
                index: 5,
                len: 1
            }
        );
        assert!(matches!(
            graph.access(AccessIndex::new(1)),
            Err(GraphicsError::OutOfRange { what: "access", .. })
        ));
        assert!(matches!(
            graph.operation_name(OperationHandle::new(9)),
            Err(GraphicsError::OutOfRange { what: "operation", .. })
        ));
    }

    #[test]
    fn test_display_gui_visits_every_operation() {
        let (mut graph, _, _) = compiled();
        let ctx = egui::Context::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| graph.display_gui(ui));
        });
    }
}

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use redlilium_framegraph::graph::{
    GraphBuilder, PassContext, PassKind, RenderPass, ResourceHandle,
};
use redlilium_framegraph::memory::BuddyAllocator;
use redlilium_framegraph::{
    pass_slots, BufferDescriptor, BufferUsage, DummyBackend, GpuBackend, GraphicsError,
    TextureDescriptor, TextureFormat, TextureUsage,
};

struct Blur;

pass_slots!(Blur {
    pub BlurInput: General => ShaderResource,
    pub BlurOutput: General => UnorderedAccess,
});

impl RenderPass for Blur {
    const KIND: PassKind = PassKind::Compute;

    fn execute(&mut self, _ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
        Ok(())
    }
}

fn backend() -> Arc<dyn GpuBackend> {
    Arc::new(DummyBackend::new())
}

fn color(size: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        size,
        size,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_ATTACHMENT
            | TextureUsage::TEXTURE_BINDING
            | TextureUsage::STORAGE_BINDING,
    )
}

/// A post-processing style chain: one clear then `passes` blurs over
/// ping-ponged transients, with a buffer chain alongside.
fn build_chain(backend: Arc<dyn GpuBackend>, passes: usize) -> GraphBuilder {
    let mut graph = GraphBuilder::new(backend);
    let first = graph.create_transient_resource(color(256));
    graph.clear_frame_buffer(first, [0.0, 0.0, 0.0, 1.0]);

    let mut previous: ResourceHandle = first;
    for i in 0..passes {
        let next = if i % 3 == 0 {
            graph.create_transient_resource(BufferDescriptor::new(
                256 * 1024,
                BufferUsage::STORAGE,
            ))
        } else {
            graph.create_transient_resource(color(256))
        };
        graph
            .add_operation(format!("blur_{i}"), Blur)
            .bind(BlurInput, previous)
            .bind(BlurOutput, next)
            .finalize();
        previous = next;
    }
    graph
}

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

fn bench_graph_build(c: &mut Criterion) {
    let backend = backend();
    c.bench_function("frame_graph_build_32_operations", |b| {
        b.iter(|| {
            black_box(build_chain(backend.clone(), 32));
        });
    });
}

// ---------------------------------------------------------------------------
// Graph compilation
// ---------------------------------------------------------------------------

fn bench_graph_compile(c: &mut Criterion) {
    let backend = backend();
    c.bench_function("frame_graph_compile_32_operations", |b| {
        b.iter_with_setup(
            || build_chain(backend.clone(), 32),
            |graph| {
                black_box(graph.compile().unwrap());
            },
        );
    });
}

fn bench_graph_compile_large(c: &mut Criterion) {
    let backend = backend();
    c.bench_function("frame_graph_compile_256_operations", |b| {
        b.iter_with_setup(
            || build_chain(backend.clone(), 256),
            |graph| {
                black_box(graph.compile().unwrap());
            },
        );
    });
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn bench_graph_execute(c: &mut Criterion) {
    let mut compiled = build_chain(backend(), 32).compile().unwrap();

    c.bench_function("frame_graph_execute_32_operations", |b| {
        b.iter(|| {
            compiled.execute().unwrap();
        });
    });
    black_box(compiled.frame_count());
}

// ---------------------------------------------------------------------------
// Buddy allocator
// ---------------------------------------------------------------------------

fn bench_buddy_churn(c: &mut Criterion) {
    c.bench_function("buddy_allocate_free_1024", |b| {
        b.iter(|| {
            let mut buddy = BuddyAllocator::new(64 * 1024 * 1024, 4096);
            let mut offsets = Vec::with_capacity(1024);
            for i in 0..1024u64 {
                if let Some(offset) = buddy.allocate(4096 << (i % 5)) {
                    offsets.push(offset);
                }
                if i % 3 == 0 {
                    if let Some(offset) = offsets.pop() {
                        buddy.deallocate(offset);
                    }
                }
            }
            for offset in offsets {
                buddy.deallocate(offset);
            }
            black_box(buddy.free_bytes());
        });
    });
}

criterion_group!(
    benches,
    bench_graph_build,
    bench_graph_compile,
    bench_graph_compile_large,
    bench_graph_execute,
    bench_buddy_churn,
);
criterion_main!(benches);

//! Frame graph integration tests.
//!
//! These tests build, compile and execute whole graphs against real
//! backends. They are parameterized using `rstest` to run against every
//! backend; backends that are not compiled in or have no device are skipped.
//!
//! # Test Categories
//!
//! - **Lifetime Tests**: Access ranges computed at compile time
//! - **Aliasing Tests**: Transient memory reuse and its safety
//! - **Execution Tests**: Clears, readback and repeated frames
//! - **Heap Tests**: Heap categories per tier
//!
//! ```bash
//! cargo test --test framegraph_tests
//! cargo test --test framegraph_tests --features vulkan-backend
//! ```

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{
    color_target, depth_target, fill, lifetimes, resolve, storage_buffer, transform, Backend,
    TestContext,
};
use redlilium_framegraph::backend::dummy::{CommandRecord, DummyBackend, SwapChainSettings};
use redlilium_framegraph::backend::{GpuBackend, HeapCategory, HeapTier};
use redlilium_framegraph::graph::{CompiledGraph, GraphBuilder};
use redlilium_framegraph::memory::BuddyAllocator;
use redlilium_framegraph::{
    FrameGraphConfig, GraphicsError, ResourceState, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Deterministic pseudo-random sequence for generated graphs.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

fn assert_aliasing_safe(graph: &CompiledGraph) -> usize {
    let ranges = lifetimes(graph);
    let mut shared = 0;
    for (i, &(a, a_first, a_last)) in ranges.iter().enumerate() {
        for &(b, b_first, b_last) in &ranges[i + 1..] {
            let (Some(alloc_a), Some(alloc_b)) = (
                graph.resources()[a].allocation(),
                graph.resources()[b].allocation(),
            ) else {
                continue;
            };
            let lifetimes_overlap = a_first <= b_last && b_first <= a_last;
            if lifetimes_overlap {
                assert!(
                    !alloc_a.overlaps(alloc_b),
                    "resources {} and {} are alive together but share memory: {:?} / {:?}",
                    a,
                    b,
                    alloc_a,
                    alloc_b
                );
            } else if alloc_a.overlaps(alloc_b) {
                shared += 1;
            }
        }
    }
    shared
}

// ============================================================================
// Lifetime Tests
// ============================================================================

/// Every accessed resource has `first <= last` inside the access table, for
/// generated operation sequences.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_generated_graphs_have_valid_lifetimes(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    for seed in 1..=8u64 {
        let mut rng = Lcg(seed);
        let mut graph = ctx.builder();
        let resource_count = 3 + rng.below(6) as usize;
        let resources: Vec<_> = (0..resource_count)
            .map(|index| {
                let size = 256 << rng.below(5);
                graph.create_transient_resource(
                    storage_buffer(size).with_label(format!("generated {index}")),
                )
            })
            .collect();

        let operation_count = 2 + rng.below(10) as usize;
        let mut touched = vec![false; resource_count];
        for op in 0..operation_count {
            let output = rng.below(resource_count as u64) as usize;
            let input = rng.below(resource_count as u64) as usize;
            if input == output {
                fill(&mut graph, &format!("fill {op}"), resources[output]);
            } else {
                transform(
                    &mut graph,
                    &format!("transform {op}"),
                    resources[input],
                    resources[output],
                );
                touched[input] = true;
            }
            touched[output] = true;
        }

        let mut compiled = graph.compile().unwrap();
        let access_count = compiled.accesses().len();
        for (index, resource) in compiled.resources().iter().enumerate() {
            match (resource.first_access(), resource.last_access()) {
                (Some(first), Some(last)) => {
                    assert!(touched[index], "seed {seed}: resource {index} has a lifetime");
                    assert!(first <= last, "seed {seed}: resource {index} ends early");
                    assert!(last.index() < access_count);
                }
                (None, None) => {
                    assert!(!touched[index], "seed {seed}: resource {index} has no lifetime");
                    assert!(resource.gpu().is_none());
                }
                other => panic!("seed {seed}: resource {index} has half a lifetime: {:?}", other),
            }
        }
        assert_aliasing_safe(&compiled);

        compiled.execute().unwrap();
        ctx.gpu.wait_idle().unwrap();
    }
    assert_eq!(ctx.validation_error_count(), 0);
}

// ============================================================================
// Aliasing Tests
// ============================================================================

/// A long chain of transients reuses memory without ever handing the same
/// bytes to two live resources.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_heavy_aliasing_is_safe(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut graph = ctx.builder();
    let buffers: Vec<_> = (0..12)
        .map(|index| {
            graph.create_transient_resource(
                storage_buffer(64 * 1024).with_label(format!("chain buffer {index}")),
            )
        })
        .collect();
    let history = graph.create_persistent_resource(storage_buffer(64 * 1024));
    fill(&mut graph, "seed", buffers[0]);
    for (index, pair) in buffers.windows(2).enumerate() {
        transform(&mut graph, &format!("step {index}"), pair[0], pair[1]);
    }
    graph.copy_resource(buffers[11], history);

    let textures: Vec<_> = (0..4)
        .map(|index| {
            graph.create_transient_resource(
                color_target(32, 32).with_label(format!("chain texture {index}")),
            )
        })
        .collect();
    graph.clear_frame_buffer(textures[0], [0.0, 0.0, 0.0, 1.0]);
    for (index, pair) in textures.windows(2).enumerate() {
        resolve(&mut graph, &format!("resolve {index}"), pair[0], pair[1]);
    }
    let (_, readback) = graph.download_texture(textures[3]);

    let mut compiled = graph.compile().unwrap();
    let shared = assert_aliasing_safe(&compiled);
    assert!(shared > 0, "no transient memory was reused");

    for _ in 0..3 {
        compiled.execute().unwrap();
    }
    let texels = readback.read().unwrap();
    assert_eq!(texels.len(), 32 * 32 * 4);
    assert_eq!(ctx.validation_error_count(), 0);
}

/// Two transients with disjoint lifetimes need only the larger block.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_disjoint_lifetimes_peak_is_max(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut graph = ctx.builder();
    let a = graph.create_transient_resource(storage_buffer(128 * 1024).with_label("a"));
    let b = graph.create_transient_resource(storage_buffer(256 * 1024).with_label("b"));
    fill(&mut graph, "first", a);
    fill(&mut graph, "second", b);
    let compiled = graph.compile().unwrap();

    let size_a = compiled.resource(a).unwrap().allocation().unwrap().size;
    let size_b = compiled.resource(b).unwrap().allocation().unwrap().size;
    assert!(size_b >= size_a);
    assert_eq!(compiled.peak_memory_usage(), size_a.max(size_b));
}

/// Without aliasing every transient keeps its own range.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_disabled_aliasing_peak_is_sum(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut graph = ctx.builder_with_config(FrameGraphConfig::default().with_aliasing(false));
    let handles: Vec<_> = [64 * 1024, 128 * 1024, 256 * 1024]
        .into_iter()
        .map(|size| graph.create_transient_resource(storage_buffer(size)))
        .collect();
    for (index, &handle) in handles.iter().enumerate() {
        fill(&mut graph, &format!("fill {index}"), handle);
    }
    let mut compiled = graph.compile().unwrap();

    let sum: u64 = handles
        .iter()
        .map(|&handle| compiled.resource(handle).unwrap().allocation().unwrap().size)
        .sum();
    assert_eq!(compiled.peak_memory_usage(), sum);
    assert_eq!(assert_aliasing_safe(&compiled), 0);

    compiled.execute().unwrap();
    ctx.gpu.wait_idle().unwrap();
    assert_eq!(ctx.validation_error_count(), 0);
}

// ============================================================================
// Execution Tests
// ============================================================================

/// Clear a 64x64 transient and read every pixel back.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_clear_and_readback(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut graph = ctx.builder();
    let target = graph.create_transient_resource(color_target(64, 64).with_label("target"));
    graph.clear_frame_buffer(target, [1.0, 0.0, 0.0, 1.0]);
    let (_, readback) = graph.download_texture(target);
    let mut compiled = graph.compile().unwrap();
    assert!(readback.is_ready());

    compiled.execute().unwrap();
    let texels = readback.read().unwrap();

    assert_eq!(texels.len(), 64 * 64 * 4);
    for (index, pixel) in texels.chunks_exact(4).enumerate() {
        assert_eq!(pixel, [255, 0, 0, 255], "pixel {} differs", index);
    }
    assert_eq!(ctx.validation_error_count(), 0);
}

/// A depth clear followed by a readback of the depth values.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_depth_clear_and_readback(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut graph = ctx.builder();
    let depth = graph.create_transient_resource(depth_target(16, 16));
    graph.clear_depth_buffer(depth, 0.5, 0);
    let (_, readback) = graph.download_texture(depth);
    let mut compiled = graph.compile().unwrap();
    compiled.execute().unwrap();

    let texels = readback.read().unwrap();
    let values: Vec<f32> = texels
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect();
    assert_eq!(values.len(), 16 * 16);
    assert!(values.iter().all(|&value| value == 0.5));
    assert_eq!(ctx.validation_error_count(), 0);
}

/// Repeated frames record the same barriers; only the back buffer changes.
#[test]
fn test_repeated_frames_are_identical_except_back_buffer() {
    common::init_logging();
    let backend = Arc::new(
        DummyBackend::new()
            .with_validation(true)
            .with_swap_chain(SwapChainSettings {
                width: 32,
                height: 32,
                format: TextureFormat::Rgba8Unorm,
                buffer_count: 3,
            }),
    );
    let mut graph = GraphBuilder::new(backend.clone());
    let swap_chain = graph.swap_chain_resource().unwrap();
    let scene = graph.create_transient_resource(color_target(32, 32));
    let history = graph.create_persistent_resource(color_target(32, 32));
    graph.clear_frame_buffer(scene, [0.1, 0.2, 0.3, 1.0]);
    resolve(&mut graph, "resolve", scene, swap_chain);
    graph.copy_resource(scene, history);
    let mut compiled = graph.compile().unwrap();

    let mut back_buffers = Vec::new();
    for _ in 0..4 {
        compiled.execute().unwrap();
        back_buffers.push(compiled.resource(swap_chain).unwrap().gpu().unwrap().id());
        compiled.present().unwrap();
    }

    let normalized: Vec<Vec<CommandRecord>> = backend
        .submissions()
        .into_iter()
        .zip(&back_buffers)
        .map(|(records, &back_buffer)| normalize_back_buffer(records, back_buffer))
        .collect();
    assert_eq!(normalized.len(), 4);
    for frame in &normalized[1..] {
        assert_eq!(frame, &normalized[0]);
    }
    assert_ne!(back_buffers[0], back_buffers[1]);
    assert_eq!(back_buffers[0], back_buffers[3]);
    assert!(backend.validation_errors().is_empty());
}

fn normalize_back_buffer(records: Vec<CommandRecord>, back_buffer: u64) -> Vec<CommandRecord> {
    let map = |id: u64| if id == back_buffer { 0 } else { id };
    records
        .into_iter()
        .map(|record| match record {
            CommandRecord::Barrier {
                kind,
                resource,
                before,
                after,
            } => CommandRecord::Barrier {
                kind,
                resource: map(resource),
                before,
                after,
            },
            CommandRecord::BeginRenderTargets {
                color,
                depth,
                width,
                height,
            } => CommandRecord::BeginRenderTargets {
                color: color.into_iter().map(map).collect(),
                depth: depth.map(map),
                width,
                height,
            },
            CommandRecord::ClearRenderTarget { target } => {
                CommandRecord::ClearRenderTarget { target: map(target) }
            }
            other => other,
        })
        .collect()
}

/// The fence passed to an execution signals once the frame is done.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_execute_with_fence(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut graph = ctx.builder();
    let target = graph.create_transient_resource(color_target(16, 16));
    graph.clear_frame_buffer(target, [0.0, 1.0, 0.0, 1.0]);
    let mut compiled = graph.compile().unwrap();

    for frame in 1..=3 {
        let fence = ctx.gpu.create_fence(false).unwrap();
        compiled.execute_with_fence(Some(&fence)).unwrap();
        ctx.gpu.wait_fence(&fence).unwrap();
        assert!(ctx.gpu.is_fence_signaled(&fence));
        assert_eq!(compiled.frame_count(), frame);
    }
    assert_eq!(ctx.validation_error_count(), 0);
}

/// Persistent resources last read as shader resources still start every
/// frame in the state they were created in.
#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_persistent_resources_start_each_frame_alike(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut graph = ctx.builder();
    let particles = graph.create_persistent_resource(storage_buffer(16 * 1024));
    let history = graph.create_persistent_resource(color_target(32, 32));
    let scratch = graph.create_transient_resource(storage_buffer(16 * 1024));
    let output = graph.create_transient_resource(color_target(32, 32));
    fill(&mut graph, "simulate", particles);
    transform(&mut graph, "integrate", particles, scratch);
    graph.clear_frame_buffer(history, [0.0; 4]);
    resolve(&mut graph, "reproject", history, output);
    let mut compiled = graph.compile().unwrap();

    let initial: Vec<ResourceState> = [particles, history]
        .iter()
        .map(|&handle| compiled.resource(handle).unwrap().initial_state())
        .collect();
    assert!(initial.iter().all(|&state| state != ResourceState::ShaderResource));

    for _ in 0..3 {
        compiled.execute().unwrap();
        for (&handle, &state) in [particles, history].iter().zip(&initial) {
            assert_eq!(compiled.resource(handle).unwrap().current_state(), state);
        }
    }
    ctx.gpu.wait_idle().unwrap();
    assert_eq!(ctx.validation_error_count(), 0);

    if let Some(dummy) = ctx.dummy() {
        let submissions = dummy.submissions();
        assert_eq!(submissions.len(), 3);
        assert_eq!(submissions[0], submissions[1]);
        assert_eq!(submissions[1], submissions[2]);
    }
}

// ============================================================================
// Heap Tests
// ============================================================================

fn mixed_category_graph(ctx: &TestContext) -> CompiledGraph {
    let mut graph = ctx.builder();
    let buffer = graph.create_transient_resource(storage_buffer(4096));
    let target = graph.create_transient_resource(color_target(16, 16));
    let sampled = graph.create_transient_resource(TextureDescriptor::new_2d(
        16,
        16,
        TextureFormat::Rgba8Unorm,
        TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
    ));
    fill(&mut graph, "fill", buffer);
    graph.clear_frame_buffer(target, [0.0; 4]);
    graph.copy_resource(target, sampled);
    graph.compile().unwrap()
}

#[test]
fn test_tier1_uses_three_heaps() {
    let ctx = TestContext::with_heap_tier(Backend::Dummy, Some(HeapTier::Tier1)).unwrap();
    let mut compiled = mixed_category_graph(&ctx);
    assert_eq!(compiled.heap_tier(), HeapTier::Tier1);

    let mut categories: Vec<HeapCategory> = compiled
        .memory_stats()
        .iter()
        .filter(|stats| stats.resource_count > 0)
        .map(|stats| stats.category)
        .collect();
    categories.sort_by_key(|category| category.name());
    assert_eq!(
        categories,
        vec![
            HeapCategory::Buffers,
            HeapCategory::RenderTargets,
            HeapCategory::Textures
        ]
    );
    let dummy = ctx.dummy().unwrap();
    assert_eq!(dummy.live_heaps().len(), 3);

    compiled.execute().unwrap();
    assert_eq!(ctx.validation_error_count(), 0);
}

#[test]
fn test_tier2_uses_one_heap() {
    let ctx = TestContext::with_heap_tier(Backend::Dummy, Some(HeapTier::Tier2)).unwrap();
    let compiled = mixed_category_graph(&ctx);

    let stats = compiled.memory_stats();
    let used: Vec<_> = stats.iter().filter(|stats| stats.resource_count > 0).collect();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].category, HeapCategory::Universal);
    assert_eq!(used[0].resource_count, 3);
    assert_eq!(ctx.dummy().unwrap().live_heaps().len(), 1);
}

/// Heaps are released with the compiled graph.
#[test]
fn test_dropping_graph_releases_heaps() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let compiled = mixed_category_graph(&ctx);
    assert!(!ctx.dummy().unwrap().live_heaps().is_empty());
    drop(compiled);
    assert!(ctx.dummy().unwrap().live_heaps().is_empty());
}

// ============================================================================
// Accessor Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_out_of_range_accessors_return_errors(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut small = ctx.builder();
    let only = small.create_transient_resource(color_target(8, 8));
    small.clear_frame_buffer(only, [0.0; 4]);
    let small = small.compile().unwrap();

    let mut large = ctx.builder();
    let handles: Vec<_> = (0..3)
        .map(|_| large.create_transient_resource(color_target(8, 8)))
        .collect();
    let mut operations = Vec::new();
    for &handle in &handles {
        operations.push(large.clear_frame_buffer(handle, [0.0; 4]));
    }
    let large = large.compile().unwrap();
    let foreign_access = large.resource(handles[2]).unwrap().first_access().unwrap();

    assert!(matches!(
        small.resource(handles[2]),
        Err(GraphicsError::OutOfRange {
            what: "resource",
            index: 2,
            len: 1
        })
    ));
    assert!(matches!(
        small.access(foreign_access),
        Err(GraphicsError::OutOfRange { what: "access", .. })
    ));
    assert!(matches!(
        small.operation_name(operations[2]),
        Err(GraphicsError::OutOfRange {
            what: "operation",
            ..
        })
    ));
    assert_eq!(small.operation_name(operations[0]).unwrap(), "clear frame buffer");
}

// ============================================================================
// Buddy Allocator Tests
// ============================================================================

/// Allocating then freeing everything restores the full capacity, for
/// generated request sequences.
#[test]
fn test_buddy_round_trip_restores_capacity() {
    const CAPACITY: u64 = 1 << 20;
    const MIN_BLOCK: u64 = 256;

    for seed in 1..=16u64 {
        let mut rng = Lcg(seed);
        let mut buddy = BuddyAllocator::new(CAPACITY, MIN_BLOCK);
        let mut offsets = Vec::new();
        loop {
            let size = MIN_BLOCK << rng.below(8);
            match buddy.allocate(size) {
                Some(offset) => offsets.push(offset),
                None => break,
            }
        }
        assert!(!offsets.is_empty());

        // Free in a shuffled order so merges happen out of allocation order.
        while !offsets.is_empty() {
            let index = rng.below(offsets.len() as u64) as usize;
            buddy.deallocate(offsets.swap_remove(index));
        }

        assert_eq!(buddy.allocated_bytes(), 0, "seed {seed}");
        assert_eq!(buddy.free_bytes(), CAPACITY);
        assert_eq!(buddy.allocate(CAPACITY), Some(0), "seed {seed}");
    }
}

#[test]
fn test_create_backend_falls_back_to_dummy() {
    common::init_logging();
    let params = redlilium_framegraph::BackendParameters::default()
        .with_backend(redlilium_framegraph::BackendType::Auto);
    let backend: Arc<dyn GpuBackend> = redlilium_framegraph::create_backend(&params).unwrap();
    assert!(["Dummy", "Vulkan"].contains(&backend.name()));
}

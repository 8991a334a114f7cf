//! # RedLilium Frame Graph
//!
//! Frame graph core of the RedLilium engine: passes declare typed resource
//! slots, the graph computes resource lifetimes, aliases transient memory
//! and schedules barriers.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`graph::GraphBuilder`] - Declares resources and operations in execution order
//! - [`graph::RenderPass`] and [`pass_slots!`] - The pass capability set and its typed slots
//! - [`graph::CompiledGraph`] - Owns all GPU memory of the graph and executes it every frame
//! - [`memory`] - Buddy allocator and transient memory aliasing
//! - [`backend::GpuBackend`] - The rendering context, with a headless dummy
//!   backend and an optional Vulkan backend
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use redlilium_framegraph::backend::DummyBackend;
//! use redlilium_framegraph::graph::GraphBuilder;
//! use redlilium_framegraph::types::{TextureDescriptor, TextureFormat, TextureUsage};
//!
//! redlilium_framegraph::init();
//!
//! let mut graph = GraphBuilder::new(Arc::new(DummyBackend::new()));
//! let depth = graph.create_transient_resource(TextureDescriptor::new_2d(
//!     256,
//!     256,
//!     TextureFormat::Depth32Float,
//!     TextureUsage::RENDER_ATTACHMENT,
//! ));
//! graph.clear_depth_buffer(depth, 1.0, 0);
//!
//! let mut compiled = graph.compile().unwrap();
//! compiled.execute().unwrap();
//! assert_eq!(compiled.frame_count(), 1);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod memory;
pub mod profiling;
pub mod types;

// Re-export main types for convenience
pub use backend::{create_backend, DummyBackend, GpuBackend};
pub use config::{BackendParameters, BackendType, FrameGraphConfig};
pub use error::GraphicsError;
pub use graph::{
    CompiledGraph, GraphBuilder, OperationHandle, PassContext, PassKind, RenderPass,
    ResourceHandle,
};
pub use types::{
    BufferDescriptor, BufferUsage, Extent3d, ResourceDescriptor, ResourceState,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Frame graph library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the frame graph subsystem.
pub fn init() {
    log::info!("RedLilium Frame Graph v{} initialized", VERSION);
}

//! Frame graph: declaration, compilation and execution of GPU passes.
//!
//! A frame is described once with a [`GraphBuilder`]:
//!
//! - resources are declared as transient (memory reused once their last
//!   access is done) or persistent (dedicated memory),
//! - operations are added in execution order, each running a
//!   [`RenderPass`] whose slots are bound to resources through a typed
//!   [`Binder`],
//! - [`GraphBuilder::compile`] runs pass setup, computes resource lifetimes
//!   and assigns aliased memory.
//!
//! The resulting [`CompiledGraph`] is executed every frame. Execution inserts
//! aliasing, unordered-access and transition barriers and binds render
//! targets for graphics-like passes.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use redlilium_framegraph::backend::DummyBackend;
//! use redlilium_framegraph::graph::{GraphBuilder, PassContext, PassKind, RenderPass};
//! use redlilium_framegraph::types::{TextureDescriptor, TextureFormat, TextureUsage};
//! use redlilium_framegraph::{pass_slots, GraphicsError};
//!
//! struct Tonemap;
//!
//! pass_slots!(Tonemap {
//!     Hdr: General => ShaderResource,
//!     Ldr: RenderTarget => RenderTarget,
//! });
//!
//! impl RenderPass for Tonemap {
//!     const KIND: PassKind = PassKind::Graphics;
//!
//!     fn execute(&mut self, ctx: &mut PassContext<'_, Self>) -> Result<(), GraphicsError> {
//!         let _hdr = ctx.resource(Hdr);
//!         let ldr = ctx.resource(Ldr);
//!         ctx.encoder().clear_render_target(ldr.gpu, [0.0, 0.0, 0.0, 1.0])
//!     }
//! }
//!
//! let mut graph = GraphBuilder::new(Arc::new(DummyBackend::new()));
//! let hdr = graph.create_transient_resource(TextureDescriptor::new_2d(
//!     128,
//!     128,
//!     TextureFormat::Rgba16Float,
//!     TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
//! ));
//! let ldr = graph.create_transient_resource(TextureDescriptor::new_2d(
//!     128,
//!     128,
//!     TextureFormat::Rgba8Unorm,
//!     TextureUsage::RENDER_ATTACHMENT,
//! ));
//! graph.clear_frame_buffer(hdr, [1.0, 0.5, 0.25, 1.0]);
//! graph.add_operation("tonemap", Tonemap).bind(Hdr, hdr).bind(Ldr, ldr).finalize();
//!
//! let mut compiled = graph.compile()?;
//! compiled.execute()?;
//! # Ok::<(), GraphicsError>(())
//! ```

mod access;
mod binding;
mod builder;
mod builtin;
mod compile;
mod compiled;
mod execute;
mod pass;
mod resource;

pub use access::{Access, AccessCategory, AccessIndex};
#[doc(hidden)]
pub use binding::PendingOperation;
pub use binding::{
    Binder, Here, IntoBinder, PassSlots, Pluck, Slot, SlotCons, SlotDescriptor, SlotNil, There,
};
pub use builder::GraphBuilder;
pub use builtin::{
    ClearColorTarget, ClearDepthBuffer, ClearDepthTarget, ClearFrameBuffer, CopyFrom,
    CopyResource, CopyTo, DownloadSource, DownloadTexture, TextureReadback,
};
pub use compile::compile;
pub use compiled::CompiledGraph;
pub use pass::{
    BoundResource, OperationHandle, PassContext, PassKind, PassSetup, PipelineTemplate,
    RenderPass,
};
pub use resource::{Resource, ResourceHandle, ResourceKind};

pub use crate::backend::CommandEncoder;

//! Common types and descriptors for graph resources.
//!
//! This module contains format enums, usage flags, descriptor structs and
//! the resource state model used throughout the frame graph.

mod buffer;
mod common;
mod resource;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{ClearValue, Extent3d, ScissorRect, Viewport};
pub use resource::ResourceDescriptor;
pub use state::ResourceState;
pub use texture::{TextureDescriptor, TextureDimension, TextureFormat, TextureUsage};

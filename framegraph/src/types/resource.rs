//! Resource descriptors covering both textures and buffers.

use super::{BufferDescriptor, Extent3d, TextureDescriptor, TextureFormat};

/// Description of a graph resource.
///
/// Every resource the graph tracks is either a texture or a buffer; the
/// variant decides which heap category it is placed in and how barriers are
/// expressed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceDescriptor {
    /// A texture resource.
    Texture(TextureDescriptor),
    /// A buffer resource.
    Buffer(BufferDescriptor),
}

impl ResourceDescriptor {
    /// Debug label, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Texture(desc) => desc.label.as_deref(),
            Self::Buffer(desc) => desc.label.as_deref(),
        }
    }

    /// Returns the texture descriptor, or `None` for buffers.
    pub fn as_texture(&self) -> Option<&TextureDescriptor> {
        match self {
            Self::Texture(desc) => Some(desc),
            Self::Buffer(_) => None,
        }
    }

    /// Returns the buffer descriptor, or `None` for textures.
    pub fn as_buffer(&self) -> Option<&BufferDescriptor> {
        match self {
            Self::Texture(_) => None,
            Self::Buffer(desc) => Some(desc),
        }
    }

    /// Returns true for buffers.
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }

    /// Returns true for textures usable as color or depth attachments.
    pub fn is_render_target_or_depth(&self) -> bool {
        self.as_texture()
            .is_some_and(TextureDescriptor::is_render_target_or_depth)
    }

    /// Size of the resource; buffers report their byte size as the width.
    pub fn extent(&self) -> Extent3d {
        match self {
            Self::Texture(desc) => desc.size,
            Self::Buffer(desc) => Extent3d::new(desc.size as u32, 1, 1),
        }
    }

    /// Texture format, or `None` for buffers.
    pub fn format(&self) -> Option<TextureFormat> {
        self.as_texture().map(|desc| desc.format)
    }

    /// Tightly packed size in bytes.
    pub fn byte_size(&self) -> u64 {
        match self {
            Self::Texture(desc) => desc.byte_size(),
            Self::Buffer(desc) => desc.size,
        }
    }
}

impl From<TextureDescriptor> for ResourceDescriptor {
    fn from(desc: TextureDescriptor) -> Self {
        Self::Texture(desc)
    }
}

impl From<BufferDescriptor> for ResourceDescriptor {
    fn from(desc: BufferDescriptor) -> Self {
        Self::Buffer(desc)
    }
}

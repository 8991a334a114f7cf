//! Buffer descriptors.

use bitflags::bitflags;

bitflags! {
    /// How a buffer may be accessed.
    ///
    /// The graph only reasons about `STORAGE` (unordered access), the copy
    /// flags and `MAP_READ`; the remaining flags are passed through to the
    /// backend for passes that bind buffers as geometry or constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        /// Vertex input.
        const VERTEX = 1 << 0;
        /// Index input.
        const INDEX = 1 << 1;
        /// Shader constants.
        const UNIFORM = 1 << 2;
        /// Read-write shader access.
        const STORAGE = 1 << 3;
        /// Indirect dispatch and draw arguments.
        const INDIRECT = 1 << 4;
        /// Source of copies.
        const COPY_SRC = 1 << 5;
        /// Destination of copies.
        const COPY_DST = 1 << 6;
        /// Mapped and read by the CPU after the GPU is done.
        const MAP_READ = 1 << 7;
    }
}

/// Description of a graph buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// A copy destination the CPU reads back.
    pub fn readback(size: u64) -> Self {
        Self::new(size, BufferUsage::COPY_DST | BufferUsage::MAP_READ)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns true if the CPU may read the buffer's contents.
    pub fn is_host_readable(&self) -> bool {
        self.usage.contains(BufferUsage::MAP_READ)
    }
}

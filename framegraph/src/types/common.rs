//! Geometry and clear-value types shared by the graph and the backends.

// ============================================================================
// Extent
// ============================================================================

/// Three-dimensional size of a resource.
///
/// For 2D textures `depth_or_array_layers` is the number of array layers,
/// for 3D textures it is the depth in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels or number of array layers.
    pub depth_or_array_layers: u32,
}

impl Default for Extent3d {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        }
    }
}

impl Extent3d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32, depth_or_array_layers: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers,
        }
    }

    /// Create a 2D extent with a single layer.
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Extent of the given mip level; every axis is clamped to at least one texel.
    pub fn mip_level_size(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth_or_array_layers: self.depth_or_array_layers,
        }
    }

    /// Number of texels in a single layer.
    pub fn texel_count_2d(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// ============================================================================
// Viewport
// ============================================================================

/// Viewport derived for graphics-like operations.
///
/// The graph uses the `[0, 1]` depth range with the origin in the top-left
/// corner, matching every backend the crate ships.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// X coordinate of the viewport's top-left corner.
    pub x: f32,
    /// Y coordinate of the viewport's top-left corner.
    pub y: f32,
    /// Width of the viewport.
    pub width: f32,
    /// Height of the viewport.
    pub height: f32,
    /// Minimum depth value.
    pub min_depth: f32,
    /// Maximum depth value.
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Viewport {
    /// Create a new viewport with the `[0, 1]` depth range.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Create a viewport covering `extent` with origin at (0, 0).
    pub fn from_extent(extent: Extent3d) -> Self {
        Self::new(0.0, 0.0, extent.width as f32, extent.height as f32)
    }

    /// Set the depth range.
    pub fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }
}

// ============================================================================
// Scissor Rectangle
// ============================================================================

/// Scissor rectangle for clipping rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    /// X coordinate of the top-left corner.
    pub x: i32,
    /// Y coordinate of the top-left corner.
    pub y: i32,
    /// Width of the scissor rectangle.
    pub width: u32,
    /// Height of the scissor rectangle.
    pub height: u32,
}

impl ScissorRect {
    /// Create a new scissor rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a scissor rectangle covering `extent` with origin at (0, 0).
    pub fn from_extent(extent: Extent3d) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }
}

// ============================================================================
// Clear Values
// ============================================================================

/// Value written by the clear built-ins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// Clear a color target to RGBA.
    Color([f32; 4]),
    /// Clear depth and stencil.
    DepthStencil {
        /// Depth value, usually 1.0 (or 0.0 with reverse-Z).
        depth: f32,
        /// Stencil value.
        stencil: u8,
    },
}

impl ClearValue {
    /// Opaque black.
    pub const BLACK: Self = Self::Color([0.0, 0.0, 0.0, 1.0]);

    /// Create a color clear value.
    pub const fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color([r, g, b, a])
    }

    /// Create a depth/stencil clear value.
    pub const fn depth_stencil(depth: f32, stencil: u8) -> Self {
        Self::DepthStencil { depth, stencil }
    }
}

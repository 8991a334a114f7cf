//! Frame graph and backend configuration.

use crate::backend::HeapTier;

/// Default minimum block size of the transient memory allocator (64 KiB).
///
/// Matches the default placement alignment of placed resources on desktop GPUs.
pub const DEFAULT_MIN_BLOCK_SIZE: u64 = 64 * 1024;

/// Options controlling how a graph is compiled.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::config::FrameGraphConfig;
///
/// let config = FrameGraphConfig::default()
///     .with_label("main")
///     .with_min_block_size(4096);
/// assert!(config.aliasing);
/// assert_eq!(config.min_block_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGraphConfig {
    /// Debug label used in log output.
    pub label: Option<String>,
    /// Reuse memory of transient resources whose lifetimes do not overlap.
    ///
    /// When disabled every transient keeps its memory until the end of the
    /// graph, which is useful for tracking down missing barriers.
    pub aliasing: bool,
    /// Smallest block the buddy allocator hands out. Rounded up to a power of two.
    pub min_block_size: u64,
    /// Overrides the heap tier reported by the backend.
    pub heap_tier: Option<HeapTier>,
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            label: None,
            aliasing: true,
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            heap_tier: None,
        }
    }
}

impl FrameGraphConfig {
    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Enable or disable memory aliasing of transient resources.
    pub fn with_aliasing(mut self, aliasing: bool) -> Self {
        self.aliasing = aliasing;
        self
    }

    /// Set the minimum buddy block size.
    pub fn with_min_block_size(mut self, size: u64) -> Self {
        self.min_block_size = size;
        self
    }

    /// Force a heap tier instead of the one the backend reports.
    pub fn with_heap_tier(mut self, tier: HeapTier) -> Self {
        self.heap_tier = Some(tier);
        self
    }

    /// Label for log messages.
    pub(crate) fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("frame graph")
    }
}

/// Backend selection for [`create_backend`](crate::backend::create_backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// Pick the best backend compiled in, falling back to the dummy backend.
    #[default]
    Auto,
    /// Headless backend that simulates GPU memory on the CPU.
    Dummy,
    /// Native Vulkan through ash. Requires the `vulkan-backend` feature.
    Vulkan,
}

/// Parameters used to create a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParameters {
    /// Which backend to create.
    pub backend: BackendType,
    /// Enable API validation (Vulkan validation layers, dummy aliasing checks).
    pub validation: bool,
}

impl Default for BackendParameters {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            validation: cfg!(debug_assertions),
        }
    }
}

impl BackendParameters {
    /// Set the backend type.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Enable or disable validation.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

//! Frame graph error types.
//!
//! Two failure classes exist:
//!
//! - [`GraphicsError`] is recoverable. It is returned by backend calls,
//!   by pass initialization during compilation and by the public accessors of
//!   [`CompiledGraph`](crate::graph::CompiledGraph).
//! - Invariant violations inside the graph (an access that points outside the
//!   resource table, a buddy request larger than the whole block, a non-2D
//!   resource where a 2D texture is required) are programming errors. They go
//!   through `graph_assert!`, which logs the location and condition and then
//!   panics.

use std::fmt;

/// Errors that can occur while building, compiling or executing a frame graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the backend.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
    /// The presentation surface has no back buffer available.
    SurfaceLost,
    /// An index passed to a public accessor was outside the valid range.
    OutOfRange {
        /// What kind of element was requested.
        what: &'static str,
        /// The requested index.
        index: usize,
        /// Number of elements available.
        len: usize,
    },
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::SurfaceLost => write!(f, "surface lost, no back buffer available"),
            Self::OutOfRange { what, index, len } => {
                write!(f, "{what} index {index} out of range (len {len})")
            }
        }
    }
}

impl std::error::Error for GraphicsError {}

/// Fatal invariant check.
///
/// Logs the file, line, stringified condition and message at error level,
/// then panics. A malformed graph is never recovered from.
macro_rules! graph_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            let message = format!($($arg)+);
            log::error!(
                "{}:{}: assertion `{}` failed: {}",
                file!(),
                line!(),
                stringify!($cond),
                message
            );
            panic!("frame graph invariant violated: {message}");
        }
    };
}

/// Unconditional fatal error. Evaluates to `!`, so it can end a `let ... else`.
macro_rules! graph_fatal {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        log::error!("{}:{}: {}", file!(), line!(), message);
        panic!("frame graph invariant violated: {message}")
    }};
}

pub(crate) use graph_assert;
pub(crate) use graph_fatal;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");

        let err = GraphicsError::OutOfRange {
            what: "resource",
            index: 7,
            len: 3,
        };
        assert_eq!(err.to_string(), "resource index 7 out of range (len 3)");
    }

    #[test]
    #[should_panic(expected = "frame graph invariant violated: index 4 >= 2")]
    fn test_graph_assert_panics() {
        let index = 4;
        graph_assert!(index < 2, "index {} >= {}", index, 2);
    }

    #[test]
    #[should_panic(expected = "frame graph invariant violated: slot 3 is empty")]
    fn test_graph_fatal_ends_let_else() {
        let slot: Option<u32> = None;
        let Some(_value) = slot else {
            graph_fatal!("slot {} is empty", 3);
        };
    }

    #[test]
    fn test_graph_assert_passes() {
        graph_assert!(1 + 1 == 2, "arithmetic is broken");
    }
}

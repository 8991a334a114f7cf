//! Profiling support via Tracy.
//!
//! Profiling is enabled with the `profiling` Cargo feature:
//!
//! ```toml
//! [dependencies]
//! redlilium-framegraph = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! The graph instruments compilation and every executed operation. When the
//! feature is disabled all macros compile to nothing.
//!
//! ```ignore
//! use redlilium_framegraph::profiling::{profile_scope, frame_mark};
//!
//! {
//!     profile_scope!("record_frame");
//!     compiled.execute()?;
//! }
//! frame_mark!();
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{self, frame_mark as tracy_frame_mark, span, Client, Span};

/// Create a profiling span for the current scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Create a function profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

pub use crate::{frame_mark, profile_function, profile_scope};

/// Start the Tracy client if profiling is enabled.
///
/// Returns true when a client is running afterwards.
pub fn init_profiling() -> bool {
    #[cfg(feature = "profiling")]
    {
        let _client = Client::start();
        log::info!("Tracy profiling client started");
        true
    }
    #[cfg(not(feature = "profiling"))]
    {
        false
    }
}

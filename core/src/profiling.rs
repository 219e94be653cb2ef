//! Tracy instrumentation for graph compilation and frame execution.
//!
//! Build with the `profiling` feature to turn the macros on:
//!
//! ```bash
//! cargo run -p tempograph-demos --bin multirate_demo --features profiling
//! ```
//!
//! Nothing is recorded until the binary calls [`start_client`]. Spans opened
//! before that are dropped.
//!
//! # Spans
//!
//! ```ignore
//! use tempograph_core::profiling::{profile_function, profile_scope};
//!
//! fn compile_graph() {
//!     profile_function!();
//!
//!     {
//!         profile_scope!("resource_allocation");
//!         // ...
//!     }
//! }
//! ```
//!
//! # Frames
//!
//! ```ignore
//! loop {
//!     graph.execute(FrameContext::default())?;
//!     frame_mark!();
//! }
//! ```
//!
//! When profiling is disabled (the default), all macros compile to no-ops.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client};

/// Start the Tracy client. Returns `None` when profiling is disabled.
#[cfg(feature = "profiling")]
pub fn start_client() -> Option<Client> {
    Some(Client::start())
}

/// Start the Tracy client. Returns `None` when profiling is disabled.
#[cfg(not(feature = "profiling"))]
pub fn start_client() -> Option<()> {
    None
}

/// End the current frame on the Tracy timeline.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.frame_mark();
        }
    };
}

/// End the current frame (disabled build).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Open a named span that closes with the enclosing scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|c| c.span_alloc(Some($name), "", file!(), line!(), 0));
    };
}

/// Open a named span (disabled build).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {
        let _ = $name;
    };
}

/// Open a span named after the calling module.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|c| c.span_alloc(Some(module_path!()), "", file!(), line!(), 0));
    };
}

/// Open a module span (disabled build).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Annotate the timeline, e.g. when a frame enters catch-up.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_message {
    ($msg:expr) => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.message($msg, 0);
        }
    };
}

/// Annotate the timeline (disabled build).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_message {
    ($msg:expr) => {
        let _ = $msg;
    };
}

pub use frame_mark;
pub use profile_function;
pub use profile_message;
pub use profile_scope;

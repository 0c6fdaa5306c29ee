//! CLOISTER Sandbox Adapter
//!
//! A thin capability layer over an embedded V8 isolate: compile-and-run,
//! closure evaluation with explicit argument binding, live references with
//! get/apply/release, consuming and borrowing transfers, host write
//! callbacks, and native capability modules.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod host;
pub mod native;
pub mod reference;
pub mod sandbox;

pub use error::{SandboxError, SandboxResult};
pub use host::{HostWrite, HostWriter, RecordingWriter, StdioWriter};
pub use native::{InspectBinding, NativeModule};
pub use reference::{ExternalCopy, Reference, Transfer};
pub use sandbox::{Sandbox, SandboxConfig, DEFAULT_MAX_HEAP};

/// Re-exported engine bindings for native module implementors
pub use deno_core::v8;

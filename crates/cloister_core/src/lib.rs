//! CLOISTER Core Types
//!
//! Pure types shared by the sandbox adapter and the bootstrap crate.
//! Nothing in this crate touches the isolation engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod module;
pub mod options;
pub mod stream;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::SandboxId;
pub use module::{ModuleSource, Registry, SupportModule, MODULE_PARAMETERS, wrap_module_source};
pub use options::InspectOptions;
pub use stream::StreamSelector;

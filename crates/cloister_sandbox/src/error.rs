//! Sandbox adapter errors.

use cloister_core::SandboxId;

/// Sandbox result type
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors raised at the sandbox boundary
///
/// Exceptions thrown inside the sandbox are carried as rendered text only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    /// Script failed to compile or threw while running its top level
    #[error("Failed to run {script}: {message}")]
    Compile {
        /// Script name
        script: String,
        /// Engine message
        message: String,
    },

    /// A call into the sandbox threw
    #[error("Uncaught exception: {message}")]
    Exception {
        /// Exception stack, or its string form when there is no stack
        message: String,
    },

    /// Value was applied but is not callable
    #[error("Not a function: {what}")]
    NotAFunction {
        /// What was being called
        what: String,
    },

    /// Property lookup on a non-object
    #[error("Not an object: {what}")]
    NotAnObject {
        /// What was being read
        what: String,
    },

    /// Structured copy failed
    #[error("Conversion failed: {reason}")]
    Conversion {
        /// Converter message
        reason: String,
    },

    /// Reference used with a sandbox it did not come from
    #[error("Reference from {actual} used in {expected}")]
    ForeignReference {
        /// Sandbox performing the operation
        expected: SandboxId,
        /// Sandbox the reference belongs to
        actual: SandboxId,
    },

    /// Nested call into a sandbox that is already running
    #[error("Sandbox is busy")]
    Busy,

    /// Native module could not be instantiated
    #[error("Native module {module} failed: {reason}")]
    Native {
        /// Module name
        module: String,
        /// Failure reason
        reason: String,
    },

    /// Execution was terminated by the engine
    #[error("Execution terminated")]
    Terminated,

    /// Script ran the heap up to the configured ceiling
    #[error("Heap limit of {limit} bytes exceeded")]
    HeapLimit {
        /// Configured maximum heap size
        limit: usize,
    },
}

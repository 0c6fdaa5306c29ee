//! Bootstrap errors.
//!
//! Every variant except [`BootError::Sandbox`] and [`BootError::Core`] is a
//! configuration defect. Nothing here is retried.

use cloister_core::CoreError;
use cloister_sandbox::SandboxError;

/// Bootstrap result type
pub type BootResult<T> = Result<T, BootError>;

/// Bootstrap error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootError {
    /// Asset source cannot resolve a registry module
    #[error("Trusted module {module} not found: {reason}")]
    AssetMissing {
        /// Module identifier
        module: String,
        /// Why resolution failed
        reason: String,
    },

    /// Trusted module source failed to compile
    #[error("Trusted module {module} failed to compile: {reason}")]
    AssetCompile {
        /// Module identifier
        module: String,
        /// Engine message
        reason: String,
    },

    /// Native capability module could not be instantiated
    #[error("Native module {module} unavailable: {reason}")]
    CapabilityUnavailable {
        /// Native module name
        module: String,
        /// Why provisioning failed
        reason: String,
    },

    /// Primordials module failed or left the holder empty
    #[error("Primordials installation failed: {reason}")]
    Primordials {
        /// Failure detail
        reason: String,
    },

    /// Loader closure threw
    #[error("Bootstrap loader failed: {reason}")]
    Loader {
        /// Failure detail
        reason: String,
    },

    /// Entry module exports lack a required function
    #[error("Entry module does not export function {name}")]
    MissingExport {
        /// Export name
        name: String,
    },

    /// Console bridge could not be installed
    #[error("Console bridge installation failed: {reason}")]
    Bridge {
        /// Failure detail
        reason: String,
    },

    /// Boot configuration is invalid
    #[error("Invalid boot configuration: {reason}")]
    Config {
        /// What is wrong
        reason: String,
    },

    /// Sandbox operation failed
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Core type error
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BootError::AssetCompile {
            module: "internal/util".to_string(),
            reason: "SyntaxError: Unexpected token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Trusted module internal/util failed to compile: SyntaxError: Unexpected token"
        );

        let err = BootError::MissingExport {
            name: "inspect".to_string(),
        };
        assert_eq!(err.to_string(), "Entry module does not export function inspect");
    }

    #[test]
    fn test_from_sandbox_error() {
        let err: BootError = SandboxError::Busy.into();
        assert_eq!(err, BootError::Sandbox(SandboxError::Busy));
        assert_eq!(err.to_string(), "Sandbox is busy");
    }

    #[test]
    fn test_from_core_error() {
        let err: BootError = CoreError::UnknownModule {
            id: "internal/nope".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Unknown trusted module: internal/nope");
    }
}

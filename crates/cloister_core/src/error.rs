//! Core error types for CLOISTER.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// File descriptor is not a writable standard stream
    InvalidStream {
        /// The rejected descriptor
        fd: u32,
    },

    /// Module identifier is not part of the registry
    UnknownModule {
        /// The rejected identifier
        id: String,
    },

    /// Registry shape is inconsistent
    InvalidRegistry {
        /// What is wrong with it
        reason: String,
    },

    /// Inspection options could not be encoded
    InvalidOptions {
        /// Encoder message
        reason: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStream { fd } => write!(f, "Invalid stream selector: {}", fd),
            Self::UnknownModule { id } => write!(f, "Unknown trusted module: {}", id),
            Self::InvalidRegistry { reason } => write!(f, "Invalid registry: {}", reason),
            Self::InvalidOptions { reason } => write!(f, "Invalid inspect options: {}", reason),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidOptions {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidStream { fd: 7 };
        assert_eq!(format!("{}", err), "Invalid stream selector: 7");

        let err = CoreError::UnknownModule {
            id: "internal/nope".to_string(),
        };
        assert_eq!(format!("{}", err), "Unknown trusted module: internal/nope");
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::InvalidStream { fd: 3 };
        let err2 = CoreError::InvalidStream { fd: 3 };
        assert_eq!(err1, err2);

        let err3 = CoreError::InvalidStream { fd: 4 };
        assert_ne!(err1, err3);
    }
}

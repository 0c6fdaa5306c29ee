//! Host stream selectors used by the console bridge.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard stream a console write is directed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamSelector {
    /// File descriptor 1
    Stdout,
    /// File descriptor 2
    Stderr,
}

impl StreamSelector {
    /// Parse a descriptor number sent from the sandbox
    ///
    /// # Errors
    ///
    /// Returns error for anything other than 1 or 2.
    pub fn from_fd(fd: u32) -> CoreResult<Self> {
        match fd {
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            _ => Err(CoreError::InvalidStream { fd }),
        }
    }

    /// Descriptor number
    #[must_use]
    pub const fn fd(&self) -> u32 {
        match self {
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }
}

impl fmt::Display for StreamSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

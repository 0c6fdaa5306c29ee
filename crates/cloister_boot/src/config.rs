//! Boot configuration.

use crate::error::{BootError, BootResult};
use cloister_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where trusted module sources come from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory laid out as `<dir>/<id>.js`; embedded sources when unset
    pub dir: Option<PathBuf>,
}

/// Full boot configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Sandbox limits
    pub sandbox: SandboxConfig,
    /// Trusted module sources
    pub assets: AssetConfig,
    /// Throw on `require` of an unregistered module
    pub strict_require: bool,
}

impl BootConfig {
    /// Create a default config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set sandbox config
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Read trusted modules from a directory
    #[must_use]
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets.dir = Some(dir.into());
        self
    }

    /// Set strict require
    #[must_use]
    pub fn with_strict_require(mut self, strict: bool) -> Self {
        self.strict_require = strict;
        self
    }

    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Config`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> BootResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| BootError::Config {
            reason: format!("{}: {}", path.display(), err),
        })?;
        serde_json::from_str(&text).map_err(|err| BootError::Config {
            reason: format!("{}: {}", path.display(), err),
        })
    }

    /// Check heap limits
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Config`] for a zero heap limit or an initial
    /// heap larger than the maximum.
    pub fn validate(&self) -> BootResult<()> {
        let sandbox = &self.sandbox;
        if sandbox.max_heap_size == 0 {
            return Err(BootError::Config {
                reason: "max_heap_size must be greater than zero".to_string(),
            });
        }
        if sandbox.initial_heap_size > sandbox.max_heap_size {
            return Err(BootError::Config {
                reason: format!(
                    "initial_heap_size {} exceeds max_heap_size {}",
                    sandbox.initial_heap_size, sandbox.max_heap_size
                ),
            });
        }
        Ok(())
    }
}

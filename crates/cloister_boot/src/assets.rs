//! Trusted module sources.
//!
//! An [`AssetSource`] maps a module identifier to its source text. The
//! bootstrap resolves every registry entry up front, so a missing asset
//! fails before anything touches the sandbox.

use crate::error::{BootError, BootResult};
use cloister_core::{ModuleSource, Registry, SupportModule};
use indexmap::IndexMap;
use std::path::{Component, Path, PathBuf};

/// Resolves module identifiers to source text
pub trait AssetSource {
    /// Source name used in logs
    fn name(&self) -> &str;

    /// Load the source text of `id`
    ///
    /// # Errors
    ///
    /// Returns [`BootError::AssetMissing`] if the module cannot be resolved.
    fn load(&self, id: &str) -> BootResult<String>;
}

/// Resolve every module of `registry`, in registry order
///
/// # Errors
///
/// Returns error if the registry is inconsistent or any module is missing.
pub fn resolve(registry: &Registry, assets: &dyn AssetSource) -> BootResult<Vec<ModuleSource>> {
    registry.validate()?;
    registry
        .modules()
        .iter()
        .map(|id| Ok(ModuleSource::new(*id, assets.load(id)?)))
        .collect()
}

/// The support modules compiled into this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

impl EmbeddedAssets {
    /// Create the embedded source
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Source text of a support module
    #[must_use]
    pub fn source(module: SupportModule) -> &'static str {
        match module {
            SupportModule::Primordials => {
                include_str!("../assets/internal/per_context/primordials.js")
            }
            SupportModule::Inspect => include_str!("../assets/internal/util/inspect.js"),
            SupportModule::Errors => include_str!("../assets/internal/errors.js"),
            SupportModule::Util => include_str!("../assets/internal/util.js"),
            SupportModule::Types => include_str!("../assets/internal/util/types.js"),
        }
    }
}

impl AssetSource for EmbeddedAssets {
    fn name(&self) -> &str {
        "embedded"
    }

    fn load(&self, id: &str) -> BootResult<String> {
        SupportModule::from_id(id)
            .map(|module| Self::source(module).to_string())
            .ok_or_else(|| BootError::AssetMissing {
                module: id.to_string(),
                reason: "not an embedded support module".to_string(),
            })
    }
}

/// Modules read from `<root>/<id>.js`
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    /// Read modules below `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a module identifier maps to
    ///
    /// Identifiers are relative, `/`-separated and may not leave the root.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::AssetMissing`] for identifiers with empty,
    /// `.` or `..` segments, or absolute identifiers.
    pub fn path_for(&self, id: &str) -> BootResult<PathBuf> {
        let relative = PathBuf::from(format!("{id}.js"));
        let plain = !id.is_empty()
            && id
                .split('/')
                .all(|segment| !matches!(segment, "" | "." | ".."))
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(BootError::AssetMissing {
                module: id.to_string(),
                reason: "identifier is not a plain relative path".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl AssetSource for DirectoryAssets {
    fn name(&self) -> &str {
        "directory"
    }

    fn load(&self, id: &str) -> BootResult<String> {
        let path = self.path_for(id)?;
        std::fs::read_to_string(&path).map_err(|err| BootError::AssetMissing {
            module: id.to_string(),
            reason: format!("{}: {}", path.display(), err),
        })
    }
}

/// In-memory module sources
#[derive(Debug, Clone, Default)]
pub struct MapAssets {
    modules: IndexMap<String, String>,
}

impl MapAssets {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the embedded support modules
    #[must_use]
    pub fn support() -> Self {
        SupportModule::ALL
            .iter()
            .fold(Self::new(), |assets, module| {
                assets.with_module(module.id(), EmbeddedAssets::source(*module))
            })
    }

    /// Add or replace a module
    #[must_use]
    pub fn with_module(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }

    /// Add or replace a module in place
    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.modules.insert(id.into(), text.into());
    }

    /// Number of modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl AssetSource for MapAssets {
    fn name(&self) -> &str {
        "map"
    }

    fn load(&self, id: &str) -> BootResult<String> {
        self.modules
            .get(id)
            .cloned()
            .ok_or_else(|| BootError::AssetMissing {
                module: id.to_string(),
                reason: "not in asset map".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloister_core::CoreError;

    #[test]
    fn test_embedded_support_modules() {
        let assets = EmbeddedAssets::new();
        for module in SupportModule::ALL {
            let text = assets.load(module.id()).unwrap();
            assert!(text.starts_with("'use strict';"), "{module}");
        }
        assert!(matches!(
            assets.load("internal/fs"),
            Err(BootError::AssetMissing { .. })
        ));
    }

    #[test]
    fn test_resolve_keeps_registry_order() {
        let sources = resolve(&Registry::support(), &EmbeddedAssets::new()).unwrap();
        let ids: Vec<_> = sources.iter().map(ModuleSource::id).collect();
        assert_eq!(ids, Registry::support().modules());
    }

    #[test]
    fn test_resolve_missing_module() {
        let assets = MapAssets::new().with_module("p", "");
        let err = resolve(&Registry::new("p", "e"), &assets).unwrap_err();
        assert_eq!(
            err,
            BootError::AssetMissing {
                module: "e".to_string(),
                reason: "not in asset map".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_rejects_invalid_registry() {
        let err = resolve(&Registry::new("p", "p"), &MapAssets::new()).unwrap_err();
        assert!(matches!(err, BootError::Core(CoreError::InvalidRegistry { .. })));
    }

    #[test]
    fn test_directory_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("internal/util")).unwrap();
        std::fs::write(dir.path().join("internal/util/types.js"), "module.exports = 1;").unwrap();

        let assets = DirectoryAssets::new(dir.path());
        assert_eq!(assets.load("internal/util/types").unwrap(), "module.exports = 1;");
        assert!(matches!(
            assets.load("internal/util/missing"),
            Err(BootError::AssetMissing { .. })
        ));
    }

    #[test]
    fn test_directory_assets_shipped_tree() {
        let assets = DirectoryAssets::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets"));
        for module in SupportModule::ALL {
            assert_eq!(
                assets.load(module.id()).unwrap(),
                EmbeddedAssets::source(module)
            );
        }
    }

    #[test]
    fn test_directory_assets_stay_below_root() {
        let assets = DirectoryAssets::new("/srv/lib");
        for id in ["../etc/passwd", "/etc/passwd", "internal//util", "internal/./util", ""] {
            assert!(
                matches!(assets.path_for(id), Err(BootError::AssetMissing { .. })),
                "{id}"
            );
        }
        assert_eq!(
            assets.path_for("internal/errors").unwrap(),
            PathBuf::from("/srv/lib/internal/errors.js")
        );
    }

    #[test]
    fn test_map_assets_support() {
        let assets = MapAssets::support().with_module("internal/util", "module.exports = {};");
        assert_eq!(assets.len(), SupportModule::ALL.len());
        assert_eq!(assets.load("internal/util").unwrap(), "module.exports = {};");
    }
}

//! Bootstrap sequence.
//!
//! Source resolution happens first, on the host. Module compilation,
//! capability provisioning and holder creation then run as three joined
//! phases; any failure aborts the join and drops every reference created
//! so far. Primordials installation and the loader follow in order.

use crate::assets::{resolve, AssetSource, DirectoryAssets, EmbeddedAssets};
use crate::binding::provision;
use crate::compiler::compile_modules;
use crate::config::BootConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{BootError, BootResult};
use crate::loader::Loader;
use crate::primordials::PrimordialsHolder;
use cloister_core::{ModuleSource, Registry};
use cloister_sandbox::{InspectBinding, NativeModule, Reference, Sandbox};
use std::fmt;
use tracing::{info, info_span, warn, Instrument};

/// Bootstrap with the embedded support modules and [`InspectBinding`]
///
/// # Errors
///
/// Returns error if any trusted module fails to compile or the native
/// capability module cannot be instantiated.
pub async fn bootstrap(sandbox: &Sandbox) -> BootResult<Diagnostics<'_>> {
    Bootstrap::new().run(sandbox).await
}

/// Configurable bootstrap
pub struct Bootstrap {
    assets: Box<dyn AssetSource>,
    native: Box<dyn NativeModule>,
    registry: Registry,
    loader: Loader,
}

impl Bootstrap {
    /// Embedded assets, [`InspectBinding`], support registry, lenient require
    #[must_use]
    pub fn new() -> Self {
        Self {
            assets: Box::new(EmbeddedAssets::new()),
            native: Box::new(InspectBinding::new()),
            registry: Registry::support(),
            loader: Loader::new(),
        }
    }

    /// Build from a boot configuration
    #[must_use]
    pub fn from_config(config: &BootConfig) -> Self {
        let bootstrap = Self::new().with_strict_require(config.strict_require);
        match &config.assets.dir {
            Some(dir) => bootstrap.with_assets(DirectoryAssets::new(dir)),
            None => bootstrap,
        }
    }

    /// Set the asset source
    #[must_use]
    pub fn with_assets(mut self, assets: impl AssetSource + 'static) -> Self {
        self.assets = Box::new(assets);
        self
    }

    /// Set the native capability module
    #[must_use]
    pub fn with_native(mut self, native: impl NativeModule + 'static) -> Self {
        self.native = Box::new(native);
        self
    }

    /// Set the module registry
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Throw on `require` of an unregistered module
    #[must_use]
    pub fn with_strict_require(mut self, strict: bool) -> Self {
        self.loader = self.loader.with_strict(strict);
        self
    }

    /// Module registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve every registry module to source text
    ///
    /// # Errors
    ///
    /// Returns error if the registry is inconsistent or a module is missing.
    pub fn sources(&self) -> BootResult<Vec<ModuleSource>> {
        resolve(&self.registry, self.assets.as_ref())
    }

    /// Bootstrap `sandbox` and return its diagnostic exports
    ///
    /// # Errors
    ///
    /// Returns error if any phase fails or the entry module lacks
    /// `formatWithOptions` or `inspect`. No partial result is returned.
    pub async fn run<'sb>(&self, sandbox: &'sb Sandbox) -> BootResult<Diagnostics<'sb>> {
        let exports = self.load(sandbox).await?;
        let diagnostics = Diagnostics::from_exports(&exports);
        exports.release();
        diagnostics
    }

    /// Bootstrap `sandbox` and return the entry module's exports
    ///
    /// # Errors
    ///
    /// Returns error if any phase fails.
    pub async fn load<'sb>(&self, sandbox: &'sb Sandbox) -> BootResult<Reference<'sb>> {
        let span = info_span!("bootstrap", sandbox = %sandbox.id());
        let result = self.load_inner(sandbox).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.in_scope(|| warn!(error = %err, "bootstrap failed"));
        }
        result
    }

    async fn load_inner<'sb>(&self, sandbox: &'sb Sandbox) -> BootResult<Reference<'sb>> {
        let sources = self.sources()?;

        let (modules, binding, holder) = futures::try_join!(
            compile_modules(sandbox, &sources),
            provision(sandbox, self.native.as_ref()),
            PrimordialsHolder::create(sandbox),
        )?;

        let primordials_id = self.registry.primordials();
        let primordials_module = modules.get(primordials_id).ok_or_else(|| BootError::AssetMissing {
            module: primordials_id.to_string(),
            reason: "not compiled".to_string(),
        })?;
        let primordials = holder.install(primordials_module, sandbox.global()?)?;

        let exports = self.loader.run(
            sandbox,
            &modules,
            primordials_id,
            primordials,
            binding,
            self.registry.entry(),
        )?;

        let count = modules.len();
        modules.release();
        info!(modules = count, assets = self.assets.name(), "bootstrap complete");
        Ok(exports)
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("assets", &self.assets.name())
            .field("native", &self.native.name())
            .field("registry", &self.registry)
            .field("loader", &self.loader)
            .finish()
    }
}

//! Module source compiler.
//!
//! Each trusted module is wrapped in the six-parameter preamble and run
//! once. The script is discarded; only a reference to the resulting
//! function value is kept.

use crate::error::{BootError, BootResult};
use cloister_core::ModuleSource;
use cloister_sandbox::{ExternalCopy, Reference, Sandbox, SandboxError};
use futures::future::try_join_all;
use indexmap::IndexMap;
use tracing::debug;

/// Compiled module functions keyed by identifier, in registry order
#[derive(Debug)]
pub struct CompiledModules<'sb> {
    modules: IndexMap<&'static str, Reference<'sb>>,
}

impl<'sb> CompiledModules<'sb> {
    /// Compiled function of `id`
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Reference<'sb>> {
        self.modules.get(id)
    }

    /// Module identifiers in registry order
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }

    /// Number of modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether nothing was compiled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Copy every module except `exclude` into a structure the loader can
    /// read locally. The references themselves stay valid.
    ///
    /// # Errors
    ///
    /// Returns error if a reference belongs to another sandbox.
    pub fn loader_map(&self, sandbox: &Sandbox, exclude: &str) -> BootResult<ExternalCopy> {
        let entries = self
            .modules
            .iter()
            .filter(|(id, _)| **id != exclude)
            .map(|(id, reference)| (*id, reference));
        Ok(ExternalCopy::reference_map(sandbox, entries)?)
    }

    /// Release every module reference
    pub fn release(self) {
        for (_, reference) in self.modules {
            reference.release();
        }
    }
}

/// Compile one module, returning a reference to its function value
///
/// # Errors
///
/// Returns [`BootError::AssetCompile`] if the source does not compile.
pub async fn compile_module<'sb>(
    sandbox: &'sb Sandbox,
    source: &ModuleSource,
) -> BootResult<Reference<'sb>> {
    let digest = source.digest();
    let function = sandbox
        .execute(source.id(), source.wrapped())
        .map_err(|err| asset_compile(source.id(), err))?;
    if !function.is_function()? {
        return Err(BootError::AssetCompile {
            module: source.id().to_string(),
            reason: "wrapped source did not evaluate to a function".to_string(),
        });
    }
    debug!(
        sandbox = %sandbox.id(),
        module = source.id(),
        len = source.len(),
        digest = %digest,
        "compiled trusted module"
    );
    Ok(function)
}

/// Compile every module
///
/// The first failure aborts the rest and drops what was already compiled.
///
/// # Errors
///
/// Returns the first compile error.
pub async fn compile_modules<'sb>(
    sandbox: &'sb Sandbox,
    sources: &[ModuleSource],
) -> BootResult<CompiledModules<'sb>> {
    let compiled = try_join_all(sources.iter().map(|source| compile_module(sandbox, source))).await?;
    let modules = sources
        .iter()
        .map(ModuleSource::id)
        .zip(compiled)
        .collect();
    Ok(CompiledModules { modules })
}

fn asset_compile(module: &str, err: SandboxError) -> BootError {
    let reason = match err {
        SandboxError::Compile { message, .. } => message,
        SandboxError::Exception { message } => message,
        other => other.to_string(),
    };
    BootError::AssetCompile {
        module: module.to_string(),
        reason,
    }
}

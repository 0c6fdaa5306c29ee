//! Bootstrap loader.
//!
//! One closure evaluation inside the sandbox builds a memoizing `require`
//! over the compiled modules and returns the entry module's exports. The
//! module cache lives in that closure, so no two sandboxes (and no two
//! bootstraps) share loader state.

use crate::binding::CapabilityTable;
use crate::compiler::CompiledModules;
use crate::error::{BootError, BootResult};
use crate::primordials::Primordials;
use cloister_sandbox::{Reference, Sandbox, SandboxError, Transfer};
use serde_json::json;
use tracing::debug;

/// `$0` module map, `$1` global, `$2` primordials, `$3` capability table,
/// `$4` strict flag, `$5` entry identifier.
const LOADER_SOURCE: &str = r#"'use strict';
const modules = $0;
const global = $1;
const primordials = $2;
const binding = $3;
const strict = $4;
const entry = $5;

const uncurry = Function.prototype.bind.bind(Function.prototype.call);
const hasOwn = uncurry(Object.prototype.hasOwnProperty);
const mapGet = uncurry(Map.prototype.get);
const mapHas = uncurry(Map.prototype.has);
const mapSet = uncurry(Map.prototype.set);

const cache = new Map();
const process = { versions: {} };

function internalBinding(name) {
  return hasOwn(binding, name) ? binding[name] : undefined;
}

function require(id) {
  if (mapHas(cache, id)) {
    return mapGet(cache, id).exports;
  }
  const fn = mapGet(modules, id);
  if (fn === undefined && strict) {
    throw new Error(`Cannot find trusted module '${id}'`);
  }
  const module = { exports: {} };
  mapSet(cache, id, module);
  if (fn !== undefined) {
    fn(global, primordials, internalBinding, process, module, require);
  }
  return module.exports;
}

return require(entry);
"#;

/// Loader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loader {
    strict: bool,
}

impl Loader {
    /// Loader that yields empty exports for unregistered modules
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Throw inside the sandbox when an unregistered module is required
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Whether unregistered modules throw
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Run the loader closure and return the exports of `entry`
    ///
    /// The primordials and capability table are consumed. Module
    /// references stay valid; callers release them afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Loader`] if the closure or any module it runs
    /// throws.
    pub fn run<'sb>(
        &self,
        sandbox: &'sb Sandbox,
        modules: &CompiledModules<'sb>,
        exclude: &str,
        primordials: Primordials<'sb>,
        binding: CapabilityTable<'sb>,
        entry: &str,
    ) -> BootResult<Reference<'sb>> {
        let map = modules.loader_map(sandbox, exclude)?;
        let global = sandbox.global()?;
        let args = vec![
            Transfer::Copy(map),
            global.transfer(),
            primordials.transfer(),
            binding.transfer(),
            Transfer::json(json!(self.strict)),
            Transfer::json(json!(entry)),
        ];
        let exports = sandbox
            .eval_closure(LOADER_SOURCE, args)
            .map_err(|err| match err {
                SandboxError::Exception { message } => BootError::Loader { reason: message },
                other => BootError::Sandbox(other),
            })?;
        debug!(sandbox = %sandbox.id(), entry, strict = self.strict, "loader finished");
        Ok(exports)
    }
}

//! Primordials installer.
//!
//! The holder goes through two states. [`PrimordialsHolder`] is the inert
//! object created before any module runs; [`Primordials`] is the same
//! object after the primordials module populated it. Only the populated
//! form can be handed to the loader.

use crate::error::{BootError, BootResult};
use cloister_sandbox::{Reference, Sandbox, Transfer};
use tracing::debug;

/// Empty holder awaiting population
#[derive(Debug)]
pub struct PrimordialsHolder<'sb> {
    holder: Reference<'sb>,
}

impl<'sb> PrimordialsHolder<'sb> {
    /// Create the holder as a null-prototype object
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox is busy.
    pub async fn create(sandbox: &'sb Sandbox) -> BootResult<Self> {
        let holder = sandbox.execute("<primordials>", "Object.create(null)")?;
        Ok(Self { holder })
    }

    /// Run the primordials module with the sandbox global and this holder
    ///
    /// The global reference is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Primordials`] if the module throws or leaves the
    /// holder without any entry.
    pub fn install(self, module: &Reference<'sb>, global: Reference<'sb>) -> BootResult<Primordials<'sb>> {
        let sandbox = self.holder.sandbox();
        module
            .apply(vec![global.transfer(), self.holder.deref_into()])
            .map_err(|err| BootError::Primordials {
                reason: err.to_string(),
            })?;

        let (entries, frozen): (usize, bool) = sandbox
            .eval_closure(
                "return [Reflect.ownKeys($0).length, Object.isFrozen($0)];",
                vec![self.holder.deref_into()],
            )?
            .copy()?;
        if entries == 0 {
            return Err(BootError::Primordials {
                reason: "module left the holder empty".to_string(),
            });
        }
        debug!(sandbox = %sandbox.id(), entries, frozen, "primordials installed");
        Ok(Primordials {
            table: self.holder,
        })
    }
}

/// Populated primordials table
#[derive(Debug)]
pub struct Primordials<'sb> {
    table: Reference<'sb>,
}

impl<'sb> Primordials<'sb> {
    /// Borrowed handle to the table
    #[must_use]
    pub fn table(&self) -> &Reference<'sb> {
        &self.table
    }

    /// Consume into a sandbox-bound value
    #[must_use]
    pub fn transfer(self) -> Transfer {
        self.table.transfer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::EmbeddedAssets;
    use crate::compiler::compile_module;
    use cloister_core::{ModuleSource, SupportModule};

    async fn install_embedded(sandbox: &Sandbox) -> Primordials<'_> {
        let source = ModuleSource::new(
            SupportModule::Primordials.id(),
            EmbeddedAssets::source(SupportModule::Primordials),
        );
        let module = compile_module(sandbox, &source).await.unwrap();
        let holder = PrimordialsHolder::create(sandbox).await.unwrap();
        holder.install(&module, sandbox.global().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_embedded_primordials_frozen() {
        let sandbox = Sandbox::default_config().unwrap();
        let primordials = install_embedded(&sandbox).await;
        let checks: Vec<bool> = sandbox
            .eval_closure(
                "return [
                    Object.isFrozen($0),
                    Object.getPrototypeOf($0) === null,
                    typeof $0.ArrayPrototypePush === 'function',
                    $0.SafeMap !== Map,
                    $0.JSONStringify({ a: 1 }) === '{\"a\":1}',
                ];",
                vec![primordials.table().deref_into()],
            )
            .unwrap()
            .copy()
            .unwrap();
        assert_eq!(checks, vec![true; 5]);
    }

    #[tokio::test]
    async fn test_primordials_survive_global_tampering() {
        let sandbox = Sandbox::default_config().unwrap();
        let primordials = install_embedded(&sandbox).await;
        sandbox
            .execute("<tamper>", "Array.prototype.push = () => { throw new Error('hijacked'); };")
            .unwrap();
        let length: usize = sandbox
            .eval_closure(
                "const a = []; $0.ArrayPrototypePush(a, 1, 2); return a.length;",
                vec![primordials.transfer()],
            )
            .unwrap()
            .copy()
            .unwrap();
        assert_eq!(length, 2);
    }

    #[tokio::test]
    async fn test_holder_ignores_prototype_setters() {
        let sandbox = Sandbox::default_config().unwrap();
        let holder = PrimordialsHolder::create(&sandbox).await.unwrap();
        sandbox
            .execute(
                "<tamper>",
                "Object.defineProperty(Object.prototype, 'ArrayPrototypePush', {
                    set() { throw new Error('intercepted'); },
                    configurable: true,
                 });",
            )
            .unwrap();
        let source = ModuleSource::new("p", "primordials.ArrayPrototypePush = 1;");
        let module = compile_module(&sandbox, &source).await.unwrap();
        let primordials = holder.install(&module, sandbox.global().unwrap()).unwrap();
        let checks: Vec<bool> = sandbox
            .eval_closure(
                "return [Object.getPrototypeOf($0) === null, $0.ArrayPrototypePush === 1];",
                vec![primordials.table().deref_into()],
            )
            .unwrap()
            .copy()
            .unwrap();
        assert_eq!(checks, vec![true, true]);
    }

    #[tokio::test]
    async fn test_empty_holder_rejected() {
        let sandbox = Sandbox::default_config().unwrap();
        let source = ModuleSource::new("p", "");
        let module = compile_module(&sandbox, &source).await.unwrap();
        let holder = PrimordialsHolder::create(&sandbox).await.unwrap();
        let err = holder.install(&module, sandbox.global().unwrap()).unwrap_err();
        assert!(matches!(err, BootError::Primordials { .. }));
    }

    #[tokio::test]
    async fn test_throwing_module_rejected() {
        let sandbox = Sandbox::default_config().unwrap();
        let source = ModuleSource::new("p", "throw new Error('no builtins');");
        let module = compile_module(&sandbox, &source).await.unwrap();
        let holder = PrimordialsHolder::create(&sandbox).await.unwrap();
        let err = holder.install(&module, sandbox.global().unwrap()).unwrap_err();
        assert!(matches!(err, BootError::Primordials { ref reason } if reason.contains("no builtins")));
    }
}

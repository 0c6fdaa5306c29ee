//! Binding provisioner.
//!
//! Instantiates a native module, calls its single factory export and keeps
//! only the resulting capability table.

use crate::error::{BootError, BootResult};
use cloister_sandbox::{NativeModule, Reference, Sandbox, SandboxResult, Transfer};
use tracing::debug;

/// Capability table produced by a native module's factory
#[derive(Debug)]
pub struct CapabilityTable<'sb> {
    table: Reference<'sb>,
}

impl<'sb> CapabilityTable<'sb> {
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

/// Instantiate `native` inside `sandbox` and build its capability table
///
/// # Errors
///
/// Returns [`BootError::CapabilityUnavailable`] if instantiation fails, the
/// module does not expose exactly one function export, or the factory throws.
pub async fn provision<'sb>(
    sandbox: &'sb Sandbox,
    native: &dyn NativeModule,
) -> BootResult<CapabilityTable<'sb>> {
    let unavailable = |reason: String| BootError::CapabilityUnavailable {
        module: native.name().to_string(),
        reason,
    };

    let exports = native
        .create(sandbox)
        .map_err(|err| unavailable(err.to_string()))?;
    let names = export_names(sandbox, &exports).map_err(|err| unavailable(err.to_string()))?;
    let [factory_name] = names.as_slice() else {
        return Err(unavailable(format!(
            "expected exactly one factory export, found {}",
            names.len()
        )));
    };

    let factory = exports
        .get(factory_name)
        .map_err(|err| unavailable(err.to_string()))?;
    let table = factory
        .apply(Vec::new())
        .map_err(|err| unavailable(err.to_string()))?;
    factory.release();
    exports.release();

    debug!(sandbox = %sandbox.id(), module = native.name(), "capability table provisioned");
    Ok(CapabilityTable { table })
}

fn export_names(sandbox: &Sandbox, exports: &Reference<'_>) -> SandboxResult<Vec<String>> {
    sandbox
        .eval_closure(
            "return Object.keys($0).filter((key) => typeof $0[key] === 'function');",
            vec![exports.deref_into()],
        )?
        .copy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloister_sandbox::{InspectBinding, SandboxError};

    struct FailingNative;

    impl NativeModule for FailingNative {
        fn name(&self) -> &str {
            "failing"
        }

        fn create<'sb>(&self, _sandbox: &'sb Sandbox) -> SandboxResult<Reference<'sb>> {
            Err(SandboxError::Native {
                module: "failing".to_string(),
                reason: "not linked".to_string(),
            })
        }
    }

    struct ScriptNative(&'static str);

    impl NativeModule for ScriptNative {
        fn name(&self) -> &str {
            "script"
        }

        fn create<'sb>(&self, sandbox: &'sb Sandbox) -> SandboxResult<Reference<'sb>> {
            sandbox.execute("<native>", self.0)
        }
    }

    #[tokio::test]
    async fn test_provision_inspect_binding() {
        let sandbox = Sandbox::default_config().unwrap();
        let binding = provision(&sandbox, &InspectBinding::new()).await.unwrap();
        let has_intl: bool = binding
            .table()
            .get("config")
            .unwrap()
            .get("hasIntl")
            .unwrap()
            .copy()
            .unwrap();
        assert!(!has_intl);
        assert!(binding.table().get("util").unwrap().get("getProxyDetails").unwrap().is_function().unwrap());
    }

    #[tokio::test]
    async fn test_instantiation_failure() {
        let sandbox = Sandbox::default_config().unwrap();
        let err = provision(&sandbox, &FailingNative).await.unwrap_err();
        assert!(matches!(
            err,
            BootError::CapabilityUnavailable { ref module, ref reason }
                if module == "failing" && reason.contains("not linked")
        ));
    }

    #[tokio::test]
    async fn test_factory_throws() {
        let sandbox = Sandbox::default_config().unwrap();
        let native = ScriptNative("({ make() { throw new Error('factory broke'); } })");
        let err = provision(&sandbox, &native).await.unwrap_err();
        assert!(matches!(
            err,
            BootError::CapabilityUnavailable { ref reason, .. } if reason.contains("factory broke")
        ));
    }

    #[tokio::test]
    async fn test_requires_single_factory() {
        let sandbox = Sandbox::default_config().unwrap();
        let native = ScriptNative("({ a() { return {}; }, b() { return {}; } })");
        let err = provision(&sandbox, &native).await.unwrap_err();
        assert!(matches!(
            err,
            BootError::CapabilityUnavailable { ref reason, .. } if reason.contains("found 2")
        ));
    }
}

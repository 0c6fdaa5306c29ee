//! Trusted support modules and the registry that orders them.
//!
//! Trusted module text is never evaluated as a script body directly. It is
//! wrapped in a function expression taking [`MODULE_PARAMETERS`], and the
//! compiled function is invoked later by the in-sandbox loader.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Parameters every trusted module body receives, in call order.
pub const MODULE_PARAMETERS: [&str; 6] = [
    "global",
    "primordials",
    "internalBinding",
    "process",
    "module",
    "require",
];

/// Wrap module source text in the six-parameter function preamble.
///
/// The closing brace goes on its own line so a trailing line comment in
/// the module cannot swallow it.
#[must_use]
pub fn wrap_module_source(text: &str) -> String {
    format!("(function({}){{{}\n}})", MODULE_PARAMETERS.join(","), text)
}

/// The five modules required for diagnostic formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SupportModule {
    /// Frozen built-in reference table
    Primordials,
    /// Value inspection and format strings
    Inspect,
    /// Error classes with codes
    Errors,
    /// Generic helpers
    Util,
    /// Type predicates
    Types,
}

impl SupportModule {
    /// All support modules in registry order
    pub const ALL: [SupportModule; 5] = [
        Self::Primordials,
        Self::Inspect,
        Self::Errors,
        Self::Util,
        Self::Types,
    ];

    /// Module identifier as used by `require`
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Self::Primordials => "internal/per_context/primordials",
            Self::Inspect => "internal/util/inspect",
            Self::Errors => "internal/errors",
            Self::Util => "internal/util",
            Self::Types => "internal/util/types",
        }
    }

    /// Look up a support module by identifier
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.id() == id)
    }
}

impl fmt::Display for SupportModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Ordered set of trusted module identifiers
///
/// The primordials module runs first and on its own; the entry module is
/// the one the loader requires and whose exports it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    primordials: &'static str,
    entry: &'static str,
    modules: Vec<&'static str>,
}

impl Registry {
    /// Create a registry holding only the primordials and entry modules
    #[must_use]
    pub fn new(primordials: &'static str, entry: &'static str) -> Self {
        let mut modules = vec![primordials];
        if entry != primordials {
            modules.push(entry);
        }
        Self {
            primordials,
            entry,
            modules,
        }
    }

    /// The registry needed for diagnostic formatting
    #[must_use]
    pub fn support() -> Self {
        Self {
            primordials: SupportModule::Primordials.id(),
            entry: SupportModule::Inspect.id(),
            modules: SupportModule::ALL.iter().map(SupportModule::id).collect(),
        }
    }

    /// Append a module (ignored if already present)
    #[must_use]
    pub fn with_module(mut self, id: &'static str) -> Self {
        if !self.modules.contains(&id) {
            self.modules.push(id);
        }
        self
    }

    /// Primordials module identifier
    #[must_use]
    pub fn primordials(&self) -> &'static str {
        self.primordials
    }

    /// Entry module identifier
    #[must_use]
    pub fn entry(&self) -> &'static str {
        self.entry
    }

    /// Module identifiers in registry order
    #[must_use]
    pub fn modules(&self) -> &[&'static str] {
        &self.modules
    }

    /// Number of modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Whether the registry contains a module
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.modules.iter().any(|m| *m == id)
    }

    /// Check that the registry can bootstrap at all
    ///
    /// # Errors
    ///
    /// Returns error if the primordials or entry module is missing, or if
    /// the primordials module is also the entry.
    pub fn validate(&self) -> CoreResult<()> {
        if self.primordials == self.entry {
            return Err(CoreError::InvalidRegistry {
                reason: "primordials module cannot be the entry module".to_string(),
            });
        }
        for id in [self.primordials, self.entry] {
            if !self.contains(id) {
                return Err(CoreError::UnknownModule { id: id.to_string() });
            }
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::support()
    }
}

/// Source text of one trusted module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    id: &'static str,
    text: String,
}

impl ModuleSource {
    /// Create a module source
    #[must_use]
    pub fn new(id: &'static str, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    /// Module identifier
    #[must_use]
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Raw source text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Source length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the source is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// BLAKE3 digest of the source text, hex encoded
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(blake3::hash(self.text.as_bytes()).as_bytes())
    }

    /// Source wrapped in the module preamble, ready to compile
    #[must_use]
    pub fn wrapped(&self) -> String {
        wrap_module_source(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_support_registry_order() {
        let registry = Registry::support();
        assert_eq!(
            registry.modules(),
            &[
                "internal/per_context/primordials",
                "internal/util/inspect",
                "internal/errors",
                "internal/util",
                "internal/util/types",
            ]
        );
        assert_eq!(registry.primordials(), "internal/per_context/primordials");
        assert_eq!(registry.entry(), "internal/util/inspect");
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_support_module_from_id() {
        assert_eq!(
            SupportModule::from_id("internal/util/types"),
            Some(SupportModule::Types)
        );
        assert_eq!(SupportModule::from_id("fs"), None);
    }

    #[test]
    fn test_registry_with_module() {
        let registry = Registry::new("p", "e").with_module("x").with_module("x");
        assert_eq!(registry.modules(), &["p", "e", "x"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_rejects_primordials_entry() {
        let registry = Registry::new("p", "p");
        assert!(matches!(
            registry.validate(),
            Err(CoreError::InvalidRegistry { .. })
        ));
    }

    #[test]
    fn test_wrap_module_source() {
        let wrapped = wrap_module_source("module.exports = 1;");
        assert_eq!(
            wrapped,
            "(function(global,primordials,internalBinding,process,module,require){module.exports = 1;\n})"
        );
    }

    #[test]
    fn test_module_source_digest() {
        let a = ModuleSource::new("a", "module.exports = 1;");
        let b = ModuleSource::new("b", "module.exports = 2;");
        assert_eq!(a.digest().len(), 64);
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), ModuleSource::new("c", "module.exports = 1;").digest());
    }

    proptest! {
        #[test]
        fn prop_wrapped_source_keeps_body(body in "[ -~\n]{0,200}") {
            let wrapped = wrap_module_source(&body);
            prop_assert!(
                wrapped.starts_with("(function(global,primordials,internalBinding,process,module,require){"),
                "missing preamble: {:?}",
                wrapped
            );
            prop_assert!(wrapped.ends_with("\n})"), "missing closing line: {:?}", wrapped);
            prop_assert!(wrapped.contains(body.as_str()), "body not kept: {:?}", body);
        }
    }
}

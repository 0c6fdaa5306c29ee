//! Host-held references to sandbox values and transfers back into the sandbox.
//!
//! A [`Reference`] borrows its [`Sandbox`], so it can never outlive it.
//! Moving a value back in is explicit: [`Reference::deref_into`] borrows
//! and leaves the handle valid, [`Reference::transfer`] consumes it.

use crate::error::{SandboxError, SandboxResult};
use crate::sandbox::{call_function, caught, Sandbox};
use cloister_core::SandboxId;
use deno_core::{serde_v8, v8};
use serde::de::DeserializeOwned;
use std::fmt;

/// Live handle to a value inside a sandbox
pub struct Reference<'sb> {
    sandbox: &'sb Sandbox,
    value: v8::Global<v8::Value>,
}

impl<'sb> Reference<'sb> {
    pub(crate) fn new(sandbox: &'sb Sandbox, value: v8::Global<v8::Value>) -> Self {
        Self { sandbox, value }
    }

    /// Sandbox this reference belongs to
    #[must_use]
    pub fn sandbox(&self) -> &'sb Sandbox {
        self.sandbox
    }

    /// Underlying engine handle
    #[must_use]
    pub fn handle(&self) -> &v8::Global<v8::Value> {
        &self.value
    }

    /// Read a property
    ///
    /// # Errors
    ///
    /// Returns error if the value is not an object or a getter throws.
    pub fn get(&self, key: &str) -> SandboxResult<Reference<'sb>> {
        let value = self.sandbox.with_scope(|scope| {
            let local = v8::Local::new(scope, &self.value);
            let object = v8::Local::<v8::Object>::try_from(local).map_err(|_| {
                SandboxError::NotAnObject {
                    what: key.to_string(),
                }
            })?;
            let name = v8::String::new(scope, key).ok_or_else(|| SandboxError::Conversion {
                reason: format!("property name too long: {} bytes", key.len()),
            })?;
            let tc = &mut v8::TryCatch::new(scope);
            match object.get(tc, name.into()) {
                Some(found) => Ok(v8::Global::new(tc, found)),
                None => Err(caught(tc)),
            }
        })?;
        Ok(Reference::new(self.sandbox, value))
    }

    /// Call the referenced function with an `undefined` receiver
    ///
    /// # Errors
    ///
    /// Returns error if the value is not a function, an argument belongs to
    /// another sandbox, or the call throws.
    pub fn apply(&self, args: Vec<Transfer>) -> SandboxResult<Reference<'sb>> {
        let owner = self.sandbox.id();
        let value = self.sandbox.with_scope(|scope| {
            let local = v8::Local::new(scope, &self.value);
            let func = match v8::Local::<v8::Function>::try_from(local) {
                Ok(func) => func,
                Err(_) => {
                    return Err(SandboxError::NotAFunction {
                        what: local.type_of(scope).to_rust_string_lossy(scope),
                    });
                }
            };
            let mut argv = Vec::with_capacity(args.len());
            for arg in args {
                argv.push(arg.into_local(scope, owner)?);
            }
            let result = call_function(scope, func, &argv)?;
            Ok(v8::Global::new(scope, result))
        })?;
        Ok(Reference::new(self.sandbox, value))
    }

    /// Structured copy of the value into a host type
    ///
    /// # Errors
    ///
    /// Returns error if the value does not fit `T`.
    pub fn copy<T: DeserializeOwned>(&self) -> SandboxResult<T> {
        self.sandbox.with_scope(|scope| {
            let local = v8::Local::new(scope, &self.value);
            serde_v8::from_v8(scope, local).map_err(|e| SandboxError::Conversion {
                reason: e.to_string(),
            })
        })
    }

    /// Result of `typeof` on the value
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox is busy.
    pub fn type_of(&self) -> SandboxResult<String> {
        self.sandbox.with_scope(|scope| {
            let local = v8::Local::new(scope, &self.value);
            Ok(local.type_of(scope).to_rust_string_lossy(scope))
        })
    }

    /// Whether the value is callable
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox is busy.
    pub fn is_function(&self) -> SandboxResult<bool> {
        self.sandbox
            .with_scope(|scope| Ok(v8::Local::new(scope, &self.value).is_function()))
    }

    /// Whether the value is `undefined`
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox is busy.
    pub fn is_undefined(&self) -> SandboxResult<bool> {
        self.sandbox
            .with_scope(|scope| Ok(v8::Local::new(scope, &self.value).is_undefined()))
    }

    /// Borrowing conversion: the handle stays valid
    #[must_use]
    pub fn deref_into(&self) -> Transfer {
        Transfer::Value {
            sandbox: self.sandbox.id(),
            value: self.value.clone(),
        }
    }

    /// Consuming conversion: the host-side handle is gone afterwards
    #[must_use]
    pub fn transfer(self) -> Transfer {
        Transfer::Value {
            sandbox: self.sandbox.id(),
            value: self.value,
        }
    }

    /// Release the handle
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("sandbox", &self.sandbox.id())
            .finish_non_exhaustive()
    }
}

/// A value on its way into a sandbox
pub enum Transfer {
    /// Sandbox-native value taken from a reference
    Value {
        /// Owning sandbox
        sandbox: SandboxId,
        /// Engine handle
        value: v8::Global<v8::Value>,
    },
    /// Structured copy of host data
    Json(serde_json::Value),
    /// Copied mapping of names to references
    Copy(ExternalCopy),
    /// `undefined`
    Undefined,
}

impl Transfer {
    /// Structured copy of a JSON value
    #[must_use]
    pub fn json(value: serde_json::Value) -> Self {
        Self::Json(value)
    }

    /// Materialize inside `owner`'s scope
    pub(crate) fn into_local<'s>(
        self,
        scope: &mut v8::HandleScope<'s>,
        owner: SandboxId,
    ) -> SandboxResult<v8::Local<'s, v8::Value>> {
        match self {
            Self::Value { sandbox, value } => {
                check_owner(owner, sandbox)?;
                Ok(v8::Local::new(scope, value))
            }
            Self::Json(value) => serde_v8::to_v8(scope, &value).map_err(|e| SandboxError::Conversion {
                reason: e.to_string(),
            }),
            Self::Copy(copy) => copy.into_local(scope, owner),
            Self::Undefined => Ok(v8::undefined(scope).into()),
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { sandbox, .. } => f.debug_struct("Value").field("sandbox", sandbox).finish(),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Copy(copy) => f.debug_tuple("Copy").field(copy).finish(),
            Self::Undefined => f.write_str("Undefined"),
        }
    }
}

impl From<serde_json::Value> for Transfer {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Copied structure of references, materialized as a sandbox-side `Map`
///
/// Building the copy clones each handle, so the source references stay
/// valid and can be released independently.
pub struct ExternalCopy {
    sandbox: SandboxId,
    entries: Vec<(String, v8::Global<v8::Value>)>,
}

impl ExternalCopy {
    /// Copy a mapping of names to references from `sandbox`
    ///
    /// # Errors
    ///
    /// Returns error if any reference belongs to another sandbox.
    pub fn reference_map<'r, 'sb: 'r, K: AsRef<str>>(
        sandbox: &Sandbox,
        entries: impl IntoIterator<Item = (K, &'r Reference<'sb>)>,
    ) -> SandboxResult<Self> {
        let owner = sandbox.id();
        let entries = entries
            .into_iter()
            .map(|(key, reference)| {
                check_owner(owner, reference.sandbox().id())?;
                Ok((key.as_ref().to_string(), reference.handle().clone()))
            })
            .collect::<SandboxResult<Vec<_>>>()?;
        Ok(Self {
            sandbox: owner,
            entries,
        })
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the copy is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    fn into_local<'s>(
        self,
        scope: &mut v8::HandleScope<'s>,
        owner: SandboxId,
    ) -> SandboxResult<v8::Local<'s, v8::Value>> {
        check_owner(owner, self.sandbox)?;
        let map = v8::Map::new(scope);
        for (key, value) in self.entries {
            let key = v8::String::new(scope, &key).ok_or_else(|| SandboxError::Conversion {
                reason: format!("map key too long: {} bytes", key.len()),
            })?;
            let value = v8::Local::new(scope, value);
            map.set(scope, key.into(), value)
                .ok_or_else(|| SandboxError::Conversion {
                    reason: "failed to populate map".to_string(),
                })?;
        }
        Ok(map.into())
    }
}

impl fmt::Debug for ExternalCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalCopy")
            .field("sandbox", &self.sandbox)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn check_owner(expected: SandboxId, actual: SandboxId) -> SandboxResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SandboxError::ForeignReference { expected, actual })
    }
}

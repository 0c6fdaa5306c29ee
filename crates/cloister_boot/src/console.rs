//! Console bridge.
//!
//! Console methods format their arguments inside the sandbox and pass a
//! single string to the host writer. Sandbox values never reach the host.
//! The bridge installs a fresh console object; methods it does not provide
//! are kept as no-ops.

use crate::diagnostics::Diagnostics;
use crate::error::{BootError, BootResult};
use cloister_sandbox::{HostWriter, Sandbox, SandboxError};
use std::rc::Rc;
use tracing::debug;

/// `$0` formatWithOptions, `$1` inspect, `$2` host write.
const BRIDGE_SOURCE: &str = r#"'use strict';
const formatWithOptions = $0;
const inspect = $1;
const write = $2;
const { captureStackTrace } = Error;
const assign = Object.assign;
const keys = Object.keys;

const bridge = {
  log(...args) {
    write(1, `${formatWithOptions({ colors: true }, ...args)}\n`);
  },
  warn(...args) {
    write(2, `${formatWithOptions({ colors: true }, ...args)}\n`);
  },
  error(...args) {
    bridge.warn(...args);
  },
  dir(object, options) {
    write(1, `${inspect(object, { customInspect: false, color: true, ...options })}\n`);
  },
  trace: function trace(...args) {
    const err = { name: 'Trace', message: formatWithOptions({ colors: true }, ...args) };
    captureStackTrace(err, trace);
    bridge.error(err.stack);
  },
  assert(expression, ...args) {
    if (!expression) {
      args[0] = `Assertion failed${args.length === 0 ? '' : `: ${args[0]}`}`;
      bridge.warn(...args);
    }
  },
};

const previous = globalThis.console;
const replacement = {};
if (previous !== null && typeof previous === 'object') {
  for (const key of keys(previous)) {
    if (typeof previous[key] === 'function') {
      replacement[key] = function () {};
    }
  }
}
globalThis.console = assign(replacement, bridge);
"#;

/// Install the console bridge on `sandbox`
///
/// Installing again replaces both the methods and the writer.
///
/// # Errors
///
/// Returns [`BootError::Bridge`] if the bridge closure fails, or
/// [`BootError::Sandbox`] if the diagnostics belong to another sandbox.
pub fn install_console_bridge(
    sandbox: &Sandbox,
    diagnostics: &Diagnostics<'_>,
    writer: Rc<dyn HostWriter>,
) -> BootResult<()> {
    let write = sandbox.install_writer(writer)?;
    let args = vec![
        diagnostics.formatter().deref_into(),
        diagnostics.inspector().deref_into(),
        write.transfer(),
    ];
    sandbox
        .eval_closure(BRIDGE_SOURCE, args)
        .map_err(|err| match err {
            err @ SandboxError::ForeignReference { .. } => BootError::Sandbox(err),
            other => BootError::Bridge {
                reason: other.to_string(),
            },
        })?
        .release();
    debug!(sandbox = %sandbox.id(), "console bridge installed");
    Ok(())
}

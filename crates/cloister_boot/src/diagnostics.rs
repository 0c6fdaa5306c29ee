//! Diagnostic exports handed to the caller of the bootstrap.

use crate::error::{BootError, BootResult};
use cloister_core::InspectOptions;
use cloister_sandbox::{Reference, Transfer};

/// Export name of the generic formatter
pub const FORMAT_WITH_OPTIONS: &str = "formatWithOptions";

/// Export name of the single-value inspector
pub const INSPECT: &str = "inspect";

/// Live `formatWithOptions` and `inspect` references
///
/// Bootstrap never releases these; they live until the caller drops or
/// releases them.
#[derive(Debug)]
pub struct Diagnostics<'sb> {
    format_with_options: Reference<'sb>,
    inspect: Reference<'sb>,
}

impl<'sb> Diagnostics<'sb> {
    /// Pick the two functions off an exports object
    ///
    /// # Errors
    ///
    /// Returns [`BootError::MissingExport`] if either is not a function.
    pub fn from_exports(exports: &Reference<'sb>) -> BootResult<Self> {
        Ok(Self {
            format_with_options: function_export(exports, FORMAT_WITH_OPTIONS)?,
            inspect: function_export(exports, INSPECT)?,
        })
    }

    /// `formatWithOptions(options, ...values)`
    #[must_use]
    pub fn formatter(&self) -> &Reference<'sb> {
        &self.format_with_options
    }

    /// `inspect(value, options?)`
    #[must_use]
    pub fn inspector(&self) -> &Reference<'sb> {
        &self.inspect
    }

    /// Format `values` inside the sandbox and copy the string out
    ///
    /// # Errors
    ///
    /// Returns error if the options cannot be encoded or formatting throws.
    pub fn format(&self, options: &InspectOptions, values: Vec<Transfer>) -> BootResult<String> {
        let mut args = Vec::with_capacity(values.len() + 1);
        args.push(Transfer::json(options.to_json()?));
        args.extend(values);
        Ok(self.format_with_options.apply(args)?.copy()?)
    }

    /// Inspect one value inside the sandbox and copy the string out
    ///
    /// # Errors
    ///
    /// Returns error if the options cannot be encoded or inspection throws.
    pub fn inspect(&self, value: Transfer, options: Option<&InspectOptions>) -> BootResult<String> {
        let mut args = vec![value];
        if let Some(options) = options {
            args.push(Transfer::json(options.to_json()?));
        }
        Ok(self.inspect.apply(args)?.copy()?)
    }

    /// Release both references
    pub fn release(self) {
        self.format_with_options.release();
        self.inspect.release();
    }
}

fn function_export<'sb>(exports: &Reference<'sb>, name: &str) -> BootResult<Reference<'sb>> {
    let missing = || BootError::MissingExport {
        name: name.to_string(),
    };
    let value = exports.get(name).map_err(|_| missing())?;
    if value.is_function()? {
        Ok(value)
    } else {
        Err(missing())
    }
}

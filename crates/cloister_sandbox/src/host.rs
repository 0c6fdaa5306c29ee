//! Host write callbacks exposed to sandboxed code.
//!
//! The sandbox sees a plain function `(fd, text)`. Only strings cross the
//! boundary; the writer never receives a sandbox value.

use cloister_core::{SandboxId, StreamSelector};
use deno_core::v8;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::trace;

/// Receives formatted text from a sandbox
pub trait HostWriter {
    /// Write `text` to `stream`
    ///
    /// # Errors
    ///
    /// Returns error if the underlying stream fails. The error is rethrown
    /// inside the sandbox.
    fn write(&self, stream: StreamSelector, text: &str) -> io::Result<()>;
}

/// Writes to the process's standard streams
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioWriter;

impl StdioWriter {
    /// Create a stdio writer
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HostWriter for StdioWriter {
    fn write(&self, stream: StreamSelector, text: &str) -> io::Result<()> {
        match stream {
            StreamSelector::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(text.as_bytes())?;
                out.flush()
            }
            StreamSelector::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(text.as_bytes())?;
                err.flush()
            }
        }
    }
}

/// One recorded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostWrite {
    /// Target stream
    pub stream: StreamSelector,
    /// Text as received
    pub text: String,
}

/// Records writes in memory
#[derive(Debug, Default)]
pub struct RecordingWriter {
    records: RefCell<Vec<HostWrite>>,
}

impl RecordingWriter {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes so far, in order
    #[must_use]
    pub fn records(&self) -> Vec<HostWrite> {
        self.records.borrow().clone()
    }

    /// Number of writes
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether nothing was written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Concatenated text written to one stream
    #[must_use]
    pub fn text(&self, stream: StreamSelector) -> String {
        self.records
            .borrow()
            .iter()
            .filter(|w| w.stream == stream)
            .map(|w| w.text.as_str())
            .collect()
    }

    /// Forget all writes
    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl HostWriter for RecordingWriter {
    fn write(&self, stream: StreamSelector, text: &str) -> io::Result<()> {
        self.records.borrow_mut().push(HostWrite {
            stream,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Writer bound to an isolate
pub(crate) struct WriterSlot {
    sandbox: SandboxId,
    writer: Rc<dyn HostWriter>,
}

impl WriterSlot {
    pub(crate) fn new(sandbox: SandboxId, writer: Rc<dyn HostWriter>) -> Self {
        Self { sandbox, writer }
    }
}

/// Sandbox-side `write(fd, text)`
pub(crate) fn write_callback(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    _rv: v8::ReturnValue,
) {
    let Some(slot) = scope.get_slot::<WriterSlot>() else {
        throw_error(scope, "no host writer installed");
        return;
    };
    let sandbox = slot.sandbox;
    let writer = Rc::clone(&slot.writer);

    let fd_value = args.get(0);
    let fd = if fd_value.is_uint32() {
        fd_value.uint32_value(scope)
    } else {
        None
    };
    let stream = match fd.map(StreamSelector::from_fd) {
        Some(Ok(stream)) => stream,
        Some(Err(err)) => {
            throw_error(scope, &err.to_string());
            return;
        }
        None => {
            let shown = fd_value.to_rust_string_lossy(scope);
            throw_error(scope, &format!("Invalid stream selector: {shown}"));
            return;
        }
    };

    let text = args.get(1).to_rust_string_lossy(scope);
    trace!(sandbox = %sandbox, stream = %stream, len = text.len(), "host write");
    if let Err(err) = writer.write(stream, &text) {
        throw_error(scope, &format!("write to {stream} failed: {err}"));
    }
}

/// Throw an `Error` with `message` in the current scope
pub(crate) fn throw_error(scope: &mut v8::HandleScope, message: &str) {
    if let Some(text) = v8::String::new(scope, message) {
        let exception = v8::Exception::error(scope, text);
        scope.throw_exception(exception);
    }
}

/// Throw a `TypeError` with `message` in the current scope
pub(crate) fn throw_type_error(scope: &mut v8::HandleScope, message: &str) {
    if let Some(text) = v8::String::new(scope, message) {
        let exception = v8::Exception::type_error(scope, text);
        scope.throw_exception(exception);
    }
}

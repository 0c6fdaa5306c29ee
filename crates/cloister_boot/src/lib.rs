//! CLOISTER Bootstrap
//!
//! Prepares a fresh sandbox to run trusted support code. Trusted module
//! sources are compiled into wrapper functions, a frozen primordials table
//! is captured before anything else runs, the native capability table is
//! provisioned, and a memoizing `require` evaluates the entry module. The
//! caller receives `formatWithOptions` and `inspect`, and can install a
//! console bridge that formats inside the sandbox and forwards plain
//! strings to a host writer.
//!
//! ```ignore
//! let sandbox = Sandbox::default_config()?;
//! let diagnostics = cloister_boot::bootstrap(&sandbox).await?;
//! install_console_bridge(&sandbox, &diagnostics, Rc::new(StdioWriter::new()))?;
//! sandbox.execute("<main>", "console.log({ hello: 'world' })")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assets;
pub mod binding;
pub mod bootstrap;
pub mod compiler;
pub mod config;
pub mod console;
pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod primordials;

pub use assets::{AssetSource, DirectoryAssets, EmbeddedAssets, MapAssets};
pub use binding::CapabilityTable;
pub use bootstrap::{bootstrap, Bootstrap};
pub use compiler::CompiledModules;
pub use config::{AssetConfig, BootConfig};
pub use console::install_console_bridge;
pub use diagnostics::{Diagnostics, FORMAT_WITH_OPTIONS, INSPECT};
pub use error::{BootError, BootResult};
pub use loader::Loader;
pub use primordials::{Primordials, PrimordialsHolder};

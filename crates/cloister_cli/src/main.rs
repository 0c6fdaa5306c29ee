//! CLOISTER CLI
//!
//! Bootstraps a sandbox, bridges its console to the process's standard
//! streams, and runs scripts or inspects values inside it.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use cloister_boot::{install_console_bridge, BootConfig, Bootstrap, Diagnostics};
use cloister_core::InspectOptions;
use cloister_sandbox::{Sandbox, StdioWriter, Transfer};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "cloister=info";

#[derive(Debug, Parser)]
#[command(name = "cloister")]
#[command(about = "CLOISTER - trusted runtime bootstrap for V8 sandboxes", long_about = None)]
struct Cli {
    /// JSON boot configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory of trusted modules, laid out as `<dir>/<id>.js`
    #[arg(long, global = true)]
    assets: Option<PathBuf>,
    /// Sandbox heap limit in MiB
    #[arg(long, global = true)]
    max_heap_mb: Option<usize>,
    /// Throw on `require` of an unregistered trusted module
    #[arg(long, global = true)]
    strict_require: bool,
    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        /// Path to the script
        file: PathBuf,
    },
    /// Evaluate inline code and print the completion value
    Eval {
        /// Source text
        code: String,
    },
    /// Inspect a JSON value
    Inspect {
        /// JSON text
        json: String,
        /// Recursion depth
        #[arg(long)]
        depth: Option<u32>,
        /// Disable ANSI colors
        #[arg(long)]
        no_colors: bool,
        /// Include non-enumerable properties
        #[arg(long)]
        show_hidden: bool,
    },
    /// List the trusted module registry
    Modules,
}

impl Cli {
    fn boot_config(&self) -> Result<BootConfig> {
        let mut config = match &self.config {
            Some(path) => BootConfig::from_json_file(path)?,
            None => BootConfig::new(),
        };
        if let Some(dir) = &self.assets {
            config = config.with_assets_dir(dir);
        }
        if let Some(mb) = self.max_heap_mb {
            config.sandbox.max_heap_size = mb.saturating_mul(1024 * 1024);
        }
        if self.strict_require {
            config = config.with_strict_require(true);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn colors_enabled(no_colors: bool) -> bool {
    !no_colors && std::io::stdout().is_terminal()
}

async fn bridged<'sb>(boot: &Bootstrap, sandbox: &'sb Sandbox) -> Result<Diagnostics<'sb>> {
    let diagnostics = boot.run(sandbox).await?;
    install_console_bridge(sandbox, &diagnostics, Rc::new(StdioWriter::new()))?;
    Ok(diagnostics)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = cli.boot_config()?;
    debug!(?config, "boot configuration");
    let boot = Bootstrap::from_config(&config);

    match &cli.command {
        Commands::Modules => {
            for source in boot.sources()? {
                println!("{}\t{}\t{}", source.id(), source.len(), source.digest());
            }
            Ok(())
        }
        Commands::Run { file } => {
            let code = std::fs::read_to_string(file)
                .wrap_err_with(|| format!("reading {}", file.display()))?;
            let sandbox = Sandbox::new(config.sandbox.clone())?;
            let _diagnostics = bridged(&boot, &sandbox).await?;
            sandbox
                .execute("<main>", code)
                .wrap_err_with(|| format!("running {}", file.display()))?
                .release();
            Ok(())
        }
        Commands::Eval { code } => {
            let sandbox = Sandbox::new(config.sandbox.clone())?;
            let diagnostics = bridged(&boot, &sandbox).await?;
            let value = sandbox.execute("<eval>", code.as_str())?;
            let options = InspectOptions::new().with_colors(colors_enabled(false));
            println!("{}", diagnostics.inspect(value.transfer(), Some(&options))?);
            Ok(())
        }
        Commands::Inspect {
            json,
            depth,
            no_colors,
            show_hidden,
        } => {
            let value: serde_json::Value =
                serde_json::from_str(json).wrap_err("parsing JSON value")?;
            let sandbox = Sandbox::new(config.sandbox.clone())?;
            let diagnostics = boot.run(&sandbox).await?;
            let mut options = InspectOptions::new()
                .with_colors(colors_enabled(*no_colors))
                .with_show_hidden(*show_hidden);
            if let Some(depth) = depth {
                options = options.with_depth(*depth);
            }
            println!("{}", diagnostics.inspect(Transfer::json(value), Some(&options))?);
            Ok(())
        }
    }
}

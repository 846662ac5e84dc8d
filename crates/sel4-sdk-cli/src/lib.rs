//! # sel4-sdk
//!
//! Command-line tool for building seL4 across a platform matrix and
//! packaging each build as an SDK.
//!
//! ## Overview
//!
//! `sel4-sdk` is the CLI for the [`sel4_sdk`] library. It handles:
//!
//! - **Building** - Configures and compiles `kernel.elf` and `libsel4.a`
//!   for each selected platform/configuration
//! - **Assembling** - Copies the binary, library and headers into
//!   `sdk/<platform>/<configuration>/`
//! - **Reporting** - Prints a per-target summary and optionally writes it as JSON
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter sel4-sdk.toml pointing at the seL4 checkout
//! sel4-sdk --source-dir seL4 init
//!
//! # Build one configuration of one platform
//! sel4-sdk build --platform tqma8xqp --configuration debug
//!
//! # Build everything and keep a machine-readable summary
//! sel4-sdk build --all --summary target/sel4-summary.json
//!
//! # Re-assemble an SDK from an existing build directory
//! sel4-sdk assemble --build-dir build/imx6/default --sdk-dir sdk/imx6/default
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Build the selected targets and assemble their SDKs |
//! | `assemble` | Assemble an SDK from one existing build directory |
//! | `list` | List platforms and configurations |
//! | `init` | Write a starter `sel4-sdk.toml` |
//!
//! ## Output Directory
//!
//! ```text
//! build/<platform>/<configuration>/   # reused across runs
//! sdk/<platform>/<configuration>/     # rebuilt from scratch on every run
//! ├── bin/
//! ├── lib/
//! └── include/
//! ```
//!
//! The process exits non-zero when any target failed.
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `sel4-sdk.toml`

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use sel4_sdk::{BuildMatrix, KernelBuilder, SdkAssembler, Selection, run_targets};

pub mod config;

use config::{ConfigResolver, Sel4SdkConfig};

/// Builds seL4 for a platform matrix and packages each build as an SDK.
#[derive(Parser, Debug)]
#[command(name = "sel4-sdk", author, version, about = "seL4 SDK builder", long_about = None)]
pub struct Cli {
    /// Path to sel4-sdk.toml (discovered from the current directory upwards if omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root of the seL4 source checkout
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Directory holding per-target build directories
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Directory holding per-target SDK trees
    #[arg(long)]
    sdk_dir: Option<PathBuf>,

    /// Print verbose output including all commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the selected targets and assemble an SDK for each.
    Build {
        #[arg(long, help = "Build every configuration of every platform")]
        all: bool,
        #[arg(long, help = "Platform to build")]
        platform: Option<String>,
        #[arg(long, help = "Single configuration of --platform to build")]
        configuration: Option<String>,
        #[arg(long, help = "Optional output path for a JSON run summary")]
        summary: Option<PathBuf>,
    },
    /// Assemble an SDK tree from one completed build directory.
    Assemble {
        #[arg(long, help = "Completed build directory containing CMakeCache.txt")]
        build_dir: PathBuf,
        #[arg(long, help = "Destination SDK directory (replaced if it exists)")]
        sdk_dir: PathBuf,
    },
    /// List the platforms and configurations of the build matrix.
    List,
    /// Write a starter sel4-sdk.toml.
    Init {
        #[arg(long, default_value = config::CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

/// Resolved global settings shared by every command.
struct Settings {
    resolver: ConfigResolver,
    source_dir: PathBuf,
    build_dir: PathBuf,
    sdk_dir: PathBuf,
    verbose: bool,
}

impl Settings {
    fn resolve(
        config: Option<&Path>,
        source_dir: Option<PathBuf>,
        build_dir: Option<PathBuf>,
        sdk_dir: Option<PathBuf>,
        verbose: bool,
    ) -> Result<Self> {
        let resolver = ConfigResolver::new(config)?;
        if let Some(path) = resolver.config_path.as_ref().filter(|_| verbose) {
            println!("Using configuration from {:?}", path);
        }
        Ok(Self {
            source_dir: resolver.source_dir(source_dir),
            build_dir: resolver.build_dir(build_dir),
            sdk_dir: resolver.sdk_dir(sdk_dir),
            verbose,
            resolver,
        })
    }
}

/// Parses the command line and runs the selected command.
pub fn run() -> Result<()> {
    run_cli(Cli::parse())
}

/// Runs an already parsed command line.
///
/// Returns an error when the selection is invalid or any target failed.
pub fn run_cli(cli: Cli) -> Result<()> {
    let Cli {
        config,
        source_dir,
        build_dir,
        sdk_dir,
        verbose,
        command,
    } = cli;

    let settings = || {
        Settings::resolve(
            config.as_deref(),
            source_dir.clone(),
            build_dir.clone(),
            sdk_dir.clone(),
            verbose,
        )
    };
    match command {
        Command::Build {
            all,
            platform,
            configuration,
            summary,
        } => {
            let selection = Selection::from_flags(all, platform, configuration)?;
            cmd_build(&settings()?, &selection, summary.as_deref())
        }
        Command::Assemble {
            build_dir: from,
            sdk_dir: to,
        } => cmd_assemble(&settings()?, &from, &to),
        Command::List => cmd_list(&settings()?.resolver.matrix()?),
        // No config is loaded: init has to work before one exists
        Command::Init { output, force } => cmd_init(
            &output,
            source_dir.as_deref().unwrap_or(Path::new(".")),
            force,
        ),
    }
}

/// Build the selected targets, assemble their SDKs and report the outcome
fn cmd_build(ctx: &Settings, selection: &Selection, summary_path: Option<&Path>) -> Result<()> {
    let matrix = ctx.resolver.matrix()?;
    let targets = matrix.enumerate(selection)?;

    println!("Building {} target(s)", targets.len());
    if ctx.verbose {
        println!("  Source directory: {:?}", ctx.source_dir);
        println!("  Build directory: {:?}", ctx.build_dir);
        println!("  SDK directory: {:?}", ctx.sdk_dir);
    }

    let builder = KernelBuilder::new(&ctx.source_dir, &ctx.build_dir)
        .toolchain(ctx.resolver.toolchain())
        .verbose(ctx.verbose);
    let assembler = SdkAssembler::new(&ctx.source_dir).verbose(ctx.verbose);

    let summary = run_targets(&targets, &builder, &assembler, &ctx.sdk_dir);
    summary.print();

    if let Some(path) = summary_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write run summary to {:?}", path))?;
        println!("Run summary written to {:?}", path);
    }

    if !summary.all_succeeded() {
        bail!(
            "{} of {} target(s) failed",
            summary.failed(),
            summary.targets.len()
        );
    }
    Ok(())
}

/// Assemble one SDK tree from an existing build directory
fn cmd_assemble(ctx: &Settings, build_dir: &Path, sdk_dir: &Path) -> Result<()> {
    println!("Assembling SDK from {:?}...", build_dir);
    let sdk = SdkAssembler::new(&ctx.source_dir)
        .verbose(ctx.verbose)
        .assemble(build_dir, sdk_dir)
        .with_context(|| format!("Failed to assemble SDK from {:?}", build_dir))?;
    println!("✓ SDK ready at {:?}", sdk.root);
    Ok(())
}

fn cmd_list(matrix: &BuildMatrix) -> Result<()> {
    println!("Platforms ({}):", matrix.platforms().len());
    for platform in matrix.platforms() {
        let configurations: Vec<String> = platform
            .configurations
            .iter()
            .map(|config| {
                if config.options.is_empty() {
                    return config.name.clone();
                }
                let options: Vec<String> = config
                    .options
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value.render()))
                    .collect();
                format!("{} [{}]", config.name, options.join(", "))
            })
            .collect();
        println!("  - {}: {}", platform.name, configurations.join("; "));
    }
    println!(
        "\nConfigurations: {}",
        matrix.configuration_names().join(", ")
    );
    Ok(())
}

fn cmd_init(output: &Path, source_dir: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{:?} already exists. Pass --force to overwrite it.",
            output
        );
    }
    let contents = Sel4SdkConfig::generate_starter_toml(&source_dir.to_string_lossy());
    fs::write(output, contents).with_context(|| format!("Failed to write {:?}", output))?;

    println!("✓ Wrote {:?}", output);
    println!("\nNext steps:");
    println!("  1. Check source_dir and the toolchain in {:?}", output);
    println!("  2. Run 'sel4-sdk list' to see the platform matrix");
    println!("  3. Run 'sel4-sdk build --platform <name>' to build");
    Ok(())
}

//! Configuration file support for sel4-sdk.
//!
//! This module provides support for `sel4-sdk.toml` configuration files that
//! persist the source, build and SDK locations, the configure/compile tools,
//! and optionally a custom platform table.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./sel4-sdk.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! An explicit `--config` path skips discovery.
//!
//! ## Example Configuration
//!
//! ```toml
//! [paths]
//! source_dir = "seL4"
//! build_dir = "build"
//! sdk_dir = "sdk"
//!
//! [toolchain]
//! configure = "cmake"
//! generator = "Ninja"
//! pass_source_dir = true
//! compile = "ninja"
//!
//! [[platform]]
//! name = "tqma8xqp"
//!
//! [[platform.configuration]]
//! name = "default"
//!
//! [[platform.configuration]]
//! name = "debug"
//! options = { KernelDebugBuild = true, KernelPrinting = true }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use sel4_sdk::{BuildMatrix, PlatformSpec, Toolchain};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "sel4-sdk.toml";

/// Root configuration structure for `sel4-sdk.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sel4SdkConfig {
    /// Source, build and SDK locations.
    pub paths: PathsConfig,

    /// Configure and compile tools.
    pub toolchain: Toolchain,

    /// Custom platform table.
    ///
    /// When empty the built-in seL4 platform table is used.
    pub platform: Vec<PlatformSpec>,
}

/// Directory locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the seL4 source checkout.
    ///
    /// Defaults to the current directory.
    pub source_dir: PathBuf,

    /// Directory holding `<platform>/<configuration>` build directories.
    ///
    /// Defaults to `build`.
    pub build_dir: PathBuf,

    /// Directory holding `<platform>/<configuration>` SDK trees.
    ///
    /// Defaults to `sdk`.
    pub sdk_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            build_dir: PathBuf::from("build"),
            sdk_dir: PathBuf::from("sdk"),
        }
    }
}

impl Sel4SdkConfig {
    /// Loads configuration from the specified file path.
    ///
    /// Relative paths in `[paths]` are kept as written; they are resolved
    /// against the directory the command runs in.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Sel4SdkConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration from the current directory
    /// or any parent directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from `start_dir`.
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Saves the configuration to the specified file path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Returns the validated platform table.
    ///
    /// An empty `[[platform]]` list selects the built-in table.
    pub fn matrix(&self) -> Result<BuildMatrix> {
        if self.platform.is_empty() {
            return Ok(BuildMatrix::builtin());
        }
        BuildMatrix::new(self.platform.clone()).context("Invalid [[platform]] table")
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes comments explaining each option. The platform table is
    /// left commented out so the built-in table applies until edited.
    pub fn generate_starter_toml(source_dir: &str) -> String {
        let source_dir = toml::Value::String(source_dir.to_string()).to_string();
        format!(
            r#"# sel4-sdk configuration file
# CLI flags override these settings when provided.

[paths]
# Root of the seL4 source checkout
source_dir = {source_dir}

# Per-target build directories are created under build_dir/<platform>/<configuration>
build_dir = "build"

# SDK trees are written to sdk_dir/<platform>/<configuration>
sdk_dir = "sdk"

[toolchain]
# Configure step (default: cmake)
configure = "cmake"

# Generator passed as -G<generator> (set to "" for wrappers such as setup-build.sh)
generator = "Ninja"

# Append the absolute source directory to the configure command line
pass_source_dir = true

# Compile step, invoked with the targets kernel.elf and libsel4.a (default: ninja)
compile = "ninja"

# Custom platform table (optional, defaults to the built-in seL4 platforms)
# [[platform]]
# name = "tqma8xqp"
#
# [[platform.configuration]]
# name = "default"
#
# [[platform.configuration]]
# name = "debug"
# options = {{ KernelDebugBuild = true, KernelPrinting = true, KernelVerificationBuild = false }}
"#,
            source_dir = source_dir,
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<Sel4SdkConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a resolver from an explicit config path, or by discovery when
    /// none is given.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Sel4SdkConfig::load_from_file(path)?;
            return Ok(Self {
                config: Some(config),
                config_path: Some(path.to_path_buf()),
            });
        }
        match Sel4SdkConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    fn paths(&self) -> PathsConfig {
        self.config
            .as_ref()
            .map(|c| c.paths.clone())
            .unwrap_or_default()
    }

    /// Returns the source directory, preferring the CLI value.
    pub fn source_dir(&self, cli_value: Option<PathBuf>) -> PathBuf {
        cli_value.unwrap_or_else(|| self.paths().source_dir)
    }

    /// Returns the build root, preferring the CLI value.
    pub fn build_dir(&self, cli_value: Option<PathBuf>) -> PathBuf {
        cli_value.unwrap_or_else(|| self.paths().build_dir)
    }

    /// Returns the SDK root, preferring the CLI value.
    pub fn sdk_dir(&self, cli_value: Option<PathBuf>) -> PathBuf {
        cli_value.unwrap_or_else(|| self.paths().sdk_dir)
    }

    /// Returns the configured toolchain.
    pub fn toolchain(&self) -> Toolchain {
        self.config
            .as_ref()
            .map(|c| c.toolchain.clone())
            .unwrap_or_default()
    }

    /// Returns the platform table.
    pub fn matrix(&self) -> Result<BuildMatrix> {
        match &self.config {
            Some(config) => config.matrix(),
            None => Ok(BuildMatrix::builtin()),
        }
    }
}

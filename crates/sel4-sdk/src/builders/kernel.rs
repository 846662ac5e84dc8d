//! Kernel build automation
//!
//! This module configures and compiles the seL4 kernel image and client
//! library for one [`BuildTarget`] by driving the external configure step
//! (CMake by default) and compile step (Ninja by default).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::common::{describe_command, run_command};
use crate::types::{BuildDirectory, BuildFailure, BuildTarget, CLIENT_LIBRARY, KERNEL_IMAGE};

/// Name of the cache option carrying the platform identifier.
pub const PLATFORM_OPTION: &str = "KernelPlatform";

/// External tools used to configure and compile a build directory.
///
/// The defaults match a plain CMake + Ninja setup. A wrapper script such as
/// `setup-build.sh` is expressed with `generator: None` and
/// `pass_source_dir: false`. In configuration files an empty `generator`
/// string stands for `None`, since TOML has no null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    /// Program run for the configure step.
    pub configure: String,
    /// Generator passed as `-G<generator>`, if any.
    #[serde(with = "generator_field")]
    pub generator: Option<String>,
    /// Whether the absolute source directory is appended to the configure
    /// command line.
    pub pass_source_dir: bool,
    /// Program run for the compile step.
    pub compile: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            configure: "cmake".to_string(),
            generator: Some("Ninja".to_string()),
            pass_source_dir: true,
            compile: "ninja".to_string(),
        }
    }
}

/// (De)serializes the optional generator as a plain string, `""` meaning none.
mod generator_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Some(value).filter(|v| !v.is_empty()))
    }
}

/// Builder that configures and compiles one target at a time
pub struct KernelBuilder {
    /// Root of the seL4 source checkout
    source_dir: PathBuf,
    /// Directory under which `<platform>/<configuration>` build dirs live
    build_root: PathBuf,
    /// Configure and compile tools
    toolchain: Toolchain,
    /// Whether to use verbose output
    verbose: bool,
}

impl KernelBuilder {
    /// Creates a new kernel builder
    ///
    /// # Arguments
    ///
    /// * `source_dir` - Root of the seL4 source tree (made absolute when the
    ///   configure command line is rendered)
    /// * `build_root` - Directory holding per-target build directories
    pub fn new(source_dir: impl Into<PathBuf>, build_root: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            build_root: build_root.into(),
            toolchain: Toolchain::default(),
            verbose: false,
        }
    }

    /// Overrides the configure/compile tools
    pub fn toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Enables verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Build directory used for `target`.
    pub fn build_dir(&self, target: &BuildTarget) -> PathBuf {
        self.build_root.join(target.relative_dir())
    }

    /// Configures and compiles `target`
    ///
    /// This performs the following steps:
    /// 1. Create `build/<platform>/<configuration>` (existing contents are
    ///    reused for incremental builds)
    /// 2. Run the configure step with the rendered option set
    /// 3. Compile exactly the kernel image and the client library
    ///
    /// Both tools run with the build directory as their working directory;
    /// this process's own working directory is left untouched.
    pub fn run(&self, target: &BuildTarget) -> Result<BuildDirectory, BuildFailure> {
        let build_dir = self.build_dir(target);
        fs::create_dir_all(&build_dir).map_err(|source| BuildFailure::CreateDir {
            target: target.to_string(),
            path: build_dir.clone(),
            source,
        })?;

        // Step 1: Configure
        let mut configure = Command::new(&self.toolchain.configure);
        configure
            .args(self.configure_args(target))
            .current_dir(&build_dir);
        let command = describe_command(&configure);
        println!("Configuring {}...", target);
        if self.verbose {
            println!("  Running: {}", command);
        }
        run_command(configure).map_err(|detail| BuildFailure::ConfigureFailed {
            target: target.to_string(),
            command,
            detail,
        })?;

        // Step 2: Compile
        let mut compile = Command::new(&self.toolchain.compile);
        compile
            .args([KERNEL_IMAGE, CLIENT_LIBRARY])
            .current_dir(&build_dir);
        let command = describe_command(&compile);
        println!("Compiling {}...", target);
        if self.verbose {
            println!("  Running: {}", command);
        }
        run_command(compile).map_err(|detail| BuildFailure::CompileFailed {
            target: target.to_string(),
            command,
            detail,
        })?;

        Ok(BuildDirectory {
            target: target.clone(),
            path: build_dir,
        })
    }

    /// Renders the configure-step arguments for `target`.
    ///
    /// The platform identifier is merged into the target's overrides and the
    /// result is emitted as `-D<name>=<value>` in name order. The platform
    /// identifier wins over an override of the same name.
    pub fn configure_args(&self, target: &BuildTarget) -> Vec<String> {
        let mut options = target.options.clone();
        options.insert(PLATFORM_OPTION.to_string(), target.platform.as_str().into());

        let mut args = Vec::with_capacity(options.len() + 2);
        if let Some(generator) = &self.toolchain.generator {
            args.push(format!("-G{}", generator));
        }
        args.extend(
            options
                .iter()
                .map(|(name, value)| format!("-D{}={}", name, value.render())),
        );
        if self.toolchain.pass_source_dir {
            args.push(absolute(&self.source_dir).to_string_lossy().into_owned());
        }
        args
    }
}

/// Makes `path` absolute against the current directory without touching the
/// filesystem.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OptionValue;
    use tempfile::TempDir;

    fn debug_target() -> BuildTarget {
        BuildTarget::new("tqma8xqp", "debug")
            .option("KernelVerificationBuild", false)
            .option("KernelPrinting", true)
            .option("KernelDebugBuild", true)
    }

    #[test]
    fn test_kernel_builder_creation() {
        let builder = KernelBuilder::new("/src/sel4", "/tmp/build");
        assert!(!builder.verbose);
        assert_eq!(builder.toolchain, Toolchain::default());
    }

    #[test]
    fn test_kernel_builder_verbose() {
        let builder = KernelBuilder::new("/src/sel4", "/tmp/build").verbose(true);
        assert!(builder.verbose);
    }

    #[test]
    fn test_build_dir_layout() {
        let builder = KernelBuilder::new("/src/sel4", "/tmp/build");
        assert_eq!(
            builder.build_dir(&debug_target()),
            Path::new("/tmp/build/tqma8xqp/debug")
        );
    }

    #[test]
    fn test_configure_args_sorted_and_rendered() {
        let builder = KernelBuilder::new("/src/sel4", "/tmp/build");
        assert_eq!(
            builder.configure_args(&debug_target()),
            vec![
                "-GNinja",
                "-DKernelDebugBuild=ON",
                "-DKernelPlatform=tqma8xqp",
                "-DKernelPrinting=ON",
                "-DKernelVerificationBuild=OFF",
                "/src/sel4",
            ]
        );
    }

    #[test]
    fn test_configure_args_platform_wins_and_strings_verbatim() {
        let builder = KernelBuilder::new("/src/sel4", "/tmp/build").toolchain(Toolchain {
            configure: "./setup-build.sh".into(),
            generator: None,
            pass_source_dir: false,
            compile: "ninja".into(),
        });
        let target = BuildTarget::new("pc99", "default")
            .option(PLATFORM_OPTION, "bogus")
            .option("KernelSel4Arch", OptionValue::from("x86_64"));
        assert_eq!(
            builder.configure_args(&target),
            vec!["-DKernelPlatform=pc99", "-DKernelSel4Arch=x86_64"]
        );
    }

    #[test]
    fn test_toolchain_empty_generator_means_none() {
        let toolchain: Toolchain = serde_json::from_str(
            r#"{"configure": "./setup-build.sh", "generator": "", "pass_source_dir": false}"#,
        )
        .unwrap();
        assert_eq!(toolchain.generator, None);
        assert_eq!(toolchain.compile, "ninja");

        let builder = KernelBuilder::new("/src/sel4", "/tmp/build").toolchain(toolchain.clone());
        assert_eq!(
            builder.configure_args(&BuildTarget::new("imx6", "default")),
            vec!["-DKernelPlatform=imx6"]
        );

        let json = serde_json::to_value(&toolchain).unwrap();
        assert_eq!(json["generator"], "");
        let reloaded: Toolchain = serde_json::from_value(json).unwrap();
        assert_eq!(reloaded, toolchain);

        let defaulted: Toolchain = serde_json::from_str("{}").unwrap();
        assert_eq!(defaulted.generator.as_deref(), Some("Ninja"));
    }

    #[test]
    fn test_configure_args_absolute_source_dir() {
        let builder = KernelBuilder::new("sel4", "build");
        let args = builder.configure_args(&BuildTarget::new("imx6", "default"));
        let source = PathBuf::from(args.last().unwrap());
        assert!(source.is_absolute());
        assert!(source.ends_with("sel4"));
    }

    #[cfg(unix)]
    fn scripted_toolchain(configure: &str, compile: &str) -> Toolchain {
        Toolchain {
            configure: configure.into(),
            generator: None,
            pass_source_dir: false,
            compile: compile.into(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_success_creates_build_dir() {
        let temp_dir = TempDir::new().unwrap();
        let builder = KernelBuilder::new(temp_dir.path(), temp_dir.path().join("build"))
            .toolchain(scripted_toolchain("true", "true"));

        let cwd_before = std::env::current_dir().unwrap();
        let dir = builder.run(&debug_target()).unwrap();
        assert_eq!(std::env::current_dir().unwrap(), cwd_before);
        assert_eq!(dir.path, temp_dir.path().join("build/tqma8xqp/debug"));
        assert!(dir.path.is_dir());
        assert_eq!(dir.target, debug_target());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_keeps_existing_build_state() {
        let temp_dir = TempDir::new().unwrap();
        let builder = KernelBuilder::new(temp_dir.path(), temp_dir.path().join("build"))
            .toolchain(scripted_toolchain("true", "true"));
        let build_dir = builder.build_dir(&debug_target());
        std::fs::create_dir_all(&build_dir).unwrap();
        std::fs::write(build_dir.join("build.ninja"), "# cached\n").unwrap();

        builder.run(&debug_target()).unwrap();
        assert!(build_dir.join("build.ninja").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_configure_failure() {
        let temp_dir = TempDir::new().unwrap();
        let builder = KernelBuilder::new(temp_dir.path(), temp_dir.path().join("build"))
            .toolchain(scripted_toolchain("false", "true"));

        let cwd_before = std::env::current_dir().unwrap();
        let err = builder.run(&debug_target()).unwrap_err();
        assert_eq!(std::env::current_dir().unwrap(), cwd_before);
        match err {
            BuildFailure::ConfigureFailed { target, command, .. } => {
                assert_eq!(target, "tqma8xqp/debug");
                assert!(command.starts_with("false -DKernelDebugBuild=ON"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_compile_failure() {
        let temp_dir = TempDir::new().unwrap();
        let builder = KernelBuilder::new(temp_dir.path(), temp_dir.path().join("build"))
            .toolchain(scripted_toolchain("true", "false"));

        let err = builder.run(&debug_target()).unwrap_err();
        match err {
            BuildFailure::CompileFailed { command, .. } => {
                assert_eq!(command, "false kernel.elf libsel4.a");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_run_missing_tool() {
        let temp_dir = TempDir::new().unwrap();
        let builder = KernelBuilder::new(temp_dir.path(), temp_dir.path().join("build"))
            .toolchain(Toolchain {
                configure: "nonexistent-cmake-12345".into(),
                ..Toolchain::default()
            });

        let err = builder.run(&debug_target()).unwrap_err();
        assert!(matches!(err, BuildFailure::ConfigureFailed { .. }));
        assert!(err.to_string().contains("Failed to start"));
    }
}

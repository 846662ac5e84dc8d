//! Core types for sel4-sdk.
//!
//! This module defines the fundamental types used throughout the crate:
//!
//! - [`OptionValue`] - A configure-step option override (boolean or string)
//! - [`BuildTarget`] - One (platform, configuration) pair selected for a run
//! - [`BuildDirectory`] / [`SdkTree`] - The filesystem locations a run produces
//! - Error enums for every stage: [`CacheError`], [`MatrixError`],
//!   [`BuildFailure`], [`AssemblyError`], and [`TargetError`] which wraps the
//!   per-target failures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the configuration cache written by the configure step.
pub const CACHE_FILE_NAME: &str = "CMakeCache.txt";

/// Compile-step target name of the kernel image.
pub const KERNEL_IMAGE: &str = "kernel.elf";

/// Compile-step target name of the client static library.
pub const CLIENT_LIBRARY: &str = "libsel4.a";

/// A single option override passed to the configure step.
///
/// Booleans render as `ON`/`OFF`, strings verbatim.
///
/// # Example
///
/// ```
/// use sel4_sdk::OptionValue;
///
/// assert_eq!(OptionValue::Bool(true).render(), "ON");
/// assert_eq!(OptionValue::from("aarch64").render(), "aarch64");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// A boolean cache option.
    Bool(bool),
    /// A string cache option.
    String(String),
}

impl OptionValue {
    /// Renders the value the way it is passed on the configure command line.
    pub fn render(&self) -> String {
        match self {
            OptionValue::Bool(true) => "ON".to_string(),
            OptionValue::Bool(false) => "OFF".to_string(),
            OptionValue::String(s) => s.clone(),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

/// Option overrides for one configuration, keyed by option name.
///
/// A `BTreeMap` keeps rendering order sorted by name.
pub type OptionOverrides = BTreeMap<String, OptionValue>;

/// A (platform, configuration) pair selected for a run.
///
/// Carries the configuration's option overrides so the build driver does not
/// need to look them up again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Platform identifier passed as `KernelPlatform`.
    pub platform: String,
    /// Configuration name (e.g. `default`, `debug`).
    pub configuration: String,
    /// Option overrides applied on top of the platform defaults.
    pub options: OptionOverrides,
}

impl BuildTarget {
    /// Creates a target with no option overrides.
    pub fn new(platform: impl Into<String>, configuration: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            configuration: configuration.into(),
            options: OptionOverrides::new(),
        }
    }

    /// Adds an option override.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Returns the path of this target relative to a build or SDK root.
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(&self.platform).join(&self.configuration)
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.configuration)
    }
}

/// The working directory of a completed build.
///
/// Owned by the build driver that created it; the SDK assembler only reads
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirectory {
    /// The target this directory was built for.
    pub target: BuildTarget,
    /// Location of the build directory.
    pub path: PathBuf,
}

impl BuildDirectory {
    /// Path to the persisted configuration cache.
    pub fn cache_path(&self) -> PathBuf {
        cache_path(&self.path)
    }

    /// Path to the compiled kernel image.
    pub fn kernel_image(&self) -> PathBuf {
        kernel_image_path(&self.path)
    }

    /// Path to the compiled client library.
    pub fn client_library(&self) -> PathBuf {
        client_library_path(&self.path)
    }
}

pub(crate) fn cache_path(build_dir: &Path) -> PathBuf {
    build_dir.join(CACHE_FILE_NAME)
}

pub(crate) fn kernel_image_path(build_dir: &Path) -> PathBuf {
    build_dir.join("kernel").join(KERNEL_IMAGE)
}

pub(crate) fn client_library_path(build_dir: &Path) -> PathBuf {
    build_dir.join("libsel4").join(CLIENT_LIBRARY)
}

/// A fully assembled SDK tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkTree {
    /// Root of the tree (`sdk/<platform>/<configuration>`).
    pub root: PathBuf,
}

impl SdkTree {
    /// Directory holding the kernel image.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Directory holding the client library.
    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    /// Directory holding all headers.
    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }
}

/// Errors raised while reading a configuration cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache file could not be read.
    #[error("failed to read configuration cache {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line does not follow the `name:TYPE=value` shape, uses an unknown
    /// type, carries an unrecognized boolean token, or repeats a name.
    #[error("malformed configuration cache {path:?}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Errors raised while validating or enumerating the build matrix.
///
/// These are user-input errors and are reported before any build starts.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// The requested combination of selection flags is not valid.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// The requested platform is not in the matrix.
    #[error("unknown platform '{platform}'. Available platforms: {available:?}")]
    UnknownPlatform {
        platform: String,
        available: Vec<String>,
    },

    /// The requested configuration is not defined for the platform.
    #[error(
        "configuration '{configuration}' not valid for platform '{platform}'. Available configurations: {available:?}"
    )]
    UnknownConfiguration {
        platform: String,
        configuration: String,
        available: Vec<String>,
    },

    /// A platform was declared without any configuration.
    #[error("platform '{0}' declares no configurations")]
    EmptyPlatform(String),

    /// A platform was declared twice.
    #[error("platform '{0}' is declared more than once")]
    DuplicatePlatform(String),

    /// A configuration name was declared twice for one platform.
    #[error("configuration '{configuration}' is declared more than once for platform '{platform}'")]
    DuplicateConfiguration {
        platform: String,
        configuration: String,
    },
}

/// Errors raised by the build driver for one target.
///
/// A build failure skips the target; the rest of the run continues.
#[derive(Debug, thiserror::Error)]
pub enum BuildFailure {
    /// The build directory could not be created.
    #[error("{target}: failed to create build directory {path:?}: {source}")]
    CreateDir {
        target: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configure step could not be started or exited non-zero.
    #[error("{target}: configure step failed\n\nCommand: {command}\n\n{detail}")]
    ConfigureFailed {
        target: String,
        command: String,
        detail: String,
    },

    /// The compile step could not be started or exited non-zero.
    #[error("{target}: compile step failed\n\nCommand: {command}\n\n{detail}")]
    CompileFailed {
        target: String,
        command: String,
        detail: String,
    },
}

/// Errors raised while assembling an SDK tree from a build directory.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// The build directory has no configuration cache.
    #[error("configuration cache not found at {0:?}. Has the configure step completed?")]
    MissingCache(PathBuf),

    /// The configuration cache could not be read or parsed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A required architecture axis is not defined in the cache.
    #[error("configuration cache {cache:?} does not define '{key}'. Is the build complete?")]
    MissingCacheKey { key: &'static str, cache: PathBuf },

    /// A required architecture axis has a value that is not a string or path.
    #[error("configuration cache {cache:?} defines '{key}' with a non-string value")]
    InvalidCacheValue { key: &'static str, cache: PathBuf },

    /// An input file or directory the SDK needs does not exist.
    #[error("missing {artifact}: expected at {path:?}")]
    MissingArtifact { artifact: String, path: PathBuf },

    /// A filesystem operation on the SDK tree failed.
    #[error("failed to {action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A failure attributed to one target during a matrix run.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The build step failed.
    #[error(transparent)]
    Build(#[from] BuildFailure),

    /// The SDK assembly step failed.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

impl TargetError {
    /// Name of the step that failed, as recorded in run summaries.
    pub fn step(&self) -> &'static str {
        match self {
            TargetError::Build(BuildFailure::CreateDir { .. }) => "prepare",
            TargetError::Build(BuildFailure::ConfigureFailed { .. }) => "configure",
            TargetError::Build(BuildFailure::CompileFailed { .. }) => "compile",
            TargetError::Assembly(_) => "assemble",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_value_render() {
        assert_eq!(OptionValue::Bool(true).render(), "ON");
        assert_eq!(OptionValue::Bool(false).render(), "OFF");
        assert_eq!(OptionValue::from("64").render(), "64");
    }

    #[test]
    fn test_build_target_display_and_dir() {
        let target = BuildTarget::new("tqma8xqp", "debug").option("KernelPrinting", true);
        assert_eq!(target.to_string(), "tqma8xqp/debug");
        assert_eq!(target.relative_dir(), Path::new("tqma8xqp").join("debug"));
        assert_eq!(
            target.options.get("KernelPrinting"),
            Some(&OptionValue::Bool(true))
        );
    }

    #[test]
    fn test_build_directory_paths() {
        let dir = BuildDirectory {
            target: BuildTarget::new("pc99", "debug"),
            path: PathBuf::from("build/pc99/debug"),
        };
        assert_eq!(dir.cache_path(), Path::new("build/pc99/debug/CMakeCache.txt"));
        assert_eq!(
            dir.kernel_image(),
            Path::new("build/pc99/debug/kernel/kernel.elf")
        );
        assert_eq!(
            dir.client_library(),
            Path::new("build/pc99/debug/libsel4/libsel4.a")
        );
    }

    #[test]
    fn test_target_error_step() {
        let err = TargetError::from(BuildFailure::CompileFailed {
            target: "pc99/debug".into(),
            command: "ninja kernel.elf libsel4.a".into(),
            detail: String::new(),
        });
        assert_eq!(err.step(), "compile");

        let err = TargetError::from(AssemblyError::MissingCache(PathBuf::from("x")));
        assert_eq!(err.step(), "assemble");
    }

    #[test]
    fn test_option_value_deserializes_untagged() {
        let value: OptionValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, OptionValue::Bool(true));
        let value: OptionValue = serde_json::from_str("\"x86_64\"").unwrap();
        assert_eq!(value, OptionValue::String("x86_64".into()));
    }
}

//! The platform × configuration build matrix.
//!
//! A [`BuildMatrix`] is an ordered table of platforms, each declaring one or
//! more named configurations with a small set of option overrides. The
//! table is validated once when constructed; enumeration then follows the
//! declared order so build logs are reproducible across runs.
//!
//! ## Example
//!
//! ```
//! use sel4_sdk::matrix::{BuildMatrix, PlatformSpec, Selection};
//! use sel4_sdk::OptionValue;
//!
//! let matrix = BuildMatrix::new(vec![
//!     PlatformSpec::new("odroidc2").plain_configuration("default"),
//!     PlatformSpec::new("pc99").configuration("debug", [("KernelDebugBuild", OptionValue::Bool(true))]),
//! ])?;
//!
//! let targets = matrix.enumerate(&Selection::All)?;
//! assert_eq!(targets.len(), 2);
//! assert_eq!(targets[1].to_string(), "pc99/debug");
//! # Ok::<(), sel4_sdk::MatrixError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::types::{BuildTarget, MatrixError, OptionOverrides, OptionValue};

/// A named configuration of one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSpec {
    /// Configuration name (e.g. `default`, `debug`).
    pub name: String,
    /// Options passed to the configure step for this configuration.
    #[serde(default)]
    pub options: OptionOverrides,
}

/// A platform and its configurations, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSpec {
    /// Platform identifier passed as `KernelPlatform`.
    pub name: String,
    /// Configurations to build for this platform.
    #[serde(rename = "configuration", default)]
    pub configurations: Vec<ConfigurationSpec>,
}

impl PlatformSpec {
    /// Creates a platform with no configurations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configurations: Vec::new(),
        }
    }

    /// Appends a configuration with the given option overrides.
    pub fn configuration<I, K>(mut self, name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: Into<String>,
    {
        self.configurations.push(ConfigurationSpec {
            name: name.into(),
            options: options.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        });
        self
    }

    /// Appends a configuration without option overrides.
    pub fn plain_configuration(self, name: impl Into<String>) -> Self {
        self.configuration(name, std::iter::empty::<(String, OptionValue)>())
    }

    fn find(&self, configuration: &str) -> Option<&ConfigurationSpec> {
        self.configurations.iter().find(|c| c.name == configuration)
    }

    fn target(&self, configuration: &ConfigurationSpec) -> BuildTarget {
        BuildTarget {
            platform: self.name.clone(),
            configuration: configuration.name.clone(),
            options: configuration.options.clone(),
        }
    }
}

/// Which targets of the matrix to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every configuration of every platform.
    All,
    /// Every configuration of one platform.
    Platform(String),
    /// Exactly one configuration of one platform.
    Target {
        platform: String,
        configuration: String,
    },
}

impl Selection {
    /// Builds a selection from command-line style flags.
    ///
    /// `--all` excludes the other two flags, and a configuration is only
    /// meaningful together with a platform.
    pub fn from_flags(
        all: bool,
        platform: Option<String>,
        configuration: Option<String>,
    ) -> Result<Self, MatrixError> {
        match (all, platform, configuration) {
            (true, None, None) => Ok(Selection::All),
            (true, Some(_), _) => Err(MatrixError::InvalidSelection(
                "--platform must not be passed if --all is passed".to_string(),
            )),
            (true, None, Some(_)) => Err(MatrixError::InvalidSelection(
                "--configuration must not be passed if --all is passed".to_string(),
            )),
            (false, Some(platform), None) => Ok(Selection::Platform(platform)),
            (false, Some(platform), Some(configuration)) => Ok(Selection::Target {
                platform,
                configuration,
            }),
            (false, None, Some(_)) => Err(MatrixError::InvalidSelection(
                "--configuration requires --platform".to_string(),
            )),
            (false, None, None) => Err(MatrixError::InvalidSelection(
                "either --all or --platform must be specified".to_string(),
            )),
        }
    }
}

/// A validated platform → configuration table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMatrix {
    platforms: Vec<PlatformSpec>,
}

impl BuildMatrix {
    /// Validates and wraps a platform table.
    ///
    /// Every platform must declare at least one configuration, platform
    /// names must be unique, and configuration names must be unique within
    /// their platform.
    pub fn new(platforms: Vec<PlatformSpec>) -> Result<Self, MatrixError> {
        let mut seen_platforms = HashSet::new();
        for platform in &platforms {
            if !seen_platforms.insert(platform.name.as_str()) {
                return Err(MatrixError::DuplicatePlatform(platform.name.clone()));
            }
            if platform.configurations.is_empty() {
                return Err(MatrixError::EmptyPlatform(platform.name.clone()));
            }
            let mut seen_configs = HashSet::new();
            for config in &platform.configurations {
                if !seen_configs.insert(config.name.as_str()) {
                    return Err(MatrixError::DuplicateConfiguration {
                        platform: platform.name.clone(),
                        configuration: config.name.clone(),
                    });
                }
            }
        }
        Ok(Self { platforms })
    }

    /// The built-in seL4 platform table.
    ///
    /// RISC-V platforms (ariane, hifive, polarfire, rocketchip, spike) are
    /// not built.
    ///
    /// The table goes through the same validation as [`BuildMatrix::new`];
    /// it panics if an edit to the table breaks that validation.
    pub fn builtin() -> Self {
        fn debug() -> [(&'static str, OptionValue); 3] {
            [
                ("KernelDebugBuild", OptionValue::Bool(true)),
                ("KernelPrinting", OptionValue::Bool(true)),
                ("KernelVerificationBuild", OptionValue::Bool(false)),
            ]
        }
        fn default_only(name: &str) -> PlatformSpec {
            PlatformSpec::new(name).plain_configuration("default")
        }

        let mut platforms = vec![
            // x86
            PlatformSpec::new("pc99").configuration("debug", debug()),
        ];
        // ARM
        platforms.extend(
            [
                "allwinnerA20",
                "am335x",
                "apq8064",
                "bcm2837",
                "exynos4",
                "exynos5",
                "hikey",
                "imx31",
                "imx6",
                "imx7",
                "omap3",
                "tk1",
                "zynq7000",
                "fvp",
                "imx8mm-evk",
                "imx8mq-evk",
                "odroidc2",
                "rockpro64",
                "tx1",
                "tx2",
                "zynqmp",
            ]
            .into_iter()
            .map(default_only),
        );
        for name in ["tqma8xqp", "ipq8074"] {
            platforms.push(default_only(name).configuration("debug", debug()));
        }

        Self::new(platforms).unwrap_or_else(|err| panic!("built-in platform table is invalid: {err}"))
    }

    /// Platforms in declared order.
    pub fn platforms(&self) -> &[PlatformSpec] {
        &self.platforms
    }

    /// Platform names in declared order.
    pub fn platform_names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name.clone()).collect()
    }

    /// Sorted union of all configuration names.
    pub fn configuration_names(&self) -> Vec<String> {
        self.platforms
            .iter()
            .flat_map(|p| p.configurations.iter().map(|c| c.name.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn find(&self, platform: &str) -> Result<&PlatformSpec, MatrixError> {
        self.platforms
            .iter()
            .find(|p| p.name == platform)
            .ok_or_else(|| MatrixError::UnknownPlatform {
                platform: platform.to_string(),
                available: self.platform_names(),
            })
    }

    /// Lists the targets covered by `selection`, in declared order.
    pub fn enumerate(&self, selection: &Selection) -> Result<Vec<BuildTarget>, MatrixError> {
        match selection {
            Selection::All => Ok(self
                .platforms
                .iter()
                .flat_map(|p| p.configurations.iter().map(move |c| p.target(c)))
                .collect()),
            Selection::Platform(platform) => {
                let spec = self.find(platform)?;
                Ok(spec.configurations.iter().map(|c| spec.target(c)).collect())
            }
            Selection::Target {
                platform,
                configuration,
            } => {
                let spec = self.find(platform)?;
                let config = spec.find(configuration).ok_or_else(|| {
                    MatrixError::UnknownConfiguration {
                        platform: platform.clone(),
                        configuration: configuration.clone(),
                        available: spec.configurations.iter().map(|c| c.name.clone()).collect(),
                    }
                })?;
                Ok(vec![spec.target(config)])
            }
        }
    }
}

impl Default for BuildMatrix {
    fn default() -> Self {
        Self::builtin()
    }
}

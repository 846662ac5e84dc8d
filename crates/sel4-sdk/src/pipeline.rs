//! Sequential matrix runs.
//!
//! Targets are built one at a time in enumeration order. A failure in one
//! target's build or assembly is recorded and the run moves on to the next
//! target; nothing here aborts the whole run.

use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::builders::{KernelBuilder, SdkAssembler};
use crate::types::{BuildTarget, SdkTree, TargetError};

/// Outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    /// The SDK tree was assembled.
    Succeeded { sdk: PathBuf },
    /// A step failed; the target was skipped.
    Failed { step: String, error: String },
}

/// One target's entry in a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub platform: String,
    pub configuration: String,
    #[serde(flatten)]
    pub status: TargetStatus,
}

/// Per-target results of a matrix run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Start of the run, RFC 3339 in UTC.
    pub started_at: String,
    /// Outcomes in the order the targets ran.
    pub targets: Vec<TargetOutcome>,
}

impl RunSummary {
    fn new() -> Self {
        let started_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            started_at,
            targets: Vec::new(),
        }
    }

    /// Number of targets whose SDK was assembled.
    pub fn succeeded(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.status, TargetStatus::Succeeded { .. }))
            .count()
    }

    /// Number of targets that failed.
    pub fn failed(&self) -> usize {
        self.targets.len() - self.succeeded()
    }

    /// Whether every target succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Serializes the summary as pretty JSON into `path`.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Prints a one-line-per-target table to stdout.
    pub fn print(&self) {
        println!("\nSummary ({} succeeded, {} failed):", self.succeeded(), self.failed());
        for outcome in &self.targets {
            let label = format!("{}/{}", outcome.platform, outcome.configuration);
            match &outcome.status {
                TargetStatus::Succeeded { sdk } => {
                    println!("  ✓ {:<28} {}", label, sdk.display());
                }
                TargetStatus::Failed { step, .. } => {
                    println!("  ✗ {:<28} {} failed", label, step);
                }
            }
        }
    }
}

/// Builds a target and assembles its SDK under `sdk_root`.
pub fn build_target(
    target: &BuildTarget,
    builder: &KernelBuilder,
    assembler: &SdkAssembler,
    sdk_root: &Path,
) -> Result<SdkTree, TargetError> {
    let build_dir = builder.run(target)?;
    println!("Assembling SDK for {}...", target);
    let sdk = assembler.assemble(&build_dir.path, &sdk_root.join(target.relative_dir()))?;
    Ok(sdk)
}

/// Runs every target in order and collects the outcomes.
pub fn run_targets(
    targets: &[BuildTarget],
    builder: &KernelBuilder,
    assembler: &SdkAssembler,
    sdk_root: &Path,
) -> RunSummary {
    let mut summary = RunSummary::new();

    for target in targets {
        println!("\n==> {}", target);
        let status = match build_target(target, builder, assembler, sdk_root) {
            Ok(sdk) => {
                println!("✓ SDK for {} ready at {}", target, sdk.root.display());
                TargetStatus::Succeeded { sdk: sdk.root }
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                TargetStatus::Failed {
                    step: err.step().to_string(),
                    error: err.to_string(),
                }
            }
        };
        summary.targets.push(TargetOutcome {
            platform: target.platform.clone(),
            configuration: target.configuration.clone(),
            status,
        });
    }

    summary
}

//! seL4 SDK builder
//!
//! `sel4-sdk` builds the seL4 kernel image and its client library for a
//! matrix of hardware platforms and build configurations, and packages each
//! result into a self-contained SDK tree that downstream projects can compile
//! against.
//!
//! # Quick Start
//!
//! 1. Check out the seL4 sources and make sure `cmake`, `ninja` and the
//!    cross-compilers are on `PATH`.
//!
//! 2. Build one platform, or the whole matrix:
//! ```bash
//! sel4-sdk --source-dir seL4 build --platform tqma8xqp
//! sel4-sdk --source-dir seL4 build --all --summary summary.json
//! ```
//!
//! 3. Point your project at the SDK:
//! ```text
//! sdk/tqma8xqp/debug/{bin,lib,include}
//! ```
//!
//! # Architecture
//!
//! The crate consists of several components:
//!
//! - **Matrix**: The platform x configuration table and target selection
//! - **Cache**: Reader for the configure step's `CMakeCache.txt`
//! - **Builders**: Configure/compile driver and SDK tree assembler
//! - **Pipeline**: Runs targets in order and records per-target outcomes
//!
//! # Example: Programmatic Usage
//!
//! ```ignore
//! use sel4_sdk::{BuildMatrix, KernelBuilder, SdkAssembler, Selection, run_targets};
//!
//! fn main() -> Result<(), sel4_sdk::MatrixError> {
//!     let matrix = BuildMatrix::builtin();
//!     let targets = matrix.enumerate(&Selection::Platform("pc99".into()))?;
//!
//!     let builder = KernelBuilder::new("seL4", "build");
//!     let assembler = SdkAssembler::new("seL4");
//!     let summary = run_targets(&targets, &builder, &assembler, "sdk".as_ref());
//!
//!     println!("{} of {} targets built", summary.succeeded(), summary.targets.len());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod builders;
pub mod cache;
pub mod matrix;
pub mod pipeline;
pub mod types;

// Re-export key types for convenience
pub use builders::{KernelBuilder, SdkAssembler, Toolchain};
pub use cache::ConfigCache;
pub use matrix::{BuildMatrix, ConfigurationSpec, PlatformSpec, Selection};
pub use pipeline::{RunSummary, TargetOutcome, TargetStatus, build_target, run_targets};
pub use types::{
    AssemblyError, BuildDirectory, BuildFailure, BuildTarget, CacheError, MatrixError,
    OptionOverrides, OptionValue, SdkTree, TargetError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Build automation for seL4 targets.
//!
//! This module provides the two stages run for every target of the matrix:
//!
//! 1. **Build** - [`KernelBuilder`] configures a per-target build directory
//!    and compiles `kernel.elf` and `libsel4.a`
//! 2. **Assemble** - [`SdkAssembler`] reads the build's configuration cache
//!    and copies the binary, library and headers into an SDK tree
//!
//! ## Builder Options
//!
//! Both stages support:
//!
//! - **`verbose(bool)`** - Print each command and resolved value
//!
//! [`KernelBuilder`] additionally accepts a [`Toolchain`] to replace the
//! default `cmake -GNinja` / `ninja` pair.
//!
//! ## Example
//!
//! ```ignore
//! use sel4_sdk::builders::{KernelBuilder, SdkAssembler};
//! use sel4_sdk::BuildTarget;
//!
//! let target = BuildTarget::new("odroidc2", "default");
//! let build = KernelBuilder::new("/src/sel4", "build").verbose(true).run(&target)?;
//! let sdk = SdkAssembler::new("/src/sel4").assemble(&build.path, "sdk/odroidc2/default".as_ref())?;
//! println!("SDK at {:?}", sdk.root);
//! # Ok::<(), sel4_sdk::TargetError>(())
//! ```

pub mod common;
pub mod kernel;
pub mod sdk;

// Re-export builders
pub use kernel::{KernelBuilder, Toolchain};
pub use sdk::{ARCH_AXES, ArchAxis, SdkAssembler};

//! SDK tree assembly
//!
//! Turns a completed build directory into a portable SDK:
//!
//! ```text
//! sdk/<platform>/<configuration>/
//! ├── bin/kernel.elf
//! ├── lib/libsel4.a
//! └── include/
//!     ├── autoconf.h
//!     ├── interfaces/sel4_client.h
//!     ├── kernel/gen_config.h
//!     └── sel4/                 # hand-written headers + generated tables
//!         ├── arch/             # KernelArch
//!         ├── sel4_arch/        # KernelSel4Arch
//!         ├── plat/             # KernelPlatform
//!         └── mode/             # KernelWordSize
//! ```
//!
//! Which architecture-specific header trees go into the SDK is read from the
//! build's configuration cache. The tree is built in a staging directory next
//! to the destination and renamed into place only once every file has been
//! copied, so a failed assembly never leaves a partial SDK behind.

use std::fs;
use std::path::{Path, PathBuf};

use super::common::{copy_file_into, copy_tree, create_dir};
use crate::cache::ConfigCache;
use crate::types::{AssemblyError, SdkTree, cache_path, client_library_path, kernel_image_path};

/// One architecture-dependent dimension of the header tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchAxis {
    /// Cache key holding the resolved value.
    pub cache_key: &'static str,
    /// Directory under `libsel4/` grouping the per-value header trees.
    pub base_dir: &'static str,
    /// Leaf directory name, used both in the source and under `include/sel4/`.
    pub leaf_dir: &'static str,
}

/// The four axes, in the order they are copied.
pub const ARCH_AXES: [ArchAxis; 4] = [
    ArchAxis {
        cache_key: "KernelArch",
        base_dir: "arch_include",
        leaf_dir: "arch",
    },
    ArchAxis {
        cache_key: "KernelSel4Arch",
        base_dir: "sel4_arch_include",
        leaf_dir: "sel4_arch",
    },
    ArchAxis {
        cache_key: "KernelPlatform",
        base_dir: "sel4_plat_include",
        leaf_dir: "plat",
    },
    ArchAxis {
        cache_key: "KernelWordSize",
        base_dir: "mode_include",
        leaf_dir: "mode",
    },
];

/// Resolved values of the four axes for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAxes {
    /// `(axis, value)` pairs in [`ARCH_AXES`] order.
    pub values: Vec<(ArchAxis, String)>,
}

impl ResolvedAxes {
    /// Looks up every axis in `cache`.
    pub fn from_cache(cache: &ConfigCache) -> Result<Self, AssemblyError> {
        let values = ARCH_AXES
            .iter()
            .map(|axis| {
                if cache.get(axis.cache_key).is_none() {
                    return Err(AssemblyError::MissingCacheKey {
                        key: axis.cache_key,
                        cache: cache.path().to_path_buf(),
                    });
                }
                let value = cache
                    .get_str(axis.cache_key)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| AssemblyError::InvalidCacheValue {
                        key: axis.cache_key,
                        cache: cache.path().to_path_buf(),
                    })?;
                Ok((*axis, value.to_string()))
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;
        Ok(Self { values })
    }

    /// Value resolved for the axis with `cache_key`.
    pub fn get(&self, cache_key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(axis, _)| axis.cache_key == cache_key)
            .map(|(_, value)| value.as_str())
    }

    fn value(&self, cache_key: &str) -> &str {
        self.get(cache_key).unwrap_or_default()
    }
}

/// A build-generated header and where it goes in the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedHeader {
    /// Human-readable name used in errors.
    pub artifact: &'static str,
    /// Path relative to the build directory.
    pub source: PathBuf,
    /// Destination directory relative to the SDK's `include/`.
    pub dest_dir: PathBuf,
}

/// Include directories that only hold generated headers. Every other
/// destination of [`generated_headers`] is created by the header copies
/// before it.
const GENERATED_ONLY_DIRS: [&str; 2] = ["interfaces", "kernel"];

/// Lists the individually generated headers copied into the SDK.
///
/// The architecture-specific entries depend on the resolved axes.
pub fn generated_headers(axes: &ResolvedAxes) -> Vec<GeneratedHeader> {
    let libsel4 = Path::new("libsel4");
    let sel4_gen = libsel4.join("include").join("sel4");
    let arch_gen = libsel4
        .join("arch_include")
        .join(axes.value("KernelArch"))
        .join("sel4")
        .join("arch");
    let sel4_arch_gen = libsel4
        .join("sel4_arch_include")
        .join(axes.value("KernelSel4Arch"))
        .join("sel4")
        .join("sel4_arch");

    let header = |artifact, source: PathBuf, dest_dir: &str| GeneratedHeader {
        artifact,
        source,
        dest_dir: PathBuf::from(dest_dir),
    };

    vec![
        header(
            "auto-configuration header",
            libsel4.join("autoconf").join("autoconf.h"),
            "",
        ),
        header("syscall table", sel4_gen.join("syscall.h"), "sel4"),
        header(
            "shared type definitions",
            sel4_gen.join("shared_types_gen.h"),
            "sel4",
        ),
        header("invocation table", sel4_gen.join("invocation.h"), "sel4"),
        header(
            "libsel4 build configuration header",
            libsel4.join("gen_config").join("sel4").join("gen_config.h"),
            "sel4",
        ),
        header(
            "arch invocation table",
            arch_gen.join("invocation.h"),
            "sel4/arch",
        ),
        header(
            "sel4_arch type definitions",
            sel4_arch_gen.join("types_gen.h"),
            "sel4/sel4_arch",
        ),
        header(
            "sel4_arch invocation table",
            sel4_arch_gen.join("invocation.h"),
            "sel4/sel4_arch",
        ),
        header(
            "client interface header",
            libsel4
                .join("include")
                .join("interfaces")
                .join("sel4_client.h"),
            "interfaces",
        ),
        header(
            "kernel build configuration header",
            Path::new("kernel")
                .join("gen_config")
                .join("kernel")
                .join("gen_config.h"),
            "kernel",
        ),
    ]
}

/// Assembles SDK trees from completed build directories
pub struct SdkAssembler {
    /// Root of the seL4 source checkout (hand-written headers live here)
    source_dir: PathBuf,
    /// Whether to use verbose output
    verbose: bool,
}

impl SdkAssembler {
    /// Creates a new assembler reading hand-written headers from `source_dir`
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            verbose: false,
        }
    }

    /// Enables verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds a fresh SDK tree at `sdk_dir` from `build_dir`
    ///
    /// This performs the following steps:
    /// 1. Parse the configuration cache and resolve the four architecture axes
    /// 2. Remove any existing tree at `sdk_dir`
    /// 3. Copy the kernel image and client library
    /// 4. Copy the hand-written headers and the per-axis header trees
    /// 5. Copy the generated headers
    /// 6. Move the staged tree into place
    ///
    /// # Returns
    ///
    /// * `Ok(SdkTree)` rooted at `sdk_dir`
    /// * `Err(AssemblyError)` if the cache or any input is missing; nothing
    ///   is left at `sdk_dir` in that case
    pub fn assemble(&self, build_dir: &Path, sdk_dir: &Path) -> Result<SdkTree, AssemblyError> {
        // Step 1: Read the configuration cache
        let cache_file = cache_path(build_dir);
        if !cache_file.is_file() {
            return Err(AssemblyError::MissingCache(cache_file));
        }
        let cache = ConfigCache::parse(&cache_file)?;
        let axes = ResolvedAxes::from_cache(&cache)?;
        if self.verbose {
            for (axis, value) in &axes.values {
                println!("  {} = {}", axis.cache_key, value);
            }
        }

        // Step 2: Start from scratch
        if sdk_dir.exists() {
            remove_tree(sdk_dir)?;
        }
        let staging = staging_dir(sdk_dir);
        if staging.exists() {
            remove_tree(&staging)?;
        }

        match self.populate(build_dir, &staging, &axes) {
            Ok(()) => {
                fs::rename(&staging, sdk_dir).map_err(|source| AssemblyError::Io {
                    action: "move staged SDK to",
                    path: sdk_dir.to_path_buf(),
                    source,
                })?;
                Ok(SdkTree {
                    root: sdk_dir.to_path_buf(),
                })
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    eprintln!(
                        "Warning: failed to remove partial SDK at {}: {}",
                        staging.display(),
                        cleanup
                    );
                }
                Err(err)
            }
        }
    }

    fn populate(
        &self,
        build_dir: &Path,
        root: &Path,
        axes: &ResolvedAxes,
    ) -> Result<(), AssemblyError> {
        let tree = SdkTree {
            root: root.to_path_buf(),
        };
        let include_dir = tree.include_dir();
        let include_sel4 = include_dir.join("sel4");

        // Step 3: Binary and library
        create_dir(&tree.bin_dir())?;
        copy_file_into(&kernel_image_path(build_dir), &tree.bin_dir(), "kernel image")?;
        create_dir(&tree.lib_dir())?;
        copy_file_into(
            &client_library_path(build_dir),
            &tree.lib_dir(),
            "client library",
        )?;

        // Step 4: Hand-written headers, then one tree per axis
        let libsel4_src = self.source_dir.join("libsel4");
        if self.verbose {
            println!("  Copying headers from {}", libsel4_src.display());
        }
        create_dir(&include_dir)?;
        copy_tree(
            &libsel4_src.join("include").join("sel4"),
            &include_sel4,
            "libsel4 base headers",
        )?;
        for (axis, value) in &axes.values {
            let src = libsel4_src
                .join(axis.base_dir)
                .join(value)
                .join("sel4")
                .join(axis.leaf_dir);
            copy_tree(
                &src,
                &include_sel4.join(axis.leaf_dir),
                &format!("{} headers for {}", axis.leaf_dir, value),
            )?;
        }

        // Step 5: Generated headers
        for dir in GENERATED_ONLY_DIRS {
            create_dir(&include_dir.join(dir))?;
        }
        for header in generated_headers(axes) {
            copy_file_into(
                &build_dir.join(&header.source),
                &include_dir.join(&header.dest_dir),
                header.artifact,
            )?;
        }

        Ok(())
    }
}

/// Sibling directory the SDK is staged in, e.g. `sdk/pc99/.debug.partial`.
fn staging_dir(sdk_dir: &Path) -> PathBuf {
    let name = sdk_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sdk".to_string());
    sdk_dir.with_file_name(format!(".{}.partial", name))
}

fn remove_tree(path: &Path) -> Result<(), AssemblyError> {
    fs::remove_dir_all(path).map_err(|source| AssemblyError::Io {
        action: "remove",
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CACHE: &str = "\
# This is the CMakeCache file.
//Kernel architecture
KernelArch:STRING=arm
KernelSel4Arch:STRING=aarch64
KernelPlatform:STRING=tqma8xqp
KernelWordSize:STRING=64
KernelDebugBuild:BOOL=ON
";

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Lays out a source checkout and a completed build directory.
    fn fixture(cache: &str) -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let build = temp_dir.path().join("build/tqma8xqp/default");

        let libsel4 = source.join("libsel4");
        write(&libsel4.join("include/sel4/sel4.h"), "#include <sel4/types.h>\n");
        write(&libsel4.join("include/sel4/types.h"), "typedef int seL4_Word;\n");
        write(&libsel4.join("arch_include/arm/sel4/arch/syscalls.h"), "arm\n");
        write(
            &libsel4.join("sel4_arch_include/aarch64/sel4/sel4_arch/constants.h"),
            "aarch64\n",
        );
        write(
            &libsel4.join("sel4_plat_include/tqma8xqp/sel4/plat/api/constants.h"),
            "#pragma once\n",
        );
        write(&libsel4.join("mode_include/64/sel4/mode/types.h"), "64\n");
        // Unselected axis values must not leak into the SDK.
        write(&libsel4.join("arch_include/x86/sel4/arch/syscalls.h"), "x86\n");

        write(&build.join("CMakeCache.txt"), cache);
        write(&build.join("kernel/kernel.elf"), "ELF");
        write(&build.join("libsel4/libsel4.a"), "!<arch>\n");
        write(&build.join("libsel4/autoconf/autoconf.h"), "autoconf\n");
        write(&build.join("libsel4/include/sel4/syscall.h"), "syscall\n");
        write(&build.join("libsel4/include/sel4/shared_types_gen.h"), "shared\n");
        write(&build.join("libsel4/include/sel4/invocation.h"), "invocation\n");
        write(&build.join("libsel4/gen_config/sel4/gen_config.h"), "sel4 cfg\n");
        write(
            &build.join("libsel4/arch_include/arm/sel4/arch/invocation.h"),
            "arch invocation\n",
        );
        write(
            &build.join("libsel4/sel4_arch_include/aarch64/sel4/sel4_arch/types_gen.h"),
            "types\n",
        );
        write(
            &build.join("libsel4/sel4_arch_include/aarch64/sel4/sel4_arch/invocation.h"),
            "sel4_arch invocation\n",
        );
        write(
            &build.join("libsel4/include/interfaces/sel4_client.h"),
            "client\n",
        );
        write(&build.join("kernel/gen_config/kernel/gen_config.h"), "kernel cfg\n");

        (temp_dir, source, build)
    }

    /// All files under `root`, relative and sorted.
    fn list_files(root: &Path) -> Vec<String> {
        fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, root, out);
                } else {
                    let rel = path.strip_prefix(root).unwrap();
                    out.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        let mut out = Vec::new();
        walk(root, root, &mut out);
        out.sort();
        out
    }

    #[test]
    fn test_sdk_assembler_creation() {
        let assembler = SdkAssembler::new("/src/sel4");
        assert!(!assembler.verbose);
        assert!(SdkAssembler::new("/src/sel4").verbose(true).verbose);
    }

    #[test]
    fn test_assemble_produces_expected_tree() {
        let (temp_dir, source, build) = fixture(CACHE);
        let sdk_dir = temp_dir.path().join("sdk/tqma8xqp/default");

        let tree = SdkAssembler::new(&source).assemble(&build, &sdk_dir).unwrap();
        assert_eq!(tree.root, sdk_dir);

        assert_eq!(
            list_files(&sdk_dir),
            vec![
                "bin/kernel.elf",
                "include/autoconf.h",
                "include/interfaces/sel4_client.h",
                "include/kernel/gen_config.h",
                "include/sel4/arch/invocation.h",
                "include/sel4/arch/syscalls.h",
                "include/sel4/gen_config.h",
                "include/sel4/invocation.h",
                "include/sel4/mode/types.h",
                "include/sel4/plat/api/constants.h",
                "include/sel4/sel4.h",
                "include/sel4/sel4_arch/constants.h",
                "include/sel4/sel4_arch/invocation.h",
                "include/sel4/sel4_arch/types_gen.h",
                "include/sel4/shared_types_gen.h",
                "include/sel4/syscall.h",
                "include/sel4/types.h",
                "lib/libsel4.a",
            ]
        );
        assert_eq!(
            fs::read_to_string(sdk_dir.join("include/sel4/arch/syscalls.h")).unwrap(),
            "arm\n"
        );
        assert!(!sdk_dir.with_file_name(".default.partial").exists());
    }

    #[test]
    fn test_assemble_twice_is_identical() {
        let (temp_dir, source, build) = fixture(CACHE);
        let sdk_dir = temp_dir.path().join("sdk/tqma8xqp/default");
        let assembler = SdkAssembler::new(&source);

        assembler.assemble(&build, &sdk_dir).unwrap();
        let first = list_files(&sdk_dir);
        // A stale file from an older SDK must not survive a rebuild.
        write(&sdk_dir.join("include/sel4/stale.h"), "old\n");

        assembler.assemble(&build, &sdk_dir).unwrap();
        assert_eq!(list_files(&sdk_dir), first);
    }

    #[test]
    fn test_missing_kernel_image() {
        let (temp_dir, source, build) = fixture(CACHE);
        fs::remove_file(build.join("kernel/kernel.elf")).unwrap();
        let sdk_dir = temp_dir.path().join("sdk/tqma8xqp/default");
        // A previous SDK must not be left claiming a usable kernel image.
        write(&sdk_dir.join("bin/kernel.elf"), "old ELF");

        let err = SdkAssembler::new(&source)
            .assemble(&build, &sdk_dir)
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::MissingArtifact { ref artifact, .. } if artifact == "kernel image"
        ));
        assert!(!sdk_dir.exists());
        assert!(!sdk_dir.with_file_name(".default.partial").exists());
    }

    #[test]
    fn test_missing_generated_header() {
        let (temp_dir, source, build) = fixture(CACHE);
        fs::remove_file(build.join("kernel/gen_config/kernel/gen_config.h")).unwrap();
        let sdk_dir = temp_dir.path().join("sdk/tqma8xqp/default");

        let err = SdkAssembler::new(&source)
            .assemble(&build, &sdk_dir)
            .unwrap_err();
        assert!(err.to_string().contains("kernel build configuration header"));
        assert!(!sdk_dir.exists());
    }

    #[test]
    fn test_missing_cache() {
        let (temp_dir, source, build) = fixture(CACHE);
        fs::remove_file(build.join("CMakeCache.txt")).unwrap();

        let err = SdkAssembler::new(&source)
            .assemble(&build, &temp_dir.path().join("sdk/x"))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::MissingCache(_)));
    }

    #[test]
    fn test_malformed_cache_propagates() {
        let (temp_dir, source, build) = fixture("KernelArch:WEIRD=arm\n");
        let err = SdkAssembler::new(&source)
            .assemble(&build, &temp_dir.path().join("sdk/x"))
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Cache(_)));
    }

    #[test]
    fn test_missing_cache_key() {
        let cache = CACHE.replace("KernelWordSize:STRING=64\n", "");
        let (temp_dir, source, build) = fixture(&cache);
        let err = SdkAssembler::new(&source)
            .assemble(&build, &temp_dir.path().join("sdk/x"))
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::MissingCacheKey { key: "KernelWordSize", .. }
        ));
    }

    #[test]
    fn test_boolean_axis_is_invalid() {
        let cache = CACHE.replace("KernelArch:STRING=arm", "KernelArch:BOOL=ON");
        let (temp_dir, source, build) = fixture(&cache);
        let err = SdkAssembler::new(&source)
            .assemble(&build, &temp_dir.path().join("sdk/x"))
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::InvalidCacheValue { key: "KernelArch", .. }
        ));
    }

    #[test]
    fn test_missing_axis_headers() {
        let cache = CACHE.replace("KernelPlatform:STRING=tqma8xqp", "KernelPlatform:STRING=tx2");
        let (temp_dir, source, build) = fixture(&cache);
        let err = SdkAssembler::new(&source)
            .assemble(&build, &temp_dir.path().join("sdk/x"))
            .unwrap_err();
        assert!(err.to_string().contains("plat headers for tx2"));
    }

    #[test]
    fn test_generated_headers_follow_axes() {
        let cache = ConfigCache::from_str_at(
            "KernelArch:STRING=x86\n\
             KernelSel4Arch:STRING=x86_64\n\
             KernelPlatform:STRING=pc99\n\
             KernelWordSize:INTERNAL=64\n",
            Path::new("CMakeCache.txt"),
        )
        .unwrap();
        let axes = ResolvedAxes::from_cache(&cache).unwrap();
        assert_eq!(axes.get("KernelSel4Arch"), Some("x86_64"));

        let headers = generated_headers(&axes);
        assert_eq!(headers.len(), 10);
        assert!(headers.iter().any(|h| h.source
            == Path::new("libsel4/arch_include/x86/sel4/arch/invocation.h")
            && h.dest_dir == Path::new("sel4/arch")));
        assert!(headers.iter().any(|h| h.source
            == Path::new("libsel4/sel4_arch_include/x86_64/sel4/sel4_arch/types_gen.h")));
    }

    #[test]
    fn test_generated_header_dirs_exist_before_copy() {
        let (_temp_dir, _source, build) = fixture(CACHE);
        let cache = ConfigCache::parse(&cache_path(&build)).unwrap();
        let axes = ResolvedAxes::from_cache(&cache).unwrap();

        let mut known: Vec<PathBuf> = vec![PathBuf::new(), PathBuf::from("sel4")];
        known.extend(GENERATED_ONLY_DIRS.iter().map(PathBuf::from));
        known.extend(ARCH_AXES.iter().map(|axis| Path::new("sel4").join(axis.leaf_dir)));

        for header in generated_headers(&axes) {
            assert!(
                known.contains(&header.dest_dir),
                "{} has no directory prepared for it",
                header.dest_dir.display()
            );
        }
    }

    #[test]
    fn test_staging_dir_name() {
        assert_eq!(
            staging_dir(Path::new("sdk/pc99/debug")),
            Path::new("sdk/pc99/.debug.partial")
        );
    }
}

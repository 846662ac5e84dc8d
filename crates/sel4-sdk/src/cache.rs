//! Reader for the configure step's persisted configuration cache.
//!
//! The cache (`CMakeCache.txt`) is a plaintext file with one entry per line in
//! the form `name:TYPE=value`. Blank lines and lines starting with `#` or `//`
//! are ignored. The format is fixed by the external build system, so parsing
//! is strict: anything that does not fit is reported as malformed rather than
//! skipped.
//!
//! ## Example
//!
//! ```
//! use sel4_sdk::cache::{CacheValue, ConfigCache};
//! use std::path::Path;
//!
//! let cache = ConfigCache::from_str_at(
//!     "// Target architecture\nKernelArch:STRING=arm\nKernelDebugBuild:BOOL=ON\n",
//!     Path::new("CMakeCache.txt"),
//! )?;
//!
//! assert_eq!(cache.get_str("KernelArch"), Some("arm"));
//! assert_eq!(cache.get_bool("KernelDebugBuild"), Some(Some(true)));
//! # Ok::<(), sel4_sdk::CacheError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::types::CacheError;

/// Declared type of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// `STRING` - a user-visible string.
    String,
    /// `STATIC` - a constant.
    Static,
    /// `INTERNAL` - a value hidden from configuration GUIs.
    Internal,
    /// `FILEPATH` - path to a file.
    FilePath,
    /// `PATH` - path to a directory.
    Path,
    /// `BOOL` - a tri-state boolean.
    Bool,
}

impl CacheType {
    /// Returns the type name as written in the cache file.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::String => "STRING",
            CacheType::Static => "STATIC",
            CacheType::Internal => "INTERNAL",
            CacheType::FilePath => "FILEPATH",
            CacheType::Path => "PATH",
            CacheType::Bool => "BOOL",
        }
    }
}

impl FromStr for CacheType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRING" => Ok(CacheType::String),
            "STATIC" => Ok(CacheType::Static),
            "INTERNAL" => Ok(CacheType::Internal),
            "FILEPATH" => Ok(CacheType::FilePath),
            "PATH" => Ok(CacheType::Path),
            "BOOL" => Ok(CacheType::Bool),
            other => Err(format!("invalid value type '{}'", other)),
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded value of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    /// `STRING`, `STATIC` and `INTERNAL` entries.
    Text(String),
    /// `FILEPATH` and `PATH` entries. Not checked for existence.
    Path(PathBuf),
    /// `BOOL` entries; `None` when the value is empty.
    Bool(Option<bool>),
}

/// One entry of the cache: its declared type and decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub kind: CacheType,
    pub value: CacheValue,
}

impl CacheEntry {
    /// Decodes a raw value according to its declared type.
    fn decode(kind: CacheType, raw: &str) -> Result<Self, String> {
        let value = match kind {
            CacheType::String | CacheType::Static | CacheType::Internal => {
                CacheValue::Text(raw.to_string())
            }
            CacheType::FilePath | CacheType::Path => CacheValue::Path(PathBuf::from(raw)),
            CacheType::Bool => CacheValue::Bool(match raw {
                "ON" => Some(true),
                "OFF" | "NO" | "FALSE" => Some(false),
                "" => None,
                other => return Err(format!("invalid boolean value '{}'", other)),
            }),
        };
        Ok(Self { kind, value })
    }

    /// Re-encodes the value with the same rules used for decoding.
    ///
    /// Booleans become `ON`, `OFF` or the empty string; every other value is
    /// written verbatim.
    pub fn render(&self) -> String {
        match &self.value {
            CacheValue::Text(s) => s.clone(),
            CacheValue::Path(p) => p.to_string_lossy().into_owned(),
            CacheValue::Bool(Some(true)) => "ON".to_string(),
            CacheValue::Bool(Some(false)) => "OFF".to_string(),
            CacheValue::Bool(None) => String::new(),
        }
    }

    /// Renders the entry as a full cache line for `name`.
    pub fn render_line(&self, name: &str) -> String {
        format!("{}:{}={}", name, self.kind, self.render())
    }
}

/// Parsed configuration cache of one build directory.
///
/// Immutable once parsed; every name appears exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl ConfigCache {
    /// Reads and parses the cache file at `path`.
    pub fn parse(path: &Path) -> Result<Self, CacheError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str_at(&contents, path)
    }

    /// Parses cache contents. `path` is only used for error reporting.
    pub fn from_str_at(contents: &str, path: &Path) -> Result<Self, CacheError> {
        let mut entries = BTreeMap::new();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let malformed = |reason: String| CacheError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            };

            let (name, rest) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("expected 'name:TYPE=value', got '{}'", line)))?;
            let (kind, raw) = rest
                .split_once('=')
                .ok_or_else(|| malformed(format!("expected 'name:TYPE=value', got '{}'", line)))?;

            if name.is_empty() {
                return Err(malformed("entry has an empty name".to_string()));
            }

            let kind: CacheType = kind.parse().map_err(&malformed)?;
            let entry = CacheEntry::decode(kind, raw)
                .map_err(|reason| malformed(format!("{} for '{}'", reason, name)))?;

            if entries.insert(name.to_string(), entry).is_some() {
                return Err(malformed(format!("duplicate entry '{}'", name)));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Path the cache was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the entry for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.get(name)
    }

    /// Returns a string or path value as text.
    ///
    /// Returns `None` when the entry is absent or is a boolean.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match &self.get(name)?.value {
            CacheValue::Text(s) => Some(s),
            CacheValue::Path(p) => p.to_str(),
            CacheValue::Bool(_) => None,
        }
    }

    /// Returns a boolean value.
    ///
    /// The outer `Option` is `None` when the entry is absent or not a
    /// boolean; the inner one is `None` for an unset (empty) boolean.
    pub fn get_bool(&self, name: &str) -> Option<Option<bool>> {
        match self.get(name)?.value {
            CacheValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

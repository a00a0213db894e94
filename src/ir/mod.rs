//! Intermediate representation shared by the scanner, the inferrer and the
//! violation checker.
//!
//! The scanner produces `SourceUnit`s. Analyzers consume them and produce
//! `Indicator`s, which fold into a `CapabilityRecord`.

pub mod capability;

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use capability::{Capability, CapabilityRecord};

/// One scannable artifact from a package's distribution.
///
/// Units are read once, analyzed and discarded. Nothing in a unit is ever
/// executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the search root the package was found in.
    pub relative_path: PathBuf,
    pub kind: UnitKind,
    /// Raw bytes. Empty for native libraries, which are never read.
    #[serde(skip)]
    pub content: Vec<u8>,
    pub size_bytes: u64,
    /// Hex SHA-256 of `content`; `None` when the content was not read.
    pub content_hash: Option<String>,
}

impl SourceUnit {
    pub fn new(path: PathBuf, relative_path: PathBuf, kind: UnitKind, content: Vec<u8>) -> Self {
        use sha2::{Digest, Sha256};

        let content_hash = Some(hex::encode(Sha256::digest(&content)));
        Self {
            path,
            relative_path,
            kind,
            size_bytes: content.len() as u64,
            content,
            content_hash,
        }
    }

    /// A unit whose bytes are deliberately not loaded (native libraries).
    pub fn unread(path: PathBuf, relative_path: PathBuf, kind: UnitKind, size_bytes: u64) -> Self {
        Self {
            path,
            relative_path,
            kind,
            content: Vec::new(),
            size_bytes,
            content_hash: None,
        }
    }
}

static VERSIONED_SO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.so(\.\d+)+$").unwrap());

/// What kind of artifact a unit is; selects the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Python,
    Shell,
    NativeLibrary,
    /// Install manifest (`RECORD`, `installed-files.txt`).
    Record,
    /// `.pth` file, processed by the interpreter at startup.
    PathConfig,
    Unknown,
}

impl UnitKind {
    pub fn from_path(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if file_name == "RECORD" || file_name == "installed-files.txt" {
            return Self::Record;
        }

        // libfoo.so.1.2 keeps its versioned suffix after ".so"
        if VERSIONED_SO_RE.is_match(&file_name) {
            return Self::NativeLibrary;
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "py" | "pyw" => Self::Python,
            "sh" | "bash" | "zsh" => Self::Shell,
            "so" | "pyd" | "dylib" | "dll" => Self::NativeLibrary,
            "pth" => Self::PathConfig,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Shell => write!(f, "shell"),
            Self::NativeLibrary => write!(f, "native library"),
            Self::Record => write!(f, "install record"),
            Self::PathConfig => write!(f, "path config"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Location in a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: &Path, line: usize, column: usize) -> Self {
        Self {
            file: file.to_path_buf(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Evidence that a unit could use a capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Indicator {
    pub capability: Capability,
    /// The construct that matched, e.g. `import socket` or `os.system`.
    pub construct: String,
    pub location: SourceLocation,
}

/// A unit that could not be analyzed. Non-fatal: the audit continues. A unit
/// that failed to parse contributes no signal; one that was never read is
/// assumed to need every capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitParseWarning {
    pub file: PathBuf,
    pub message: String,
}

impl std::fmt::Display for UnitParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unit_kinds() {
        assert_eq!(UnitKind::from_path(Path::new("a/b.py")), UnitKind::Python);
        assert_eq!(UnitKind::from_path(Path::new("run.sh")), UnitKind::Shell);
        assert_eq!(
            UnitKind::from_path(Path::new("_speedups.cpython-311-x86_64-linux-gnu.so")),
            UnitKind::NativeLibrary
        );
        assert_eq!(
            UnitKind::from_path(Path::new("libz.so.1")),
            UnitKind::NativeLibrary
        );
        assert_eq!(
            UnitKind::from_path(Path::new("pkg-1.0.dist-info/RECORD")),
            UnitKind::Record
        );
        assert_eq!(
            UnitKind::from_path(Path::new("distutils-precedence.pth")),
            UnitKind::PathConfig
        );
        assert_eq!(UnitKind::from_path(Path::new("types.pyi")), UnitKind::Unknown);
        assert_eq!(UnitKind::from_path(Path::new("mod.pyc")), UnitKind::Unknown);
    }

    #[test]
    fn so_inside_a_source_name_is_not_native() {
        assert_eq!(
            UnitKind::from_path(Path::new("pkg/helpers.so.py")),
            UnitKind::Python
        );
        assert_eq!(
            UnitKind::from_path(Path::new("libssl.so.3.0")),
            UnitKind::NativeLibrary
        );
        assert_eq!(UnitKind::from_path(Path::new("notes.so.txt")), UnitKind::Unknown);
    }

    #[test]
    fn unit_hash_is_stable() {
        let a = SourceUnit::new("x.py".into(), "x.py".into(), UnitKind::Python, b"pass".to_vec());
        let b = SourceUnit::new("y.py".into(), "y.py".into(), UnitKind::Python, b"pass".to_vec());
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.size_bytes, 4);
    }
}

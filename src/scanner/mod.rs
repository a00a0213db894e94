//! Package resolution: turn a package identifier into its source units.
//!
//! A `Locator` knows one way a package can be laid out in a search root
//! (wheel install, legacy egg install, bare module). Roots are tried in
//! order and, within a root, locators in order; the first hit wins. Only
//! the package's own files are returned, never its dependencies.

pub mod dist_info;
pub mod module;
pub mod roots;

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use crate::config::ScanConfig;
use crate::error::{Result, TrustError};
use crate::ir::{SourceUnit, UnitKind, UnitParseWarning};

/// Files a locator found for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Name reported for the package.
    pub name: String,
    /// Directory unit paths are made relative to.
    pub root: PathBuf,
    /// Locator that produced this resolution.
    pub locator: &'static str,
    /// Absolute paths of the package's files.
    pub files: Vec<PathBuf>,
    /// Directories that hold more of the package but lie past the depth
    /// limit.
    pub truncated: Vec<PathBuf>,
}

/// A locator resolves a package name within one search root.
pub trait Locator: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means "not here, try the next locator or root".
    fn locate(&self, root: &Path, package: &str, max_depth: usize) -> Result<Option<Resolution>>;
}

/// All registered locators, in priority order.
pub fn all_locators() -> Vec<Box<dyn Locator>> {
    vec![
        Box::new(dist_info::DistInfoLocator),
        Box::new(dist_info::EggInfoLocator),
        Box::new(module::ModuleLocator),
    ]
}

/// PEP 503 normalization: lowercase, runs of `-`, `_`, `.` become `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_sep = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !in_sep {
                out.push('-');
            }
            in_sep = true;
        } else {
            out.push(ch.to_ascii_lowercase());
            in_sep = false;
        }
    }
    out
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Whether an identifier names a fetched source tree rather than an
/// installed distribution.
fn is_source_tree(package: &str) -> bool {
    let looks_like_path = package.contains('/')
        || package.contains(std::path::MAIN_SEPARATOR)
        || package.starts_with('.');
    looks_like_path && Path::new(package).is_dir()
}

/// A resolved package with its units loaded.
#[derive(Debug, Clone)]
pub struct ScannedPackage {
    pub name: String,
    pub root: PathBuf,
    pub locator: &'static str,
    /// Units sorted by relative path.
    pub units: Vec<SourceUnit>,
    /// Files and directories of the package that were not read, sorted by
    /// relative path.
    pub skipped: Vec<UnitParseWarning>,
}

/// Resolves packages and reads their units. Read-only: nothing found is
/// ever imported or executed.
#[derive(Clone)]
pub struct Scanner {
    config: ScanConfig,
    search_paths: Arc<Vec<PathBuf>>,
    locators: Arc<Vec<Box<dyn Locator>>>,
}

impl Scanner {
    /// Create a scanner. An empty `search_paths` is replaced by the
    /// auto-detected defaults.
    pub fn new(config: ScanConfig) -> Self {
        let search_paths = if config.search_paths.is_empty() {
            roots::default_search_paths()
        } else {
            config.search_paths.clone()
        };
        Self {
            config,
            search_paths: Arc::new(search_paths),
            locators: Arc::new(all_locators()),
        }
    }

    /// Replace the registered locators.
    pub fn with_locators(mut self, locators: Vec<Box<dyn Locator>>) -> Self {
        self.locators = Arc::new(locators);
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve and load a package.
    pub fn scan(&self, package: &str) -> Result<ScannedPackage> {
        let resolution = self.resolve_with_timeout(package)?;
        tracing::debug!(
            package,
            locator = resolution.locator,
            root = %resolution.root.display(),
            files = resolution.files.len(),
            "package resolved"
        );
        let (units, skipped) = load_units(&resolution, self.config.max_file_size);
        Ok(ScannedPackage {
            name: resolution.name,
            root: resolution.root,
            locator: resolution.locator,
            units,
            skipped,
        })
    }

    /// Resolve on a helper thread, waiting at most the configured timeout.
    /// On expiry the helper is abandoned; it only ever reads.
    pub fn resolve_with_timeout(&self, package: &str) -> Result<Resolution> {
        let (tx, rx) = mpsc::channel();
        let worker = self.clone();
        let name = package.to_string();
        thread::Builder::new()
            .name("pytrust-resolve".into())
            .spawn(move || {
                let _ = tx.send(worker.resolve(&name));
            })?;

        let timeout = self.config.timeout();
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TrustError::ResolutionTimeout {
                package: package.to_string(),
                timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(TrustError::Internal(format!(
                "resolver for '{package}' exited without a result"
            ))),
        }
    }

    /// Resolve without a timeout.
    pub fn resolve(&self, package: &str) -> Result<Resolution> {
        if is_source_tree(package) {
            return module::walk_source_tree(Path::new(package), self.config.max_depth);
        }

        for root in self.search_paths.iter() {
            if !root.is_dir() {
                continue;
            }
            for locator in self.locators.iter() {
                if let Some(resolution) = locator.locate(root, package, self.config.max_depth)? {
                    return Ok(resolution);
                }
            }
        }

        Err(TrustError::PackageNotFound(package.to_string()))
    }
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

fn skipped(relative: PathBuf, message: String) -> UnitParseWarning {
    UnitParseWarning {
        file: relative,
        message,
    }
}

/// Read one unit's bytes. A failed read is reported instead of aborting the
/// package.
fn read_unit(path: &Path, relative: &Path) -> std::result::Result<Vec<u8>, UnitParseWarning> {
    std::fs::read(path).map_err(|e| {
        tracing::warn!(file = %path.display(), error = %e, "file could not be read");
        skipped(relative.to_path_buf(), format!("could not be read: {e}"))
    })
}

/// Read the resolved files into units, sorted and de-duplicated. Files that
/// belong to the package but were not read come back as warnings.
fn load_units(
    resolution: &Resolution,
    max_file_size: u64,
) -> (Vec<SourceUnit>, Vec<UnitParseWarning>) {
    let mut files: Vec<&PathBuf> = resolution.files.iter().collect();
    files.sort();
    files.dedup();

    let mut units = Vec::new();
    let mut unread: Vec<UnitParseWarning> = resolution
        .truncated
        .iter()
        .map(|dir| {
            skipped(
                relative_to(&resolution.root, dir),
                "below the directory depth limit, not analyzed".into(),
            )
        })
        .collect();

    for path in files {
        let kind = UnitKind::from_path(path);
        if matches!(kind, UnitKind::Unknown) {
            continue;
        }
        let relative = relative_to(&resolution.root, path);

        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(file = %path.display(), "listed file missing, skipping");
                continue;
            }
            Err(e) => {
                unread.push(skipped(relative, format!("could not be read: {e}")));
                continue;
            }
        };

        if matches!(kind, UnitKind::NativeLibrary) {
            units.push(SourceUnit::unread(
                path.clone(),
                relative,
                kind,
                metadata.len(),
            ));
            continue;
        }

        if metadata.len() > max_file_size {
            tracing::warn!(
                file = %path.display(),
                size = metadata.len(),
                limit = max_file_size,
                "file exceeds size limit, not analyzed"
            );
            unread.push(skipped(
                relative,
                format!(
                    "exceeds size limit ({} > {max_file_size} bytes), not analyzed",
                    metadata.len()
                ),
            ));
            continue;
        }

        match read_unit(path, &relative) {
            Ok(content) => units.push(SourceUnit::new(path.clone(), relative, kind, content)),
            Err(warning) => unread.push(warning),
        }
    }

    units.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    unread.sort_by(|a, b| a.file.cmp(&b.file));
    (units, unread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn scanner_for(root: &Path) -> Scanner {
        Scanner::new(ScanConfig {
            search_paths: vec![root.to_path_buf()],
            ..ScanConfig::default()
        })
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_name("Foo.Bar__baz"), "foo-bar-baz");
        assert_eq!(normalize_name("requests"), "requests");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
    }

    #[test]
    fn cleans_parent_components() {
        assert_eq!(
            clean_path(Path::new("/site/pkg.egg-info/../pkg/./a.py")),
            PathBuf::from("/site/pkg/a.py")
        );
    }

    #[test]
    fn unknown_package_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = scanner_for(dir.path()).scan("does-not-exist").unwrap_err();
        assert!(matches!(err, TrustError::PackageNotFound(name) if name == "does-not-exist"));
    }

    #[test]
    fn first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(&first.path().join("dup.py"), "import socket\n");
        write(&second.path().join("dup.py"), "import subprocess\n");

        let scanner = Scanner::new(ScanConfig {
            search_paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
            ..ScanConfig::default()
        });
        let scanned = scanner.scan("dup").unwrap();
        assert_eq!(scanned.root, first.path());
    }

    #[test]
    fn rescanning_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        write(&pkg.join("b.py"), "x = 1\n");
        write(&pkg.join("a.py"), "y = 2\n");
        write(&pkg.join("sub/c.py"), "z = 3\n");
        write(&pkg.join("data.json"), "{}\n");

        let scanner = scanner_for(dir.path());
        let first: Vec<PathBuf> = scanner
            .scan("pkg")
            .unwrap()
            .units
            .into_iter()
            .map(|u| u.relative_path)
            .collect();
        let second: Vec<PathBuf> = scanner
            .scan("pkg")
            .unwrap()
            .units
            .into_iter()
            .map(|u| u.relative_path)
            .collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                PathBuf::from("pkg/a.py"),
                PathBuf::from("pkg/b.py"),
                PathBuf::from("pkg/sub/c.py"),
            ]
        );
    }

    #[test]
    fn oversized_files_are_reported_unread() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("big/__init__.py"), &"x = 1\n".repeat(100));
        let scanner = Scanner::new(ScanConfig {
            search_paths: vec![dir.path().to_path_buf()],
            max_file_size: 10,
            ..ScanConfig::default()
        });
        let scanned = scanner.scan("big").unwrap();
        assert!(scanned.units.is_empty());
        assert_eq!(scanned.skipped.len(), 1);
        assert_eq!(scanned.skipped[0].file, PathBuf::from("big/__init__.py"));
        assert!(scanned.skipped[0].message.contains("size limit"));
    }

    #[test]
    fn failed_read_becomes_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_file = dir.path().join("pkg");
        fs::create_dir_all(&not_a_file).unwrap();

        let warning = read_unit(&not_a_file, Path::new("pkg")).unwrap_err();
        assert_eq!(warning.file, PathBuf::from("pkg"));
        assert!(warning.message.starts_with("could not be read"));
    }

    #[test]
    fn truncated_directories_are_reported_unread() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("nested/__init__.py"), "");
        write(&dir.path().join("nested/a/b/c.py"), "import socket\n");
        let scanner = Scanner::new(ScanConfig {
            search_paths: vec![dir.path().to_path_buf()],
            max_depth: 2,
            ..ScanConfig::default()
        });
        let scanned = scanner.scan("nested").unwrap();
        assert_eq!(scanned.units.len(), 1);
        assert_eq!(scanned.skipped.len(), 1);
        assert_eq!(scanned.skipped[0].file, PathBuf::from("nested/a/b"));
    }

    #[test]
    fn source_tree_identifier_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("checkout");
        write(&tree.join("setup.py"), "from setuptools import setup\n");
        write(&tree.join("src/tool/cli.py"), "import subprocess\n");

        let scanner = scanner_for(dir.path());
        let scanned = scanner.scan(tree.to_str().unwrap()).unwrap();
        assert_eq!(scanned.name, "checkout");
        assert_eq!(scanned.locator, "source-tree");
        assert_eq!(scanned.units.len(), 2);
    }

    struct SlowLocator;

    impl Locator for SlowLocator {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn locate(&self, _root: &Path, _package: &str, _depth: usize) -> Result<Option<Resolution>> {
            thread::sleep(Duration::from_secs(3));
            Ok(None)
        }
    }

    #[test]
    fn slow_resolution_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::new(ScanConfig {
            search_paths: vec![dir.path().to_path_buf()],
            timeout_secs: 1,
            ..ScanConfig::default()
        })
        .with_locators(vec![Box::new(SlowLocator)]);

        let err = scanner.scan("anything").unwrap_err();
        assert!(matches!(err, TrustError::ResolutionTimeout { .. }));
        assert!(err.is_retryable());
    }
}

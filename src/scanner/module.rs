//! Packages without install metadata: bare modules in a search root, and
//! fetched source trees given by path.

use std::path::{Path, PathBuf};

use super::{normalize_name, Locator, Resolution};
use crate::error::Result;
use crate::ir::UnitKind;

/// `<root>/<module>/`, `<root>/<module>.py` and native `<root>/<module>.*.so`.
pub struct ModuleLocator;

/// Import names to try for a package: as given (with `-` → `_`), then
/// normalized.
fn module_candidates(package: &str) -> Vec<String> {
    let mut candidates = vec![package.trim().replace('-', "_")];
    let normalized = normalize_name(package).replace('-', "_");
    if !candidates.contains(&normalized) {
        candidates.push(normalized);
    }
    candidates
}

impl Locator for ModuleLocator {
    fn name(&self) -> &'static str {
        "module"
    }

    fn locate(&self, root: &Path, package: &str, max_depth: usize) -> Result<Option<Resolution>> {
        for module in module_candidates(package) {
            if module.is_empty() || module.contains(['/', '\\']) {
                continue;
            }

            let mut files = Vec::new();
            let mut truncated = Vec::new();

            let dir = root.join(&module);
            if dir.is_dir() {
                let walked = walk_files(&dir, max_depth, false);
                files.extend(walked.files);
                truncated.extend(walked.truncated);
            }

            let single = root.join(format!("{module}.py"));
            if single.is_file() {
                files.push(single);
            }

            // Top-level extension modules sit beside the package directory
            if let Ok(entries) = std::fs::read_dir(root) {
                let prefix = format!("{module}.");
                files.extend(entries.flatten().map(|e| e.path()).filter(|p| {
                    p.is_file()
                        && UnitKind::from_path(p) == UnitKind::NativeLibrary
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
                }));
            }

            if !files.is_empty() || !truncated.is_empty() {
                return Ok(Some(Resolution {
                    name: module,
                    root: root.to_path_buf(),
                    locator: self.name(),
                    files,
                    truncated,
                }));
            }
        }
        Ok(None)
    }
}

/// Resolve a directory given by path: every file under it belongs to the
/// package, honouring `.gitignore`.
pub fn walk_source_tree(dir: &Path, max_depth: usize) -> Result<Resolution> {
    let name = dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "source-tree".into());

    let walked = walk_files(dir, max_depth, true);
    Ok(Resolution {
        name,
        root: dir.to_path_buf(),
        locator: "source-tree",
        files: walked.files,
        truncated: walked.truncated,
    })
}

struct Walked {
    files: Vec<PathBuf>,
    /// Directories at the depth limit that still hold code or subdirectories.
    truncated: Vec<PathBuf>,
}

fn walk_files(dir: &Path, max_depth: usize, git_ignore: bool) -> Walked {
    let walker = ignore::WalkBuilder::new(dir)
        .hidden(true)
        .git_ignore(git_ignore)
        .max_depth(Some(max_depth))
        .build();

    let mut walked = Walked {
        files: Vec::new(),
        truncated: Vec::new(),
    };
    for entry in walker.flatten() {
        let depth = entry.depth();
        let path = entry.into_path();
        if path.is_file() {
            walked.files.push(path);
        } else if depth == max_depth && path.is_dir() && holds_units(&path) {
            tracing::warn!(dir = %path.display(), max_depth, "directory below depth limit not walked");
            walked.truncated.push(path);
        }
    }
    walked
}

fn holds_units(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|entries| {
        entries
            .flatten()
            .map(|e| e.path())
            .any(|p| p.is_dir() || UnitKind::from_path(&p) != UnitKind::Unknown)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn candidates_cover_dashes() {
        assert_eq!(module_candidates("python-dateutil"), vec!["python_dateutil"]);
        assert_eq!(module_candidates("PyYAML"), vec!["PyYAML", "pyyaml"]);
    }

    #[test]
    fn finds_package_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("mylib/__init__.py"), "");
        write(&dir.path().join("mylib/core.py"), "import socket\n");
        let resolution = ModuleLocator
            .locate(dir.path(), "mylib", 16)
            .unwrap()
            .unwrap();
        assert_eq!(resolution.files.len(), 2);
        assert_eq!(resolution.locator, "module");
    }

    #[test]
    fn finds_single_file_module_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("six.py"), "import sys\n");
        write(&dir.path().join("six.cpython-311-x86_64-linux-gnu.so"), "");
        write(&dir.path().join("sixty.py"), "import socket\n");
        let resolution = ModuleLocator
            .locate(dir.path(), "six", 16)
            .unwrap()
            .unwrap();
        let mut names: Vec<String> = resolution
            .files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["six.cpython-311-x86_64-linux-gnu.so", "six.py"]);
    }

    #[test]
    fn directories_past_the_depth_limit_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("deep/__init__.py"), "");
        write(&dir.path().join("deep/a/b/inner.py"), "import socket\n");
        write(&dir.path().join("deep/docs/notes/readme.txt"), "");
        let resolution = ModuleLocator
            .locate(dir.path(), "deep", 2)
            .unwrap()
            .unwrap();
        assert_eq!(resolution.files, vec![dir.path().join("deep/__init__.py")]);
        assert_eq!(resolution.truncated, vec![dir.path().join("deep/a/b")]);
    }

    #[test]
    fn missing_module_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModuleLocator
            .locate(dir.path(), "ghost", 16)
            .unwrap()
            .is_none());
    }
}

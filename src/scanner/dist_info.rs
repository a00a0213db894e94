//! Installed distributions: wheel-style `.dist-info` and legacy `.egg-info`.

use std::path::{Component, Path, PathBuf};

use super::{clean_path, normalize_name, Locator, Resolution};
use crate::error::Result;
use crate::inference::manifest::record_path;

/// Find `<name>-<version>.<suffix>` directories in `root` whose name part
/// normalizes to `package`. Sorted, so the pick is stable when several
/// versions coexist.
fn metadata_dirs(root: &Path, package: &str, suffix: &str, split_first: bool) -> Vec<PathBuf> {
    let wanted = normalize_name(package);
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            let Some(file_name) = p.file_name().map(|n| n.to_string_lossy().to_string()) else {
                return false;
            };
            let Some(stem) = file_name.strip_suffix(suffix) else {
                return false;
            };
            // Versions never contain '-'; egg names carry extra "-pyX.Y" tags
            let dist = if split_first {
                stem.split('-').next().unwrap_or(stem)
            } else {
                stem.rsplit_once('-').map_or(stem, |(name, _)| name)
            };
            normalize_name(dist) == wanted
        })
        .collect();
    dirs.sort();
    dirs
}

fn dist_name(dir: &Path, suffix: &str) -> String {
    let file_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = file_name.strip_suffix(suffix).unwrap_or(&file_name);
    stem.split('-').next().unwrap_or(stem).to_string()
}

/// Wheel installs: every file listed in `<dist>.dist-info/RECORD`.
pub struct DistInfoLocator;

impl Locator for DistInfoLocator {
    fn name(&self) -> &'static str {
        "dist-info"
    }

    fn locate(&self, root: &Path, package: &str, _max_depth: usize) -> Result<Option<Resolution>> {
        for dir in metadata_dirs(root, package, ".dist-info", false) {
            let record = dir.join("RECORD");
            if !record.is_file() {
                tracing::debug!(dir = %dir.display(), "dist-info without RECORD, skipping");
                continue;
            }

            let content = std::fs::read_to_string(&record)?;
            let mut files = vec![record.clone()];
            for line in content.lines() {
                let entry = record_path(line);
                if entry.is_empty() {
                    continue;
                }
                let relative = Path::new(entry);
                // Console scripts land outside site-packages (../../bin)
                if relative.is_absolute()
                    || relative.components().any(|c| c == Component::ParentDir)
                {
                    continue;
                }
                files.push(root.join(relative));
            }

            return Ok(Some(Resolution {
                name: dist_name(&dir, ".dist-info"),
                root: root.to_path_buf(),
                locator: self.name(),
                files,
                truncated: Vec::new(),
            }));
        }
        Ok(None)
    }
}

/// Legacy setuptools installs: `<dist>.egg-info/installed-files.txt`, with
/// paths relative to the egg-info directory.
pub struct EggInfoLocator;

impl Locator for EggInfoLocator {
    fn name(&self) -> &'static str {
        "egg-info"
    }

    fn locate(&self, root: &Path, package: &str, _max_depth: usize) -> Result<Option<Resolution>> {
        for dir in metadata_dirs(root, package, ".egg-info", true) {
            let listing = dir.join("installed-files.txt");
            if !listing.is_file() {
                continue;
            }

            let content = std::fs::read_to_string(&listing)?;
            let mut files = vec![listing.clone()];
            for line in content.lines() {
                let entry = line.trim();
                if entry.is_empty() {
                    continue;
                }
                let resolved = clean_path(&dir.join(entry));
                if resolved.starts_with(root) {
                    files.push(resolved);
                }
            }

            return Ok(Some(Resolution {
                name: dist_name(&dir, ".egg-info"),
                root: root.to_path_buf(),
                locator: self.name(),
                files,
                truncated: Vec::new(),
            }));
        }
        Ok(None)
    }
}

//! Default search roots when the configuration names none.

use std::path::{Path, PathBuf};

/// System-wide install locations, expanded with `glob`.
const SYSTEM_PATTERNS: &[&str] = &[
    "/usr/local/lib/python3*/site-packages",
    "/usr/local/lib/python3*/dist-packages",
    "/usr/lib/python3*/site-packages",
    "/usr/lib/python3/dist-packages",
    "/usr/lib/python3*/dist-packages",
];

/// `PYTHONPATH` entries, then the active virtualenv, then system locations.
/// Non-directories are dropped and duplicates keep their first position.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Some(python_path) = std::env::var_os("PYTHONPATH") {
        roots.extend(std::env::split_paths(&python_path));
    }

    if let Some(venv) = std::env::var_os("VIRTUAL_ENV") {
        roots.extend(virtualenv_roots(Path::new(&venv)));
    }

    for pattern in SYSTEM_PATTERNS {
        roots.extend(expand(pattern));
    }

    let roots = dedup_dirs(roots);
    tracing::debug!(count = roots.len(), "auto-detected search roots");
    roots
}

fn virtualenv_roots(venv: &Path) -> Vec<PathBuf> {
    let mut roots = expand(&format!("{}/lib/python3*/site-packages", venv.display()));
    // Windows layout
    roots.push(venv.join("Lib").join("site-packages"));
    roots
}

/// Glob results come back sorted, so expansion is deterministic.
fn expand(pattern: &str) -> Vec<PathBuf> {
    match glob::glob(pattern) {
        Ok(paths) => paths.flatten().collect(),
        Err(e) => {
            tracing::debug!(pattern, error = %e, "invalid search root pattern");
            Vec::new()
        }
    }
}

fn dedup_dirs(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = Vec::new();
    for root in roots {
        if root.is_dir() && !seen.contains(&root) {
            seen.push(root);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtualenv_site_packages_are_found() {
        let venv = tempfile::tempdir().unwrap();
        let site = venv.path().join("lib/python3.11/site-packages");
        std::fs::create_dir_all(&site).unwrap();

        let roots = dedup_dirs(virtualenv_roots(venv.path()));
        assert_eq!(roots, vec![site]);
    }

    #[test]
    fn dedup_keeps_first_and_drops_missing() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let roots = dedup_dirs(vec![
            a.path().to_path_buf(),
            PathBuf::from("/definitely/not/here"),
            b.path().to_path_buf(),
            a.path().to_path_buf(),
        ]);
        assert_eq!(roots, vec![a.path().to_path_buf(), b.path().to_path_buf()]);
    }
}

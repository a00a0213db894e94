//! Analyzers for units that are not program text: install manifests,
//! interpreter startup hooks and compiled extension modules.

use std::path::Path;

use super::{decode_utf8, UnitAnalyzer};
use crate::error::Result;
use crate::ir::{Capability, Indicator, SourceLocation, UnitKind};

/// `RECORD` / `installed-files.txt`: any listed native library means the
/// package ships compiled code.
pub struct RecordAnalyzer;

impl UnitAnalyzer for RecordAnalyzer {
    fn kind(&self) -> UnitKind {
        UnitKind::Record
    }

    fn analyze(&self, path: &Path, content: &[u8]) -> Result<Vec<Indicator>> {
        let source = decode_utf8(path, content)?;
        let mut indicators = Vec::new();

        for (line_idx, line) in source.lines().enumerate() {
            let entry = record_path(line);
            if entry.is_empty() {
                continue;
            }
            if UnitKind::from_path(Path::new(entry)) == UnitKind::NativeLibrary {
                indicators.push(Indicator {
                    capability: Capability::NativeExtension,
                    construct: entry.to_string(),
                    location: SourceLocation::new(path, line_idx + 1, 0),
                });
            }
        }

        Ok(indicators)
    }
}

/// First CSV column of a RECORD line (whole line for installed-files.txt).
pub(crate) fn record_path(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix('"') {
        return rest.split('"').next().unwrap_or("");
    }
    line.split(',').next().unwrap_or("").trim()
}

/// `.pth` files: lines starting with `import` are executed by `site` at
/// every interpreter start.
pub struct PathConfigAnalyzer;

impl UnitAnalyzer for PathConfigAnalyzer {
    fn kind(&self) -> UnitKind {
        UnitKind::PathConfig
    }

    fn analyze(&self, path: &Path, content: &[u8]) -> Result<Vec<Indicator>> {
        let source = decode_utf8(path, content)?;
        let indicators = source
            .lines()
            .enumerate()
            .filter(|(_, line)| line.starts_with("import ") || line.starts_with("import\t"))
            .map(|(idx, line)| Indicator {
                capability: Capability::DynamicCodeExecution,
                construct: format!("startup hook: {}", line.trim()),
                location: SourceLocation::new(path, idx + 1, 0),
            })
            .collect();
        Ok(indicators)
    }
}

/// Compiled extension modules. The bytes are never read; presence alone is
/// the signal.
pub struct NativeLibraryAnalyzer;

impl UnitAnalyzer for NativeLibraryAnalyzer {
    fn kind(&self) -> UnitKind {
        UnitKind::NativeLibrary
    }

    fn analyze(&self, path: &Path, _content: &[u8]) -> Result<Vec<Indicator>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(vec![Indicator {
            capability: Capability::NativeExtension,
            construct: format!("native library {name}"),
            location: SourceLocation::new(path, 0, 0),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lists_native_library() {
        let record = "\
pkg/__init__.py,sha256=abc,120
pkg/_speedups.cpython-311-x86_64-linux-gnu.so,sha256=def,40960
pkg-1.0.dist-info/RECORD,,
";
        let indicators = RecordAnalyzer
            .analyze(Path::new("pkg-1.0.dist-info/RECORD"), record.as_bytes())
            .unwrap();
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].capability, Capability::NativeExtension);
        assert_eq!(indicators[0].location.line, 2);
    }

    #[test]
    fn record_paths_handle_quotes() {
        assert_eq!(record_path("\"a,b.py\",sha256=x,1"), "a,b.py");
        assert_eq!(record_path("pkg/mod.py,,"), "pkg/mod.py");
        assert_eq!(record_path("   "), "");
    }

    #[test]
    fn pth_import_line_is_startup_code() {
        let pth = "/opt/extra\nimport _virtualenv\n";
        let indicators = PathConfigAnalyzer
            .analyze(Path::new("_virtualenv.pth"), pth.as_bytes())
            .unwrap();
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].capability, Capability::DynamicCodeExecution);
        assert_eq!(indicators[0].location.line, 2);
    }

    #[test]
    fn pth_plain_paths_are_harmless() {
        let indicators = PathConfigAnalyzer
            .analyze(Path::new("extra.pth"), b"/opt/lib\n./vendor\n")
            .unwrap();
        assert!(indicators.is_empty());
    }

    #[test]
    fn native_library_always_flags() {
        let indicators = NativeLibraryAnalyzer
            .analyze(Path::new("pkg/_core.so"), &[])
            .unwrap();
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].capability, Capability::NativeExtension);
    }
}

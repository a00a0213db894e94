pub mod console;
pub mod grants;
pub mod json;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::{AuditReport, BatchReport};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
    Toml,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            "toml" | "policy" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Render one report into the specified format.
pub fn render(report: &AuditReport, format: OutputFormat, verbose: bool) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render(report, verbose)),
        OutputFormat::Json => json::render(report),
        OutputFormat::Toml => grants::render(report),
    }
}

/// Render a batch into the specified format.
pub fn render_batch(batch: &BatchReport, format: OutputFormat, verbose: bool) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_batch(batch, verbose)),
        OutputFormat::Json => json::render_batch(batch),
        OutputFormat::Toml => grants::render_batch(batch),
    }
}

#[cfg(test)]
pub(crate) fn sample_report(granted: Option<crate::ir::CapabilityRecord>) -> AuditReport {
    use crate::ir::{Capability, CapabilityRecord, Indicator, SourceLocation, UnitParseWarning};
    use crate::policy::Verdict;
    use std::path::{Path, PathBuf};

    let required = CapabilityRecord::empty()
        .with(Capability::Network)
        .with(Capability::Subprocess);
    let file = Path::new("runner/shell.py");
    AuditReport {
        package: "runner".into(),
        resolved_name: "runner".into(),
        root: PathBuf::from("/site-packages"),
        locator: "dist-info",
        verdict: Verdict::evaluate(&required, granted.as_ref()),
        required,
        granted,
        indicators: vec![
            Indicator {
                capability: Capability::Network,
                construct: "import httpx".into(),
                location: SourceLocation::new(Path::new("runner/__init__.py"), 1, 1),
            },
            Indicator {
                capability: Capability::Subprocess,
                construct: "import subprocess".into(),
                location: SourceLocation::new(file, 1, 1),
            },
        ],
        warnings: vec![UnitParseWarning {
            file: PathBuf::from("runner/legacy.py"),
            message: "not valid UTF-8 (byte 3)".into(),
        }],
        units: Vec::new(),
    }
}

//! Static capability inference.
//!
//! Each `UnitAnalyzer` turns one source unit into indicators. The `Inferrer`
//! runs analyzers over a package's units on a bounded worker pool and folds
//! the per-unit records with `CapabilityRecord::merge`, starting from the
//! empty record. Merge is commutative and associative, so completion order
//! never changes the result.

pub mod manifest;
pub mod patterns;
pub mod python;
pub mod shell;

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use serde::Serialize;

use crate::error::{Result, TrustError};
use crate::ir::{
    Capability, CapabilityRecord, Indicator, SourceLocation, SourceUnit, UnitKind,
    UnitParseWarning,
};

/// Per-kind analyzer. Implementations are pattern based: a flag is raised
/// when a known construct is present, without data-flow analysis, so they
/// over-approximate rather than miss.
pub trait UnitAnalyzer: Send + Sync {
    fn kind(&self) -> UnitKind;

    /// Analyze one unit. `Err` means the unit could not be analyzed at all.
    fn analyze(&self, path: &Path, content: &[u8]) -> Result<Vec<Indicator>>;
}

/// All registered analyzers.
pub fn all_analyzers() -> Vec<Box<dyn UnitAnalyzer>> {
    vec![
        Box::new(python::PythonAnalyzer),
        Box::new(shell::ShellAnalyzer),
        Box::new(manifest::RecordAnalyzer),
        Box::new(manifest::PathConfigAnalyzer),
        Box::new(manifest::NativeLibraryAnalyzer),
    ]
}

/// Get the analyzer for a unit kind, if there is one.
pub fn analyzer_for_kind(kind: UnitKind) -> Option<Box<dyn UnitAnalyzer>> {
    all_analyzers().into_iter().find(|a| a.kind() == kind)
}

pub(crate) fn decode_utf8<'a>(path: &Path, content: &'a [u8]) -> Result<&'a str> {
    let text = std::str::from_utf8(content).map_err(|e| TrustError::Parse {
        file: path.display().to_string(),
        message: format!("not valid UTF-8 (byte {})", e.valid_up_to()),
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Result of analyzing a single unit.
#[derive(Debug, Clone, Default)]
pub struct UnitAnalysis {
    pub record: CapabilityRecord,
    pub indicators: Vec<Indicator>,
}

/// Result of analyzing every unit of a package.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageInference {
    /// The required-capability record.
    pub required: CapabilityRecord,
    /// Evidence, ordered by unit then position in the unit.
    pub indicators: Vec<Indicator>,
    /// Units that contributed no signal because they could not be analyzed.
    pub warnings: Vec<UnitParseWarning>,
    pub units_analyzed: usize,
}

impl PackageInference {
    /// Account for units that were never read. Nothing is known about what
    /// they do, so each one requires every capability and is reported as a
    /// warning. Warnings stay ordered by file.
    pub fn add_unanalyzed(&mut self, skipped: Vec<UnitParseWarning>) {
        if skipped.is_empty() {
            return;
        }
        self.required = self.required.merge(&CapabilityRecord::all());
        for warning in &skipped {
            self.indicators
                .extend(Capability::ALL.iter().map(|&capability| Indicator {
                    capability,
                    construct: "unit not analyzed".to_string(),
                    location: SourceLocation::new(&warning.file, 0, 0),
                }));
        }
        self.warnings.extend(skipped);
        self.warnings.sort_by(|a, b| a.file.cmp(&b.file));
    }
}

/// Coarse cancellation, checked between units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs analyzers over source units.
pub struct Inferrer {
    analyzers: Vec<Box<dyn UnitAnalyzer>>,
    workers: usize,
}

impl Inferrer {
    /// Create an inferrer with all built-in analyzers and one worker per
    /// available core.
    pub fn new() -> Self {
        Self {
            analyzers: all_analyzers(),
            workers: default_workers(),
        }
    }

    /// Cap the worker pool. `0` means available parallelism.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = if workers == 0 {
            default_workers()
        } else {
            workers
        };
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Analyze one unit into a record plus evidence. Units with no matching
    /// analyzer contribute nothing.
    pub fn analyze(&self, unit: &SourceUnit) -> Result<UnitAnalysis> {
        let Some(analyzer) = self.analyzers.iter().find(|a| a.kind() == unit.kind) else {
            return Ok(UnitAnalysis::default());
        };
        let indicators = analyzer.analyze(&unit.relative_path, &unit.content)?;
        let record = indicators.iter().map(|i| i.capability).collect();
        Ok(UnitAnalysis { record, indicators })
    }

    /// Required capabilities of one unit.
    pub fn infer(&self, unit: &SourceUnit) -> Result<CapabilityRecord> {
        self.analyze(unit).map(|a| a.record)
    }

    /// Required capabilities of a whole package.
    ///
    /// Units that fail to analyze become warnings; they never abort the
    /// package. Returns `Cancelled` if `cancel` fires before every unit has
    /// been analyzed.
    pub fn infer_package(
        &self,
        units: &[SourceUnit],
        cancel: &CancelToken,
    ) -> Result<PackageInference> {
        let workers = self.workers.min(units.len()).max(1);
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, Result<UnitAnalysis>)>();

        let mut required = CapabilityRecord::empty();
        let mut per_unit: Vec<Vec<Indicator>> = vec![Vec::new(); units.len()];
        let mut warnings: Vec<(usize, UnitParseWarning)> = Vec::new();
        let mut analyzed = 0usize;

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || {
                    while !cancel.is_cancelled() {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(unit) = units.get(idx) else {
                            break;
                        };
                        if tx.send((idx, self.analyze(unit))).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (idx, outcome) in rx {
                analyzed += 1;
                match outcome {
                    Ok(analysis) => {
                        required = required.merge(&analysis.record);
                        per_unit[idx] = analysis.indicators;
                    }
                    Err(e) => {
                        let unit = &units[idx];
                        tracing::warn!(
                            file = %unit.relative_path.display(),
                            error = %e,
                            "unit could not be analyzed, contributing no signal"
                        );
                        let message = match e {
                            TrustError::Parse { message, .. } => message,
                            other => other.to_string(),
                        };
                        warnings.push((
                            idx,
                            UnitParseWarning {
                                file: unit.relative_path.clone(),
                                message,
                            },
                        ));
                    }
                }
            }
        });

        if analyzed < units.len() {
            return Err(TrustError::Cancelled);
        }

        warnings.sort_by_key(|(idx, _)| *idx);
        tracing::debug!(
            units = units.len(),
            workers,
            warnings = warnings.len(),
            "inference complete"
        );

        Ok(PackageInference {
            required,
            indicators: per_unit.into_iter().flatten().collect(),
            warnings: warnings.into_iter().map(|(_, w)| w).collect(),
            units_analyzed: analyzed,
        })
    }
}

impl Default for Inferrer {
    fn default() -> Self {
        Self::new()
    }
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

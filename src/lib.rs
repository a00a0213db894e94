//! pytrust: static capability auditor for Python packages.
//!
//! Infers which sensitive capabilities (network, filesystem, subprocess,
//! environment, dynamic code execution, native extensions) a package's code
//! could use, and checks them against the capabilities a trust policy grants.
//! Inference is static and conservative: it may over-report, never
//! under-report.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use pytrust::{audit, AuditOptions};
//! use pytrust::policy::GrantStore;
//!
//! let options = AuditOptions::default();
//! let policy = GrantStore::load(Path::new("permissions.toml")).unwrap();
//! let report = audit("requests", &options, Some(&policy)).unwrap();
//! println!("{}: {} violation(s)", report.verdict, report.violations().len());
//! ```

pub mod config;
pub mod error;
pub mod inference;
pub mod ir;
pub mod output;
pub mod policy;
pub mod scanner;

use std::path::{Path, PathBuf};

use serde::Serialize;

use config::Config;
use error::{Result, TrustError};
use inference::{CancelToken, Inferrer};
use ir::{CapabilityRecord, Indicator, SourceUnit, UnitKind, UnitParseWarning};
use output::OutputFormat;
use policy::{GrantStore, Verdict, Violation};
use scanner::Scanner;

/// Options for an audit invocation.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub config: Config,
    /// Checked between units; cancelling aborts the package in progress.
    pub cancel: CancelToken,
}

impl AuditOptions {
    /// Options from a config file (defaults to `.pytrust.toml` in the
    /// current directory; missing file means defaults).
    pub fn from_config_path(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".pytrust.toml"));
        Ok(Self {
            config: Config::load(&path)?,
            cancel: CancelToken::new(),
        })
    }
}

/// A unit as listed in reports.
#[derive(Debug, Clone, Serialize)]
pub struct UnitSummary {
    pub path: PathBuf,
    pub kind: UnitKind,
    pub size_bytes: u64,
    pub content_hash: Option<String>,
}

impl From<&SourceUnit> for UnitSummary {
    fn from(unit: &SourceUnit) -> Self {
        Self {
            path: unit.relative_path.clone(),
            kind: unit.kind,
            size_bytes: unit.size_bytes,
            content_hash: unit.content_hash.clone(),
        }
    }
}

/// Complete audit report for one package.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// Identifier as requested.
    pub package: String,
    /// Distribution or module name the identifier resolved to.
    pub resolved_name: String,
    pub root: PathBuf,
    pub locator: &'static str,
    pub required: CapabilityRecord,
    /// `None` when no policy was supplied.
    pub granted: Option<CapabilityRecord>,
    pub verdict: Verdict,
    pub indicators: Vec<Indicator>,
    pub warnings: Vec<UnitParseWarning>,
    pub units: Vec<UnitSummary>,
}

impl AuditReport {
    pub fn violations(&self) -> &[Violation] {
        self.verdict.violations()
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    /// Key this package goes under in a policy file. Source trees given by
    /// path use their directory name.
    pub fn policy_name(&self) -> &str {
        if self.locator == "source-tree" {
            &self.resolved_name
        } else {
            &self.package
        }
    }
}

/// Scanner and inferrer configured once, reusable across packages.
pub struct Auditor {
    scanner: Scanner,
    inferrer: Inferrer,
    cancel: CancelToken,
}

impl Auditor {
    pub fn new(options: &AuditOptions) -> Self {
        Self {
            scanner: Scanner::new(options.config.scan.clone()),
            inferrer: Inferrer::new().with_workers(options.config.inference.workers),
            cancel: options.cancel.clone(),
        }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Audit one package: validate its grant, scan, infer, check.
    ///
    /// The grant is validated before scanning, so a malformed policy entry
    /// is reported without touching the package.
    pub fn audit(&self, package: &str, policy: Option<&GrantStore>) -> Result<AuditReport> {
        let mut granted = match policy {
            Some(store) => store.granted_for(package)?,
            None => None,
        };

        let scanned = self.scanner.scan(package)?;

        if let Some(store) = policy {
            if granted.is_none() && scanned.name != package {
                granted = store.granted_for(&scanned.name)?;
            }
            if granted.is_none() {
                tracing::warn!(
                    package,
                    "package has no entry in the policy, treating it as granted nothing"
                );
                granted = Some(CapabilityRecord::empty());
            }
        }

        let mut inference = self.inferrer.infer_package(&scanned.units, &self.cancel)?;
        inference.add_unanalyzed(scanned.skipped);
        let verdict = Verdict::evaluate(&inference.required, granted.as_ref());

        tracing::info!(
            package,
            units = scanned.units.len(),
            warnings = inference.warnings.len(),
            verdict = %verdict,
            "audit complete"
        );

        Ok(AuditReport {
            package: package.to_string(),
            resolved_name: scanned.name,
            root: scanned.root,
            locator: scanned.locator,
            required: inference.required,
            granted,
            verdict,
            indicators: inference.indicators,
            warnings: inference.warnings,
            units: scanned.units.iter().map(UnitSummary::from).collect(),
        })
    }

    /// Audit several packages. Failures are per package; the batch always
    /// runs to the end unless cancelled.
    pub fn audit_batch<S: AsRef<str>>(
        &self,
        packages: &[S],
        policy: Option<&GrantStore>,
    ) -> BatchReport {
        let mut entries = Vec::with_capacity(packages.len());
        for package in packages {
            let package = package.as_ref();
            if self.cancel.is_cancelled() {
                entries.push(BatchEntry {
                    package: package.to_string(),
                    outcome: Err(TrustError::Cancelled),
                });
                continue;
            }
            let outcome = self.audit(package, policy);
            if let Err(e) = &outcome {
                tracing::warn!(package, error = %e, "package audit failed, continuing");
            }
            entries.push(BatchEntry {
                package: package.to_string(),
                outcome,
            });
        }
        BatchReport { entries }
    }
}

/// One package's outcome in a batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub package: String,
    pub outcome: Result<AuditReport>,
}

/// Outcomes of a batch audit, in request order.
#[derive(Debug)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn reports(&self) -> impl Iterator<Item = &AuditReport> {
        self.entries.iter().filter_map(|e| e.outcome.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &TrustError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err().map(|err| (e.package.as_str(), err)))
    }

    /// 2 if any package errored, else 1 if any failed, else 0.
    pub fn exit_code(&self) -> i32 {
        if self.errors().next().is_some() {
            2
        } else if self.reports().any(|r| r.verdict.is_fail()) {
            1
        } else {
            0
        }
    }
}

/// Audit one package with a fresh [`Auditor`].
pub fn audit(
    package: &str,
    options: &AuditOptions,
    policy: Option<&GrantStore>,
) -> Result<AuditReport> {
    Auditor::new(options).audit(package, policy)
}

/// Audit several packages with one [`Auditor`].
pub fn audit_batch<S: AsRef<str>>(
    packages: &[S],
    options: &AuditOptions,
    policy: Option<&GrantStore>,
) -> BatchReport {
    Auditor::new(options).audit_batch(packages, policy)
}

/// Render an audit report in the specified format.
pub fn render_report(report: &AuditReport, format: OutputFormat, verbose: bool) -> Result<String> {
    output::render(report, format, verbose)
}

/// Render a batch report in the specified format.
pub fn render_batch(batch: &BatchReport, format: OutputFormat, verbose: bool) -> Result<String> {
    output::render_batch(batch, format, verbose)
}

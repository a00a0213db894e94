//! Reports rendered as policy files: the required record of each package as
//! its grant. Feeding the output back as a policy passes.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::ir::CapabilityRecord;
use crate::policy::to_policy_toml;
use crate::{AuditReport, BatchReport};

/// Render one report as `[package]` with its required capabilities.
pub fn render(report: &AuditReport) -> Result<String> {
    to_policy_toml(report.policy_name(), &report.required)
}

/// Render every successful report of a batch as one policy. Failed packages
/// are left out. Reports sharing a policy name are merged, so the entry
/// grants what each of them requires.
pub fn render_batch(batch: &BatchReport) -> Result<String> {
    let mut table: BTreeMap<&str, CapabilityRecord> = BTreeMap::new();
    for report in batch.reports() {
        let name = report.policy_name();
        match table.get_mut(name) {
            Some(existing) => {
                tracing::warn!(
                    package = name,
                    "several audited packages share this policy name, merging their records"
                );
                *existing = existing.merge(&report.required);
            }
            None => {
                table.insert(name, report.required);
            }
        }
    }
    Ok(toml::to_string(&table)?)
}

//! Trust policy: which capabilities each package is granted.
//!
//! A policy file maps package names to capability tables:
//!
//! ```toml
//! [requests]
//! network = true
//! filesystem = true
//! ```
//!
//! Records are kept raw until asked for, so one malformed entry fails only
//! that package's check, not a whole batch.

pub mod violation;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{Result, TrustError};
use crate::ir::CapabilityRecord;
use crate::scanner::normalize_name;

pub use violation::{check, Verdict, Violation};

/// Parsed policy: package name → raw grant record.
#[derive(Debug, Clone, Default)]
pub struct GrantStore {
    /// Keyed by normalized package name; values keep the original name.
    entries: BTreeMap<String, (String, Value)>,
}

impl GrantStore {
    /// Load a policy file. `.json` files are read as JSON, anything else as
    /// TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let value: Value = toml::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    /// Build from an already-parsed mapping. The top level must be a table;
    /// per-package records are validated lazily by
    /// [`granted_for`](Self::granted_for).
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(TrustError::Config(
                "policy must be a table with package names as keys".into(),
            ));
        };
        let entries = map
            .into_iter()
            .map(|(name, record)| (normalize_name(&name), (name, record)))
            .collect();
        Ok(Self { entries })
    }

    /// Package names as written in the policy, in normalized-name order.
    pub fn packages(&self) -> Vec<&str> {
        self.entries.values().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validated grant for `package`, or `None` if the policy has no entry.
    pub fn granted_for(&self, package: &str) -> Result<Option<CapabilityRecord>> {
        match self.entries.get(&normalize_name(package)) {
            None => Ok(None),
            Some((name, value)) => CapabilityRecord::from_value(name, value).map(Some),
        }
    }
}

/// Serialize `{package: record}` as TOML, in capability order; the output is
/// itself a valid policy.
pub fn to_policy_toml(package: &str, record: &CapabilityRecord) -> Result<String> {
    let mut table = BTreeMap::new();
    table.insert(package, record);
    Ok(toml::to_string(&table)?)
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};

/// Top-level configuration from `.pytrust.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Package resolution and unit loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories holding installed packages, searched in order.
    /// Empty means auto-detect (PYTHONPATH, virtualenv, system site-packages).
    pub search_paths: Vec<PathBuf>,
    /// Upper bound on package resolution, in seconds.
    pub timeout_secs: u64,
    /// Text units larger than this are not read; they are assumed to need
    /// every capability.
    pub max_file_size: u64,
    /// Maximum directory depth when walking a package or source tree.
    pub max_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            timeout_secs: 30,
            max_file_size: 1_048_576,
            max_depth: 16,
        }
    }
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Worker threads for unit analysis. 0 = available parallelism.
    pub workers: usize,
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every audit fail.
    pub fn validate(&self) -> Result<()> {
        if self.scan.timeout_secs == 0 {
            return Err(TrustError::Config(
                "scan.timeout_secs must be at least 1".into(),
            ));
        }
        if self.scan.max_depth == 0 {
            return Err(TrustError::Config("scan.max_depth must be at least 1".into()));
        }
        Ok(())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# pytrust configuration

[scan]
# Directories holding installed packages, searched in order.
# Leave empty to auto-detect from PYTHONPATH, $VIRTUAL_ENV and system site-packages.
search_paths = []

# Give up resolving a package after this many seconds.
timeout_secs = 30

# Files larger than this many bytes are not analyzed. They are reported as
# warnings and assumed to need every capability.
max_file_size = 1048576

# Maximum directory depth when walking a package. Deeper directories are
# treated like oversized files.
max_depth = 16

[inference]
# Worker threads for analysis (0 = one per CPU).
workers = 0
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/.pytrust.toml")).unwrap();
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.inference.workers, 0);
    }

    #[test]
    fn starter_toml_parses_to_defaults() {
        let config: Config = toml::from_str(Config::starter_toml()).unwrap();
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.inference, InferenceConfig::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: Config = toml::from_str("[scan]\ntimeout_secs = 5\n").unwrap();
        assert_eq!(config.scan.timeout(), Duration::from_secs(5));
        assert_eq!(config.scan.max_file_size, 1_048_576);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".pytrust.toml");
        std::fs::write(&path, "[scan]\ntimeout_secs = 0\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, TrustError::Config(msg) if msg.contains("timeout_secs")));
    }
}

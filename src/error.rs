use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrustError>;

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Resolving package '{package}' timed out after {}s", timeout.as_secs_f64())]
    ResolutionTimeout { package: String, timeout: Duration },

    #[error("Schema error in grant for '{package}': {message}")]
    Schema { package: String, message: String },

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audit cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrustError {
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// Whether a caller may reasonably retry the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResolutionTimeout { .. })
    }

    pub(crate) fn schema(package: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            package: package.to_string(),
            message: message.into(),
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigraError {
    #[error("adapter '{0}' not found")]
    AdapterNotFound(String),

    #[error("{adapter} does not support {operation}: {reason}")]
    UnsupportedOperation {
        adapter: String,
        operation: String,
        reason: String,
    },

    #[error("rollback steps must be positive")]
    InvalidRollbackSteps,

    #[error("failed to spawn '{program}': {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed: {message}")]
    CommandFailed { program: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("no tenants found in {0}")]
    NoTenants(String),

    #[error("environment variable {0} is not set")]
    TenantEnvUnset(String),

    #[error("tenant at index {0} has no ID")]
    TenantMissingId(usize),

    #[error("duplicate tenant id '{0}'")]
    DuplicateTenant(String),

    #[error("tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("failed to parse tenant list from {origin}: {message}")]
    TenantParse { origin: String, message: String },

    #[error("failed to load tenants: {0}")]
    TenantLoad(#[source] Box<MigraError>),

    #[error("failed to read state file {path}: {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {path}: {source}")]
    StateCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("configuration validation failed:\n  - {}", .0.join("\n  - "))]
    ConfigInvalid(Vec<String>),

    #[error("failed to discover services under {root}: {source}")]
    Discovery {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MigraError>;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Service / Tenant
// ---------------------------------------------------------------------------

/// One independently migratable unit. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub name: String,
    /// Framework discriminator; selects the adapter in the registry.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Service {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            path: path.into(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Directory the adapter runs its command in: `working_dir`, else `path`.
    pub fn run_dir(&self) -> &std::path::Path {
        self.working_dir.as_deref().unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(default)]
    pub id: String,
    /// Connection parameters, exported to the adapter as environment variables.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub connection: BTreeMap<String, String>,
}

impl Tenant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connection: BTreeMap::new(),
        }
    }
}

/// Deserialize a map that may be written as `null` into an empty map.
pub(crate) fn null_as_empty<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    D: serde::Deserializer<'de>,
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
{
    let opt = Option::<BTreeMap<K, V>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Deploy,
    Rollback,
    Status,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deploy => "deploy",
            Operation::Rollback => "rollback",
            Operation::Status => "status",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(Operation::Deploy),
            "rollback" => Ok(Operation::Rollback),
            "status" => Ok(Operation::Status),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter results
// ---------------------------------------------------------------------------

/// Normalized outcome of one adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl OperationResult {
    pub fn succeeded(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            duration,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: error.into(),
            duration,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub applied: Vec<String>,
    pub pending: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StatusResult {
    pub fn summary(&self) -> String {
        format!(
            "Applied: {}, Pending: {}",
            self.applied.len(),
            self.pending.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Caller-facing results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult {
    pub service_name: String,
    pub success: bool,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantResult {
    pub tenant_id: String,
    pub success: bool,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Number of services in the run.
    pub service_count: usize,
    /// Services that completed successfully before the tenant stopped.
    pub succeeded: usize,
}

/// Render a duration the way it is stored in execution records (`1.5s`, `250ms`).
pub fn format_duration(d: Duration) -> String {
    format!("{d:?}")
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

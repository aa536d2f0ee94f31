//! Durable execution history.
//!
//! [`OrchestrationState`] is the persisted aggregate: one record per service
//! and one per tenant (with its own per-service records). [`StateStore`]
//! owns the on-disk copy under `.migra/state.json` and is the only shared
//! mutable resource used by the engines and the tenant executor.

use crate::error::{MigraError, Result};
use crate::paths;
use crate::types::{format_duration, null_as_empty};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const STATE_VERSION: &str = "1.0";

pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_FAILURE: &str = "failure";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceExecutionRecord {
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error: String,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub last_duration: String,
}

impl ServiceExecutionRecord {
    fn apply(&mut self, now: DateTime<Utc>, success: bool, duration: Duration, err: Option<&str>) {
        self.last_run = Some(now);
        self.last_duration = format_duration(duration);
        if success {
            self.last_result = RESULT_SUCCESS.to_string();
            self.success_count += 1;
            self.last_error.clear();
        } else {
            self.last_result = RESULT_FAILURE.to_string();
            self.failure_count += 1;
            if let Some(e) = err {
                self.last_error = e.to_string();
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        self.last_result == RESULT_SUCCESS
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantExecutionRecord {
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub services: BTreeMap<String, ServiceExecutionRecord>,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
}

// ---------------------------------------------------------------------------
// OrchestrationState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationState {
    #[serde(default)]
    pub last_execution: Option<DateTime<Utc>>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub services: BTreeMap<String, ServiceExecutionRecord>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tenants: BTreeMap<String, TenantExecutionRecord>,
}

fn default_version() -> String {
    STATE_VERSION.to_string()
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationState {
    pub fn new() -> Self {
        Self {
            last_execution: None,
            version: default_version(),
            services: BTreeMap::new(),
            tenants: BTreeMap::new(),
        }
    }

    pub fn record_service_execution(
        &mut self,
        service: &str,
        success: bool,
        duration: Duration,
        err: Option<&str>,
    ) {
        let now = Utc::now();
        self.services
            .entry(service.to_string())
            .or_default()
            .apply(now, success, duration, err);
        self.last_execution = Some(now);
    }

    pub fn record_tenant_execution(
        &mut self,
        tenant_id: &str,
        service: &str,
        success: bool,
        duration: Duration,
        err: Option<&str>,
    ) {
        let now = Utc::now();
        let tenant = self.tenants.entry(tenant_id.to_string()).or_default();
        tenant.last_run = Some(now);
        tenant
            .services
            .entry(service.to_string())
            .or_default()
            .apply(now, success, duration, err);
        if success {
            tenant.success_count += 1;
        } else {
            tenant.failure_count += 1;
        }
        self.last_execution = Some(now);
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Lock-guarded owner of the persisted [`OrchestrationState`].
///
/// Every record call mutates and saves while holding the lock, so one
/// execution is one persist and snapshots hit the disk in order.
#[derive(Debug)]
pub struct StateStore {
    dir: PathBuf,
    file: PathBuf,
    state: Mutex<OrchestrationState>,
}

impl StateStore {
    /// Store rooted at `root/.migra`. Nothing is read until [`load`](Self::load).
    pub fn new(root: &Path) -> Self {
        Self {
            dir: paths::migra_dir(root),
            file: paths::state_path(root),
            state: Mutex::new(OrchestrationState::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Load state from disk. A missing file yields an empty state; an
    /// unreadable or unparsable one is an error and leaves the in-memory
    /// state untouched.
    pub fn load(&self) -> Result<()> {
        crate::io::ensure_dir(&self.dir)?;
        let loaded = if self.file.exists() {
            let data = std::fs::read_to_string(&self.file).map_err(|source| {
                MigraError::StateRead {
                    path: self.file.clone(),
                    source,
                }
            })?;
            serde_json::from_str(&data).map_err(|source| MigraError::StateCorrupt {
                path: self.file.clone(),
                source,
            })?
        } else {
            OrchestrationState::new()
        };
        *self.lock() = loaded;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let state = self.lock();
        self.persist(&state)
    }

    /// Point-in-time copy of the current state.
    pub fn state(&self) -> OrchestrationState {
        self.lock().clone()
    }

    pub fn record_service_execution(
        &self,
        service: &str,
        success: bool,
        duration: Duration,
        err: Option<&str>,
    ) -> Result<()> {
        self.update(|s| s.record_service_execution(service, success, duration, err))
    }

    pub fn record_tenant_execution(
        &self,
        tenant_id: &str,
        service: &str,
        success: bool,
        duration: Duration,
        err: Option<&str>,
    ) -> Result<()> {
        self.update(|s| s.record_tenant_execution(tenant_id, service, success, duration, err))
    }

    /// Drop all history and persist the empty state.
    pub fn reset(&self) -> Result<()> {
        self.update(|s| *s = OrchestrationState::new())
    }

    fn update(&self, f: impl FnOnce(&mut OrchestrationState)) -> Result<()> {
        let mut state = self.lock();
        f(&mut state);
        self.persist(&state)
    }

    fn persist(&self, state: &OrchestrationState) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        crate::io::atomic_write(&self.file, &data)
    }

    fn lock(&self) -> MutexGuard<'_, OrchestrationState> {
        // Mutations are applied whole before the guard drops, so a poisoned
        // lock still holds a consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

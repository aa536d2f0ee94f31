use crate::adapter::AdapterRegistry;
use crate::discovery;
use crate::engine::DEFAULT_PARALLEL_LIMIT;
use crate::error::{MigraError, Result};
use crate::paths;
use crate::types::Service;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

pub const STRATEGY_SEQUENTIAL: &str = "sequential";
pub const STRATEGY_PARALLEL: &str = "parallel";

pub const TENANCY_MODE_DATABASE: &str = "database_per_tenant";
pub const TENANCY_MODE_SCHEMA: &str = "schema_per_tenant";

pub const TENANT_SOURCE_ENV: &str = "env";
pub const TENANT_SOURCE_FILE: &str = "file";
pub const TENANT_SOURCE_COMMAND: &str = "command";

const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["console", "json"];

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,
    #[serde(default)]
    pub parallel_limit: i64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            stop_on_failure: true,
            parallel_limit: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub tenant_source: String,
    #[serde(default)]
    pub stop_on_failure: bool,
    #[serde(default)]
    pub max_parallel: i64,
    /// Variable read by the `env` source (default `MIGRA_TENANTS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    /// File read by the `file` source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Command line run by the `command` source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_strategy() -> String {
    STRATEGY_SEQUENTIAL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Contents of `migra.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenancy: Option<TenancyConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub global_env: BTreeMap<String, String>,
    #[serde(default)]
    pub parallel_limit: i64,
    /// Directory relative paths in the file are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Read, default and (if enabled) extend with discovered services.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(MigraError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let base_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::from_yaml(&data, &base_dir)
    }

    pub fn from_yaml(data: &str, base_dir: &Path) -> Result<Self> {
        let mut cfg: Config = serde_yaml::from_str(data)?;
        cfg.base_dir = base_dir.to_path_buf();
        cfg.apply_defaults();
        cfg.discover()?;
        Ok(cfg)
    }

    fn apply_defaults(&mut self) {
        if self.execution.strategy.is_empty() {
            self.execution.strategy = default_strategy();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if let Some(tenancy) = self.tenancy.as_mut().filter(|t| t.enabled) {
            if tenancy.mode.is_empty() {
                tenancy.mode = TENANCY_MODE_DATABASE.to_string();
            }
            if tenancy.max_parallel == 0 {
                tenancy.max_parallel = DEFAULT_PARALLEL_LIMIT as i64;
            }
        }

        let base = self.base_dir.clone();
        let global_env = self.global_env.clone();
        for service in &mut self.services {
            if !service.path.as_os_str().is_empty() {
                service.path = paths::resolve_against(&base, &service.path);
            }
            service.working_dir = Some(match service.working_dir.take() {
                Some(dir) if !dir.as_os_str().is_empty() => paths::resolve_against(&base, &dir),
                _ => service.path.clone(),
            });
            inherit_env(service, &global_env);
        }
    }

    fn discover(&mut self) -> Result<()> {
        let Some(discovery) = self.discovery.as_ref().filter(|d| d.enabled) else {
            return Ok(());
        };
        if discovery.root.as_os_str().is_empty() {
            return Err(MigraError::ConfigInvalid(vec![
                "discovery.root is required when discovery is enabled".to_string(),
            ]));
        }

        let root = paths::resolve_against(&self.base_dir, &discovery.root);
        let existing: HashSet<String> = self.services.iter().map(|s| s.name.clone()).collect();
        for mut service in discovery::discover_services(&root)? {
            if existing.contains(&service.name) {
                tracing::debug!(service = %service.name, "explicit service overrides discovered one");
                continue;
            }
            inherit_env(&mut service, &self.global_env);
            self.services.push(service);
        }
        Ok(())
    }

    /// Concurrency ceiling for the parallel engine.
    pub fn parallel_limit(&self) -> usize {
        [self.execution.parallel_limit, self.parallel_limit]
            .into_iter()
            .find(|n| *n > 0)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_PARALLEL_LIMIT)
    }

    pub fn is_parallel(&self) -> bool {
        self.execution.strategy == STRATEGY_PARALLEL
    }

    /// Tenancy section, only when enabled.
    pub fn tenancy(&self) -> Option<&TenancyConfig> {
        self.tenancy.as_ref().filter(|t| t.enabled)
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Every problem found, errors and warnings alike.
    pub fn validate(&self, registry: &AdapterRegistry) -> Vec<ConfigWarning> {
        let mut issues = Vec::new();
        self.validate_services(registry, &mut issues);
        self.validate_execution(&mut issues);
        self.validate_tenancy(&mut issues);
        self.validate_logging(&mut issues);
        self.check_programs(registry, &mut issues);
        issues
    }

    /// `Err(ConfigInvalid)` listing every error-level issue.
    pub fn check(&self, registry: &AdapterRegistry) -> Result<Vec<ConfigWarning>> {
        let (errors, warnings): (Vec<_>, Vec<_>) = self
            .validate(registry)
            .into_iter()
            .partition(|w| w.level == WarnLevel::Error);
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(MigraError::ConfigInvalid(
                errors.into_iter().map(|w| w.message).collect(),
            ))
        }
    }

    fn validate_services(&self, registry: &AdapterRegistry, issues: &mut Vec<ConfigWarning>) {
        let discovery_on = self.discovery.as_ref().is_some_and(|d| d.enabled);
        if self.services.is_empty() && !discovery_on {
            issues.push(ConfigWarning::error(
                "at least one service must be defined, or enable service discovery",
            ));
            return;
        }

        let supported = registry.kinds().collect::<Vec<_>>().join(", ");
        let mut seen = HashSet::new();
        for (i, svc) in self.services.iter().enumerate() {
            if svc.name.is_empty() {
                issues.push(ConfigWarning::error(format!("services[{i}]: name is required")));
            } else if !seen.insert(svc.name.as_str()) {
                issues.push(ConfigWarning::error(format!(
                    "services[{i}]: duplicate service name '{}'",
                    svc.name
                )));
            }

            if svc.kind.is_empty() {
                issues.push(ConfigWarning::error(format!(
                    "services[{i}] ({}): type is required",
                    svc.name
                )));
            } else if !registry.supports(&svc.kind) {
                issues.push(ConfigWarning::error(format!(
                    "services[{i}] ({}): unsupported type '{}' (supported: {supported})",
                    svc.name, svc.kind
                )));
            }

            if svc.path.as_os_str().is_empty() {
                issues.push(ConfigWarning::error(format!(
                    "services[{i}] ({}): path is required",
                    svc.name
                )));
            } else if !svc.path.exists() {
                issues.push(ConfigWarning::error(format!(
                    "services[{i}] ({}): path does not exist: {}",
                    svc.name,
                    svc.path.display()
                )));
            }
        }
    }

    fn validate_execution(&self, issues: &mut Vec<ConfigWarning>) {
        let strategy = self.execution.strategy.as_str();
        if strategy != STRATEGY_SEQUENTIAL && strategy != STRATEGY_PARALLEL {
            issues.push(ConfigWarning::error(format!(
                "execution.strategy must be 'sequential' or 'parallel', got '{strategy}'"
            )));
        }
        if strategy == STRATEGY_PARALLEL {
            // Zero means "use the default".
            if self.execution.parallel_limit < 0 {
                issues.push(ConfigWarning::error(
                    "execution.parallel_limit must be at least 1 for parallel execution",
                ));
            }
            if self.execution.parallel_limit > 100 {
                issues.push(ConfigWarning::error(
                    "execution.parallel_limit should not exceed 100",
                ));
            }
        }
        if self.parallel_limit < 0 {
            issues.push(ConfigWarning::error("parallel_limit cannot be negative"));
        }
        if self.parallel_limit > 100 {
            issues.push(ConfigWarning::error("parallel_limit should not exceed 100"));
        }
    }

    fn validate_tenancy(&self, issues: &mut Vec<ConfigWarning>) {
        let Some(tenancy) = self.tenancy() else {
            return;
        };
        if tenancy.mode != TENANCY_MODE_DATABASE && tenancy.mode != TENANCY_MODE_SCHEMA {
            issues.push(ConfigWarning::error(format!(
                "tenancy.mode must be 'database_per_tenant' or 'schema_per_tenant', got '{}'",
                tenancy.mode
            )));
        }
        match tenancy.tenant_source.as_str() {
            "" => issues.push(ConfigWarning::error(
                "tenancy.tenant_source is required when tenancy is enabled",
            )),
            TENANT_SOURCE_ENV | TENANT_SOURCE_FILE | TENANT_SOURCE_COMMAND => {}
            other => issues.push(ConfigWarning::error(format!(
                "tenancy.tenant_source must be 'env', 'file', or 'command', got '{other}'"
            ))),
        }
        if tenancy.max_parallel < 1 {
            issues.push(ConfigWarning::error("tenancy.max_parallel must be at least 1"));
        }
        if tenancy.max_parallel > 1000 {
            issues.push(ConfigWarning::error(
                "tenancy.max_parallel should not exceed 1000",
            ));
        }
    }

    fn validate_logging(&self, issues: &mut Vec<ConfigWarning>) {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            issues.push(ConfigWarning::error(format!(
                "logging.level must be 'debug', 'info', 'warn', or 'error', got '{}'",
                self.logging.level
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            issues.push(ConfigWarning::error(format!(
                "logging.format must be 'console' or 'json', got '{}'",
                self.logging.format
            )));
        }
    }

    fn check_programs(&self, registry: &AdapterRegistry, issues: &mut Vec<ConfigWarning>) {
        let kinds: BTreeSet<&str> = self.services.iter().map(|s| s.kind.as_str()).collect();
        for kind in kinds {
            let Ok(adapter) = registry.get(kind) else {
                continue;
            };
            if let Some(program) = adapter.program() {
                if which::which(program).is_err() {
                    issues.push(ConfigWarning::warning(format!(
                        "{kind} services need '{program}', which was not found on PATH"
                    )));
                }
            }
        }
    }
}

fn inherit_env(service: &mut Service, global_env: &BTreeMap<String, String>) {
    for (key, value) in global_env {
        service
            .env
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Multi-tenant fan-out.
//!
//! A [`TenantSource`] produces the tenant list; the [`TenantExecutor`] runs
//! every service for each tenant, tenants in parallel and services in order.

mod command;
mod env;
mod executor;
mod file;

pub use command::CommandSource;
pub use env::{parse_tenant_list, EnvSource, DEFAULT_TENANTS_VAR};
pub use executor::{TenantExecutor, TenantExecutorOptions};
pub use file::FileSource;

use crate::config::{TenancyConfig, TENANT_SOURCE_COMMAND, TENANT_SOURCE_ENV, TENANT_SOURCE_FILE};
use crate::error::{MigraError, Result};
use crate::paths;
use crate::types::Tenant;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const TENANTS_FILE_VAR: &str = "MIGRA_TENANTS_FILE";
pub const TENANTS_COMMAND_VAR: &str = "MIGRA_TENANTS_COMMAND";

#[async_trait]
pub trait TenantSource: Send + Sync {
    /// Load the current tenant list. A successful load is never empty.
    async fn load_tenants(&self, cancel: &CancellationToken) -> Result<Vec<Tenant>>;

    /// Where tenants come from, for messages.
    fn describe(&self) -> String;
}

/// Reject empty lists, blank ids and duplicate ids.
pub fn validate_tenants(tenants: Vec<Tenant>, origin: &str) -> Result<Vec<Tenant>> {
    if tenants.is_empty() {
        return Err(MigraError::NoTenants(origin.to_string()));
    }
    let mut seen = HashSet::new();
    for (idx, tenant) in tenants.iter().enumerate() {
        if tenant.id.trim().is_empty() {
            return Err(MigraError::TenantMissingId(idx));
        }
        if !seen.insert(tenant.id.as_str()) {
            return Err(MigraError::DuplicateTenant(tenant.id.clone()));
        }
    }
    Ok(tenants)
}

/// Build the tenant source selected by the tenancy config.
///
/// Relative file paths resolve against `base_dir`. Unset fields fall back
/// to `MIGRA_TENANTS_FILE` / `MIGRA_TENANTS_COMMAND`, then `tenants.json`.
pub fn source_from_config(config: &TenancyConfig, base_dir: &Path) -> Result<Arc<dyn TenantSource>> {
    match config.tenant_source.as_str() {
        TENANT_SOURCE_ENV => {
            let var = config
                .env_var
                .clone()
                .unwrap_or_else(|| DEFAULT_TENANTS_VAR.to_string());
            Ok(Arc::new(EnvSource::new(var)))
        }
        TENANT_SOURCE_FILE => {
            let file = config
                .file
                .clone()
                .or_else(|| std::env::var(TENANTS_FILE_VAR).ok().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_TENANTS_FILE));
            Ok(Arc::new(FileSource::new(paths::resolve_against(base_dir, &file))))
        }
        TENANT_SOURCE_COMMAND => {
            let line = config
                .command
                .clone()
                .or_else(|| std::env::var(TENANTS_COMMAND_VAR).ok())
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| {
                    MigraError::ConfigInvalid(vec![format!(
                        "tenancy.command or {TENANTS_COMMAND_VAR} is required for the command tenant source"
                    )])
                })?;
            Ok(Arc::new(CommandSource::from_command_line(&line, base_dir)?))
        }
        other => Err(MigraError::ConfigInvalid(vec![format!(
            "unsupported tenant source: {other}"
        )])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_rejected() {
        let err = validate_tenants(vec![], "tenants.json").unwrap_err();
        assert_eq!(err.to_string(), "no tenants found in tenants.json");
    }

    #[test]
    fn blank_id_reports_index() {
        let err = validate_tenants(vec![Tenant::new("acme"), Tenant::new(" ")], "x").unwrap_err();
        assert!(matches!(err, MigraError::TenantMissingId(1)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = validate_tenants(
            vec![Tenant::new("acme"), Tenant::new("globex"), Tenant::new("acme")],
            "x",
        )
        .unwrap_err();
        assert!(matches!(err, MigraError::DuplicateTenant(ref id) if id == "acme"));
    }

    #[test]
    fn config_selects_source() {
        let base = Path::new("/etc/migra");
        let mut cfg = TenancyConfig {
            enabled: true,
            tenant_source: "file".into(),
            file: Some(PathBuf::from("tenants.yaml")),
            ..TenancyConfig::default()
        };
        let source = source_from_config(&cfg, base).unwrap();
        assert_eq!(source.describe(), "file /etc/migra/tenants.yaml");

        cfg.tenant_source = "env".into();
        cfg.env_var = Some("ACME_TENANTS".into());
        let source = source_from_config(&cfg, base).unwrap();
        assert_eq!(source.describe(), "environment variable ACME_TENANTS");

        cfg.tenant_source = "command".into();
        cfg.command = Some("./list-tenants --format json".into());
        let source = source_from_config(&cfg, base).unwrap();
        assert_eq!(source.describe(), "command ./list-tenants --format json");

        cfg.tenant_source = "ldap".into();
        assert!(matches!(
            source_from_config(&cfg, base),
            Err(MigraError::ConfigInvalid(_))
        ));
    }
}

use super::{validate_tenants, TenantSource};
use crate::error::{MigraError, Result};
use crate::types::Tenant;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TENANTS_VAR: &str = "MIGRA_TENANTS";

/// Tenants from an environment variable: `id[:database_url],...`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    var: String,
}

impl EnvSource {
    pub fn new(var: impl Into<String>) -> Self {
        let var = var.into();
        Self {
            var: if var.is_empty() {
                DEFAULT_TENANTS_VAR.to_string()
            } else {
                var
            },
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new(DEFAULT_TENANTS_VAR)
    }
}

#[async_trait]
impl TenantSource for EnvSource {
    async fn load_tenants(&self, _cancel: &CancellationToken) -> Result<Vec<Tenant>> {
        let value = std::env::var(&self.var).unwrap_or_default();
        if value.trim().is_empty() {
            return Err(MigraError::TenantEnvUnset(self.var.clone()));
        }
        validate_tenants(parse_tenant_list(&value), &self.describe())
    }

    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }
}

/// Parse `acme:postgres://..,globex`. Text after the first `:` becomes
/// `DATABASE_URL`; blank entries are ignored.
pub fn parse_tenant_list(value: &str) -> Vec<Tenant> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once(':') {
            Some((id, url)) => {
                let mut tenant = Tenant::new(id.trim());
                tenant
                    .connection
                    .insert("DATABASE_URL".to_string(), url.trim().to_string());
                tenant
            }
            None => Tenant::new(part),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_and_urls() {
        let tenants = parse_tenant_list("acme:postgres://db/acme, globex ,, initech:mysql://h:3306/i");
        let ids: Vec<_> = tenants.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["acme", "globex", "initech"]);
        assert_eq!(tenants[0].connection["DATABASE_URL"], "postgres://db/acme");
        assert!(tenants[1].connection.is_empty());
        assert_eq!(tenants[2].connection["DATABASE_URL"], "mysql://h:3306/i");
    }

    #[tokio::test]
    async fn unset_variable_is_an_error() {
        let source = EnvSource::new("MIGRA_TEST_TENANTS_NEVER_SET");
        let err = source
            .load_tenants(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::TenantEnvUnset(ref v) if v == "MIGRA_TEST_TENANTS_NEVER_SET"));
    }

    #[tokio::test]
    async fn loads_from_variable() {
        std::env::set_var("MIGRA_TEST_TENANTS_LOAD", "acme,globex:postgres://g");
        let tenants = EnvSource::new("MIGRA_TEST_TENANTS_LOAD")
            .load_tenants(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[1].connection["DATABASE_URL"], "postgres://g");
    }

    #[tokio::test]
    async fn only_separators_means_no_tenants() {
        std::env::set_var("MIGRA_TEST_TENANTS_BLANK", " , ,");
        let err = EnvSource::new("MIGRA_TEST_TENANTS_BLANK")
            .load_tenants(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::NoTenants(_)));
    }
}

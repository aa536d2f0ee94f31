use super::{validate_tenants, TenantSource};
use crate::error::{MigraError, Result};
use crate::types::Tenant;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Tenants from a JSON (or YAML) array on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TenantSource for FileSource {
    async fn load_tenants(&self, _cancel: &CancellationToken) -> Result<Vec<Tenant>> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MigraError::TenantParse {
                origin: self.describe(),
                message: e.to_string(),
            })?;
        let tenants = parse_tenant_document(&data).map_err(|message| MigraError::TenantParse {
            origin: self.describe(),
            message,
        })?;
        validate_tenants(tenants, &self.describe())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// JSON first; YAML if the document is not JSON.
fn parse_tenant_document(data: &str) -> std::result::Result<Vec<Tenant>, String> {
    match serde_json::from_str::<Vec<Tenant>>(data) {
        Ok(tenants) => Ok(tenants),
        Err(json_err) => serde_yaml::from_str::<Option<Vec<Tenant>>>(data)
            .map(Option::unwrap_or_default)
            .map_err(|yaml_err| format!("not JSON ({json_err}) nor YAML ({yaml_err})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn load(dir: &TempDir, name: &str, body: &str) -> Result<Vec<Tenant>> {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        FileSource::new(path)
            .load_tenants(&CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn reads_json_array() {
        let dir = TempDir::new().unwrap();
        let tenants = load(
            &dir,
            "tenants.json",
            r#"[{"id":"acme","connection":{"DATABASE_URL":"postgres://a"}},{"id":"globex"}]"#,
        )
        .await
        .unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].connection["DATABASE_URL"], "postgres://a");
        assert!(tenants[1].connection.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_yaml() {
        let dir = TempDir::new().unwrap();
        let tenants = load(
            &dir,
            "tenants.yaml",
            "- id: acme\n  connection:\n    DATABASE_URL: postgres://a\n- id: globex\n  connection: null\n",
        )
        .await
        .unwrap();
        let ids: Vec<_> = tenants.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["acme", "globex"]);
    }

    #[tokio::test]
    async fn empty_array_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir, "tenants.json", "[]").await.unwrap_err();
        assert!(matches!(err, MigraError::NoTenants(_)));
    }

    #[tokio::test]
    async fn tenant_without_id_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir, "tenants.json", r#"[{"id":"acme"},{"connection":{}}]"#)
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::TenantMissingId(1)));
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let dir = TempDir::new().unwrap();
        let err = FileSource::new(dir.path().join("nope.json"))
            .load_tenants(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }
}

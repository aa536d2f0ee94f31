use super::{validate_tenants, TenantSource};
use crate::error::{MigraError, Result};
use crate::types::Tenant;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Tenants from the JSON array a command prints on stdout.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            dir: None,
        }
    }

    /// Split a whitespace-separated command line; runs in `dir`.
    pub fn from_command_line(line: &str, dir: &Path) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            MigraError::ConfigInvalid(vec!["tenant command is empty".to_string()])
        })?;
        Ok(Self {
            program,
            args: parts.collect(),
            dir: Some(dir.to_path_buf()),
        })
    }
}

#[async_trait]
impl TenantSource for CommandSource {
    async fn load_tenants(&self, cancel: &CancellationToken) -> Result<Vec<Tenant>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| MigraError::CommandSpawn {
            program: self.program.clone(),
            source,
        })?;
        let output = tokio::select! {
            out = child.wait_with_output() => out?,
            _ = cancel.cancelled() => return Err(MigraError::Cancelled),
        };

        if !output.status.success() {
            return Err(MigraError::CommandFailed {
                program: self.program.clone(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let tenants: Vec<Tenant> =
            serde_json::from_slice(&output.stdout).map_err(|e| MigraError::TenantParse {
                origin: self.describe(),
                message: e.to_string(),
            })?;
        validate_tenants(tenants, &self.describe())
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            format!("command {}", self.program)
        } else {
            format!("command {} {}", self.program, self.args.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSource {
        CommandSource::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn parses_stdout_json() {
        let tenants = sh(r#"echo '[{"id":"acme"},{"id":"globex","connection":{"SCHEMA":"globex"}}]'"#)
            .load_tenants(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[1].connection["SCHEMA"], "globex");
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let err = sh("echo nope >&2; exit 2")
            .load_tenants(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::CommandFailed { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn non_json_output_is_a_parse_error() {
        let err = sh("echo acme,globex")
            .load_tenants(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::TenantParse { .. }));
    }

    #[test]
    fn command_line_is_split_on_whitespace() {
        let source = CommandSource::from_command_line("  ./tenants.sh  --json ", Path::new("/srv")).unwrap();
        assert_eq!(source.program, "./tenants.sh");
        assert_eq!(source.args, vec!["--json"]);
        assert!(CommandSource::from_command_line("   ", Path::new("/srv")).is_err());
    }
}

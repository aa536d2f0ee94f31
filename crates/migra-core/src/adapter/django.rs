use super::command::{require_success, run_command, sanitize};
use super::{Adapter, FRAMEWORK_DJANGO};
use crate::error::{MigraError, Result};
use crate::types::{OperationResult, Service, StatusResult, Tenant};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Runs `manage.py` through a Python interpreter.
#[derive(Debug, Clone)]
pub struct DjangoAdapter {
    program: String,
}

impl DjangoAdapter {
    pub fn new() -> Self {
        Self {
            program: "python".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for DjangoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for DjangoAdapter {
    fn name(&self) -> &str {
        FRAMEWORK_DJANGO
    }

    fn program(&self) -> Option<&str> {
        Some(&self.program)
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
    ) -> Result<OperationResult> {
        let result = run_command(
            cancel,
            service,
            tenant,
            &self.program,
            &["manage.py", "migrate", "--no-input"],
        )
        .await?;
        Ok(sanitize(result))
    }

    async fn rollback(
        &self,
        cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
        steps: u32,
    ) -> Result<OperationResult> {
        if steps == 0 {
            return Err(MigraError::InvalidRollbackSteps);
        }
        // Django has no relative rollback; without a target this re-syncs to the plan.
        let result = run_command(
            cancel,
            service,
            tenant,
            &self.program,
            &["manage.py", "migrate", "--no-input"],
        )
        .await?;
        Ok(sanitize(result))
    }

    async fn status(
        &self,
        cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
    ) -> Result<StatusResult> {
        let result = run_command(
            cancel,
            service,
            tenant,
            &self.program,
            &["manage.py", "showmigrations", "--plan"],
        )
        .await?;
        let result = require_success(&self.program, result)?;
        Ok(parse_showmigrations(&result.output))
    }
}

/// Parse `showmigrations --plan`: `[X] app.name` is applied, `[ ] app.name` pending.
pub(crate) fn parse_showmigrations(output: &str) -> StatusResult {
    let mut status = StatusResult::default();
    for line in output.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("[X]") {
            status.applied.push(name.trim().to_string());
        } else if let Some(name) = line.strip_prefix("[ ]") {
            status.pending.push(name.trim().to_string());
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_plan_output() {
        let output = "\
[X]  contenttypes.0001_initial
[X]  auth.0001_initial
[ ]  users.0003_add_email
System check identified no issues.
[ ]  orders.0001_initial
";
        let status = parse_showmigrations(output);
        assert_eq!(status.applied, vec!["contenttypes.0001_initial", "auth.0001_initial"]);
        assert_eq!(status.pending, vec!["users.0003_add_email", "orders.0001_initial"]);
        assert_eq!(status.summary(), "Applied: 2, Pending: 2");
    }

    #[test]
    fn empty_output_has_no_items() {
        let status = parse_showmigrations("");
        assert!(status.applied.is_empty());
        assert!(status.pending.is_empty());
    }

    #[tokio::test]
    async fn zero_step_rollback_is_rejected() {
        let dir = TempDir::new().unwrap();
        let svc = Service::new("users", "django", dir.path());
        let err = DjangoAdapter::new()
            .rollback(&CancellationToken::new(), &svc, None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::InvalidRollbackSteps));
    }

    #[tokio::test]
    async fn failing_status_command_is_an_error() {
        let dir = TempDir::new().unwrap();
        let svc = Service::new("users", "django", dir.path());
        // `false` ignores its arguments and exits 1.
        let err = DjangoAdapter::new()
            .with_program("false")
            .status(&CancellationToken::new(), &svc, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::CommandFailed { ref program, .. } if program == "false"));
    }
}

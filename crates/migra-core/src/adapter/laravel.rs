use super::command::{require_success, run_command, sanitize};
use super::{Adapter, FRAMEWORK_LARAVEL};
use crate::error::{MigraError, Result};
use crate::types::{OperationResult, Service, StatusResult, Tenant};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Runs `artisan` through PHP.
#[derive(Debug, Clone)]
pub struct LaravelAdapter {
    program: String,
}

impl LaravelAdapter {
    pub fn new() -> Self {
        Self {
            program: "php".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for LaravelAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for LaravelAdapter {
    fn name(&self) -> &str {
        FRAMEWORK_LARAVEL
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
            &["artisan", "migrate", "--force"],
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
        let step_arg = format!("--step={steps}");
        let result = run_command(
            cancel,
            service,
            tenant,
            &self.program,
            &["artisan", "migrate:rollback", &step_arg, "--force"],
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
            &["artisan", "migrate:status"],
        )
        .await?;
        let result = require_success(&self.program, result)?;
        Ok(parse_migrate_status(&result.output))
    }
}

/// Parse `migrate:status`.
///
/// Older releases print a table (`| Y | name |` or `| Ran? | Migration | Batch |`
/// with `Yes`/`No`); newer ones print `name ....... [1] Ran` / `name .... Pending`.
pub(crate) fn parse_migrate_status(output: &str) -> StatusResult {
    let mut status = StatusResult::default();
    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('+') {
            continue;
        }

        if line.starts_with('|') {
            let cells: Vec<&str> = line
                .trim_matches('|')
                .split('|')
                .map(str::trim)
                .collect();
            if cells.len() < 2 {
                continue;
            }
            let name = cells[1].to_string();
            match cells[0].to_ascii_lowercase().as_str() {
                "y" | "yes" | "ran" => status.applied.push(name),
                "n" | "no" | "pending" => status.pending.push(name),
                _ => {}
            }
            continue;
        }

        let Some(name) = line.split_whitespace().next() else {
            continue;
        };
        if line.ends_with("Ran") {
            status.applied.push(name.to_string());
        } else if line.ends_with("Pending") {
            status.pending.push(name.to_string());
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_table() {
        let output = "\
+------+------------------------------------------------+-------+
| Ran? | Migration                                      | Batch |
+------+------------------------------------------------+-------+
| Yes  | 2014_10_12_000000_create_users_table           | 1     |
| Y    | 2014_10_12_100000_create_password_resets_table | 1     |
| No   | 2024_01_05_093000_create_orders_table          |       |
+------+------------------------------------------------+-------+
";
        let status = parse_migrate_status(output);
        assert_eq!(
            status.applied,
            vec![
                "2014_10_12_000000_create_users_table",
                "2014_10_12_100000_create_password_resets_table"
            ]
        );
        assert_eq!(status.pending, vec!["2024_01_05_093000_create_orders_table"]);
    }

    #[test]
    fn parses_dotted_listing() {
        let output = "
  Migration name .............................................. Batch / Status
  2014_10_12_000000_create_users_table ................................ [1] Ran
  2024_01_05_093000_create_orders_table ............................... Pending
";
        let status = parse_migrate_status(output);
        assert_eq!(status.applied, vec!["2014_10_12_000000_create_users_table"]);
        assert_eq!(status.pending, vec!["2024_01_05_093000_create_orders_table"]);
    }

    #[test]
    fn migration_table_missing_is_empty() {
        let status = parse_migrate_status("Migration table not found.\n");
        assert_eq!(status.summary(), "Applied: 0, Pending: 0");
    }
}

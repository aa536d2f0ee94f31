use super::command::{require_success, run_command, sanitize};
use super::{Adapter, FRAMEWORK_PRISMA};
use crate::error::{MigraError, Result};
use crate::types::{OperationResult, Service, StatusResult, Tenant};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Runs the prisma CLI through `npx`. Prisma has no down migrations.
#[derive(Debug, Clone)]
pub struct PrismaAdapter {
    program: String,
}

impl PrismaAdapter {
    pub fn new() -> Self {
        Self {
            program: "npx".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for PrismaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for PrismaAdapter {
    fn name(&self) -> &str {
        FRAMEWORK_PRISMA
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
            &["prisma", "migrate", "deploy"],
        )
        .await?;
        Ok(sanitize(result))
    }

    async fn rollback(
        &self,
        _cancel: &CancellationToken,
        _service: &Service,
        _tenant: Option<&Tenant>,
        steps: u32,
    ) -> Result<OperationResult> {
        if steps == 0 {
            return Err(MigraError::InvalidRollbackSteps);
        }
        Err(MigraError::UnsupportedOperation {
            adapter: FRAMEWORK_PRISMA.to_string(),
            operation: "rollback".to_string(),
            reason: "automatic rollback is not available, manual intervention required"
                .to_string(),
        })
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
            &["prisma", "migrate", "status"],
        )
        .await?;
        let result = require_success(&self.program, result)?;
        Ok(parse_migrate_status(&result.output))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Applied,
    Pending,
}

/// Parse `prisma migrate status`. Section headers decide where the
/// following migration directory names (`20240101000000_init`) belong.
pub(crate) fn parse_migrate_status(output: &str) -> StatusResult {
    let mut status = StatusResult::default();
    let mut section = Section::None;

    for line in output.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();
        // "Following migration have not yet been applied" is a pending header.
        if lower.contains("pending migration") || lower.contains("not yet") {
            section = Section::Pending;
            continue;
        }
        if lower.contains("migrations applied") || lower.contains("following migration") {
            section = Section::Applied;
            continue;
        }
        if !is_migration_name(line) {
            continue;
        }
        match section {
            Section::Applied => status.applied.push(line.to_string()),
            Section::Pending => status.pending.push(line.to_string()),
            Section::None => {}
        }
    }
    status
}

fn is_migration_name(line: &str) -> bool {
    line.len() > 15 && line.contains('_') && !line.contains(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pending_section_collects_names() {
        let output = "\
Prisma schema loaded from prisma/schema.prisma
Datasource \"db\": PostgreSQL database \"app\"

2 migrations found in prisma/migrations
Following migration have not yet been applied:
20240101000000_init
20240215120000_add_orders

To apply migrations in development run prisma migrate dev.
";
        let status = parse_migrate_status(output);
        assert!(status.applied.is_empty());
        assert_eq!(status.pending, vec!["20240101000000_init", "20240215120000_add_orders"]);
    }

    #[test]
    fn applied_header_switches_section() {
        let output = "\
The following migrations have been applied:
20240101000000_init
Pending migrations:
20240215120000_add_orders
";
        let status = parse_migrate_status(output);
        assert_eq!(status.applied, vec!["20240101000000_init"]);
        assert_eq!(status.pending, vec!["20240215120000_add_orders"]);
    }

    #[test]
    fn up_to_date_reports_nothing() {
        let status = parse_migrate_status("Database schema is up to date!\n");
        assert_eq!(status, StatusResult::default());
    }

    #[tokio::test]
    async fn rollback_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let svc = Service::new("billing", "prisma", dir.path());
        let err = PrismaAdapter::new()
            .rollback(&CancellationToken::new(), &svc, None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::UnsupportedOperation { .. }));
    }
}

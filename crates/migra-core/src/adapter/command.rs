use crate::error::{MigraError, Result};
use crate::types::{OperationResult, Service, Tenant};
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Run `program args..` in the service directory and normalize the outcome.
///
/// The child inherits the parent environment, overlaid with the service's
/// `env` and then the tenant's connection parameters. A non-zero exit is an
/// unsuccessful [`OperationResult`], not an `Err`; only spawn failures and
/// caller cancellation are errors. On cancellation the child is killed.
pub async fn run_command(
    cancel: &CancellationToken,
    service: &Service,
    tenant: Option<&Tenant>,
    program: &str,
    args: &[&str],
) -> Result<OperationResult> {
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(service.run_dir())
        .envs(&service.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(tenant) = tenant {
        cmd.envs(&tenant.connection);
    }

    tracing::debug!(
        service = %service.name,
        tenant = tenant.map(|t| t.id.as_str()),
        program,
        args = ?args,
        "running migration command"
    );

    let child = cmd.spawn().map_err(|source| MigraError::CommandSpawn {
        program: program.to_string(),
        source,
    })?;

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        out = child.wait_with_output() => out?,
        _ = cancel.cancelled() => return Err(MigraError::Cancelled),
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let duration = start.elapsed();

    if output.status.success() {
        Ok(OperationResult::succeeded(text, duration))
    } else {
        let error = if text.trim().is_empty() {
            format!("{program} exited with {}", output.status)
        } else {
            format!("{program} exited with {}: {}", output.status, text.trim())
        };
        Ok(OperationResult::failed(text, error, duration))
    }
}

static SECRET_RE: OnceLock<Regex> = OnceLock::new();

fn secret_re() -> &'static Regex {
    SECRET_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(password|pass|secret|token)=\S+").expect("valid secret pattern")
    })
}

/// Redact `password=`, `pass=`, `secret=` and `token=` values.
pub fn sanitize_output(output: &str) -> String {
    secret_re()
        .replace_all(output, "${1}=[REDACTED]")
        .into_owned()
}

/// Status queries need the command to succeed before their output means anything.
pub(crate) fn require_success(program: &str, result: OperationResult) -> Result<OperationResult> {
    if result.success {
        Ok(result)
    } else {
        Err(MigraError::CommandFailed {
            program: program.to_string(),
            message: sanitize_output(&result.error),
        })
    }
}

pub(crate) fn sanitize(mut result: OperationResult) -> OperationResult {
    result.output = sanitize_output(&result.output);
    result.error = sanitize_output(&result.error);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service_in(dir: &TempDir) -> Service {
        Service::new("users", "django", dir.path())
    }

    #[test]
    fn sanitize_redacts_known_keys() {
        let out = sanitize_output("connecting with PASSWORD=hunter2 user=bob token=abc123");
        assert_eq!(out, "connecting with PASSWORD=[REDACTED] user=bob token=[REDACTED]");
    }

    #[test]
    fn sanitize_leaves_clean_output_alone() {
        let out = sanitize_output("Applying users.0001_initial... OK");
        assert_eq!(out, "Applying users.0001_initial... OK");
    }

    #[tokio::test]
    async fn successful_command_captures_output() {
        let dir = TempDir::new().unwrap();
        let result = run_command(
            &CancellationToken::new(),
            &service_in(&dir),
            None,
            "sh",
            &["-c", "echo migrated"],
        )
        .await
        .unwrap();
        assert!(result.success);
        assert_eq!(result.output.trim(), "migrated");
        assert!(result.error.is_empty());
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_unsuccessful_result() {
        let dir = TempDir::new().unwrap();
        let result = run_command(
            &CancellationToken::new(),
            &service_in(&dir),
            None,
            "sh",
            &["-c", "echo broken >&2; exit 3"],
        )
        .await
        .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("broken"));
        assert!(result.error.starts_with("sh exited with"));
        assert!(result.error.contains("broken"));
    }

    #[tokio::test]
    async fn service_and_tenant_env_reach_the_child() {
        let dir = TempDir::new().unwrap();
        let mut svc = service_in(&dir);
        svc.env.insert("APP_ENV".into(), "staging".into());
        svc.env.insert("DATABASE_URL".into(), "postgres://shared".into());
        let mut tenant = Tenant::new("acme");
        tenant
            .connection
            .insert("DATABASE_URL".into(), "postgres://acme".into());

        let result = run_command(
            &CancellationToken::new(),
            &svc,
            Some(&tenant),
            "sh",
            &["-c", "echo $APP_ENV $DATABASE_URL"],
        )
        .await
        .unwrap();
        assert_eq!(result.output.trim(), "staging postgres://acme");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let err = run_command(
            &CancellationToken::new(),
            &service_in(&dir),
            None,
            "definitely-not-a-real-binary-migra",
            &[],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MigraError::CommandSpawn { .. }));
    }

    #[tokio::test]
    async fn caller_cancel_kills_the_command() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = run_command(&cancel, &service_in(&dir), None, "sleep", &["10"])
            .await
            .unwrap_err();
        assert!(matches!(err, MigraError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}

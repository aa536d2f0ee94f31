//! Execution engines.
//!
//! An [`Engine`] drives one [`Operation`] across an ordered list of services
//! for a single (tenant-less) context. [`SequentialEngine`] runs them in
//! order; [`ParallelEngine`] fans them out behind a counting admission gate.
//! Both share the per-service path in [`run_service`]: resolve the adapter,
//! dispatch, record the outcome.

mod parallel;
mod sequential;
mod summary;

pub use parallel::ParallelEngine;
pub use sequential::SequentialEngine;
pub use summary::ExecutionSummary;

use crate::adapter::{Adapter, AdapterRegistry};
use crate::error::Result;
use crate::state::StateStore;
use crate::types::{Operation, OperationResult, Service, ServiceResult, Tenant};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Concurrency ceiling used when none (or a non-positive one) is configured.
pub const DEFAULT_PARALLEL_LIMIT: usize = 5;

/// Output of every service in a dry run.
pub const DRY_RUN_OUTPUT: &str = "Dry run - no actual execution";

#[async_trait]
pub trait Engine: Send + Sync {
    /// Run `operation` for each service. Failures are reported per service
    /// in the returned list, never as `Err`. Services skipped because of
    /// stop-on-failure or caller cancellation are absent from the list.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        services: &[Service],
        operation: Operation,
    ) -> Result<Vec<ServiceResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub stop_on_failure: bool,
    pub dry_run: bool,
    /// Steps passed to adapters on rollback.
    pub rollback_steps: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stop_on_failure: true,
            dry_run: false,
            rollback_steps: 1,
        }
    }
}

/// Clamp a configured ceiling: zero means "use the default".
pub fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_PARALLEL_LIMIT
    } else {
        limit
    }
}

// ---------------------------------------------------------------------------
// Per-service execution
// ---------------------------------------------------------------------------

/// Outcome of one resolved-and-dispatched adapter call.
#[derive(Debug, Clone)]
pub(crate) struct Attempt {
    pub success: bool,
    pub duration: Duration,
    pub output: String,
    pub error: String,
}

impl Attempt {
    fn from_result(result: OperationResult) -> Self {
        Self {
            success: result.success,
            duration: result.duration,
            output: result.output,
            error: result.error,
        }
    }

    fn failed(error: String, duration: Duration) -> Self {
        Self {
            success: false,
            duration,
            output: String::new(),
            error,
        }
    }

    pub fn error_text(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(self.error.as_str())
        }
    }

    pub fn into_service_result(self, service: &Service) -> ServiceResult {
        ServiceResult {
            service_name: service.name.clone(),
            success: self.success,
            duration: self.duration,
            error: self.error,
            output: self.output,
        }
    }
}

/// Invoke the adapter method that corresponds to `operation`.
///
/// Status is reduced to its `Applied: N, Pending: M` summary.
pub(crate) async fn dispatch(
    adapter: &dyn Adapter,
    cancel: &CancellationToken,
    service: &Service,
    tenant: Option<&Tenant>,
    operation: Operation,
    rollback_steps: u32,
) -> Result<OperationResult> {
    match operation {
        Operation::Deploy => adapter.deploy(cancel, service, tenant).await,
        Operation::Rollback => {
            adapter
                .rollback(cancel, service, tenant, rollback_steps)
                .await
        }
        Operation::Status => {
            let start = Instant::now();
            let status = adapter.status(cancel, service, tenant).await?;
            Ok(OperationResult::succeeded(status.summary(), start.elapsed()))
        }
    }
}

/// Resolve the adapter for `service` and run `operation` once.
///
/// Resolution failures, adapter errors and adapter panics all come back as
/// a failed [`Attempt`]; nothing here returns early without an outcome.
/// The adapter call runs on its own task so a panic stays inside it.
pub(crate) async fn attempt(
    registry: &AdapterRegistry,
    cancel: &CancellationToken,
    service: &Service,
    tenant: Option<&Tenant>,
    operation: Operation,
    rollback_steps: u32,
) -> Attempt {
    let start = Instant::now();
    let adapter = match registry.get_for_service(service) {
        Ok(adapter) => adapter,
        Err(e) => return Attempt::failed(e.to_string(), start.elapsed()),
    };

    let call = {
        let cancel = cancel.clone();
        let service = service.clone();
        let tenant = tenant.cloned();
        tokio::spawn(async move {
            dispatch(
                adapter.as_ref(),
                &cancel,
                &service,
                tenant.as_ref(),
                operation,
                rollback_steps,
            )
            .await
        })
    };

    match call.await {
        Ok(Ok(result)) => Attempt::from_result(result),
        Ok(Err(e)) => Attempt::failed(e.to_string(), start.elapsed()),
        Err(e) => {
            tracing::error!(service = %service.name, error = %e, "adapter task failed");
            Attempt::failed(format!("adapter task failed: {e}"), start.elapsed())
        }
    }
}

/// Execute one service outside any tenant context and record the outcome.
pub(crate) async fn run_service(
    registry: &AdapterRegistry,
    store: &StateStore,
    options: EngineOptions,
    cancel: &CancellationToken,
    service: &Service,
    operation: Operation,
) -> ServiceResult {
    if options.dry_run {
        tracing::info!(service = %service.name, %operation, "dry run");
        return ServiceResult {
            service_name: service.name.clone(),
            success: true,
            duration: Duration::ZERO,
            error: String::new(),
            output: DRY_RUN_OUTPUT.to_string(),
        };
    }

    tracing::info!(service = %service.name, kind = %service.kind, %operation, "executing");
    let outcome = attempt(
        registry,
        cancel,
        service,
        None,
        operation,
        options.rollback_steps,
    )
    .await;

    if let Err(e) = store.record_service_execution(
        &service.name,
        outcome.success,
        outcome.duration,
        outcome.error_text(),
    ) {
        tracing::warn!(service = %service.name, error = %e, "failed to record execution state");
    }

    if outcome.success {
        tracing::info!(
            service = %service.name,
            %operation,
            duration = ?outcome.duration,
            "completed"
        );
    } else {
        tracing::error!(
            service = %service.name,
            %operation,
            duration = ?outcome.duration,
            error = %outcome.error,
            "failed"
        );
    }

    outcome.into_service_result(service)
}

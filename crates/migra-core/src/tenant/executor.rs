use super::{validate_tenants, TenantSource};
use crate::adapter::AdapterRegistry;
use crate::engine::{attempt, effective_limit};
use crate::error::{MigraError, Result};
use crate::state::StateStore;
use crate::types::{Operation, Service, Tenant, TenantResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantExecutorOptions {
    /// Tenants running at once; zero means the default.
    pub max_parallel: usize,
    /// Skip queued tenants once one tenant fails.
    pub stop_on_failure: bool,
    pub rollback_steps: u32,
    /// Run a single tenant by id.
    pub only: Option<String>,
}

impl Default for TenantExecutorOptions {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            stop_on_failure: false,
            rollback_steps: 1,
            only: None,
        }
    }
}

/// Runs the full service list once per tenant.
///
/// Tenants fan out behind their own admission gate; within a tenant the
/// services run strictly in order and the first failure ends that tenant.
pub struct TenantExecutor {
    source: Arc<dyn TenantSource>,
    registry: Arc<AdapterRegistry>,
    store: Arc<StateStore>,
    options: TenantExecutorOptions,
}

impl TenantExecutor {
    pub fn new(
        source: Arc<dyn TenantSource>,
        registry: Arc<AdapterRegistry>,
        store: Arc<StateStore>,
        options: TenantExecutorOptions,
    ) -> Self {
        Self {
            source,
            registry,
            store,
            options,
        }
    }

    /// Load, validate and (optionally) filter the tenant list.
    pub async fn load_tenants(&self, cancel: &CancellationToken) -> Result<Vec<Tenant>> {
        let origin = self.source.describe();
        let tenants = self
            .source
            .load_tenants(cancel)
            .await
            .and_then(|t| validate_tenants(t, &origin))
            .map_err(|e| MigraError::TenantLoad(Box::new(e)))?;

        match &self.options.only {
            None => Ok(tenants),
            Some(id) => tenants
                .into_iter()
                .find(|t| &t.id == id)
                .map(|t| vec![t])
                .ok_or_else(|| MigraError::TenantNotFound(id.clone())),
        }
    }

    /// Load tenants, then run every service for each of them.
    ///
    /// Only loading fails the call; per-tenant failures are in the results.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        services: &[Service],
        operation: Operation,
    ) -> Result<Vec<TenantResult>> {
        let tenants = self.load_tenants(cancel).await?;
        Ok(self
            .execute_tenants(cancel, tenants, services, operation)
            .await)
    }

    /// Fan out over an already loaded tenant list.
    pub async fn execute_tenants(
        &self,
        cancel: &CancellationToken,
        tenants: Vec<Tenant>,
        services: &[Service],
        operation: Operation,
    ) -> Vec<TenantResult> {
        let limit = effective_limit(self.options.max_parallel);
        tracing::info!(
            tenants = tenants.len(),
            services = services.len(),
            max_parallel = limit,
            %operation,
            "starting tenant run"
        );

        let stop = cancel.child_token();
        let gate = Arc::new(Semaphore::new(limit));
        let services: Arc<[Service]> = services.into();
        let ids: Vec<String> = tenants.iter().map(|t| t.id.clone()).collect();

        let mut handles = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let gate = gate.clone();
            let stop = stop.clone();
            let cancel = cancel.clone();
            let registry = self.registry.clone();
            let store = self.store.clone();
            let services = services.clone();
            let stop_on_failure = self.options.stop_on_failure;
            let steps = self.options.rollback_steps;

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return None,
                    permit = gate.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return None,
                    },
                };
                if stop.is_cancelled() {
                    tracing::debug!(tenant = %tenant.id, "skipped after stop");
                    return None;
                }

                // Raises the stop signal on a failed tenant and on unwind.
                let guard = stop_on_failure.then(|| stop.clone().drop_guard());
                let result =
                    run_tenant(&registry, &store, &cancel, &tenant, &services, operation, steps)
                        .await;
                if result.as_ref().is_some_and(|r| r.success) {
                    if let Some(guard) = guard {
                        guard.disarm();
                    }
                }
                result
            }));
        }

        let mut slots: Vec<Option<TenantResult>> = vec![None; handles.len()];
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => slots[idx] = result,
                Err(e) => {
                    tracing::error!(tenant = %ids[idx], error = %e, "tenant task failed");
                    slots[idx] = Some(TenantResult {
                        tenant_id: ids[idx].clone(),
                        success: false,
                        duration: Duration::ZERO,
                        error: format!("tenant task failed: {e}"),
                        service_count: services.len(),
                        succeeded: 0,
                    });
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}

/// Run every service for one tenant, stopping at the first failure.
///
/// `None` when the caller cancelled before the tenant finished: the tenant
/// counts as skipped, and services it already ran keep their records.
#[tracing::instrument(skip_all, fields(tenant = %tenant.id))]
async fn run_tenant(
    registry: &AdapterRegistry,
    store: &StateStore,
    cancel: &CancellationToken,
    tenant: &Tenant,
    services: &[Service],
    operation: Operation,
    rollback_steps: u32,
) -> Option<TenantResult> {
    let start = Instant::now();
    let mut succeeded = 0;
    let mut error = String::new();

    for service in services {
        if cancel.is_cancelled() {
            tracing::warn!(next = %service.name, completed = succeeded, "cancelled, not starting remaining services");
            return None;
        }

        let outcome = attempt(
            registry,
            cancel,
            service,
            Some(tenant),
            operation,
            rollback_steps,
        )
        .await;

        if let Err(e) = store.record_tenant_execution(
            &tenant.id,
            &service.name,
            outcome.success,
            outcome.duration,
            outcome.error_text(),
        ) {
            tracing::warn!(service = %service.name, error = %e, "failed to record execution state");
        }

        if !outcome.success {
            error = format!("service {} failed: {}", service.name, outcome.error);
            break;
        }
        succeeded += 1;
    }

    let success = succeeded == services.len();
    let duration = start.elapsed();
    if success {
        tracing::info!(%operation, duration = ?duration, "tenant completed");
    } else {
        tracing::error!(%operation, error = %error, "tenant failed");
    }

    Some(TenantResult {
        tenant_id: tenant.id.clone(),
        success,
        duration,
        error,
        service_count: services.len(),
        succeeded,
    })
}
